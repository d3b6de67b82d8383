//! # limiquantix Common
//!
//! Shared utilities for the limiquantix tools.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use limiquantix_common::{init_logging, TimedOperation};
//!
//! init_logging("info")?;
//!
//! let op = TimedOperation::start("wipe");
//! // ...
//! op.finish();
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, TimedOperation};
