//! # limiquantix Volume Control
//!
//! Command-line front end for the storage volume bindings. Each subcommand
//! maps to one volume operation; results print as text or JSON.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Args, Command};
pub use commands::{execute, run, Output};
pub use config::Config;
