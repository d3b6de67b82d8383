//! Error types for the storage volume bindings.
//!
//! Native failures are reported exactly as libvirt describes them: the
//! error domain, the error code and the message read from the calling
//! thread's last-error slot. Nothing here reclassifies them.

use thiserror::Error;

/// Errors produced by the storage volume bindings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A native entry point returned its failure sentinel.
    #[error("{call} failed: {message} (domain {domain}, code {code})")]
    CallFailed {
        /// Name of the native entry point, e.g. `virStorageVolResize`.
        call: &'static str,
        /// libvirt error domain (`virErrorDomain`).
        domain: i32,
        /// libvirt error code (`virErrorNumber`).
        code: i32,
        /// Human readable message as reported by libvirt.
        message: String,
    },

    /// A raw flag or enumeration value is not part of the native ABI.
    #[error("invalid {kind} value: {value:#x}")]
    InvalidValue {
        kind: &'static str,
        value: u32,
    },

    /// A string argument cannot cross the C boundary.
    #[error("string argument contains an interior NUL byte: {0:?}")]
    InvalidString(String),
}

impl StorageError {
    /// Build a call failure from the error detail libvirt reported.
    pub fn call_failed(call: &'static str, detail: ErrorDetail) -> Self {
        Self::CallFailed {
            call,
            domain: detail.domain,
            code: detail.code,
            message: detail.message,
        }
    }

    /// libvirt error code, if this is a native failure.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::CallFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// libvirt error domain, if this is a native failure.
    pub fn domain(&self) -> Option<i32> {
        match self {
            Self::CallFailed { domain, .. } => Some(*domain),
            _ => None,
        }
    }
}

/// Snapshot of libvirt's thread-local `virError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub domain: i32,
    pub code: i32,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(domain: i32, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
        }
    }

    /// Detail used when a call failed but libvirt left no error behind.
    pub fn unreported() -> Self {
        Self::new(domain::NONE, code::OK, "no error detail reported by libvirt")
    }
}

/// Result type alias for storage volume operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// `virErrorDomain` values used by the bindings.
pub mod domain {
    pub const NONE: i32 = 0;
    pub const STORAGE: i32 = 18;
    pub const STREAMS: i32 = 38;
}

/// `virErrorNumber` values used by the bindings.
pub mod code {
    pub const OK: i32 = 0;
    pub const INTERNAL_ERROR: i32 = 1;
    pub const NO_SUPPORT: i32 = 3;
    pub const INVALID_ARG: i32 = 8;
    pub const OPERATION_FAILED: i32 = 9;
    pub const XML_ERROR: i32 = 27;
    pub const INVALID_STORAGE_POOL: i32 = 46;
    pub const INVALID_STORAGE_VOL: i32 = 47;
    pub const NO_STORAGE_POOL: i32 = 49;
    pub const NO_STORAGE_VOL: i32 = 50;
    pub const OPERATION_INVALID: i32 = 55;
    pub const INVALID_STREAM: i32 = 73;
    pub const STORAGE_VOL_EXIST: i32 = 90;
}
