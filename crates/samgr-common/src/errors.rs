//! Error types and wire reply codes.
//!
//! Every fallible operation in the workspace returns [`Result<T>`]. Errors
//! that cross a process boundary are flattened to a signed 32-bit reply code
//! with [`Error::code`] and rebuilt on the other side with [`Error::from_code`],
//! so a proxy surfaces the same variant the stub produced.
//!
//! ```
//! use samgr_common::{Error, Result};
//! use samgr_common::errors::codes;
//!
//! fn lookup() -> Result<()> {
//!     Err(Error::not_found("ability 1234"))
//! }
//!
//! let err = lookup().unwrap_err();
//! assert_eq!(err.code(), codes::ERR_NAME_NOT_FOUND);
//! assert!(matches!(Error::from_code(err.code()), Some(Error::NotFound { .. })));
//! ```

use thiserror::Error;

/// Result type alias for registry and manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Signed 32-bit reply codes. Zero is success, everything else is a failure.
pub mod codes {
    pub const ERR_OK: i32 = 0;
    pub const ERR_PERMISSION_DENIED: i32 = -1;
    pub const ERR_NAME_NOT_FOUND: i32 = -2;
    pub const ERR_BUSY: i32 = -16;
    pub const ERR_ALREADY_EXISTS: i32 = -17;
    pub const ERR_INVALID_VALUE: i32 = -22;
    pub const ERR_UNKNOWN_TRANSACTION: i32 = -74;
    pub const ERR_TIMED_OUT: i32 = -110;
    pub const ERR_TRANSACTION_FAILED: i32 = -129;
    pub const ERR_FLATTEN_OBJECT: i32 = -1001;
    pub const ERR_UNKNOWN: i32 = i32::MIN;
}

/// Main error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or out-of-range input, rejected before any state changes.
    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    /// Interface token mismatch, or a per-caller quota or map capacity was
    /// exceeded.
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// A requested ability, process or subscription does not exist.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The entry is already registered.
    #[error("Already exists: {resource}")]
    AlreadyExists { resource: String },

    /// A bounded wait elapsed.
    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    /// The underlying channel failed (dead peer, closed queue).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// A parcel could not be written or read.
    #[error("Parcel error: {0}")]
    Parcel(String),

    /// The target does not understand the operation code.
    #[error("Unknown transaction code: {0}")]
    UnknownTransaction(u32),

    /// A worker pool refused a task because its queue is full.
    #[error("Task queue full for pool '{pool}' (limit: {limit})")]
    QueueFull { pool: String, limit: usize },

    /// A worker task panicked.
    #[error("Task panicked in pool '{pool}': {message}")]
    TaskPanic { pool: String, message: String },

    /// A non-zero reply code with no local counterpart.
    #[error("Remote returned error code {0}")]
    Remote(i32),

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error with added context.
    #[error("{message}: {source}")]
    WithContext { message: String, source: Box<Error> },
}

impl Error {
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn parcel(message: impl Into<String>) -> Self {
        Self::Parcel(message.into())
    }

    pub fn queue_full(pool: impl Into<String>, limit: usize) -> Self {
        Self::QueueFull {
            pool: pool.into(),
            limit,
        }
    }

    pub fn task_panic(pool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskPanic {
            pool: pool.into(),
            message: message.into(),
        }
    }

    /// Adds context to an error.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Reply code sent over the wire for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidValue { .. } => codes::ERR_INVALID_VALUE,
            Self::PermissionDenied { .. } => codes::ERR_PERMISSION_DENIED,
            Self::NotFound { .. } => codes::ERR_NAME_NOT_FOUND,
            Self::AlreadyExists { .. } => codes::ERR_ALREADY_EXISTS,
            Self::Timeout { .. } => codes::ERR_TIMED_OUT,
            Self::Transport(_) => codes::ERR_TRANSACTION_FAILED,
            Self::Parcel(_) => codes::ERR_FLATTEN_OBJECT,
            Self::UnknownTransaction(_) => codes::ERR_UNKNOWN_TRANSACTION,
            Self::QueueFull { .. } => codes::ERR_BUSY,
            Self::TaskPanic { .. } | Self::Internal(_) => codes::ERR_UNKNOWN,
            Self::Remote(code) => *code,
            Self::WithContext { source, .. } => source.code(),
        }
    }

    /// Rebuilds an error from a reply code. Returns `None` for `ERR_OK`.
    pub fn from_code(code: i32) -> Option<Self> {
        let err = match code {
            codes::ERR_OK => return None,
            codes::ERR_INVALID_VALUE => Self::invalid_value("rejected by remote"),
            codes::ERR_PERMISSION_DENIED => Self::permission_denied("rejected by remote"),
            codes::ERR_NAME_NOT_FOUND => Self::not_found("remote entry"),
            codes::ERR_ALREADY_EXISTS => Self::already_exists("remote entry"),
            codes::ERR_TIMED_OUT => Self::timeout("remote operation"),
            codes::ERR_TRANSACTION_FAILED => Self::transport("remote transaction failed"),
            codes::ERR_FLATTEN_OBJECT => Self::parcel("remote could not read the request"),
            codes::ERR_BUSY => Self::queue_full("remote", 0),
            other => Self::Remote(other),
        };
        Some(err)
    }

    /// True for quota and capacity violations as well as token mismatches.
    pub fn is_permission_denied(&self) -> bool {
        self.code() == codes::ERR_PERMISSION_DENIED
    }

    /// True when the addressed entry was absent.
    pub fn is_not_found(&self) -> bool {
        self.code() == codes::ERR_NAME_NOT_FOUND
    }
}

/// Converts a reply code into a `Result`.
pub fn check_code(code: i32) -> Result<()> {
    match Error::from_code(code) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Flattens a `Result` into a reply code.
pub fn to_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => codes::ERR_OK,
        Err(e) => e.code(),
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}
