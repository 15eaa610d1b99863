//! Native status codes and the error type reported by SDK implementations.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status code reported by the native SDK.
///
/// Every callback-based native operation completes with one of these codes.
/// [`ErrorCode::OK`] means success; everything else is a failure whose
/// meaning is owned by the SDK. Two codes are special-cased by the bridge:
/// [`ErrorCode::END_OF_FILE`] and [`ErrorCode::NO_CHANNELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0);
    pub const ABORTED: ErrorCode = ErrorCode(1);
    pub const ACCESS_DENIED: ErrorCode = ErrorCode(2);
    pub const BAD_RESPONSE: ErrorCode = ErrorCode(3);
    pub const CLOSED: ErrorCode = ErrorCode(4);
    pub const DNS: ErrorCode = ErrorCode(5);
    pub const END_OF_FILE: ErrorCode = ErrorCode(6);
    pub const FORBIDDEN: ErrorCode = ErrorCode(7);
    pub const INVALID_ARGUMENT: ErrorCode = ErrorCode(8);
    pub const INVALID_STATE: ErrorCode = ErrorCode(9);
    pub const NO_CHANNELS: ErrorCode = ErrorCode(10);
    pub const NO_DATA: ErrorCode = ErrorCode(11);
    pub const NONE: ErrorCode = ErrorCode(12);
    pub const NOT_CONNECTED: ErrorCode = ErrorCode(13);
    pub const NOT_FOUND: ErrorCode = ErrorCode(14);
    pub const NOT_SUPPORTED: ErrorCode = ErrorCode(15);
    pub const OPERATION_IN_PROGRESS: ErrorCode = ErrorCode(16);
    pub const STOPPED: ErrorCode = ErrorCode(17);
    pub const TIMEOUT: ErrorCode = ErrorCode(18);
    pub const UNAUTHORIZED: ErrorCode = ErrorCode(19);
    pub const UNKNOWN: ErrorCode = ErrorCode(20);

    /// Returns true for [`ErrorCode::OK`].
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Symbolic name of the code, `"UNKNOWN"` for codes outside the known set.
    pub fn name(self) -> &'static str {
        match self {
            Self::OK => "OK",
            Self::ABORTED => "ABORTED",
            Self::ACCESS_DENIED => "ACCESS_DENIED",
            Self::BAD_RESPONSE => "BAD_RESPONSE",
            Self::CLOSED => "CLOSED",
            Self::DNS => "DNS",
            Self::END_OF_FILE => "END_OF_FILE",
            Self::FORBIDDEN => "FORBIDDEN",
            Self::INVALID_ARGUMENT => "INVALID_ARGUMENT",
            Self::INVALID_STATE => "INVALID_STATE",
            Self::NO_CHANNELS => "NO_CHANNELS",
            Self::NO_DATA => "NO_DATA",
            Self::NONE => "NONE",
            Self::NOT_CONNECTED => "NOT_CONNECTED",
            Self::NOT_FOUND => "NOT_FOUND",
            Self::NOT_SUPPORTED => "NOT_SUPPORTED",
            Self::OPERATION_IN_PROGRESS => "OPERATION_IN_PROGRESS",
            Self::STOPPED => "STOPPED",
            Self::TIMEOUT => "TIMEOUT",
            Self::UNAUTHORIZED => "UNAUTHORIZED",
            _ => "UNKNOWN",
        }
    }

    /// Human-readable description, used when the SDK reports a bare code.
    pub fn description(self) -> &'static str {
        match self {
            Self::OK => "Ok",
            Self::ABORTED => "The operation was aborted",
            Self::ACCESS_DENIED => "Access denied",
            Self::BAD_RESPONSE => "The peer sent a malformed response",
            Self::CLOSED => "The resource is closed",
            Self::DNS => "DNS resolution failed",
            Self::END_OF_FILE => "End of file",
            Self::FORBIDDEN => "The request was forbidden",
            Self::INVALID_ARGUMENT => "Invalid argument",
            Self::INVALID_STATE => "The resource is in an invalid state for this operation",
            Self::NO_CHANNELS => "No connectivity channels could be established",
            Self::NO_DATA => "No data available",
            Self::NONE => "No error recorded",
            Self::NOT_CONNECTED => "The connection is not established",
            Self::NOT_FOUND => "Not found",
            Self::NOT_SUPPORTED => "The operation is not supported on this platform",
            Self::OPERATION_IN_PROGRESS => "Another operation is in progress",
            Self::STOPPED => "The client has been stopped",
            Self::TIMEOUT => "The operation timed out",
            Self::UNAUTHORIZED => "Unauthorized",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Failure raised by a synchronous native call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{description} [{code}]")]
pub struct NativeError {
    pub code: ErrorCode,
    pub description: String,
}

impl NativeError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Builds an error carrying the code's default description.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.description())
    }

    pub fn not_supported(operation: &str) -> Self {
        Self::new(
            ErrorCode::NOT_SUPPORTED,
            format!("{} is not supported by this SDK build", operation),
        )
    }
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Error type for host-provided sinks (see [`crate::log::LoggerSink`]).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;
