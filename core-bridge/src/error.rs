use bridge_traits::ErrorCode;
use core_runtime::{Handle, ResourceKind};
use thiserror::Error;

/// Failure surfaced to the host by any bridge operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("No {kind} is registered with handle {handle}")]
    InvalidHandle { kind: ResourceKind, handle: Handle },

    #[error("A {kind} is already registered with handle {handle}")]
    DuplicateHandle { kind: ResourceKind, handle: Handle },

    #[error("{kind} handle {handle} was disposed and cannot be reused")]
    RetiredHandle { kind: ResourceKind, handle: Handle },

    #[error("Native operation failed: {description} [{code}]")]
    NativeOperationFailed { code: ErrorCode, description: String },

    #[error("End of stream")]
    EndOfStream,

    #[error(
        "No channels available (local: {local}, remote: {remote}, direct candidates: {direct_candidates})"
    )]
    NoChannelsAvailable {
        local: ErrorCode,
        remote: ErrorCode,
        direct_candidates: ErrorCode,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot {operation} {kind} {handle} while {state}")]
    InvalidState {
        kind: ResourceKind,
        handle: Handle,
        operation: &'static str,
        state: &'static str,
    },

    #[error("Stream {handle} is closed")]
    StreamClosed { handle: Handle },

    #[error("Invalid connection options: {0}")]
    InvalidOptions(String),

    /// The native side dropped the completion without settling it, which
    /// happens when a resource is disposed while an operation is in flight.
    #[error("{operation} on {kind} {handle} was abandoned before it completed")]
    Abandoned {
        kind: ResourceKind,
        handle: Handle,
        operation: &'static str,
    },
}

impl BridgeError {
    /// Stable identifier hosts can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidHandle { .. } => "INVALID_HANDLE",
            BridgeError::DuplicateHandle { .. } => "DUPLICATE_HANDLE",
            BridgeError::RetiredHandle { .. } => "RETIRED_HANDLE",
            BridgeError::NativeOperationFailed { .. } => "NATIVE_OPERATION_FAILED",
            BridgeError::EndOfStream => "END_OF_STREAM",
            BridgeError::NoChannelsAvailable { .. } => "NO_CHANNELS_AVAILABLE",
            BridgeError::InvalidPayload(_) => "INVALID_PAYLOAD",
            BridgeError::InvalidArgument(_) => "INVALID_ARGUMENT",
            BridgeError::InvalidState { .. } => "INVALID_STATE",
            BridgeError::StreamClosed { .. } => "STREAM_CLOSED",
            BridgeError::InvalidOptions(_) => "INVALID_OPTIONS",
            BridgeError::Abandoned { .. } => "ABANDONED",
        }
    }

    /// Native status code behind the error, when there is one.
    pub fn native_code(&self) -> Option<ErrorCode> {
        match self {
            BridgeError::NativeOperationFailed { code, .. } => Some(*code),
            BridgeError::EndOfStream => Some(ErrorCode::END_OF_FILE),
            BridgeError::NoChannelsAvailable { .. } => Some(ErrorCode::NO_CHANNELS),
            _ => None,
        }
    }

    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, BridgeError::InvalidHandle { .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
