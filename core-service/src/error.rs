use core_bridge::BridgeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Invalid host request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// Stable identifier the host can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Bridge(e) => e.code(),
            ServiceError::Runtime(core_runtime::Error::CapabilityMissing { .. }) => {
                "CAPABILITY_MISSING"
            }
            ServiceError::Runtime(core_runtime::Error::Config(_)) => "INVALID_CONFIGURATION",
            ServiceError::Runtime(core_runtime::Error::Logging(_)) => "INTERNAL",
            ServiceError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Error shape returned across the host boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostError {
    pub code: String,
    pub message: String,
    /// Native SDK status for failures that came from the SDK.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_code: Option<i32>,
    /// Per-channel diagnostics of a `NO_CHANNELS_AVAILABLE` failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_error_codes: Option<ChannelErrorCodes>,
}

/// Native status of each channel a connect attempt tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelErrorCodes {
    pub local: i32,
    pub remote: i32,
    pub direct_candidates: i32,
}

impl From<ServiceError> for HostError {
    fn from(error: ServiceError) -> Self {
        let (native_code, channel_error_codes) = match &error {
            ServiceError::Bridge(e) => (e.native_code().map(|code| code.0), channel_codes(e)),
            _ => (None, None),
        };
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            native_code,
            channel_error_codes,
        }
    }
}

fn channel_codes(error: &BridgeError) -> Option<ChannelErrorCodes> {
    match *error {
        BridgeError::NoChannelsAvailable {
            local,
            remote,
            direct_candidates,
        } => Some(ChannelErrorCodes {
            local: local.0,
            remote: remote.0,
            direct_candidates: direct_candidates.0,
        }),
        _ => None,
    }
}

impl From<BridgeError> for HostError {
    fn from(error: BridgeError) -> Self {
        ServiceError::from(error).into()
    }
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for HostError {}
