//! Failures raised while assembling the bridge, before any handle exists.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A platform piece the bridge cannot run without was not injected.
    #[error("{capability} is not available: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging could not be installed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
