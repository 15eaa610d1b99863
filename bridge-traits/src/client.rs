//! SDK entry point and client objects.

use std::sync::Arc;

use crate::{
    connection::NativeConnection,
    error::NativeResult,
    mdns::NativeMdnsScanner,
};

/// Platform context handed to the SDK when a client is created.
///
/// On Android this stands in for the application context; other platforms
/// only use the application name for SDK-side logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub application_name: Option<String>,
    pub application_version: Option<String>,
}

impl ClientContext {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: Some(application_name.into()),
            application_version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = Some(version.into());
        self
    }
}

/// Factory for native clients.
///
/// # Platform Support
///
/// - **Android / iOS**: wraps the vendor client library
/// - **Tests / desktop tooling**: `bridge-loopback` simulates devices in-process
pub trait NativeSdk: Send + Sync {
    /// Create a new, independent client instance.
    fn create_client(&self, context: &ClientContext) -> NativeResult<Arc<dyn NativeClient>>;
}

/// One SDK client instance.
pub trait NativeClient: Send + Sync {
    /// SDK version string.
    fn version(&self) -> String;

    /// Set the SDK's internal log level (`"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`).
    fn set_log_level(&self, level: &str) -> NativeResult<()>;

    /// Generate a new private key in PEM format.
    ///
    /// May block for the duration of key generation.
    fn create_private_key(&self) -> NativeResult<String>;

    fn create_connection(&self) -> NativeResult<Arc<dyn NativeConnection>>;

    /// Create a discovery scanner. An empty subtype means "no filter".
    fn create_mdns_scanner(&self, subtype: &str) -> NativeResult<Arc<dyn NativeMdnsScanner>>;

    /// Release the client. Objects created from it stop working afterwards.
    fn close(&self);
}
