//! Bridge configuration.
//!
//! A [`BridgeConfig`] names the [`NativeSdk`] every client is created from,
//! plus the settings shared by all clients of one bridge context. It is
//! assembled with [`BridgeConfig::builder`] and checked once, in
//! [`BridgeConfigBuilder::build`], so a host that forgot to inject its SDK
//! fails at startup instead of on its first `createNabtoClient`.
//!
//! With the `loopback-shims` feature a missing SDK is replaced by the
//! in-process loopback SDK, which needs an ambient Tokio runtime.
//!
//! ```ignore
//! let config = BridgeConfig::builder()
//!     .sdk(Arc::new(PlatformSdk::new()))
//!     .application_name("Thermostat")
//!     .sdk_log_level(LogLevel::Info)
//!     .build()?;
//! ```

use bridge_traits::{ClientContext, LogLevel, NativeSdk};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Largest accepted event bus buffer.
pub const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

#[derive(Clone)]
pub struct BridgeConfig {
    pub sdk: Arc<dyn NativeSdk>,
    /// Passed to [`NativeSdk::create_client`] for every client.
    pub client_context: ClientContext,
    pub event_buffer_size: usize,
    /// Applied to each client right after creation.
    pub sdk_log_level: Option<LogLevel>,
    pub features: FeatureFlags,
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("sdk", &"NativeSdk { ... }")
            .field("client_context", &self.client_context)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("sdk_log_level", &self.sdk_log_level)
            .field("features", &self.features)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Report `NOT_SUPPORTED` for direct-candidate and channel-diagnostic
    /// calls the platform SDK lacks. When off they succeed as no-ops.
    pub strict_feature_parity: bool,
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        let size = self.event_buffer_size;
        if !(1..=MAX_EVENT_BUFFER_SIZE).contains(&size) {
            return Err(Error::Config(format!(
                "event_buffer_size {} is outside 1..={}",
                size, MAX_EVENT_BUFFER_SIZE
            )));
        }

        let blank = |value: &Option<String>| value.as_deref().is_some_and(|v| v.trim().is_empty());
        if blank(&self.client_context.application_name) {
            return Err(Error::Config("application_name is blank".to_string()));
        }
        if blank(&self.client_context.application_version) {
            return Err(Error::Config("application_version is blank".to_string()));
        }

        Ok(())
    }
}

fn missing_sdk(message: String) -> Error {
    Error::CapabilityMissing {
        capability: "NativeSdk".to_string(),
        message,
    }
}

#[cfg(feature = "loopback-shims")]
fn fallback_sdk() -> Result<Arc<dyn NativeSdk>> {
    let sdk = bridge_loopback::LoopbackSdk::current().map_err(|e| {
        missing_sdk(format!(
            "the loopback SDK needs a Tokio runtime ({}); build inside one or call .sdk(..)",
            e
        ))
    })?;
    Ok(Arc::new(sdk))
}

#[cfg(not(feature = "loopback-shims"))]
fn fallback_sdk() -> Result<Arc<dyn NativeSdk>> {
    Err(missing_sdk(
        "call .sdk(..) with the platform binding, or enable the 'loopback-shims' feature \
         for the in-process simulator"
            .to_string(),
    ))
}

#[derive(Default)]
pub struct BridgeConfigBuilder {
    sdk: Option<Arc<dyn NativeSdk>>,
    client_context: ClientContext,
    event_buffer_size: Option<usize>,
    sdk_log_level: Option<LogLevel>,
    features: FeatureFlags,
}

impl BridgeConfigBuilder {
    pub fn sdk(mut self, sdk: Arc<dyn NativeSdk>) -> Self {
        self.sdk = Some(sdk);
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.client_context.application_name = Some(name.into());
        self
    }

    pub fn application_version(mut self, version: impl Into<String>) -> Self {
        self.client_context.application_version = Some(version.into());
        self
    }

    /// Replaces both application fields at once.
    pub fn client_context(mut self, context: ClientContext) -> Self {
        self.client_context = context;
        self
    }

    /// Defaults to [`DEFAULT_EVENT_BUFFER_SIZE`].
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn sdk_log_level(mut self, level: LogLevel) -> Self {
        self.sdk_log_level = Some(level);
        self
    }

    pub fn strict_feature_parity(mut self, enabled: bool) -> Self {
        self.features.strict_feature_parity = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn build(self) -> Result<BridgeConfig> {
        let sdk = match self.sdk {
            Some(sdk) => sdk,
            None => fallback_sdk()?,
        };
        let config = BridgeConfig {
            sdk,
            client_context: self.client_context,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            sdk_log_level: self.sdk_log_level,
            features: self.features,
        };
        config.validate().map(|()| config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{NativeClient, NativeResult};
    use mockall::mock;

    mock! {
        pub Sdk {}

        impl NativeSdk for Sdk {
            fn create_client(&self, context: &ClientContext) -> NativeResult<Arc<dyn NativeClient>>;
        }
    }

    fn sdk() -> Arc<dyn NativeSdk> {
        Arc::new(MockSdk::new())
    }

    #[test]
    fn test_build_with_defaults() {
        let config = BridgeConfig::builder().sdk(sdk()).build().unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.sdk_log_level, None);
        assert!(!config.features.strict_feature_parity);
        assert_eq!(config.client_context, ClientContext::default());
    }

    #[test]
    fn test_build_with_all_settings() {
        let config = BridgeConfig::builder()
            .sdk(sdk())
            .application_name("Thermostat")
            .application_version("2.1.0")
            .event_buffer_size(512)
            .sdk_log_level(LogLevel::Debug)
            .strict_feature_parity(true)
            .build()
            .unwrap();

        assert_eq!(config.client_context.application_name.as_deref(), Some("Thermostat"));
        assert_eq!(config.client_context.application_version.as_deref(), Some("2.1.0"));
        assert_eq!(config.event_buffer_size, 512);
        assert_eq!(config.sdk_log_level, Some(LogLevel::Debug));
        assert!(config.features.strict_feature_parity);
    }

    #[cfg(not(feature = "loopback-shims"))]
    #[test]
    fn test_builder_requires_sdk() {
        let result = BridgeConfig::builder().application_name("Thermostat").build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("NativeSdk"));
        assert!(err_msg.contains("loopback-shims"));
    }

    #[cfg(feature = "loopback-shims")]
    #[tokio::test]
    async fn test_build_with_loopback_default() {
        let config = BridgeConfig::builder().build().unwrap();
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_event_buffer_bounds() {
        let zero = BridgeConfig::builder().sdk(sdk()).event_buffer_size(0).build();
        assert!(zero.unwrap_err().to_string().contains("outside 1..=65536"));

        let huge = BridgeConfig::builder()
            .sdk(sdk())
            .event_buffer_size(MAX_EVENT_BUFFER_SIZE + 1)
            .build();
        assert!(matches!(huge.unwrap_err(), Error::Config(_)));

        let max = BridgeConfig::builder()
            .sdk(sdk())
            .event_buffer_size(MAX_EVENT_BUFFER_SIZE)
            .build();
        assert!(max.is_ok());
    }

    #[test]
    fn test_blank_application_name_rejected() {
        let result = BridgeConfig::builder().sdk(sdk()).application_name("  ").build();
        assert!(result.unwrap_err().to_string().contains("application_name is blank"));

        let result = BridgeConfig::builder().sdk(sdk()).application_version("").build();
        assert!(result.unwrap_err().to_string().contains("application_version"));
    }

    #[test]
    fn test_debug_hides_sdk() {
        let config = BridgeConfig::builder().sdk(sdk()).build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("NativeSdk { ... }"));
        assert!(debug.contains("event_buffer_size: 100"));
    }
}
