//! Core service façade and bootstrap helpers.
//!
//! This crate sits between a host runtime and the bridge. It owns one
//! [`BridgeContext`], exposes the JSON marshaling layer ([`dispatch`]) the
//! host calls into, and pumps bridge events back out through a
//! [`HostEventEmitter`]. Hosts without a native SDK at hand (tests, demos)
//! enable the `loopback-shims` feature and get the in-process loopback SDK.

pub mod dispatch;
pub mod emitter;
pub mod error;
pub mod payload;

pub use dispatch::{CoapResult, HostCall, HostDispatcher};
pub use emitter::{spawn_event_pump, HostEventEmitter};
pub use error::{ChannelErrorCodes, HostError, Result, ServiceError};

use std::sync::Arc;

use core_bridge::BridgeContext;
use core_runtime::config::BridgeConfig;
use core_runtime::events::EventStream;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct EdgeClientService {
    context: Arc<BridgeContext>,
    dispatcher: HostDispatcher,
}

impl EdgeClientService {
    /// Create a service around a fresh bridge context.
    pub fn new(config: &BridgeConfig) -> Self {
        let context = BridgeContext::shared(config);
        info!(
            application = config.client_context.application_name.as_deref().unwrap_or("<unnamed>"),
            "Edge client service ready"
        );
        Self {
            dispatcher: HostDispatcher::new(Arc::clone(&context)),
            context,
        }
    }

    /// Access the bridge context for typed facades.
    pub fn context(&self) -> Arc<BridgeContext> {
        Arc::clone(&self.context)
    }

    pub fn dispatcher(&self) -> &HostDispatcher {
        &self.dispatcher
    }

    /// Handle one raw JSON request from the host.
    pub async fn dispatch(&self, request: Value) -> std::result::Result<Value, HostError> {
        self.dispatcher.dispatch_json(request).await
    }

    pub fn events(&self) -> EventStream {
        self.context.events()
    }

    /// Forward every bridge event produced from now on to `emitter`.
    pub fn forward_events(&self, emitter: Arc<dyn HostEventEmitter>) -> JoinHandle<()> {
        spawn_event_pump(self.context.events(), emitter)
    }

    /// Dispose every resource the host left behind.
    pub async fn shutdown(&self) -> usize {
        self.context.shutdown().await
    }
}

impl std::fmt::Debug for EdgeClientService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeClientService")
            .field("context", &self.context)
            .finish()
    }
}

/// Convenience bootstrapper backed by the loopback SDK.
///
/// ```
/// # #[cfg(feature = "loopback-shims")]
/// # async fn example() -> core_service::Result<()> {
/// use core_service::bootstrap_loopback;
/// use serde_json::json;
///
/// let (service, sdk) = bootstrap_loopback("my-app")?;
/// service
///     .dispatch(json!({ "method": "createNabtoClient", "clientId": 0 }))
///     .await
///     .ok();
/// # drop(sdk);
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "loopback-shims")]
pub fn bootstrap_loopback(
    application_name: &str,
) -> Result<(EdgeClientService, bridge_loopback::LoopbackSdk)> {
    let sdk = bridge_loopback::LoopbackSdk::current().map_err(|e| {
        ServiceError::Runtime(core_runtime::Error::CapabilityMissing {
            capability: "NativeSdk".to_string(),
            message: e.to_string(),
        })
    })?;
    let config = BridgeConfig::builder()
        .sdk(Arc::new(sdk.clone()))
        .application_name(application_name)
        .build()?;
    Ok((EdgeClientService::new(&config), sdk))
}
