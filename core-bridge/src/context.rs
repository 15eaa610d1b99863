//! Per-instance bridge state shared by every facade.

use bridge_traits::{ClientContext, LogLevel, NativeSdk};
use core_runtime::config::BridgeConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::{Handle, HandleAllocator, ResourceKind};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapter::CallAdapter;
use crate::error::Result;
use crate::forwarder::EventForwarder;
use crate::registry::HandleRegistry;

/// Everything one bridge instance owns: the native SDK, the handle registry
/// and the event plumbing.
///
/// Resource operations are available on the context keyed by handle (for a
/// host marshaling layer) and through the typed facades such as
/// [`EdgeClient`](crate::EdgeClient), which hold an `Arc<BridgeContext>` and a
/// handle.
pub struct BridgeContext {
    pub(crate) sdk: Arc<dyn NativeSdk>,
    pub(crate) client_context: ClientContext,
    pub(crate) sdk_log_level: Option<LogLevel>,
    pub(crate) registry: HandleRegistry,
    pub(crate) adapter: CallAdapter,
    pub(crate) forwarder: EventForwarder,
    allocator: HandleAllocator,
}

impl BridgeContext {
    pub fn new(config: &BridgeConfig) -> Self {
        info!(
            event_buffer_size = config.event_buffer_size,
            strict_feature_parity = config.features.strict_feature_parity,
            "Creating bridge context"
        );
        Self {
            sdk: Arc::clone(&config.sdk),
            client_context: config.client_context.clone(),
            sdk_log_level: config.sdk_log_level,
            registry: HandleRegistry::new(),
            adapter: CallAdapter::new(config.features.strict_feature_parity),
            forwarder: EventForwarder::new(EventBus::new(config.event_buffer_size)),
            allocator: HandleAllocator::new(),
        }
    }

    pub fn shared(config: &BridgeConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &CallAdapter {
        &self.adapter
    }

    pub fn event_bus(&self) -> &EventBus {
        self.forwarder.bus()
    }

    /// Subscribe to every event produced from now on.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.forwarder.bus().subscribe())
    }

    /// Next unused handle for `kind`.
    ///
    /// Numbers a host that allocates its own handles has registered, now or
    /// before, are skipped.
    pub fn allocate(&self, kind: ResourceKind) -> Handle {
        loop {
            let handle = self.allocator.allocate(kind);
            if !self.registry.is_used(kind, handle) {
                return handle;
            }
        }
    }

    /// Dispose the resource of `kind` registered under `handle`.
    ///
    /// Unknown handles are ignored.
    pub async fn dispose(&self, kind: ResourceKind, handle: Handle) -> Result<()> {
        match kind {
            ResourceKind::Client => self.client_dispose(handle).await,
            ResourceKind::Connection => self.connection_dispose(handle).await,
            ResourceKind::Stream => self.stream_dispose(handle).await,
            ResourceKind::Coap => self.coap_dispose(handle).await,
            ResourceKind::TcpTunnel => self.tunnel_dispose(handle).await,
            ResourceKind::MdnsScanner => self.scanner_dispose(handle).await,
        }
    }

    /// Dispose every registered resource, dependents before their owners.
    ///
    /// Returns the number of resources disposed.
    pub async fn shutdown(&self) -> usize {
        let mut disposed = 0;
        for kind in ResourceKind::TEARDOWN_ORDER {
            for handle in self.registry.handles(kind) {
                match self.dispose(kind, handle).await {
                    Ok(()) => disposed += 1,
                    Err(e) => warn!(%kind, %handle, error = %e, "Dispose failed during shutdown"),
                }
            }
        }
        debug!(disposed, "Bridge shut down");
        disposed
    }
}

impl fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("BridgeContext");
        for kind in ResourceKind::TEARDOWN_ORDER {
            s.field(kind.as_str(), &self.registry.len(kind));
        }
        s.field("strict_parity", &self.adapter.strict_parity())
            .finish_non_exhaustive()
    }
}
