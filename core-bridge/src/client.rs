//! Client facade and handle-keyed client operations.

use bridge_traits::NativeClient;
use core_runtime::{Handle, ResourceKind};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::adapter::Call;
use crate::connection::{Connection, ConnectionEntry};
use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};
use crate::mdns::{MdnsScanner, ScannerEntry};

pub struct ClientEntry {
    native: Arc<dyn NativeClient>,
}

impl ClientEntry {
    pub fn native(&self) -> &Arc<dyn NativeClient> {
        &self.native
    }
}

fn call(handle: Handle, operation: &'static str) -> Call {
    Call::new(ResourceKind::Client, handle, operation)
}

// ============================================================================
// Handle-keyed operations
// ============================================================================

impl BridgeContext {
    /// Create a native client and register it under `handle`.
    ///
    /// The configured SDK log level, if any, is applied before registration.
    #[instrument(skip(self), level = "debug")]
    pub async fn create_client(&self, handle: Handle) -> Result<()> {
        self.registry.clients.ensure_vacant(handle)?;

        let native = self.adapter.fallible(call(handle, "create_client"), None, || {
            self.sdk.create_client(&self.client_context)
        })?;

        if let Some(level) = self.sdk_log_level {
            let applied = self
                .adapter
                .fallible(call(handle, "set_log_level"), None, || {
                    native.set_log_level(level.as_sdk_level())
                });
            if let Err(e) = applied {
                native.close();
                return Err(e);
            }
        }

        let entry = Arc::new(ClientEntry {
            native: Arc::clone(&native),
        });
        if let Err(e) = self.registry.clients.register(handle, entry) {
            native.close();
            return Err(e);
        }

        info!(client = %handle, version = %native.version(), "Client created");
        Ok(())
    }

    pub async fn client_version(&self, handle: Handle) -> Result<String> {
        let entry = self.registry.clients.resolve(handle)?;
        Ok(self
            .adapter
            .value(call(handle, "version"), || entry.native.version()))
    }

    /// Set the native SDK log level (`none`, `error`, `warn`, `info`, `debug`, `trace`).
    pub async fn client_set_log_level(&self, handle: Handle, level: &str) -> Result<()> {
        let entry = self.registry.clients.resolve(handle)?;
        self.adapter
            .fallible(call(handle, "set_log_level"), None, || {
                entry.native.set_log_level(level)
            })
    }

    /// Generate a private key in PEM form.
    pub async fn client_create_private_key(&self, handle: Handle) -> Result<String> {
        let entry = self.registry.clients.resolve(handle)?;
        let native = Arc::clone(&entry.native);
        self.adapter
            .blocking(call(handle, "create_private_key"), move || {
                native.create_private_key()
            })
            .await
    }

    /// Create a connection owned by `client` and register it under `connection`.
    #[instrument(skip(self), level = "debug")]
    pub async fn client_create_connection(&self, client: Handle, connection: Handle) -> Result<()> {
        let entry = self.registry.clients.resolve(client)?;
        self.registry.connections.ensure_vacant(connection)?;

        let native = self
            .adapter
            .fallible(call(client, "create_connection"), None, || {
                entry.native.create_connection()
            })?;

        let entry = ConnectionEntry::new(client, Arc::clone(&native));
        let subscription = self.forwarder.forward_connection_events(
            connection,
            Arc::clone(&native),
            entry.listeners(),
        );
        entry.attach_subscription(subscription);

        // On failure the entry is dropped, which cancels its subscription.
        if let Err(e) = self.registry.connections.register(connection, Arc::new(entry)) {
            native.close();
            return Err(e);
        }

        debug!(%client, %connection, "Connection created");
        Ok(())
    }

    /// Create a scanner owned by `client` and register it under `scanner`.
    ///
    /// An empty `subtype` scans for every device.
    pub async fn client_create_mdns_scanner(
        &self,
        client: Handle,
        scanner: Handle,
        subtype: &str,
    ) -> Result<()> {
        let entry = self.registry.clients.resolve(client)?;
        self.registry.scanners.ensure_vacant(scanner)?;

        let native = self
            .adapter
            .fallible(call(client, "create_mdns_scanner"), None, || {
                entry.native.create_mdns_scanner(subtype)
            })?;

        self.registry.scanners.register(
            scanner,
            Arc::new(ScannerEntry::new(client, subtype.to_string(), native)),
        )?;

        debug!(%client, %scanner, subtype, "Scanner created");
        Ok(())
    }

    /// Close the native client and remove its handle. Idempotent.
    ///
    /// Connections and scanners created from the client stay registered until
    /// they are disposed, but only `close` and `dispose` still work on them.
    pub async fn client_dispose(&self, handle: Handle) -> Result<()> {
        if let Some(entry) = self.registry.clients.remove(handle) {
            self.adapter
                .value(call(handle, "close"), || entry.native.close());
            info!(client = %handle, "Client disposed");
        }
        Ok(())
    }

    /// Resolve `client`, reporting a disposed owner as an invalid client handle.
    pub(crate) fn ensure_client(&self, client: Handle) -> Result<()> {
        if self.registry.clients.contains(client) {
            Ok(())
        } else {
            Err(BridgeError::InvalidHandle {
                kind: ResourceKind::Client,
                handle: client,
            })
        }
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Host-facing client.
///
/// ```ignore
/// let context = BridgeContext::shared(&config);
/// let client = EdgeClient::create(&context).await?;
/// let connection = client.create_connection().await?;
/// ```
#[derive(Clone)]
pub struct EdgeClient {
    context: Arc<BridgeContext>,
    handle: Handle,
}

impl EdgeClient {
    pub async fn create(context: &Arc<BridgeContext>) -> Result<Self> {
        let handle = context.allocate(ResourceKind::Client);
        context.create_client(handle).await?;
        Ok(Self::attach(Arc::clone(context), handle))
    }

    /// Wrap an already registered client handle.
    pub fn attach(context: Arc<BridgeContext>, handle: Handle) -> Self {
        Self { context, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub async fn version(&self) -> Result<String> {
        self.context.client_version(self.handle).await
    }

    pub async fn set_log_level(&self, level: &str) -> Result<()> {
        self.context.client_set_log_level(self.handle, level).await
    }

    pub async fn create_private_key(&self) -> Result<String> {
        self.context.client_create_private_key(self.handle).await
    }

    pub async fn create_connection(&self) -> Result<Connection> {
        let handle = self.context.allocate(ResourceKind::Connection);
        self.context
            .client_create_connection(self.handle, handle)
            .await?;
        Ok(Connection::attach(Arc::clone(&self.context), handle))
    }

    pub async fn create_mdns_scanner(&self, subtype: &str) -> Result<MdnsScanner> {
        let handle = self.context.allocate(ResourceKind::MdnsScanner);
        self.context
            .client_create_mdns_scanner(self.handle, handle, subtype)
            .await?;
        Ok(MdnsScanner::attach(Arc::clone(&self.context), handle))
    }

    /// Same as [`EdgeClient::dispose`].
    pub async fn close(&self) -> Result<()> {
        self.dispose().await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.context.client_dispose(self.handle).await
    }
}

impl std::fmt::Debug for EdgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeClient").field("handle", &self.handle).finish()
    }
}
