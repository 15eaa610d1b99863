//! Connection facade and handle-keyed connection operations.
//!
//! ```text
//! Created ──connect──> Connecting ──ok──> Connected ──close──> Closed
//!                           └──────error──────────────────────>┘
//! ```
//!
//! Dispose removes the handle from any state. A connection whose client was
//! disposed rejects everything except `close` and `dispose` with an invalid
//! client handle error.

use bridge_traits::{ConnectionType, ErrorCode, NativeConnection};
use core_runtime::events::ConnectionEvent;
use core_runtime::{Handle, ResourceKind};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::adapter::Call;
use crate::coap::{Coap, CoapEntry, CoapMethod};
use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};
use crate::forwarder::{Listener, ListenerId, ListenerList, Subscription};
use crate::options::ConnectionOptions;
use crate::stream::{Stream, StreamEntry};
use crate::tunnel::{TcpTunnel, TunnelEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connecting,
    Connected,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Created => "created",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        }
    }
}

pub struct ConnectionEntry {
    client: Handle,
    native: Arc<dyn NativeConnection>,
    state: Mutex<ConnectionState>,
    listeners: Arc<ListenerList<ConnectionEvent>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ConnectionEntry {
    pub(crate) fn new(client: Handle, native: Arc<dyn NativeConnection>) -> Self {
        Self {
            client,
            native,
            state: Mutex::new(ConnectionState::Created),
            listeners: Arc::new(ListenerList::new()),
            subscription: Mutex::new(None),
        }
    }

    /// Handle of the owning client.
    pub fn client(&self) -> Handle {
        self.client
    }

    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    pub fn native(&self) -> &Arc<dyn NativeConnection> {
        &self.native
    }

    pub(crate) fn listeners(&self) -> Arc<ListenerList<ConnectionEvent>> {
        Arc::clone(&self.listeners)
    }

    pub(crate) fn attach_subscription(&self, subscription: Subscription) {
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *self.lock_state(), state)
    }

    /// Move from `from` to `to`, or fail with `InvalidState`.
    fn transition(&self, call: Call, from: ConnectionState, to: ConnectionState) -> Result<()> {
        let mut state = self.lock_state();
        if *state != from {
            return Err(BridgeError::InvalidState {
                kind: call.kind,
                handle: call.handle,
                operation: call.operation,
                state: state.as_str(),
            });
        }
        *state = to;
        Ok(())
    }

    fn require(&self, call: Call, expected: ConnectionState) -> Result<()> {
        let state = self.state();
        if state != expected {
            return Err(BridgeError::InvalidState {
                kind: call.kind,
                handle: call.handle,
                operation: call.operation,
                state: state.as_str(),
            });
        }
        Ok(())
    }

    /// Stop forwarding events and forget every host listener.
    fn release_events(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(subscription);
        self.listeners.clear();
    }
}

fn call(handle: Handle, operation: &'static str) -> Call {
    Call::new(ResourceKind::Connection, handle, operation)
}

// ============================================================================
// Handle-keyed operations
// ============================================================================

impl BridgeContext {
    /// Resolve a connection whose client is still registered.
    fn live_connection(&self, handle: Handle) -> Result<Arc<ConnectionEntry>> {
        let entry = self.registry.connections.resolve(handle)?;
        self.ensure_client(entry.client)?;
        Ok(entry)
    }

    /// Merge `options` into the native connection options.
    pub async fn connection_update_options(
        &self,
        handle: Handle,
        options: &ConnectionOptions,
    ) -> Result<()> {
        let entry = self.live_connection(handle)?;
        options.validate()?;
        debug!(connection = %handle, ?options, "Updating options");
        let json = options.to_json()?;
        let native = entry.native.as_ref();
        self.adapter
            .fallible(call(handle, "update_options"), Some(native), || {
                native.update_options(&json)
            })
    }

    /// Current options. The native SDK never reports the private key.
    pub async fn connection_get_options(&self, handle: Handle) -> Result<ConnectionOptions> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        let json = self
            .adapter
            .fallible(call(handle, "get_options"), Some(native), || native.options())?;
        ConnectionOptions::from_json(&json)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn connection_connect(&self, handle: Handle) -> Result<()> {
        let entry = self.live_connection(handle)?;
        let call = call(handle, "connect");
        entry.transition(call, ConnectionState::Created, ConnectionState::Connecting)?;

        let native = entry.native.as_ref();
        let result = self
            .adapter
            .callback(call, Some(native), |done| native.connect(done))
            .await;

        match result {
            // A close issued while connecting wins over the late success.
            Ok(_) => {
                entry.transition(call, ConnectionState::Connecting, ConnectionState::Connected)?;
                info!(connection = %handle, "Connected");
                Ok(())
            }
            Err(e) => {
                entry.set_state(ConnectionState::Closed);
                warn!(connection = %handle, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    pub async fn connection_password_authenticate(
        &self,
        handle: Handle,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let entry = self.live_connection(handle)?;
        let call = call(handle, "password_authenticate");
        entry.require(call, ConnectionState::Connected)?;

        let native = entry.native.as_ref();
        self.adapter
            .callback(call, Some(native), |done| {
                native.password_authenticate(username, password, done)
            })
            .await
            .map(|_| ())
    }

    /// Gracefully close the connection. The handle stays registered.
    ///
    /// Closing a closed connection is a no-op. When the owning client is gone
    /// the native session is already stopped and only local state changes.
    pub async fn connection_close(&self, handle: Handle) -> Result<()> {
        let entry = self.registry.connections.resolve(handle)?;
        let previous = entry.set_state(ConnectionState::Closed);
        let client_alive = self.registry.clients.contains(entry.client);

        let result = match previous {
            ConnectionState::Connecting | ConnectionState::Connected if client_alive => {
                let native = entry.native.as_ref();
                self.adapter
                    .callback(call(handle, "close"), Some(native), |done| {
                        native.connection_close(done)
                    })
                    .await
                    .map(|_| ())
            }
            _ => Ok(()),
        };

        entry.release_events();
        if previous != ConnectionState::Closed {
            info!(connection = %handle, "Connection closed");
        }
        result
    }

    /// Release the native connection and remove its handle. Idempotent.
    pub async fn connection_dispose(&self, handle: Handle) -> Result<()> {
        if let Some(entry) = self.registry.connections.remove(handle) {
            entry.release_events();
            self.adapter
                .value(call(handle, "dispose"), || entry.native.close());
            debug!(connection = %handle, "Connection disposed");
        }
        Ok(())
    }

    pub async fn connection_device_fingerprint(&self, handle: Handle) -> Result<String> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter
            .fallible(call(handle, "device_fingerprint"), Some(native), || {
                native.device_fingerprint()
            })
    }

    pub async fn connection_client_fingerprint(&self, handle: Handle) -> Result<String> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter
            .fallible(call(handle, "client_fingerprint"), Some(native), || {
                native.client_fingerprint()
            })
    }

    pub async fn connection_type(&self, handle: Handle) -> Result<ConnectionType> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter
            .fallible(call(handle, "get_type"), Some(native), || {
                native.connection_type()
            })
    }

    pub async fn connection_create_stream(&self, handle: Handle, stream: Handle) -> Result<()> {
        let entry = self.live_connection(handle)?;
        self.registry.streams.ensure_vacant(stream)?;
        let native = entry.native.as_ref();
        let created = self
            .adapter
            .fallible(call(handle, "create_stream"), Some(native), || {
                native.create_stream()
            })?;
        self.registry
            .streams
            .register(stream, Arc::new(StreamEntry::new(handle, created)))?;
        debug!(connection = %handle, %stream, "Stream created");
        Ok(())
    }

    pub async fn connection_create_coap(
        &self,
        handle: Handle,
        coap: Handle,
        method: CoapMethod,
        path: &str,
    ) -> Result<()> {
        let entry = self.live_connection(handle)?;
        self.registry.coaps.ensure_vacant(coap)?;
        let native = entry.native.as_ref();
        let created = self
            .adapter
            .fallible(call(handle, "create_coap"), Some(native), || {
                native.create_coap(method.as_str(), path)
            })?;
        self.registry.coaps.register(
            coap,
            Arc::new(CoapEntry::new(method, path.to_string(), created)),
        )?;
        debug!(connection = %handle, %coap, %method, path, "CoAP exchange created");
        Ok(())
    }

    pub async fn connection_create_tcp_tunnel(&self, handle: Handle, tunnel: Handle) -> Result<()> {
        let entry = self.live_connection(handle)?;
        self.registry.tunnels.ensure_vacant(tunnel)?;
        let native = entry.native.as_ref();
        let created = self
            .adapter
            .fallible(call(handle, "create_tcp_tunnel"), Some(native), || {
                native.create_tcp_tunnel()
            })?;
        self.registry
            .tunnels
            .register(tunnel, Arc::new(TunnelEntry::new(handle, created)))?;
        debug!(connection = %handle, %tunnel, "Tunnel created");
        Ok(())
    }

    pub async fn connection_enable_direct_candidates(&self, handle: Handle) -> Result<()> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter.optional(
            call(handle, "enable_direct_candidates"),
            Some(native),
            (),
            || native.enable_direct_candidates(),
        )
    }

    pub async fn connection_add_direct_candidate(
        &self,
        handle: Handle,
        host: &str,
        port: u16,
    ) -> Result<()> {
        if host.trim().is_empty() {
            return Err(BridgeError::InvalidArgument(
                "Direct candidate host cannot be blank".to_string(),
            ));
        }
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter.optional(
            call(handle, "add_direct_candidate"),
            Some(native),
            (),
            || native.add_direct_candidate(host, port),
        )
    }

    pub async fn connection_end_of_direct_candidates(&self, handle: Handle) -> Result<()> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter.optional(
            call(handle, "end_of_direct_candidates"),
            Some(native),
            (),
            || native.end_of_direct_candidates(),
        )
    }

    pub async fn connection_local_channel_error_code(&self, handle: Handle) -> Result<ErrorCode> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter.optional(
            call(handle, "get_local_channel_error_code"),
            Some(native),
            ErrorCode::NONE,
            || native.local_channel_error_code(),
        )
    }

    pub async fn connection_remote_channel_error_code(&self, handle: Handle) -> Result<ErrorCode> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter.optional(
            call(handle, "get_remote_channel_error_code"),
            Some(native),
            ErrorCode::NONE,
            || native.remote_channel_error_code(),
        )
    }

    pub async fn connection_direct_candidates_channel_error_code(
        &self,
        handle: Handle,
    ) -> Result<ErrorCode> {
        let entry = self.live_connection(handle)?;
        let native = entry.native.as_ref();
        self.adapter.optional(
            call(handle, "get_direct_candidates_channel_error_code"),
            Some(native),
            ErrorCode::NONE,
            || native.direct_candidates_channel_error_code(),
        )
    }

    /// Register a host listener for connection events. Past events are not replayed.
    pub async fn connection_add_events_listener(
        &self,
        handle: Handle,
        listener: Listener<ConnectionEvent>,
    ) -> Result<ListenerId> {
        let entry = self.live_connection(handle)?;
        Ok(entry.listeners.add(listener))
    }

    /// Returns whether the listener was registered.
    pub async fn connection_remove_events_listener(
        &self,
        handle: Handle,
        listener: ListenerId,
    ) -> Result<bool> {
        let entry = self.registry.connections.resolve(handle)?;
        Ok(entry.listeners.remove(listener))
    }

    pub fn connection_state(&self, handle: Handle) -> Result<ConnectionState> {
        Ok(self.registry.connections.resolve(handle)?.state())
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Host-facing connection to one device.
#[derive(Clone)]
pub struct Connection {
    context: Arc<BridgeContext>,
    handle: Handle,
}

impl Connection {
    /// Wrap an already registered connection handle.
    pub fn attach(context: Arc<BridgeContext>, handle: Handle) -> Self {
        Self { context, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> Result<ConnectionState> {
        self.context.connection_state(self.handle)
    }

    pub async fn update_options(&self, options: &ConnectionOptions) -> Result<()> {
        self.context
            .connection_update_options(self.handle, options)
            .await
    }

    pub async fn get_options(&self) -> Result<ConnectionOptions> {
        self.context.connection_get_options(self.handle).await
    }

    pub async fn connect(&self) -> Result<()> {
        self.context.connection_connect(self.handle).await
    }

    pub async fn password_authenticate(&self, username: &str, password: &str) -> Result<()> {
        self.context
            .connection_password_authenticate(self.handle, username, password)
            .await
    }

    pub async fn device_fingerprint(&self) -> Result<String> {
        self.context.connection_device_fingerprint(self.handle).await
    }

    pub async fn client_fingerprint(&self) -> Result<String> {
        self.context.connection_client_fingerprint(self.handle).await
    }

    pub async fn connection_type(&self) -> Result<ConnectionType> {
        self.context.connection_type(self.handle).await
    }

    pub async fn create_stream(&self) -> Result<Stream> {
        let stream = self.context.allocate(ResourceKind::Stream);
        self.context
            .connection_create_stream(self.handle, stream)
            .await?;
        Ok(Stream::attach(Arc::clone(&self.context), stream))
    }

    pub async fn create_coap(&self, method: CoapMethod, path: &str) -> Result<Coap> {
        let coap = self.context.allocate(ResourceKind::Coap);
        self.context
            .connection_create_coap(self.handle, coap, method, path)
            .await?;
        Ok(Coap::attach(Arc::clone(&self.context), coap))
    }

    pub async fn create_tcp_tunnel(&self) -> Result<TcpTunnel> {
        let tunnel = self.context.allocate(ResourceKind::TcpTunnel);
        self.context
            .connection_create_tcp_tunnel(self.handle, tunnel)
            .await?;
        Ok(TcpTunnel::attach(Arc::clone(&self.context), tunnel))
    }

    pub async fn enable_direct_candidates(&self) -> Result<()> {
        self.context
            .connection_enable_direct_candidates(self.handle)
            .await
    }

    pub async fn add_direct_candidate(&self, host: &str, port: u16) -> Result<()> {
        self.context
            .connection_add_direct_candidate(self.handle, host, port)
            .await
    }

    pub async fn end_of_direct_candidates(&self) -> Result<()> {
        self.context
            .connection_end_of_direct_candidates(self.handle)
            .await
    }

    pub async fn local_channel_error_code(&self) -> Result<ErrorCode> {
        self.context
            .connection_local_channel_error_code(self.handle)
            .await
    }

    pub async fn remote_channel_error_code(&self) -> Result<ErrorCode> {
        self.context
            .connection_remote_channel_error_code(self.handle)
            .await
    }

    pub async fn direct_candidates_channel_error_code(&self) -> Result<ErrorCode> {
        self.context
            .connection_direct_candidates_channel_error_code(self.handle)
            .await
    }

    pub async fn add_events_listener<F>(&self, listener: F) -> Result<ListenerId>
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.context
            .connection_add_events_listener(self.handle, Arc::new(listener))
            .await
    }

    pub async fn remove_events_listener(&self, listener: ListenerId) -> Result<bool> {
        self.context
            .connection_remove_events_listener(self.handle, listener)
            .await
    }

    pub async fn close(&self) -> Result<()> {
        self.context.connection_close(self.handle).await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.context.connection_dispose(self.handle).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("handle", &self.handle).finish()
    }
}
