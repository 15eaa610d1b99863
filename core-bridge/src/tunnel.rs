//! TCP tunnels: a local listening port forwarded to a service on the device.

use bridge_traits::{ErrorCode, NativeTcpTunnel};
use core_runtime::{Handle, ResourceKind};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::adapter::Call;
use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Created,
    Opening,
    Open,
    Closed,
}

impl TunnelState {
    pub fn as_str(self) -> &'static str {
        match self {
            TunnelState::Created => "created",
            TunnelState::Opening => "opening",
            TunnelState::Open => "open",
            TunnelState::Closed => "closed",
        }
    }
}

pub struct TunnelEntry {
    connection: Handle,
    native: Arc<dyn NativeTcpTunnel>,
    state: Mutex<TunnelState>,
}

impl TunnelEntry {
    pub(crate) fn new(connection: Handle, native: Arc<dyn NativeTcpTunnel>) -> Self {
        Self {
            connection,
            native,
            state: Mutex::new(TunnelState::Created),
        }
    }

    pub fn connection(&self) -> Handle {
        self.connection
    }

    pub fn state(&self) -> TunnelState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, TunnelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: TunnelState) -> TunnelState {
        std::mem::replace(&mut *self.lock_state(), state)
    }
}

fn call(handle: Handle, operation: &'static str) -> Call {
    Call::new(ResourceKind::TcpTunnel, handle, operation)
}

fn invalid_state(call: Call, state: TunnelState) -> BridgeError {
    BridgeError::InvalidState {
        kind: call.kind,
        handle: call.handle,
        operation: call.operation,
        state: state.as_str(),
    }
}

// ============================================================================
// Handle-keyed operations
// ============================================================================

impl BridgeContext {
    /// Start listening on `local_port` (0 picks a free port) and forward
    /// accepted connections to `service` on the device.
    pub async fn tunnel_open(&self, handle: Handle, service: &str, local_port: u16) -> Result<()> {
        if service.trim().is_empty() {
            return Err(BridgeError::InvalidArgument(
                "Tunnel service cannot be blank".to_string(),
            ));
        }
        let entry = self.registry.tunnels.resolve(handle)?;
        let call = call(handle, "open");
        {
            let mut state = entry.lock_state();
            if *state != TunnelState::Created {
                return Err(invalid_state(call, *state));
            }
            *state = TunnelState::Opening;
        }

        let native = Arc::clone(&entry.native);
        let service_name = service.to_string();
        let result = self
            .adapter
            .blocking(call, move || native.open(&service_name, local_port))
            .await;

        match result {
            Ok(()) => {
                entry.set_state(TunnelState::Open);
                info!(tunnel = %handle, service, local_port, "Tunnel open");
                Ok(())
            }
            Err(e) => {
                entry.set_state(TunnelState::Created);
                Err(e)
            }
        }
    }

    /// Port the tunnel listens on, only while open.
    pub async fn tunnel_local_port(&self, handle: Handle) -> Result<u16> {
        let entry = self.registry.tunnels.resolve(handle)?;
        let call = call(handle, "get_local_port");
        let state = entry.state();
        if state != TunnelState::Open {
            return Err(invalid_state(call, state));
        }
        let port = self
            .adapter
            .fallible(call, None, || entry.native.local_port())?;
        if port == 0 {
            return Err(BridgeError::NativeOperationFailed {
                code: ErrorCode::INVALID_STATE,
                description: "Tunnel reported no local port".to_string(),
            });
        }
        Ok(port)
    }

    /// Stop listening. Closing a tunnel that is not open only marks it closed.
    pub async fn tunnel_close(&self, handle: Handle) -> Result<()> {
        let entry = self.registry.tunnels.resolve(handle)?;
        let previous = entry.set_state(TunnelState::Closed);
        if previous != TunnelState::Open {
            return Ok(());
        }
        let native = Arc::clone(&entry.native);
        self.adapter
            .callback(call(handle, "close"), None, |done| native.tunnel_close(done))
            .await
            .map(|_| ())
    }

    /// Release the native tunnel and remove its handle. Idempotent.
    pub async fn tunnel_dispose(&self, handle: Handle) -> Result<()> {
        if let Some(entry) = self.registry.tunnels.remove(handle) {
            entry.set_state(TunnelState::Closed);
            self.adapter
                .value(call(handle, "dispose"), || entry.native.close());
            debug!(tunnel = %handle, "Tunnel disposed");
        }
        Ok(())
    }

    pub fn tunnel_state(&self, handle: Handle) -> Result<TunnelState> {
        Ok(self.registry.tunnels.resolve(handle)?.state())
    }
}

// ============================================================================
// Facade
// ============================================================================

#[derive(Clone)]
pub struct TcpTunnel {
    context: Arc<BridgeContext>,
    handle: Handle,
}

impl TcpTunnel {
    pub fn attach(context: Arc<BridgeContext>, handle: Handle) -> Self {
        Self { context, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> Result<TunnelState> {
        self.context.tunnel_state(self.handle)
    }

    pub async fn open(&self, service: &str, local_port: u16) -> Result<()> {
        self.context
            .tunnel_open(self.handle, service, local_port)
            .await
    }

    pub async fn local_port(&self) -> Result<u16> {
        self.context.tunnel_local_port(self.handle).await
    }

    pub async fn close(&self) -> Result<()> {
        self.context.tunnel_close(self.handle).await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.context.tunnel_dispose(self.handle).await
    }
}

impl std::fmt::Debug for TcpTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTunnel")
            .field("handle", &self.handle)
            .finish()
    }
}
