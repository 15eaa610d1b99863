//! TCP tunnels backed by a real local listener.

use bridge_traits::{Completion, ErrorCode, NativeError, NativeResult, NativeTcpTunnel};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::ConnShared;
use crate::sdk::SdkShared;

struct OpenTunnel {
    local_port: u16,
    accept_loop: JoinHandle<()>,
}

/// Tunnel forwarding every accepted local connection to the device
/// service's target address.
pub struct LoopbackTunnel {
    sdk: Arc<SdkShared>,
    connection: Arc<ConnShared>,
    open: Mutex<Option<OpenTunnel>>,
}

impl LoopbackTunnel {
    pub(crate) fn new(sdk: Arc<SdkShared>, connection: Arc<ConnShared>) -> Self {
        Self {
            sdk,
            connection,
            open: Mutex::new(None),
        }
    }

    fn shutdown(&self) -> bool {
        match self.open.lock().unwrap_or_else(|e| e.into_inner()).take() {
            Some(open) => {
                open.accept_loop.abort();
                true
            }
            None => false,
        }
    }
}

async fn accept_loop(listener: TcpListener, target: SocketAddr) {
    loop {
        let (mut inbound, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Tunnel listener failed");
                return;
            }
        };
        debug!(%peer, %target, "Tunnel accepted local connection");
        tokio::spawn(async move {
            match TcpStream::connect(target).await {
                Ok(mut outbound) => {
                    if let Err(e) = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
                        debug!(error = %e, "Tunnel connection ended");
                    }
                }
                Err(e) => warn!(error = %e, %target, "Tunnel target unreachable"),
            }
        });
    }
}

fn io_error(e: std::io::Error) -> NativeError {
    NativeError::new(ErrorCode::UNKNOWN, format!("Tunnel listener: {}", e))
}

impl NativeTcpTunnel for LoopbackTunnel {
    fn open(&self, service: &str, local_port: u16) -> NativeResult<()> {
        let device = self.connection.connected_device()?;
        let target = device.tunnel_target(service).ok_or_else(|| {
            NativeError::new(
                ErrorCode::NOT_FOUND,
                format!("Device has no tunnel service '{}'", service),
            )
        })?;

        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        if open.is_some() {
            return Err(NativeError::from_code(ErrorCode::INVALID_STATE));
        }

        let std_listener = std::net::TcpListener::bind(("127.0.0.1", local_port)).map_err(io_error)?;
        std_listener.set_nonblocking(true).map_err(io_error)?;
        let bound_port = std_listener.local_addr().map_err(io_error)?.port();

        let runtime = self.sdk.runtime();
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener).map_err(io_error)?
        };
        let accept_loop = runtime.spawn(accept_loop(listener, target));

        debug!(service, local_port = bound_port, %target, "Tunnel open");
        *open = Some(OpenTunnel {
            local_port: bound_port,
            accept_loop,
        });
        Ok(())
    }

    fn local_port(&self) -> NativeResult<u16> {
        self.open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|open| open.local_port)
            .ok_or_else(|| NativeError::from_code(ErrorCode::INVALID_STATE))
    }

    fn tunnel_close(&self, done: Completion<()>) {
        let code = if self.shutdown() {
            ErrorCode::OK
        } else {
            ErrorCode::INVALID_STATE
        };
        self.sdk.complete(done, code, None);
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl Drop for LoopbackTunnel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
