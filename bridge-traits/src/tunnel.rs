//! TCP Tunnel Abstraction

use crate::{callback::Completion, error::NativeResult};

/// Local TCP listener bridged through a connection to a device-side service.
pub trait NativeTcpTunnel: Send + Sync {
    /// Bind the local listener and attach it to `service`.
    ///
    /// `local_port = 0` lets the platform pick a free port. This call blocks
    /// until the listener is bound and the device has accepted the service.
    fn open(&self, service: &str, local_port: u16) -> NativeResult<()>;

    /// Port the local listener is bound to.
    fn local_port(&self) -> NativeResult<u16>;

    /// Stop accepting new local connections.
    fn tunnel_close(&self, done: Completion<()>);

    /// Release the native tunnel object.
    fn close(&self);
}
