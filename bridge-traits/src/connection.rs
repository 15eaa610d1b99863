//! Connection Abstraction
//!
//! A logical session to one remote device. Options are exchanged with the SDK
//! as a JSON object string; the bridge owns the typed representation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    callback::{Completion, ListenerToken},
    coap::NativeCoap,
    error::{ErrorCode, NativeError, NativeResult},
    stream::NativeStream,
    tunnel::NativeTcpTunnel,
};

/// Raw connection event code, as delivered by the SDK.
///
/// `0` = connected, `1` = closed, `2` = channel changed. Other values may be
/// added by newer SDKs and should be tolerated.
pub type ConnectionEventCode = i32;

/// Callback invoked by the SDK for every connection event.
pub type ConnectionEventsCallback = Arc<dyn Fn(ConnectionEventCode) + Send + Sync>;

/// Channel the connection ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionType {
    Relay,
    Direct,
}

impl ConnectionType {
    /// Ordinal used across the host boundary (`RELAY = 0`, `DIRECT = 1`).
    pub fn ordinal(self) -> u8 {
        match self {
            ConnectionType::Relay => 0,
            ConnectionType::Direct => 1,
        }
    }
}

/// Native connection object.
///
/// Direct-candidate and channel-diagnostic operations are not available on
/// every platform build; their default implementations report
/// [`ErrorCode::NOT_SUPPORTED`].
pub trait NativeConnection: Send + Sync {
    /// Merge the given JSON object into the connection options.
    fn update_options(&self, options_json: &str) -> NativeResult<()>;

    /// Current options as a JSON object string.
    fn options(&self) -> NativeResult<String>;

    fn connect(&self, done: Completion<()>);

    fn password_authenticate(&self, username: &str, password: &str, done: Completion<()>);

    /// Gracefully close the session with the device.
    fn connection_close(&self, done: Completion<()>);

    /// Release the native connection object.
    fn close(&self);

    fn create_stream(&self) -> NativeResult<Arc<dyn NativeStream>>;

    fn create_coap(&self, method: &str, path: &str) -> NativeResult<Arc<dyn NativeCoap>>;

    fn create_tcp_tunnel(&self) -> NativeResult<Arc<dyn NativeTcpTunnel>>;

    fn device_fingerprint(&self) -> NativeResult<String>;

    fn client_fingerprint(&self) -> NativeResult<String>;

    fn connection_type(&self) -> NativeResult<ConnectionType>;

    fn add_connection_events_listener(&self, listener: ConnectionEventsCallback) -> ListenerToken;

    fn remove_connection_events_listener(&self, token: ListenerToken);

    fn enable_direct_candidates(&self) -> NativeResult<()> {
        Err(NativeError::not_supported("enable_direct_candidates"))
    }

    fn add_direct_candidate(&self, _host: &str, _port: u16) -> NativeResult<()> {
        Err(NativeError::not_supported("add_direct_candidate"))
    }

    fn end_of_direct_candidates(&self) -> NativeResult<()> {
        Err(NativeError::not_supported("end_of_direct_candidates"))
    }

    fn local_channel_error_code(&self) -> NativeResult<ErrorCode> {
        Err(NativeError::not_supported("local_channel_error_code"))
    }

    fn remote_channel_error_code(&self) -> NativeResult<ErrorCode> {
        Err(NativeError::not_supported("remote_channel_error_code"))
    }

    fn direct_candidates_channel_error_code(&self) -> NativeResult<ErrorCode> {
        Err(NativeError::not_supported("direct_candidates_channel_error_code"))
    }
}
