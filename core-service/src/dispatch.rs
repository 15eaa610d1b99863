//! Host marshaling layer.
//!
//! A host runtime sends one JSON object per call. The `method` field names the
//! operation and the remaining fields carry its arguments, including the
//! host-allocated ids of every resource involved:
//!
//! ```json
//! { "method": "connectionCreateCoap", "connectionId": 0, "coapId": 3,
//!   "coapMethod": "GET", "path": "/info" }
//! ```
//!
//! Results come back as JSON values. Bytes are base64 strings in both
//! directions (see [`crate::payload`]).

use core_bridge::{BridgeContext, CoapMethod, CoapResponse, ConnectionOptions};
use core_runtime::Handle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{HostError, Result, ServiceError};
use crate::payload;

/// One host request, tagged by `method`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum HostCall {
    // ------------------------------------------------------------------
    // Client
    // ------------------------------------------------------------------
    #[serde(rename_all = "camelCase")]
    CreateNabtoClient { client_id: Handle },
    #[serde(rename_all = "camelCase")]
    ClientGetVersion { client_id: Handle },
    #[serde(rename_all = "camelCase")]
    ClientSetLogLevel { client_id: Handle, level: String },
    #[serde(rename_all = "camelCase")]
    ClientCreatePrivateKey { client_id: Handle },
    #[serde(rename_all = "camelCase")]
    ClientCreateConnection {
        client_id: Handle,
        connection_id: Handle,
    },
    #[serde(rename_all = "camelCase")]
    CreateMdnsScanner {
        client_id: Handle,
        scanner_id: Handle,
        #[serde(default)]
        subtype: String,
    },
    #[serde(rename_all = "camelCase")]
    ClientDispose { client_id: Handle },

    // ------------------------------------------------------------------
    // mDNS scanner
    // ------------------------------------------------------------------
    #[serde(rename_all = "camelCase")]
    MdnsScannerStart { scanner_id: Handle },
    #[serde(rename_all = "camelCase")]
    MdnsScannerStop { scanner_id: Handle },
    #[serde(rename_all = "camelCase")]
    MdnsScannerIsStarted { scanner_id: Handle },
    #[serde(rename_all = "camelCase")]
    MdnsScannerDispose { scanner_id: Handle },

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------
    /// `options` is either a JSON object or a string holding one.
    #[serde(rename_all = "camelCase")]
    ConnectionUpdateOptions {
        connection_id: Handle,
        options: Value,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionGetOptions { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionConnect { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionPasswordAuthenticate {
        connection_id: Handle,
        username: String,
        password: String,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionGetDeviceFingerprint { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionGetClientFingerprint { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionGetType { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionCreateStream {
        connection_id: Handle,
        stream_id: Handle,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionCreateCoap {
        connection_id: Handle,
        coap_id: Handle,
        coap_method: String,
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionCreateTcpTunnel {
        connection_id: Handle,
        tunnel_id: Handle,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionEnableDirectCandidates { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionAddDirectCandidate {
        connection_id: Handle,
        host: String,
        port: u16,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionEndOfDirectCandidates { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionGetLocalChannelErrorCode { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionGetRemoteChannelErrorCode { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionGetDirectCandidatesChannelErrorCode { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionClose { connection_id: Handle },
    #[serde(rename_all = "camelCase")]
    ConnectionDispose { connection_id: Handle },

    // ------------------------------------------------------------------
    // Stream
    // ------------------------------------------------------------------
    #[serde(rename_all = "camelCase")]
    StreamOpen { stream_id: Handle, stream_port: u32 },
    #[serde(rename_all = "camelCase")]
    StreamReadSome { stream_id: Handle },
    #[serde(rename_all = "camelCase")]
    StreamReadAll { stream_id: Handle, length: usize },
    /// `bytes` is base64.
    #[serde(rename_all = "camelCase")]
    StreamWrite { stream_id: Handle, bytes: String },
    #[serde(rename_all = "camelCase")]
    StreamClose { stream_id: Handle },
    #[serde(rename_all = "camelCase")]
    StreamDispose { stream_id: Handle },

    // ------------------------------------------------------------------
    // CoAP
    // ------------------------------------------------------------------
    /// `payload` is base64.
    #[serde(rename_all = "camelCase")]
    CoapSetRequestPayload {
        coap_id: Handle,
        content_format: u16,
        payload: String,
    },
    #[serde(rename_all = "camelCase")]
    CoapExecute { coap_id: Handle },
    #[serde(rename_all = "camelCase")]
    CoapDispose { coap_id: Handle },

    // ------------------------------------------------------------------
    // TCP tunnel
    // ------------------------------------------------------------------
    #[serde(rename_all = "camelCase")]
    TcpTunnelOpen {
        tunnel_id: Handle,
        service: String,
        local_port: u16,
    },
    #[serde(rename_all = "camelCase")]
    TcpTunnelGetLocalPort { tunnel_id: Handle },
    #[serde(rename_all = "camelCase")]
    TcpTunnelClose { tunnel_id: Handle },
    #[serde(rename_all = "camelCase")]
    TcpTunnelDispose { tunnel_id: Handle },
}

/// Result of `coapExecute` as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoapResult {
    pub response_status_code: u16,
    pub response_content_format: Option<u16>,
    /// Base64, absent when the device sent no body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_payload: Option<String>,
}

impl From<CoapResponse> for CoapResult {
    fn from(response: CoapResponse) -> Self {
        Self {
            response_status_code: response.status_code,
            response_content_format: response.content_format,
            response_payload: response.payload.as_deref().map(payload::encode),
        }
    }
}

fn options_from(value: Value) -> core_bridge::Result<ConnectionOptions> {
    match value {
        Value::String(json) => ConnectionOptions::from_json(&json),
        other => ConnectionOptions::from_value(other),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ServiceError::InvalidRequest(e.to_string()))
}

/// Routes [`HostCall`]s to the handle-keyed bridge operations.
#[derive(Clone)]
pub struct HostDispatcher {
    context: Arc<BridgeContext>,
}

impl HostDispatcher {
    pub fn new(context: Arc<BridgeContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.context
    }

    /// Decode a raw JSON request and dispatch it.
    pub async fn dispatch_json(&self, request: Value) -> std::result::Result<Value, HostError> {
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        let call: HostCall = serde_json::from_value(request)
            .map_err(|e| ServiceError::InvalidRequest(format!("{}: {}", method, e)))?;
        self.dispatch(call).await.map_err(|e| {
            warn!(%method, code = %e.code, error = %e.message, "Host call failed");
            e
        })
    }

    pub async fn dispatch(&self, call: HostCall) -> std::result::Result<Value, HostError> {
        self.execute(call).await.map_err(HostError::from)
    }

    async fn execute(&self, call: HostCall) -> Result<Value> {
        let ctx = &self.context;
        let value = match call {
            HostCall::CreateNabtoClient { client_id } => {
                ctx.create_client(client_id).await?;
                Value::Null
            }
            HostCall::ClientGetVersion { client_id } => {
                Value::String(ctx.client_version(client_id).await?)
            }
            HostCall::ClientSetLogLevel { client_id, level } => {
                ctx.client_set_log_level(client_id, &level).await?;
                Value::Null
            }
            HostCall::ClientCreatePrivateKey { client_id } => {
                Value::String(ctx.client_create_private_key(client_id).await?)
            }
            HostCall::ClientCreateConnection {
                client_id,
                connection_id,
            } => {
                ctx.client_create_connection(client_id, connection_id)
                    .await?;
                Value::Null
            }
            HostCall::CreateMdnsScanner {
                client_id,
                scanner_id,
                subtype,
            } => {
                ctx.client_create_mdns_scanner(client_id, scanner_id, &subtype)
                    .await?;
                Value::Null
            }
            HostCall::ClientDispose { client_id } => {
                ctx.client_dispose(client_id).await?;
                Value::Null
            }

            HostCall::MdnsScannerStart { scanner_id } => {
                ctx.scanner_start(scanner_id).await?;
                Value::Null
            }
            HostCall::MdnsScannerStop { scanner_id } => {
                ctx.scanner_stop(scanner_id).await?;
                Value::Null
            }
            HostCall::MdnsScannerIsStarted { scanner_id } => {
                Value::Bool(ctx.scanner_is_started(scanner_id).await?)
            }
            HostCall::MdnsScannerDispose { scanner_id } => {
                ctx.scanner_dispose(scanner_id).await?;
                Value::Null
            }

            HostCall::ConnectionUpdateOptions {
                connection_id,
                options,
            } => {
                let options = options_from(options)?;
                ctx.connection_update_options(connection_id, &options)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionGetOptions { connection_id } => {
                to_value(ctx.connection_get_options(connection_id).await?)?
            }
            HostCall::ConnectionConnect { connection_id } => {
                ctx.connection_connect(connection_id).await?;
                Value::Null
            }
            HostCall::ConnectionPasswordAuthenticate {
                connection_id,
                username,
                password,
            } => {
                ctx.connection_password_authenticate(connection_id, &username, &password)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionGetDeviceFingerprint { connection_id } => {
                Value::String(ctx.connection_device_fingerprint(connection_id).await?)
            }
            HostCall::ConnectionGetClientFingerprint { connection_id } => {
                Value::String(ctx.connection_client_fingerprint(connection_id).await?)
            }
            HostCall::ConnectionGetType { connection_id } => {
                Value::from(ctx.connection_type(connection_id).await?.ordinal())
            }
            HostCall::ConnectionCreateStream {
                connection_id,
                stream_id,
            } => {
                ctx.connection_create_stream(connection_id, stream_id)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionCreateCoap {
                connection_id,
                coap_id,
                coap_method,
                path,
            } => {
                let method: CoapMethod = coap_method.parse()?;
                ctx.connection_create_coap(connection_id, coap_id, method, &path)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionCreateTcpTunnel {
                connection_id,
                tunnel_id,
            } => {
                ctx.connection_create_tcp_tunnel(connection_id, tunnel_id)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionEnableDirectCandidates { connection_id } => {
                ctx.connection_enable_direct_candidates(connection_id)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionAddDirectCandidate {
                connection_id,
                host,
                port,
            } => {
                ctx.connection_add_direct_candidate(connection_id, &host, port)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionEndOfDirectCandidates { connection_id } => {
                ctx.connection_end_of_direct_candidates(connection_id)
                    .await?;
                Value::Null
            }
            HostCall::ConnectionGetLocalChannelErrorCode { connection_id } => {
                Value::from(ctx.connection_local_channel_error_code(connection_id).await?.0)
            }
            HostCall::ConnectionGetRemoteChannelErrorCode { connection_id } => {
                Value::from(ctx.connection_remote_channel_error_code(connection_id).await?.0)
            }
            HostCall::ConnectionGetDirectCandidatesChannelErrorCode { connection_id } => {
                Value::from(
                    ctx.connection_direct_candidates_channel_error_code(connection_id)
                        .await?
                        .0,
                )
            }
            HostCall::ConnectionClose { connection_id } => {
                ctx.connection_close(connection_id).await?;
                Value::Null
            }
            HostCall::ConnectionDispose { connection_id } => {
                ctx.connection_dispose(connection_id).await?;
                Value::Null
            }

            HostCall::StreamOpen {
                stream_id,
                stream_port,
            } => {
                ctx.stream_open(stream_id, stream_port).await?;
                Value::Null
            }
            HostCall::StreamReadSome { stream_id } => {
                Value::String(payload::encode(&ctx.stream_read_some(stream_id).await?))
            }
            HostCall::StreamReadAll { stream_id, length } => {
                Value::String(payload::encode(&ctx.stream_read_all(stream_id, length).await?))
            }
            HostCall::StreamWrite { stream_id, bytes } => {
                let bytes = payload::decode("bytes", &bytes)?;
                ctx.stream_write(stream_id, bytes).await?;
                Value::Null
            }
            HostCall::StreamClose { stream_id } => {
                ctx.stream_close(stream_id).await?;
                Value::Null
            }
            HostCall::StreamDispose { stream_id } => {
                ctx.stream_dispose(stream_id).await?;
                Value::Null
            }

            HostCall::CoapSetRequestPayload {
                coap_id,
                content_format,
                payload: encoded,
            } => {
                let bytes = payload::decode("payload", &encoded)?;
                ctx.coap_set_request_payload(coap_id, content_format, bytes)
                    .await?;
                Value::Null
            }
            HostCall::CoapExecute { coap_id } => {
                to_value(CoapResult::from(ctx.coap_execute(coap_id).await?))?
            }
            HostCall::CoapDispose { coap_id } => {
                ctx.coap_dispose(coap_id).await?;
                Value::Null
            }

            HostCall::TcpTunnelOpen {
                tunnel_id,
                service,
                local_port,
            } => {
                ctx.tunnel_open(tunnel_id, &service, local_port).await?;
                Value::Null
            }
            HostCall::TcpTunnelGetLocalPort { tunnel_id } => {
                Value::from(ctx.tunnel_local_port(tunnel_id).await?)
            }
            HostCall::TcpTunnelClose { tunnel_id } => {
                ctx.tunnel_close(tunnel_id).await?;
                Value::Null
            }
            HostCall::TcpTunnelDispose { tunnel_id } => {
                ctx.tunnel_dispose(tunnel_id).await?;
                Value::Null
            }
        };
        debug!("Host call completed");
        Ok(value)
    }
}

impl std::fmt::Debug for HostDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDispatcher")
            .field("context", &self.context)
            .finish()
    }
}
