//! Simulated devices.

use bridge_traits::ConnectionType;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Request as seen by a device-side CoAP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapRequest {
    pub method: String,
    pub path: String,
    pub content_format: Option<u16>,
    pub payload: Vec<u8>,
}

/// Device-side CoAP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapReply {
    pub status_code: u16,
    pub content_format: Option<u16>,
    pub payload: Vec<u8>,
}

impl CoapReply {
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            content_format: None,
            payload: Vec::new(),
        }
    }

    /// `2.05 Content` with a body.
    pub fn content(content_format: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code: 205,
            content_format: Some(content_format),
            payload: payload.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::status(404)
    }
}

pub type CoapHandler = Arc<dyn Fn(&CoapRequest) -> CoapReply + Send + Sync>;

#[derive(Clone)]
enum CoapResource {
    Static(CoapReply),
    Handler(CoapHandler),
}

/// Device-side behavior of a stream port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamService {
    /// Every written byte is echoed back.
    Echo,
    /// The device sends these bytes, then closes its side. Writes are discarded.
    Greeting(Vec<u8>),
}

/// A device reachable through the loopback SDK.
///
/// Connections find their device by the `ProductId` and `DeviceId` options.
#[derive(Clone)]
pub struct LoopbackDevice {
    product_id: String,
    device_id: String,
    connection_type: ConnectionType,
    reachable: bool,
    server_connect_token: Option<String>,
    users: HashMap<String, String>,
    coap: HashMap<(String, String), CoapResource>,
    stream_ports: HashMap<u32, StreamService>,
    tunnel_services: HashMap<String, SocketAddr>,
}

impl LoopbackDevice {
    pub fn builder(
        product_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> LoopbackDeviceBuilder {
        LoopbackDeviceBuilder::new(product_id, device_id)
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Hex SHA-256 over the product and device id.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(format!("{}/{}", self.product_id, self.device_id).as_bytes())
    }

    /// Returns true when the device accepts `token` (or requires none).
    pub fn accepts_server_connect_token(&self, token: Option<&str>) -> bool {
        match &self.server_connect_token {
            None => true,
            Some(expected) => token == Some(expected.as_str()),
        }
    }

    pub fn check_password(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .map(|expected| expected == password)
            .unwrap_or(false)
    }

    pub fn has_stream_port(&self, port: u32) -> bool {
        self.stream_ports.contains_key(&port)
    }

    pub fn stream_service(&self, port: u32) -> Option<&StreamService> {
        self.stream_ports.get(&port)
    }

    pub fn tunnel_target(&self, service: &str) -> Option<SocketAddr> {
        self.tunnel_services.get(service).copied()
    }

    /// Serve a CoAP request, answering `4.04` for unknown resources.
    pub fn handle_coap(&self, request: &CoapRequest) -> CoapReply {
        let key = (request.method.to_ascii_uppercase(), request.path.clone());
        match self.coap.get(&key) {
            Some(CoapResource::Static(reply)) => reply.clone(),
            Some(CoapResource::Handler(handler)) => handler(request),
            None => CoapReply::not_found(),
        }
    }
}

impl fmt::Debug for LoopbackDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackDevice")
            .field("product_id", &self.product_id)
            .field("device_id", &self.device_id)
            .field("connection_type", &self.connection_type)
            .field("reachable", &self.reachable)
            .field("coap_resources", &self.coap.len())
            .field("stream_ports", &self.stream_ports.keys().collect::<Vec<_>>())
            .field("tunnel_services", &self.tunnel_services)
            .finish()
    }
}

pub struct LoopbackDeviceBuilder {
    device: LoopbackDevice,
}

impl LoopbackDeviceBuilder {
    fn new(product_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            device: LoopbackDevice {
                product_id: product_id.into(),
                device_id: device_id.into(),
                connection_type: ConnectionType::Relay,
                reachable: true,
                server_connect_token: None,
                users: HashMap::new(),
                coap: HashMap::new(),
                stream_ports: HashMap::new(),
                tunnel_services: HashMap::new(),
            },
        }
    }

    pub fn connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.device.connection_type = connection_type;
        self
    }

    /// Every connect attempt fails with `NO_CHANNELS`.
    pub fn unreachable(mut self) -> Self {
        self.device.reachable = false;
        self
    }

    pub fn server_connect_token(mut self, token: impl Into<String>) -> Self {
        self.device.server_connect_token = Some(token.into());
        self
    }

    pub fn password_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.device.users.insert(username.into(), password.into());
        self
    }

    pub fn coap_resource(
        mut self,
        method: impl Into<String>,
        path: impl Into<String>,
        reply: CoapReply,
    ) -> Self {
        self.device.coap.insert(
            (method.into().to_ascii_uppercase(), path.into()),
            CoapResource::Static(reply),
        );
        self
    }

    pub fn coap_handler<F>(mut self, method: impl Into<String>, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&CoapRequest) -> CoapReply + Send + Sync + 'static,
    {
        self.device.coap.insert(
            (method.into().to_ascii_uppercase(), path.into()),
            CoapResource::Handler(Arc::new(handler)),
        );
        self
    }

    /// Streams opened on `port` echo every written byte back.
    pub fn echo_stream_port(mut self, port: u32) -> Self {
        self.device.stream_ports.insert(port, StreamService::Echo);
        self
    }

    /// Streams opened on `port` receive `greeting` and then end of file.
    pub fn greeting_stream_port(mut self, port: u32, greeting: impl Into<Vec<u8>>) -> Self {
        self.device
            .stream_ports
            .insert(port, StreamService::Greeting(greeting.into()));
        self
    }

    /// Tunnels opened for `service` forward to `target`.
    pub fn tunnel_service(mut self, service: impl Into<String>, target: SocketAddr) -> Self {
        self.device.tunnel_services.insert(service.into(), target);
        self
    }

    pub fn build(self) -> LoopbackDevice {
        self.device
    }
}

/// Service advertisement delivered to running scanners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsAdvertisement {
    pub action: bridge_traits::MdnsAction,
    pub product_id: String,
    pub device_id: String,
    pub service_instance_name: String,
    pub subtypes: Vec<String>,
    pub txt_items: BTreeMap<String, String>,
}

impl MdnsAdvertisement {
    pub fn new(product_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        let product_id = product_id.into();
        let device_id = device_id.into();
        Self {
            action: bridge_traits::MdnsAction::Add,
            service_instance_name: format!("{}-{}", product_id, device_id),
            product_id,
            device_id,
            subtypes: Vec::new(),
            txt_items: BTreeMap::new(),
        }
    }

    pub fn with_action(mut self, action: bridge_traits::MdnsAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtypes.push(subtype.into());
        self
    }

    pub fn with_txt(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.txt_items.insert(key.into(), value.into());
        self
    }

    /// An empty filter matches every advertisement.
    pub fn matches(&self, subtype: &str) -> bool {
        subtype.is_empty() || self.subtypes.iter().any(|s| s == subtype)
    }
}

pub(crate) fn fingerprint_of(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
