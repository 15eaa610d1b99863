//! End-to-end bridge behavior against the loopback SDK.

use bridge_loopback::{CoapReply, LoopbackDevice, LoopbackSdk, MdnsAdvertisement};
use bridge_traits::{ConnectionType, ErrorCode, MdnsAction, NativeSdk};
use core_bridge::{
    BridgeContext, BridgeError, CoapContentFormat, CoapMethod, Connection, ConnectionOptions,
    ConnectionState, EdgeClient,
};
use core_runtime::config::BridgeConfig;
use core_runtime::events::{ConnectionEvent, HostEvent, MdnsResult};
use core_runtime::{Handle, ResourceKind};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const PRODUCT: &str = "pr-fqnkmiaq";
const DEVICE: &str = "de-ijrdq47i";

fn loopback() -> LoopbackSdk {
    let sdk = LoopbackSdk::current().unwrap();
    sdk.add_device(
        LoopbackDevice::builder(PRODUCT, DEVICE)
            .connection_type(ConnectionType::Relay)
            .password_user("admin", "hunter2")
            .coap_resource(
                "GET",
                "/info",
                CoapReply::content(50, r#"{"name":"thermostat"}"#),
            )
            .echo_stream_port(42)
            .greeting_stream_port(43, b"hello from device".to_vec())
            .build(),
    );
    sdk
}

fn context(sdk: &LoopbackSdk) -> Arc<BridgeContext> {
    let sdk: Arc<dyn NativeSdk> = Arc::new(sdk.clone());
    let config = BridgeConfig::builder()
        .sdk(sdk)
        .application_name("bridge-tests")
        .build()
        .unwrap();
    BridgeContext::shared(&config)
}

async fn connection_to(client: &EdgeClient, device_id: &str) -> Connection {
    let key = client.create_private_key().await.unwrap();
    let connection = client.create_connection().await.unwrap();
    connection
        .update_options(
            &ConnectionOptions::new()
                .product_id(PRODUCT)
                .device_id(device_id)
                .private_key(key),
        )
        .await
        .unwrap();
    connection
}

async fn connected(client: &EdgeClient) -> Connection {
    let connection = connection_to(client, DEVICE).await;
    connection.connect().await.unwrap();
    connection
}

fn recorder<E: Clone + Send + 'static>() -> (Arc<Mutex<Vec<E>>>, impl Fn(&E) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &E| sink.lock().unwrap().push(event.clone()))
}

// ============================================================================
// Handles
// ============================================================================

#[tokio::test]
async fn test_unregistered_handles_are_invalid() {
    let sdk = loopback();
    let context = context(&sdk);

    let err = context.client_version(Handle(7)).await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::InvalidHandle {
            kind: ResourceKind::Client,
            handle: Handle(7),
        }
    );
    assert!(context.stream_read_some(Handle(0)).await.unwrap_err().is_invalid_handle());
    assert!(context.coap_execute(Handle(0)).await.unwrap_err().is_invalid_handle());
}

#[tokio::test]
async fn test_double_dispose_is_idempotent() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;
    let stream = connection.create_stream().await.unwrap();

    stream.dispose().await.unwrap();
    stream.dispose().await.unwrap();
    connection.dispose().await.unwrap();
    connection.dispose().await.unwrap();
    client.dispose().await.unwrap();
    client.dispose().await.unwrap();

    assert!(context.registry().is_empty());
}

#[tokio::test]
async fn test_host_allocated_handles_collide() {
    let sdk = loopback();
    let context = context(&sdk);

    context.create_client(Handle(5)).await.unwrap();
    let err = context.create_client(Handle(5)).await.unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_HANDLE");
    assert_eq!(context.registry().len(ResourceKind::Client), 1);
}

#[tokio::test]
async fn test_disposed_handles_are_never_rebound() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;

    context
        .connection_create_stream(connection.handle(), Handle(0))
        .await
        .unwrap();
    context.stream_dispose(Handle(0)).await.unwrap();

    let err = context
        .connection_create_stream(connection.handle(), Handle(0))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::RetiredHandle {
            kind: ResourceKind::Stream,
            handle: Handle(0),
        }
    );

    let stream = connection.create_stream().await.unwrap();
    assert_ne!(stream.handle(), Handle(0));
    assert!(context.stream_state(Handle(0)).unwrap_err().is_invalid_handle());
    assert_eq!(context.registry().len(ResourceKind::Stream), 1);
}

#[tokio::test]
async fn test_shutdown_disposes_everything() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;
    connection.create_stream().await.unwrap();
    connection.create_coap(CoapMethod::Get, "/info").await.unwrap();
    connection.create_tcp_tunnel().await.unwrap();
    client.create_mdns_scanner("").await.unwrap();

    assert_eq!(context.shutdown().await, 6);
    assert!(context.registry().is_empty());
}

// ============================================================================
// Connections
// ============================================================================

#[tokio::test]
async fn test_connect_reports_relay() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;

    assert_eq!(connection.state().unwrap(), ConnectionState::Connected);
    assert_eq!(connection.connection_type().await.unwrap(), ConnectionType::Relay);
    assert_eq!(connection.device_fingerprint().await.unwrap().len(), 64);

    connection.password_authenticate("admin", "hunter2").await.unwrap();
    let err = connection
        .password_authenticate("admin", "wrong")
        .await
        .unwrap_err();
    assert_eq!(err.native_code(), Some(ErrorCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_options_round_trip_hides_private_key() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connection_to(&client, DEVICE).await;

    let options = connection.get_options().await.unwrap();
    assert_eq!(options.product_id.as_deref(), Some(PRODUCT));
    assert_eq!(options.device_id.as_deref(), Some(DEVICE));
    assert_eq!(options.private_key, None);
}

#[tokio::test]
async fn test_unknown_device_has_no_channels() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connection_to(&client, "de-missing").await;

    let err = connection.connect().await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::NoChannelsAvailable {
            local: ErrorCode::NOT_FOUND,
            remote: ErrorCode::NOT_FOUND,
            direct_candidates: ErrorCode::NONE,
        }
    );
    assert_eq!(connection.state().unwrap(), ConnectionState::Closed);
    assert_eq!(err.code(), "NO_CHANNELS_AVAILABLE");
}

#[tokio::test]
async fn test_listeners_get_no_replay_and_nothing_after_removal() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connection_to(&client, DEVICE).await;
    let mut bus = context.events().for_handle(connection.handle());

    let (early_seen, early) = recorder::<ConnectionEvent>();
    let early_id = connection.add_events_listener(early).await.unwrap();
    connection.connect().await.unwrap();

    let (late_seen, late) = recorder::<ConnectionEvent>();
    connection.add_events_listener(late).await.unwrap();
    assert!(connection.remove_events_listener(early_id).await.unwrap());
    assert!(!connection.remove_events_listener(early_id).await.unwrap());

    connection.close().await.unwrap();

    assert_eq!(*early_seen.lock().unwrap(), vec![ConnectionEvent::Connected]);
    assert_eq!(*late_seen.lock().unwrap(), vec![ConnectionEvent::Closed]);

    let connected = bus.recv().await.unwrap();
    assert_eq!(connected.name(), format!("ConnectionOnEvent#{}", connection.handle()));
    assert_eq!(connected.body(), serde_json::json!({ "event": 0 }));
    let closed = bus.recv().await.unwrap();
    assert_eq!(closed.body(), serde_json::json!({ "event": 1 }));
}

#[tokio::test]
async fn test_disposed_client_invalidates_connections() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;

    client.dispose().await.unwrap();

    let err = connection.create_stream().await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::InvalidHandle {
            kind: ResourceKind::Client,
            handle: client.handle(),
        }
    );
    connection.close().await.unwrap();
    connection.dispose().await.unwrap();
}

// ============================================================================
// Streams
// ============================================================================

#[tokio::test]
async fn test_stream_echo_round_trip() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;
    let stream = connection.create_stream().await.unwrap();

    stream.open(42).await.unwrap();
    let bytes: Vec<u8> = (0..=255).collect();
    stream.write(bytes.clone()).await.unwrap();
    assert_eq!(stream.read_all(bytes.len()).await.unwrap(), bytes);

    stream.close().await.unwrap();
    assert_eq!(
        stream.read_some().await.unwrap_err(),
        BridgeError::StreamClosed {
            handle: stream.handle()
        }
    );
}

#[tokio::test]
async fn test_device_closing_stream_is_end_of_stream() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;
    let stream = connection.create_stream().await.unwrap();

    stream.open(43).await.unwrap();
    assert_eq!(stream.read_some().await.unwrap(), b"hello from device".to_vec());
    assert_eq!(stream.read_some().await.unwrap_err(), BridgeError::EndOfStream);
}

#[tokio::test]
async fn test_open_unknown_port_can_retry() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;
    let stream = connection.create_stream().await.unwrap();

    let err = stream.open(9).await.unwrap_err();
    assert_eq!(err.native_code(), Some(ErrorCode::NOT_FOUND));
    stream.open(42).await.unwrap();
}

// ============================================================================
// CoAP
// ============================================================================

#[tokio::test]
async fn test_get_info() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;

    let coap = connection.create_coap(CoapMethod::Get, "/info").await.unwrap();
    let response = coap.execute().await.unwrap();

    assert_eq!(response.status_code, 205);
    assert_eq!(response.format(), Some(CoapContentFormat::Json));
    let body: serde_json::Value = serde_json::from_slice(&response.payload.unwrap()).unwrap();
    assert_eq!(body["name"], "thermostat");
    assert!(!context.registry().is_registered(ResourceKind::Coap, coap.handle()));
}

#[tokio::test]
async fn test_unknown_resource_has_no_payload() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;

    let coap = connection.create_coap(CoapMethod::Get, "/nothing").await.unwrap();
    let response = coap.execute().await.unwrap();
    assert_eq!(response.status_code, 404);
    assert_eq!(response.payload, None);
}

#[tokio::test]
async fn test_failed_exchange_also_removes_handle() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;
    let coap = connection.create_coap(CoapMethod::Post, "/info").await.unwrap();
    coap.set_request_payload(CoapContentFormat::TextPlainUtf8, "on")
        .await
        .unwrap();

    connection.close().await.unwrap();
    let err = coap.execute().await.unwrap_err();
    assert_eq!(err.native_code(), Some(ErrorCode::NOT_CONNECTED));
    assert!(coap.execute().await.unwrap_err().is_invalid_handle());
}

// ============================================================================
// Tunnels
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tunnel_forwards_to_service() {
    let echo = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let echo_addr = echo.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = echo.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    let sdk = LoopbackSdk::current().unwrap();
    sdk.add_device(
        LoopbackDevice::builder(PRODUCT, DEVICE)
            .tunnel_service("echo", echo_addr)
            .build(),
    );
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let connection = connected(&client).await;
    let tunnel = connection.create_tcp_tunnel().await.unwrap();

    tunnel.open("echo", 0).await.unwrap();
    let port = tunnel.local_port().await.unwrap();
    assert_ne!(port, 0);

    let mut socket = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    socket.write_all(b"ping").await.unwrap();
    let mut reply = [0u8; 4];
    socket.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"ping");

    tunnel.close().await.unwrap();
    assert_eq!(tunnel.local_port().await.unwrap_err().code(), "INVALID_STATE");
    tunnel.dispose().await.unwrap();
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_scanner_delivers_until_stopped() {
    let sdk = loopback();
    let context = context(&sdk);
    let client = EdgeClient::create(&context).await.unwrap();
    let scanner = client.create_mdns_scanner("").await.unwrap();
    let mut bus = context.events();

    let (seen, listener) = recorder::<MdnsResult>();
    scanner.add_result_listener(listener).await.unwrap();
    scanner.start().await.unwrap();
    assert!(scanner.is_started().await.unwrap());

    let advertisement = MdnsAdvertisement::new(PRODUCT, DEVICE).with_txt("fn", "Thermostat");
    assert_eq!(sdk.announce(&advertisement), 1);

    scanner.stop().await.unwrap();
    assert!(!scanner.is_started().await.unwrap());
    assert_eq!(sdk.announce(&advertisement), 0);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].action, MdnsAction::Add);
    assert_eq!(seen[0].device_id, DEVICE);
    assert_eq!(seen[0].txt_items.get("fn").map(String::as_str), Some("Thermostat"));

    let event = bus.recv().await.unwrap();
    assert!(matches!(event, HostEvent::MdnsResult { .. }));
    assert_eq!(event.name(), format!("ScannerOnResult#{}", scanner.handle()));
    assert_eq!(event.body()["productId"], PRODUCT);
    assert_eq!(event.body()["action"], 0);
}
