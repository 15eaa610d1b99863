//! Drives a simulated device through the host JSON boundary.
//!
//! ```text
//! cargo run -p core-service --example loopback_demo --features loopback-shims
//! ```

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bridge_loopback::{CoapReply, LoopbackDevice};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{bootstrap_loopback, EdgeClientService, HostEventEmitter};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct PrintingEmitter;

#[async_trait]
impl HostEventEmitter for PrintingEmitter {
    async fn emit(&self, name: &str, body: Value) {
        println!("event {} {}", name, body);
    }
}

async fn call(service: &EdgeClientService, request: Value) -> Result<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    service
        .dispatch(request)
        .await
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("{} failed", method))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let (service, sdk) = bootstrap_loopback("loopback-demo")?;
    sdk.add_device(
        LoopbackDevice::builder("pr-demo", "de-demo")
            .coap_resource(
                "GET",
                "/hello-world",
                CoapReply::content(0, "Hello from the loopback device"),
            )
            .build(),
    );
    let pump = service.forward_events(Arc::new(PrintingEmitter));

    call(&service, json!({ "method": "createNabtoClient", "clientId": 0 })).await?;
    let version = call(&service, json!({ "method": "clientGetVersion", "clientId": 0 })).await?;
    println!("sdk version {}", version);

    let key = call(&service, json!({ "method": "clientCreatePrivateKey", "clientId": 0 })).await?;
    call(
        &service,
        json!({ "method": "clientCreateConnection", "clientId": 0, "connectionId": 0 }),
    )
    .await?;
    call(
        &service,
        json!({
            "method": "connectionUpdateOptions",
            "connectionId": 0,
            "options": { "ProductId": "pr-demo", "DeviceId": "de-demo", "PrivateKey": key },
        }),
    )
    .await?;
    call(&service, json!({ "method": "connectionConnect", "connectionId": 0 })).await?;

    call(
        &service,
        json!({
            "method": "connectionCreateCoap",
            "connectionId": 0,
            "coapId": 0,
            "coapMethod": "GET",
            "path": "/hello-world",
        }),
    )
    .await?;
    let response = call(&service, json!({ "method": "coapExecute", "coapId": 0 })).await?;
    println!("coap response {}", response);

    call(&service, json!({ "method": "connectionClose", "connectionId": 0 })).await?;
    let disposed = service.shutdown().await;
    println!("disposed {} resources", disposed);

    drop(service);
    // The pump ends when the bus closes.
    let _ = tokio::time::timeout(Duration::from_secs(1), pump).await;
    Ok(())
}
