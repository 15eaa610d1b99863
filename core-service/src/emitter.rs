//! Re-emitting bridge events to the host runtime.

use async_trait::async_trait;
use core_runtime::events::{EventStream, RecvError};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Host-side event channel, e.g. a JavaScript event emitter.
#[async_trait]
pub trait HostEventEmitter: Send + Sync {
    /// Deliver one named event. `name` is handle-scoped, such as
    /// `ConnectionOnEvent#3`.
    async fn emit(&self, name: &str, body: Value);
}

/// Pump every event from `events` into `emitter` until the bus closes.
///
/// Events missed because the host fell behind are logged and skipped.
pub fn spawn_event_pump(mut events: EventStream, emitter: Arc<dyn HostEventEmitter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => emitter.emit(&event.name(), event.body()).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Host event emitter lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Host event pump stopped");
    })
}
