//! Host-bound notifications.
//!
//! Native listeners on connections and mDNS scanners are turned into
//! [`HostEvent`]s and published on an [`EventBus`]. Each event carries the
//! handle of the resource that produced it, and renders itself into the
//! name/body pair the host expects:
//!
//! | Source      | Name                     | Body                                   |
//! |-------------|--------------------------|----------------------------------------|
//! | connection  | `ConnectionOnEvent#<h>`  | `{"event": <code>}`                    |
//! | mDNS scanner| `ScannerOnResult#<h>`    | `{action, deviceId, productId, ...}`   |
//!
//! Subscribers see only events published after they subscribed. A slow
//! subscriber gets [`RecvError::Lagged`] and may keep reading; once every
//! bus clone is dropped, reads end with [`RecvError::Closed`].
//!
//! ```rust
//! use core_runtime::events::{ConnectionEvent, EventBus, HostEvent};
//! use core_runtime::handle::Handle;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::default();
//! let mut connection_0 = bus.stream().for_handle(Handle(0));
//!
//! bus.publish(HostEvent::Connection {
//!     handle: Handle(0),
//!     event: ConnectionEvent::Connected,
//! });
//!
//! let event = connection_0.recv().await.unwrap();
//! assert_eq!(event.name(), "ConnectionOnEvent#0");
//! # }
//! ```

use bridge_traits::{MdnsAction, NativeMdnsResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::handle::Handle;

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Events a subscriber may fall behind by before it starts lagging.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Connection lifecycle notification, with the native event codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Connected,
    Closed,
    ChannelChanged,
}

impl ConnectionEvent {
    const ALL: [ConnectionEvent; 3] = [
        ConnectionEvent::Connected,
        ConnectionEvent::Closed,
        ConnectionEvent::ChannelChanged,
    ];

    /// Decode a native event code. Unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.code() == code)
    }

    pub fn code(self) -> i32 {
        match self {
            ConnectionEvent::Connected => 0,
            ConnectionEvent::Closed => 1,
            ConnectionEvent::ChannelChanged => 2,
        }
    }
}

/// One discovery result as seen by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MdnsResult {
    pub action: MdnsAction,
    pub device_id: String,
    pub product_id: String,
    pub service_instance_name: String,
    pub txt_items: BTreeMap<String, String>,
}

impl From<NativeMdnsResult> for MdnsResult {
    fn from(native: NativeMdnsResult) -> Self {
        Self {
            action: native.action,
            device_id: native.device_id,
            product_id: native.product_id,
            service_instance_name: native.service_instance_name,
            txt_items: native.txt_items,
        }
    }
}

/// Notification addressed to the host, tagged with its producing handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum HostEvent {
    Connection { handle: Handle, event: ConnectionEvent },
    MdnsResult { handle: Handle, result: MdnsResult },
}

impl HostEvent {
    pub fn handle(&self) -> Handle {
        match self {
            HostEvent::Connection { handle, .. } | HostEvent::MdnsResult { handle, .. } => *handle,
        }
    }

    /// Prefix of the host event name, without the handle suffix.
    pub fn channel(&self) -> &'static str {
        match self {
            HostEvent::Connection { .. } => "ConnectionOnEvent",
            HostEvent::MdnsResult { .. } => "ScannerOnResult",
        }
    }

    /// `<channel>#<handle>`
    pub fn name(&self) -> String {
        format!("{}#{}", self.channel(), self.handle())
    }

    pub fn body(&self) -> Value {
        match self {
            HostEvent::Connection { event, .. } => json!({ "event": event.code() }),
            HostEvent::MdnsResult { result, .. } => json!({
                "action": result.action.ordinal(),
                "deviceId": result.device_id,
                "productId": result.product_id,
                "serviceInstanceName": result.service_instance_name,
                "txtItems": result.txt_items,
            }),
        }
    }
}

/// Broadcast channel shared by every event producer in a bridge context.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HostEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Deliver `event` to current subscribers and return how many got it.
    /// Publishing with nobody listening is a no-op.
    pub fn publish(&self, event: HostEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Receiver<HostEvent> {
        self.sender.subscribe()
    }

    /// Subscribe and wrap the receiver in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus({} subscribers)", self.subscriber_count())
    }
}

type Predicate = Box<dyn Fn(&HostEvent) -> bool + Send + Sync>;

/// Subscriber side of the bus. Predicates added with [`EventStream::filter`]
/// accumulate; an event is returned only when all of them accept it.
pub struct EventStream {
    receiver: Receiver<HostEvent>,
    predicates: Vec<Predicate>,
}

impl EventStream {
    pub fn new(receiver: Receiver<HostEvent>) -> Self {
        Self {
            receiver,
            predicates: Vec::new(),
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&HostEvent) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Keep only events produced by `handle`.
    pub fn for_handle(self, handle: Handle) -> Self {
        self.filter(move |event| event.handle() == handle)
    }

    fn wants(&self, event: &HostEvent) -> bool {
        self.predicates.iter().all(|predicate| predicate(event))
    }

    /// Wait for the next accepted event.
    ///
    /// Lagging is reported once, after which reading resumes from the
    /// oldest event still buffered.
    pub async fn recv(&mut self) -> Result<HostEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.wants(&event) {
                break Ok(event);
            }
        }
    }

    /// Non-blocking [`EventStream::recv`]; `None` when nothing accepted is
    /// buffered.
    pub fn try_recv(&mut self) -> Option<Result<HostEvent, RecvError>> {
        loop {
            let outcome = match self.receiver.try_recv() {
                Ok(event) if self.wants(&event) => Ok(event),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(missed)) => Err(RecvError::Lagged(missed)),
                Err(TryRecvError::Closed) => Err(RecvError::Closed),
            };
            break Some(outcome);
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
