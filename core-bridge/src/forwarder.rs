//! # Event Forwarder
//!
//! Relays native connection events and discovery results to host listeners
//! and to the [`EventBus`].
//!
//! Delivery goes to the listeners registered at the moment the native event
//! arrives, in registration order. Past events are never replayed and a
//! removed listener is never called again. After the host listeners, each
//! event is published on the bus as a handle-scoped [`HostEvent`].
//!
//! A [`Subscription`] owns the native listener registration. Cancelling it
//! first marks it dead, waiting for a delivery already in progress, and then
//! removes the native listener, so nothing is delivered once `cancel` returns.

use bridge_traits::{NativeConnection, NativeMdnsResult, NativeMdnsScanner};
use core_runtime::events::{ConnectionEvent, EventBus, HostEvent, MdnsResult};
use core_runtime::Handle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, trace, warn};

/// Identifies one listener added to a [`ListenerList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered, mutex-guarded host listeners for one resource.
pub struct ListenerList<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> ListenerList<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener<E>)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Returns whether the listener was present.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Call every current listener with `event`, returning how many were called.
    ///
    /// Listeners run outside the lock, so they may add or remove listeners.
    pub fn deliver(&self, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }
}

impl<E> Default for ListenerList<E> {
    fn default() -> Self {
        Self::new()
    }
}

type Teardown = Box<dyn FnOnce() + Send + Sync>;

/// Live native listener registration. Dropping it cancels it.
pub struct Subscription {
    live: Arc<RwLock<bool>>,
    teardown: Option<Teardown>,
}

impl Subscription {
    fn new(live: Arc<RwLock<bool>>, teardown: Teardown) -> Self {
        Self {
            live,
            teardown: Some(teardown),
        }
    }

    pub fn is_active(&self) -> bool {
        self.teardown.is_some()
    }

    /// Stop delivery and remove the native listener. Idempotent.
    ///
    /// Must not be called from inside a listener of the same subscription.
    pub fn cancel(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            *self.live.write().unwrap_or_else(|e| e.into_inner()) = false;
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Bridges native listener callbacks to host listeners and the event bus.
#[derive(Clone, Debug)]
pub struct EventForwarder {
    bus: EventBus,
}

impl EventForwarder {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn publish(bus: &EventBus, event: HostEvent) {
        let channel = event.channel();
        let receivers = bus.publish(event);
        trace!(channel, receivers, "Published host event");
    }

    /// Start forwarding connection events of `native`.
    pub fn forward_connection_events(
        &self,
        handle: Handle,
        native: Arc<dyn NativeConnection>,
        listeners: Arc<ListenerList<ConnectionEvent>>,
    ) -> Subscription {
        let live = Arc::new(RwLock::new(true));
        let gate = Arc::clone(&live);
        let bus = self.bus.clone();

        let token = native.add_connection_events_listener(Arc::new(move |code: i32| {
            let live = gate.read().unwrap_or_else(|e| e.into_inner());
            if !*live {
                return;
            }
            let Some(event) = ConnectionEvent::from_code(code) else {
                warn!(connection = %handle, code, "Dropping unknown connection event");
                return;
            };
            debug!(connection = %handle, ?event, "Connection event");
            listeners.deliver(&event);
            Self::publish(&bus, HostEvent::Connection { handle, event });
        }));

        Subscription::new(
            live,
            Box::new(move || native.remove_connection_events_listener(token)),
        )
    }

    /// Start forwarding discovery results of `native`.
    pub fn forward_mdns_results(
        &self,
        handle: Handle,
        native: Arc<dyn NativeMdnsScanner>,
        listeners: Arc<ListenerList<MdnsResult>>,
    ) -> Subscription {
        let live = Arc::new(RwLock::new(true));
        let gate = Arc::clone(&live);
        let bus = self.bus.clone();

        let token = native.add_result_receiver(Arc::new(move |native_result: NativeMdnsResult| {
            let live = gate.read().unwrap_or_else(|e| e.into_inner());
            if !*live {
                return;
            }
            let result = MdnsResult::from(native_result);
            debug!(
                scanner = %handle,
                device_id = %result.device_id,
                action = ?result.action,
                "Discovery result"
            );
            listeners.deliver(&result);
            Self::publish(&bus, HostEvent::MdnsResult { handle, result });
        }));

        Subscription::new(
            live,
            Box::new(move || native.remove_result_receiver(token)),
        )
    }
}
