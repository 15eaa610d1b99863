//! # Handle Registry
//!
//! Owns every live native object the host can reach, keyed by
//! `(ResourceKind, Handle)`.
//!
//! ## Overview
//!
//! The registry is a set of typed [`HandleTable`]s, one per [`ResourceKind`].
//! Each table guards its map with an `RwLock`:
//!
//! - `resolve` takes the read lock, so lookups on any handles run concurrently
//! - `register` and `remove` take the write lock
//! - the lock is held only for the map access and never across a native call,
//!   so a slow native operation on one handle never blocks another
//!
//! Resolving hands out an `Arc` to the entry. A resource removed while an
//! operation is still using it stays alive until that operation finishes.
//!
//! A removed handle is retired: it never resolves again and cannot be
//! registered a second time, so a stale host reference can only ever fail
//! with `InvalidHandle`.

use core_runtime::{Handle, ResourceKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::client::ClientEntry;
use crate::coap::CoapEntry;
use crate::connection::ConnectionEntry;
use crate::error::{BridgeError, Result};
use crate::mdns::ScannerEntry;
use crate::stream::StreamEntry;
use crate::tunnel::TunnelEntry;

struct Slots<T> {
    live: HashMap<Handle, Arc<T>>,
    retired: HashSet<Handle>,
}

/// Handle-keyed map of one resource kind.
pub struct HandleTable<T> {
    kind: ResourceKind,
    slots: RwLock<Slots<T>>,
}

impl<T> HandleTable<T> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            slots: RwLock::new(Slots {
                live: HashMap::new(),
                retired: HashSet::new(),
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn read(&self) -> RwLockReadGuard<'_, Slots<T>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots<T>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `entry` under `handle`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::DuplicateHandle`] if `handle` is registered, and
    /// [`BridgeError::RetiredHandle`] if it was registered once and removed.
    pub fn register(&self, handle: Handle, entry: Arc<T>) -> Result<()> {
        let mut slots = self.write();
        self.vacancy(&slots, handle)?;
        slots.live.insert(handle, entry);
        Ok(())
    }

    /// Fail the way [`HandleTable::register`] would if `handle` cannot take
    /// a new entry. Lets callers check before creating a native object.
    pub fn ensure_vacant(&self, handle: Handle) -> Result<()> {
        self.vacancy(&self.read(), handle)
    }

    fn vacancy(&self, slots: &Slots<T>, handle: Handle) -> Result<()> {
        let kind = self.kind;
        if slots.live.contains_key(&handle) {
            return Err(BridgeError::DuplicateHandle { kind, handle });
        }
        if slots.retired.contains(&handle) {
            return Err(BridgeError::RetiredHandle { kind, handle });
        }
        Ok(())
    }

    /// Look up the entry registered under `handle`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidHandle`] if nothing is registered under `handle`.
    pub fn resolve(&self, handle: Handle) -> Result<Arc<T>> {
        self.read()
            .live
            .get(&handle)
            .cloned()
            .ok_or(BridgeError::InvalidHandle {
                kind: self.kind,
                handle,
            })
    }

    /// Remove and retire `handle`, returning its entry if it was registered.
    ///
    /// Removing an unknown handle is a no-op.
    pub fn remove(&self, handle: Handle) -> Option<Arc<T>> {
        let mut slots = self.write();
        let entry = slots.live.remove(&handle)?;
        slots.retired.insert(handle);
        Some(entry)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.read().live.contains_key(&handle)
    }

    /// Whether `handle` is registered now or was retired.
    pub fn is_used(&self, handle: Handle) -> bool {
        let slots = self.read();
        slots.live.contains_key(&handle) || slots.retired.contains(&handle)
    }

    /// Registered handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.read().live.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().live.is_empty()
    }
}

/// All resource tables of one bridge instance.
pub struct HandleRegistry {
    pub clients: HandleTable<ClientEntry>,
    pub connections: HandleTable<ConnectionEntry>,
    pub streams: HandleTable<StreamEntry>,
    pub coaps: HandleTable<CoapEntry>,
    pub tunnels: HandleTable<TunnelEntry>,
    pub scanners: HandleTable<ScannerEntry>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            clients: HandleTable::new(ResourceKind::Client),
            connections: HandleTable::new(ResourceKind::Connection),
            streams: HandleTable::new(ResourceKind::Stream),
            coaps: HandleTable::new(ResourceKind::Coap),
            tunnels: HandleTable::new(ResourceKind::TcpTunnel),
            scanners: HandleTable::new(ResourceKind::MdnsScanner),
        }
    }

    pub fn is_registered(&self, kind: ResourceKind, handle: Handle) -> bool {
        match kind {
            ResourceKind::Client => self.clients.contains(handle),
            ResourceKind::Connection => self.connections.contains(handle),
            ResourceKind::Stream => self.streams.contains(handle),
            ResourceKind::Coap => self.coaps.contains(handle),
            ResourceKind::TcpTunnel => self.tunnels.contains(handle),
            ResourceKind::MdnsScanner => self.scanners.contains(handle),
        }
    }

    /// Whether `handle` was ever registered for `kind`.
    pub fn is_used(&self, kind: ResourceKind, handle: Handle) -> bool {
        match kind {
            ResourceKind::Client => self.clients.is_used(handle),
            ResourceKind::Connection => self.connections.is_used(handle),
            ResourceKind::Stream => self.streams.is_used(handle),
            ResourceKind::Coap => self.coaps.is_used(handle),
            ResourceKind::TcpTunnel => self.tunnels.is_used(handle),
            ResourceKind::MdnsScanner => self.scanners.is_used(handle),
        }
    }

    /// Number of live resources of `kind`.
    pub fn len(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Client => self.clients.len(),
            ResourceKind::Connection => self.connections.len(),
            ResourceKind::Stream => self.streams.len(),
            ResourceKind::Coap => self.coaps.len(),
            ResourceKind::TcpTunnel => self.tunnels.len(),
            ResourceKind::MdnsScanner => self.scanners.len(),
        }
    }

    pub fn handles(&self, kind: ResourceKind) -> Vec<Handle> {
        match kind {
            ResourceKind::Client => self.clients.handles(),
            ResourceKind::Connection => self.connections.handles(),
            ResourceKind::Stream => self.streams.handles(),
            ResourceKind::Coap => self.coaps.handles(),
            ResourceKind::TcpTunnel => self.tunnels.handles(),
            ResourceKind::MdnsScanner => self.scanners.handles(),
        }
    }

    pub fn is_empty(&self) -> bool {
        ResourceKind::TEARDOWN_ORDER
            .iter()
            .all(|kind| self.len(*kind) == 0)
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_resolve_remove() {
        let table: HandleTable<String> = HandleTable::new(ResourceKind::Stream);
        table.register(Handle(0), Arc::new("first".to_string())).unwrap();

        assert_eq!(table.resolve(Handle(0)).unwrap().as_str(), "first");
        assert!(table.remove(Handle(0)).is_some());
        assert!(table.remove(Handle(0)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_resolve_unknown_handle() {
        let table: HandleTable<u32> = HandleTable::new(ResourceKind::Coap);
        let err = table.resolve(Handle(9)).unwrap_err();
        assert_eq!(
            err,
            BridgeError::InvalidHandle {
                kind: ResourceKind::Coap,
                handle: Handle(9),
            }
        );
    }

    #[test]
    fn test_duplicate_register_keeps_first() {
        let table: HandleTable<u32> = HandleTable::new(ResourceKind::Client);
        table.register(Handle(1), Arc::new(1)).unwrap();

        let err = table.register(Handle(1), Arc::new(2)).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_HANDLE");
        assert_eq!(*table.resolve(Handle(1)).unwrap(), 1);
    }

    #[test]
    fn test_removed_handle_is_retired() {
        let table: HandleTable<&str> = HandleTable::new(ResourceKind::Stream);
        table.register(Handle(0), Arc::new("old")).unwrap();
        table.remove(Handle(0));

        let err = table.register(Handle(0), Arc::new("new")).unwrap_err();
        assert_eq!(
            err,
            BridgeError::RetiredHandle {
                kind: ResourceKind::Stream,
                handle: Handle(0),
            }
        );
        assert!(table.resolve(Handle(0)).unwrap_err().is_invalid_handle());
        assert!(table.is_used(Handle(0)));
        assert!(!table.contains(Handle(0)));
        assert!(!table.is_used(Handle(1)));
    }

    #[test]
    fn test_removed_entry_outlives_registration() {
        let table: HandleTable<Vec<u8>> = HandleTable::new(ResourceKind::Stream);
        table.register(Handle(3), Arc::new(vec![1, 2, 3])).unwrap();

        let in_use = table.resolve(Handle(3)).unwrap();
        table.remove(Handle(3));
        assert_eq!(in_use.as_slice(), &[1, 2, 3]);
        assert!(table.resolve(Handle(3)).is_err());
    }

    #[test]
    fn test_handles_sorted() {
        let table: HandleTable<()> = HandleTable::new(ResourceKind::TcpTunnel);
        for h in [5, 1, 3] {
            table.register(Handle(h), Arc::new(())).unwrap();
        }
        assert_eq!(table.handles(), vec![Handle(1), Handle(3), Handle(5)]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_empty_registry() {
        let registry = HandleRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.is_registered(ResourceKind::Connection, Handle(0)));
        assert_eq!(registry.len(ResourceKind::MdnsScanner), 0);
    }
}
