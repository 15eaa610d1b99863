//! # Resource Handles
//!
//! Opaque integer handles naming native objects across the host boundary.
//!
//! A handle is only meaningful together with its [`ResourceKind`]: connection
//! `3` and stream `3` are unrelated objects. Handles are allocated per kind
//! by a [`HandleAllocator`] scoped to one bridge instance, start at `0`, and
//! increase monotonically. A number is never handed out twice by the same
//! allocator, so a disposed handle can never alias a newer object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier of one registered native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Handle {
    fn from(value: u64) -> Self {
        Handle(value)
    }
}

/// Kind of native object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Client,
    Connection,
    Stream,
    Coap,
    TcpTunnel,
    MdnsScanner,
}

impl ResourceKind {
    /// All kinds, in teardown order (dependents before owners).
    pub const TEARDOWN_ORDER: [ResourceKind; 6] = [
        ResourceKind::MdnsScanner,
        ResourceKind::Coap,
        ResourceKind::Stream,
        ResourceKind::TcpTunnel,
        ResourceKind::Connection,
        ResourceKind::Client,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Client => "Client",
            ResourceKind::Connection => "Connection",
            ResourceKind::Stream => "Stream",
            ResourceKind::Coap => "Coap",
            ResourceKind::TcpTunnel => "TcpTunnel",
            ResourceKind::MdnsScanner => "MdnsScanner",
        }
    }

    fn index(self) -> usize {
        match self {
            ResourceKind::Client => 0,
            ResourceKind::Connection => 1,
            ResourceKind::Stream => 2,
            ResourceKind::Coap => 3,
            ResourceKind::TcpTunnel => 4,
            ResourceKind::MdnsScanner => 5,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind monotonic handle source.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: [AtomicU64; 6],
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next unused handle for `kind`.
    pub fn allocate(&self, kind: ResourceKind) -> Handle {
        Handle(self.next[kind.index()].fetch_add(1, Ordering::Relaxed))
    }

    /// Number of handles handed out so far for `kind`.
    pub fn allocated(&self, kind: ResourceKind) -> u64 {
        self.next[kind.index()].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_allocation_is_per_kind() {
        let allocator = HandleAllocator::new();
        assert_eq!(allocator.allocate(ResourceKind::Connection), Handle(0));
        assert_eq!(allocator.allocate(ResourceKind::Connection), Handle(1));
        assert_eq!(allocator.allocate(ResourceKind::Stream), Handle(0));
        assert_eq!(allocator.allocated(ResourceKind::Connection), 2);
        assert_eq!(allocator.allocated(ResourceKind::Coap), 0);
    }

    #[test]
    fn test_concurrent_allocation_never_repeats() {
        let allocator = Arc::new(HandleAllocator::new());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| allocator.allocate(ResourceKind::Coap))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for handle in t.join().unwrap() {
                assert!(seen.insert(handle));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_handle_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Handle(7)).unwrap(), "7");
        assert_eq!(ResourceKind::TcpTunnel.to_string(), "TcpTunnel");
    }
}
