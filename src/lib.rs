//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `edge-client-workspace`
//! and enable `loopback-shims` to get [`core_service`] wired to the in-process
//! loopback SDK without naming each crate individually.

#[cfg(feature = "loopback-shims")]
pub use core_service;
