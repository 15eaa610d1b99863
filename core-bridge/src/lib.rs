//! # Core Bridge
//!
//! Handle-based, future-returning access to the native edge SDK.
//!
//! ## Overview
//!
//! The bridge owns every native object the host creates and names it with an
//! opaque [`Handle`](core_runtime::Handle). Host code never touches native
//! objects directly; it holds a facade (a shared [`BridgeContext`] plus a
//! handle) or, for a marshaling layer, calls the handle-keyed operations on
//! the context.
//!
//! ## Components
//!
//! - [`registry`]: typed handle tables behind read/write locks
//! - [`adapter`]: one calling convention for synchronous, blocking and
//!   callback-based native operations
//! - [`forwarder`]: ordered host listeners and bus events for native
//!   notifications
//! - [`translate`]: native status codes to [`BridgeError`]
//! - Facades: [`EdgeClient`], [`Connection`], [`Stream`], [`Coap`],
//!   [`TcpTunnel`], [`MdnsScanner`]
//!
//! ## Example
//!
//! ```ignore
//! use core_bridge::{BridgeContext, CoapMethod, ConnectionOptions, EdgeClient};
//!
//! let context = BridgeContext::shared(&config);
//! let client = EdgeClient::create(&context).await?;
//! let key = client.create_private_key().await?;
//!
//! let connection = client.create_connection().await?;
//! connection
//!     .update_options(
//!         &ConnectionOptions::new()
//!             .product_id("pr-abcd1234")
//!             .device_id("de-efgh5678")
//!             .private_key(key),
//!     )
//!     .await?;
//! connection.connect().await?;
//!
//! let coap = connection.create_coap(CoapMethod::Get, "/hello-world").await?;
//! let response = coap.execute().await?;
//! ```

pub mod adapter;
pub mod client;
pub mod coap;
pub mod connection;
pub mod context;
pub mod error;
pub mod forwarder;
pub mod mdns;
pub mod options;
pub mod registry;
pub mod stream;
pub mod translate;
pub mod tunnel;

#[cfg(test)]
mod test_support;

pub use client::EdgeClient;
pub use coap::{Coap, CoapContentFormat, CoapMethod, CoapResponse};
pub use connection::{Connection, ConnectionState};
pub use context::BridgeContext;
pub use error::{BridgeError, Result};
pub use forwarder::{ListenerId, Subscription};
pub use mdns::MdnsScanner;
pub use options::ConnectionOptions;
pub use stream::{Stream, StreamState};
pub use tunnel::{TcpTunnel, TunnelState};
