//! Shape of the native edge SDK as the bridge sees it.
//!
//! Platform bindings (Objective-C blocks, Java callbacks, the in-process
//! `bridge-loopback` simulator) implement these traits so the bridge core
//! never deals with a particular binding style. Three calling conventions
//! cover the whole surface:
//!
//! * quick synchronous calls return [`NativeResult`];
//! * long-running calls take a [`Completion`], invoked exactly once from any
//!   thread with an [`ErrorCode`] and an optional value;
//! * listener registrations hand back a [`ListenerToken`] for removal.
//!
//! Object graph: [`NativeSdk`] creates [`NativeClient`]s, a client creates
//! [`NativeConnection`]s and [`NativeMdnsScanner`]s, and a connection creates
//! [`NativeStream`]s, [`NativeCoap`] exchanges and [`NativeTcpTunnel`]s.
//! [`LoggerSink`] receives SDK and bridge log entries on the host side.
//!
//! ```ignore
//! impl NativeStream for PlatformStream {
//!     fn read_some(&self, done: Completion<Vec<u8>>) {
//!         self.inner.read_some(move |ec, bytes| done(ErrorCode(ec), bytes));
//!     }
//! }
//! ```

pub mod callback;
pub mod client;
pub mod coap;
pub mod connection;
pub mod error;
pub mod log;
pub mod mdns;
pub mod stream;
pub mod tunnel;

pub use error::{ErrorCode, NativeError, NativeResult, SinkError};

pub use callback::{Completion, ListenerToken};
pub use client::{ClientContext, NativeClient, NativeSdk};
pub use coap::{NativeCoap, NativeCoapResponse};
pub use connection::{
    ConnectionEventCode, ConnectionEventsCallback, ConnectionType, NativeConnection,
};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use mdns::{MdnsAction, MdnsResultCallback, NativeMdnsResult, NativeMdnsScanner};
pub use stream::NativeStream;
pub use tunnel::NativeTcpTunnel;
