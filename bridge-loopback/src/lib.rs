//! # Loopback SDK
//!
//! In-process implementation of the native SDK traits, used by integration
//! tests and desktop tooling where the vendor SDK is unavailable.
//!
//! ## Overview
//!
//! The loopback SDK simulates devices instead of talking to them:
//! - `NativeConnection` resolves devices registered with [`LoopbackSdk::add_device`]
//! - `NativeStream` echoes written bytes back on configured stream ports
//! - `NativeCoap` serves static replies or handler closures per method and path
//! - `NativeTcpTunnel` binds a real local listener and forwards to a socket address
//! - `NativeMdnsScanner` receives advertisements pushed with [`LoopbackSdk::announce`]
//!
//! Completions are always delivered from a Tokio task, never on the calling
//! thread, matching how the vendor SDK reports results from its own workers.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_loopback::{CoapReply, LoopbackDevice, LoopbackSdk};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sdk = LoopbackSdk::current().unwrap();
//!     sdk.add_device(
//!         LoopbackDevice::builder("pr-abcd1234", "de-efgh5678")
//!             .coap_resource("GET", "/hello-world", CoapReply::content(0, "Hello"))
//!             .echo_stream_port(42)
//!             .build(),
//!     );
//!
//!     // Hand `sdk` to the bridge configuration
//! }
//! ```

mod coap;
mod connection;
mod device;
mod mdns;
mod sdk;
mod stream;
mod tunnel;

pub use coap::LoopbackCoap;
pub use connection::LoopbackConnection;
pub use device::{
    CoapHandler, CoapReply, CoapRequest, LoopbackDevice, LoopbackDeviceBuilder, MdnsAdvertisement,
    StreamService,
};
pub use mdns::LoopbackMdnsScanner;
pub use sdk::{LoopbackClient, LoopbackSdk, LOOPBACK_SDK_VERSION};
pub use stream::LoopbackStream;
pub use tunnel::LoopbackTunnel;
