//! Runtime plumbing shared by the bridge crates.
//!
//! [`config`] builds the validated [`config::BridgeConfig`], [`handle`] owns
//! the host-visible resource ids, [`events`] carries connection and scanner
//! notifications towards the host, and [`logging`] installs the `tracing`
//! subscriber with secret redaction.

pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod logging;

pub use error::{Error, Result};
pub use handle::{Handle, HandleAllocator, ResourceKind};
