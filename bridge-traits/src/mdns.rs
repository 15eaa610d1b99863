//! Local Discovery Abstraction

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{callback::ListenerToken, error::NativeResult};

/// What happened to an advertised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MdnsAction {
    Add,
    Update,
    Remove,
}

impl MdnsAction {
    /// Ordinal used across the host boundary (`ADD = 0`, `UPDATE = 1`, `REMOVE = 2`).
    pub fn ordinal(self) -> u8 {
        match self {
            MdnsAction::Add => 0,
            MdnsAction::Update => 1,
            MdnsAction::Remove => 2,
        }
    }
}

/// One observed device advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMdnsResult {
    pub action: MdnsAction,
    pub device_id: String,
    pub product_id: String,
    pub service_instance_name: String,
    pub txt_items: BTreeMap<String, String>,
}

/// Callback invoked by the SDK for each discovery result.
pub type MdnsResultCallback = Arc<dyn Fn(NativeMdnsResult) + Send + Sync>;

/// Native discovery session.
pub trait NativeMdnsScanner: Send + Sync {
    fn start(&self) -> NativeResult<()>;

    fn stop(&self) -> NativeResult<()>;

    fn is_started(&self) -> bool;

    fn add_result_receiver(&self, receiver: MdnsResultCallback) -> ListenerToken;

    fn remove_result_receiver(&self, token: ListenerToken);
}
