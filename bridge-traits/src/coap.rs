//! CoAP Abstraction

use crate::{callback::Completion, error::NativeResult};

/// Response reported by the SDK once an exchange completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeCoapResponse {
    /// Status code in `class * 100 + detail` form (e.g. `205`, `404`).
    pub status_code: u16,
    /// Content format of the response body, if the device set one.
    pub content_format: Option<u16>,
    /// Response body. Devices differ in whether an empty body is `None` or
    /// `Some(vec![])`.
    pub payload: Option<Vec<u8>>,
}

/// One CoAP request/response exchange.
pub trait NativeCoap: Send + Sync {
    fn set_request_payload(&self, content_format: u16, payload: Vec<u8>) -> NativeResult<()>;

    fn execute(&self, done: Completion<NativeCoapResponse>);
}
