//! CoAP exchanges served by the simulated device.

use bridge_traits::{Completion, ErrorCode, NativeCoap, NativeCoapResponse, NativeError, NativeResult};
use std::sync::{Arc, Mutex};

use crate::connection::ConnShared;
use crate::device::CoapRequest;
use crate::sdk::SdkShared;

pub struct LoopbackCoap {
    sdk: Arc<SdkShared>,
    connection: Arc<ConnShared>,
    method: String,
    path: String,
    request: Mutex<Option<(u16, Vec<u8>)>>,
}

impl LoopbackCoap {
    pub(crate) fn new(sdk: Arc<SdkShared>, connection: Arc<ConnShared>, method: String, path: String) -> Self {
        Self {
            sdk,
            connection,
            method,
            path,
            request: Mutex::new(None),
        }
    }
}

impl NativeCoap for LoopbackCoap {
    fn set_request_payload(&self, content_format: u16, payload: Vec<u8>) -> NativeResult<()> {
        if self.method == "GET" || self.method == "DELETE" {
            return Err(NativeError::new(
                ErrorCode::INVALID_ARGUMENT,
                format!("{} requests carry no payload", self.method),
            ));
        }
        *self.request.lock().unwrap_or_else(|e| e.into_inner()) = Some((content_format, payload));
        Ok(())
    }

    fn execute(&self, done: Completion<NativeCoapResponse>) {
        let device = match self.connection.connected_device() {
            Ok(device) => device,
            Err(e) => {
                self.sdk.complete(done, e.code, None);
                return;
            }
        };
        let (content_format, payload) = self
            .request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|(format, bytes)| (Some(format), bytes))
            .unwrap_or((None, Vec::new()));

        let reply = device.handle_coap(&CoapRequest {
            method: self.method.clone(),
            path: self.path.clone(),
            content_format,
            payload,
        });
        let response = NativeCoapResponse {
            status_code: reply.status_code,
            content_format: reply.content_format,
            payload: Some(reply.payload),
        };
        self.sdk.complete(done, ErrorCode::OK, Some(response));
    }
}
