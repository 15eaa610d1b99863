//! One-shot CoAP exchanges.
//!
//! An exchange is built with a method and path, optionally given a request
//! payload, and executed once. Its handle is removed as soon as `execute`
//! settles, whether the exchange succeeded or failed.

use bridge_traits::{ErrorCode, NativeCoap, NativeCoapResponse};
use core_runtime::{Handle, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::adapter::Call;
use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};
use crate::registry::HandleTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoapMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl CoapMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CoapMethod::Get => "GET",
            CoapMethod::Post => "POST",
            CoapMethod::Put => "PUT",
            CoapMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for CoapMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoapMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(CoapMethod::Get),
            "POST" => Ok(CoapMethod::Post),
            "PUT" => Ok(CoapMethod::Put),
            "DELETE" => Ok(CoapMethod::Delete),
            _ => Err(BridgeError::InvalidArgument(format!(
                "Unsupported CoAP method '{}'",
                s
            ))),
        }
    }
}

/// Registered CoAP content formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoapContentFormat {
    TextPlainUtf8,
    LinkFormat,
    Xml,
    OctetStream,
    Json,
    Cbor,
}

impl CoapContentFormat {
    pub fn code(self) -> u16 {
        match self {
            CoapContentFormat::TextPlainUtf8 => 0,
            CoapContentFormat::LinkFormat => 40,
            CoapContentFormat::Xml => 41,
            CoapContentFormat::OctetStream => 42,
            CoapContentFormat::Json => 50,
            CoapContentFormat::Cbor => 60,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(CoapContentFormat::TextPlainUtf8),
            40 => Some(CoapContentFormat::LinkFormat),
            41 => Some(CoapContentFormat::Xml),
            42 => Some(CoapContentFormat::OctetStream),
            50 => Some(CoapContentFormat::Json),
            60 => Some(CoapContentFormat::Cbor),
            _ => None,
        }
    }
}

impl From<CoapContentFormat> for u16 {
    fn from(format: CoapContentFormat) -> Self {
        format.code()
    }
}

/// Result of an executed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapResponse {
    /// CoAP status as `class * 100 + detail`, e.g. `205` for 2.05 Content.
    pub status_code: u16,
    pub content_format: Option<u16>,
    /// Present only when the device sent a non-empty body.
    pub payload: Option<Vec<u8>>,
}

impl CoapResponse {
    pub fn format(&self) -> Option<CoapContentFormat> {
        self.content_format.and_then(CoapContentFormat::from_code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

impl From<NativeCoapResponse> for CoapResponse {
    fn from(native: NativeCoapResponse) -> Self {
        Self {
            status_code: native.status_code,
            content_format: native.content_format,
            payload: native.payload.filter(|body| !body.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapState {
    Built,
    Executing,
    Completed,
    Failed,
}

impl CoapState {
    pub fn as_str(self) -> &'static str {
        match self {
            CoapState::Built => "built",
            CoapState::Executing => "executing",
            CoapState::Completed => "completed",
            CoapState::Failed => "failed",
        }
    }
}

pub struct CoapEntry {
    method: CoapMethod,
    path: String,
    native: Arc<dyn NativeCoap>,
    state: Mutex<CoapState>,
}

impl CoapEntry {
    pub(crate) fn new(method: CoapMethod, path: String, native: Arc<dyn NativeCoap>) -> Self {
        Self {
            method,
            path,
            native,
            state: Mutex::new(CoapState::Built),
        }
    }

    pub fn method(&self) -> CoapMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> CoapState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, CoapState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_built(&self, call: Call) -> Result<()> {
        let state = self.state();
        if state != CoapState::Built {
            return Err(BridgeError::InvalidState {
                kind: call.kind,
                handle: call.handle,
                operation: call.operation,
                state: state.as_str(),
            });
        }
        Ok(())
    }
}

fn call(handle: Handle, operation: &'static str) -> Call {
    Call::new(ResourceKind::Coap, handle, operation)
}

/// Retires an executing exchange when dropped, including when the host drops
/// the `execute` future before the native side settles.
struct Execution<'a> {
    table: &'a HandleTable<CoapEntry>,
    entry: Arc<CoapEntry>,
    handle: Handle,
}

impl Drop for Execution<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.entry.lock_state();
            if *state == CoapState::Executing {
                *state = CoapState::Failed;
            }
        }
        self.table.remove(self.handle);
    }
}

// ============================================================================
// Handle-keyed operations
// ============================================================================

impl BridgeContext {
    pub async fn coap_set_request_payload(
        &self,
        handle: Handle,
        content_format: u16,
        payload: Vec<u8>,
    ) -> Result<()> {
        let entry = self.registry.coaps.resolve(handle)?;
        let call = call(handle, "set_request_payload");
        entry.require_built(call)?;
        self.adapter.fallible(call, None, || {
            entry.native.set_request_payload(content_format, payload)
        })
    }

    /// Execute the exchange. The handle is gone once this returns.
    pub async fn coap_execute(&self, handle: Handle) -> Result<CoapResponse> {
        let entry = self.registry.coaps.resolve(handle)?;
        let call = call(handle, "execute");
        {
            let mut state = entry.lock_state();
            if *state != CoapState::Built {
                return Err(BridgeError::InvalidState {
                    kind: call.kind,
                    handle,
                    operation: call.operation,
                    state: state.as_str(),
                });
            }
            *state = CoapState::Executing;
        }
        let _execution = Execution {
            table: &self.registry.coaps,
            entry: Arc::clone(&entry),
            handle,
        };

        let native = Arc::clone(&entry.native);
        let result = self
            .adapter
            .callback(call, None, |done| native.execute(done))
            .await
            .and_then(|response| {
                response.map(CoapResponse::from).ok_or_else(|| {
                    BridgeError::NativeOperationFailed {
                        code: ErrorCode::BAD_RESPONSE,
                        description: "CoAP exchange completed without a response".to_string(),
                    }
                })
            });

        *entry.lock_state() = if result.is_ok() {
            CoapState::Completed
        } else {
            CoapState::Failed
        };

        if let Ok(response) = &result {
            debug!(
                coap = %handle,
                method = %entry.method,
                path = %entry.path,
                status = response.status_code,
                "CoAP exchange completed"
            );
        }
        result
    }

    /// Remove the exchange without executing it. Idempotent.
    pub async fn coap_dispose(&self, handle: Handle) -> Result<()> {
        self.registry.coaps.remove(handle);
        Ok(())
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Host-facing CoAP exchange.
#[derive(Clone)]
pub struct Coap {
    context: Arc<BridgeContext>,
    handle: Handle,
}

impl Coap {
    pub fn attach(context: Arc<BridgeContext>, handle: Handle) -> Self {
        Self { context, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub async fn set_request_payload(
        &self,
        content_format: impl Into<u16>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.context
            .coap_set_request_payload(self.handle, content_format.into(), payload.into())
            .await
    }

    pub async fn execute(&self) -> Result<CoapResponse> {
        self.context.coap_execute(self.handle).await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.context.coap_dispose(self.handle).await
    }
}

impl fmt::Debug for Coap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coap").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockCoap, MockSdk};
    use bridge_traits::{Completion, NativeSdk};
    use core_runtime::config::BridgeConfig;

    fn exchange(native: MockCoap) -> Coap {
        let sdk: Arc<dyn NativeSdk> = Arc::new(MockSdk::new());
        let context = BridgeContext::shared(&BridgeConfig::builder().sdk(sdk).build().unwrap());
        let handle = context.allocate(ResourceKind::Coap);
        context
            .registry()
            .coaps
            .register(
                handle,
                Arc::new(CoapEntry::new(CoapMethod::Get, "/info".into(), Arc::new(native))),
            )
            .unwrap();
        Coap::attach(context, handle)
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<CoapMethod>().unwrap(), CoapMethod::Get);
        assert_eq!("DELETE".parse::<CoapMethod>().unwrap(), CoapMethod::Delete);
        assert_eq!(
            "FETCH".parse::<CoapMethod>().unwrap_err().code(),
            "INVALID_ARGUMENT"
        );
    }

    #[test]
    fn test_content_formats() {
        assert_eq!(CoapContentFormat::Cbor.code(), 60);
        assert_eq!(
            CoapContentFormat::from_code(40),
            Some(CoapContentFormat::LinkFormat)
        );
        assert_eq!(CoapContentFormat::from_code(11542), None);
    }

    #[test]
    fn test_empty_body_has_no_payload() {
        let response = CoapResponse::from(NativeCoapResponse {
            status_code: 404,
            content_format: None,
            payload: Some(Vec::new()),
        });
        assert_eq!(response.payload, None);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_handle_removed_after_success() {
        let mut native = MockCoap::new();
        native
            .expect_execute()
            .times(1)
            .returning(|done: Completion<NativeCoapResponse>| {
                done(
                    ErrorCode::OK,
                    Some(NativeCoapResponse {
                        status_code: 205,
                        content_format: Some(50),
                        payload: Some(b"{}".to_vec()),
                    }),
                )
            });

        let coap = exchange(native);
        let response = coap.execute().await.unwrap();
        assert_eq!(response.status_code, 205);
        assert_eq!(response.format(), Some(CoapContentFormat::Json));
        assert_eq!(response.payload.as_deref(), Some(&b"{}"[..]));

        assert!(coap.execute().await.unwrap_err().is_invalid_handle());
    }

    #[tokio::test]
    async fn test_handle_removed_when_execute_is_dropped() {
        let pending: Arc<Mutex<Option<Completion<NativeCoapResponse>>>> =
            Arc::new(Mutex::new(None));
        let slot = Arc::clone(&pending);
        let mut native = MockCoap::new();
        native
            .expect_execute()
            .times(1)
            .returning(move |done: Completion<NativeCoapResponse>| {
                *slot.lock().unwrap() = Some(done);
            });

        let coap = exchange(native);
        let entry = coap.context.registry().coaps.resolve(coap.handle()).unwrap();
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(20), coap.execute()).await;
        assert!(timed_out.is_err());

        assert!(!coap.context.registry().coaps.contains(coap.handle()));
        assert_eq!(entry.state(), CoapState::Failed);

        // A late completion has nobody left to deliver to.
        let done = pending.lock().unwrap().take().unwrap();
        done(ErrorCode::OK, None);
        assert!(coap.execute().await.unwrap_err().is_invalid_handle());
    }

    #[tokio::test]
    async fn test_handle_removed_after_failure() {
        let mut native = MockCoap::new();
        native
            .expect_execute()
            .returning(|done: Completion<NativeCoapResponse>| done(ErrorCode::TIMEOUT, None));

        let coap = exchange(native);
        let err = coap.execute().await.unwrap_err();
        assert_eq!(err.native_code(), Some(ErrorCode::TIMEOUT));
        assert!(coap
            .set_request_payload(CoapContentFormat::Json, b"{}".to_vec())
            .await
            .unwrap_err()
            .is_invalid_handle());
    }

    #[tokio::test]
    async fn test_payload_forwarded_while_built() {
        let mut native = MockCoap::new();
        native
            .expect_set_request_payload()
            .withf(|format, payload| *format == 42 && payload.as_slice() == [1, 2, 3])
            .times(1)
            .returning(|_, _| Ok(()));

        let coap = exchange(native);
        coap.set_request_payload(CoapContentFormat::OctetStream, vec![1, 2, 3])
            .await
            .unwrap();
    }
}
