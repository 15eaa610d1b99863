//! # Async Call Adapter
//!
//! Turns every native calling convention into one `Result`-returning call.
//!
//! | Convention  | Native shape                         | Used for                          |
//! |-------------|--------------------------------------|-----------------------------------|
//! | `value`     | `fn() -> T`                          | `version`, `is_started`           |
//! | `fallible`  | `fn() -> NativeResult<T>`            | options, fingerprints, factories  |
//! | `blocking`  | `fn() -> NativeResult<T>`, may block | tunnel open, private key creation |
//! | `callback`  | `fn(Completion<T>)`                  | connect, stream I/O, CoAP execute |
//! | `optional`  | `fallible`, may be `NOT_SUPPORTED`   | direct candidates, channel codes  |
//!
//! Native failures are passed through [`crate::translate`]. A completion the
//! native side drops without calling settles as [`BridgeError::Abandoned`].

use bridge_traits::{Completion, ErrorCode, NativeConnection, NativeResult};
use core_runtime::{Handle, ResourceKind};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::translate::{translate, translate_code};

/// Identity of one bridge operation, used for tracing and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub kind: ResourceKind,
    pub handle: Handle,
    pub operation: &'static str,
}

impl Call {
    pub fn new(kind: ResourceKind, handle: Handle, operation: &'static str) -> Self {
        Self {
            kind,
            handle,
            operation,
        }
    }

    fn abandoned(&self) -> BridgeError {
        BridgeError::Abandoned {
            kind: self.kind,
            handle: self.handle,
            operation: self.operation,
        }
    }

    fn trace(&self) {
        debug!(
            kind = %self.kind,
            handle = %self.handle,
            operation = self.operation,
            "Invoking native operation"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallAdapter {
    strict_parity: bool,
}

impl CallAdapter {
    pub fn new(strict_parity: bool) -> Self {
        Self { strict_parity }
    }

    pub fn strict_parity(&self) -> bool {
        self.strict_parity
    }

    /// Call that cannot fail.
    pub fn value<T>(&self, call: Call, f: impl FnOnce() -> T) -> T {
        call.trace();
        f()
    }

    /// Synchronous call reporting a native error.
    pub fn fallible<T>(
        &self,
        call: Call,
        connection: Option<&dyn NativeConnection>,
        f: impl FnOnce() -> NativeResult<T>,
    ) -> Result<T> {
        call.trace();
        f().map_err(|e| translate(e, connection))
    }

    /// Synchronous call that may block, run on the blocking thread pool.
    pub async fn blocking<T, F>(&self, call: Call, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> NativeResult<T> + Send + 'static,
    {
        call.trace();
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result.map_err(|e| translate(e, None)),
            Err(e) => {
                warn!(
                    kind = %call.kind,
                    handle = %call.handle,
                    operation = call.operation,
                    error = %e,
                    "Blocking native operation did not finish"
                );
                Err(call.abandoned())
            }
        }
    }

    /// Callback-based call, resolved exactly once by the native completion.
    ///
    /// Resolves to the completion's value, which the native side may omit on
    /// success.
    pub async fn callback<T, F>(
        &self,
        call: Call,
        connection: Option<&dyn NativeConnection>,
        start: F,
    ) -> Result<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce(Completion<T>),
    {
        call.trace();
        let (tx, rx) = oneshot::channel();
        start(Box::new(move |code, value| {
            // The receiver is gone only if the host dropped the future.
            let _ = tx.send((code, value));
        }));

        match rx.await {
            Ok((code, value)) if code.is_ok() => Ok(value),
            Ok((code, _)) => {
                debug!(
                    kind = %call.kind,
                    handle = %call.handle,
                    operation = call.operation,
                    %code,
                    "Native operation failed"
                );
                Err(translate_code(code, connection))
            }
            Err(_) => {
                warn!(
                    kind = %call.kind,
                    handle = %call.handle,
                    operation = call.operation,
                    "Native completion dropped without settling"
                );
                Err(call.abandoned())
            }
        }
    }

    /// Call that some platform builds do not implement.
    ///
    /// `NOT_SUPPORTED` resolves to `fallback` unless strict parity is on.
    pub fn optional<T>(
        &self,
        call: Call,
        connection: Option<&dyn NativeConnection>,
        fallback: T,
        f: impl FnOnce() -> NativeResult<T>,
    ) -> Result<T> {
        call.trace();
        match f() {
            Ok(value) => Ok(value),
            Err(e) if e.code == ErrorCode::NOT_SUPPORTED && !self.strict_parity => {
                debug!(
                    operation = call.operation,
                    "Native operation not supported on this platform, using default"
                );
                Ok(fallback)
            }
            Err(e) => Err(translate(e, connection)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::NativeError;

    fn call() -> Call {
        Call::new(ResourceKind::Stream, Handle(2), "read_some")
    }

    #[tokio::test]
    async fn test_callback_success_with_value() {
        let adapter = CallAdapter::default();
        let value = adapter
            .callback(call(), None, |done: Completion<Vec<u8>>| {
                done(ErrorCode::OK, Some(vec![1u8, 2]))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_callback_completed_from_another_thread() {
        let adapter = CallAdapter::default();
        let result: Result<Option<()>> = adapter
            .callback(call(), None, |done: Completion<()>| {
                std::thread::spawn(move || done(ErrorCode::END_OF_FILE, None));
            })
            .await;
        assert_eq!(result.unwrap_err(), BridgeError::EndOfStream);
    }

    #[tokio::test]
    async fn test_dropped_completion_is_abandoned() {
        let adapter = CallAdapter::default();
        let result: Result<Option<()>> = adapter
            .callback(call(), None, |done: Completion<()>| drop(done))
            .await;
        assert_eq!(
            result.unwrap_err(),
            BridgeError::Abandoned {
                kind: ResourceKind::Stream,
                handle: Handle(2),
                operation: "read_some",
            }
        );
    }

    #[tokio::test]
    async fn test_blocking_runs_off_executor() {
        let adapter = CallAdapter::default();
        let port = adapter
            .blocking(call(), || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                Ok(8080u16)
            })
            .await
            .unwrap();
        assert_eq!(port, 8080);

        let err = adapter
            .blocking::<(), _>(call(), || Err(NativeError::from_code(ErrorCode::NOT_FOUND)))
            .await
            .unwrap_err();
        assert_eq!(err.native_code(), Some(ErrorCode::NOT_FOUND));
    }

    #[test]
    fn test_optional_respects_parity() {
        let unsupported = || Err::<ErrorCode, _>(NativeError::not_supported("local_channel"));

        let lenient = CallAdapter::new(false);
        assert_eq!(
            lenient.optional(call(), None, ErrorCode::NONE, unsupported),
            Ok(ErrorCode::NONE)
        );

        let strict = CallAdapter::new(true);
        let err = strict
            .optional(call(), None, ErrorCode::NONE, unsupported)
            .unwrap_err();
        assert_eq!(err.native_code(), Some(ErrorCode::NOT_SUPPORTED));
    }

    #[test]
    fn test_optional_other_errors_propagate() {
        let adapter = CallAdapter::default();
        let err = adapter
            .optional(call(), None, (), || {
                Err(NativeError::from_code(ErrorCode::INVALID_STATE))
            })
            .unwrap_err();
        assert_eq!(err.native_code(), Some(ErrorCode::INVALID_STATE));
    }
}
