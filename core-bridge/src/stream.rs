//! Stream facade and handle-keyed stream operations.

use bridge_traits::NativeStream;
use core_runtime::{Handle, ResourceKind};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::adapter::Call;
use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Opening,
    Open,
    Closed,
}

impl StreamState {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Created => "created",
            StreamState::Opening => "opening",
            StreamState::Open => "open",
            StreamState::Closed => "closed",
        }
    }
}

pub struct StreamEntry {
    connection: Handle,
    native: Arc<dyn NativeStream>,
    state: Mutex<StreamState>,
}

impl StreamEntry {
    pub(crate) fn new(connection: Handle, native: Arc<dyn NativeStream>) -> Self {
        Self {
            connection,
            native,
            state: Mutex::new(StreamState::Created),
        }
    }

    pub fn connection(&self) -> Handle {
        self.connection
    }

    pub fn state(&self) -> StreamState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: StreamState) -> StreamState {
        std::mem::replace(&mut *self.lock_state(), state)
    }

    /// I/O is only allowed while open.
    fn require_open(&self, call: Call) -> Result<()> {
        match self.state() {
            StreamState::Open => Ok(()),
            StreamState::Closed => Err(BridgeError::StreamClosed {
                handle: call.handle,
            }),
            state => Err(BridgeError::InvalidState {
                kind: call.kind,
                handle: call.handle,
                operation: call.operation,
                state: state.as_str(),
            }),
        }
    }
}

fn call(handle: Handle, operation: &'static str) -> Call {
    Call::new(ResourceKind::Stream, handle, operation)
}

// ============================================================================
// Handle-keyed operations
// ============================================================================

impl BridgeContext {
    /// Open the stream on the device's `port`. A failed open can be retried.
    pub async fn stream_open(&self, handle: Handle, port: u32) -> Result<()> {
        let entry = self.registry.streams.resolve(handle)?;
        let call = call(handle, "open");
        {
            let mut state = entry.lock_state();
            if *state != StreamState::Created {
                return Err(BridgeError::InvalidState {
                    kind: call.kind,
                    handle,
                    operation: call.operation,
                    state: state.as_str(),
                });
            }
            *state = StreamState::Opening;
        }

        let native = Arc::clone(&entry.native);
        let result = self
            .adapter
            .callback(call, None, |done| native.open(port, done))
            .await;

        match result {
            Ok(_) => {
                entry.set_state(StreamState::Open);
                debug!(stream = %handle, port, "Stream open");
                Ok(())
            }
            Err(e) => {
                entry.set_state(StreamState::Created);
                Err(e)
            }
        }
    }

    /// Read whatever is available, waiting for at least one byte.
    pub async fn stream_read_some(&self, handle: Handle) -> Result<Vec<u8>> {
        let entry = self.registry.streams.resolve(handle)?;
        let call = call(handle, "read_some");
        entry.require_open(call)?;
        let native = Arc::clone(&entry.native);
        let bytes = self
            .adapter
            .callback(call, None, |done| native.read_some(done))
            .await?;
        Ok(bytes.unwrap_or_default())
    }

    /// Read exactly `length` bytes.
    pub async fn stream_read_all(&self, handle: Handle, length: usize) -> Result<Vec<u8>> {
        let entry = self.registry.streams.resolve(handle)?;
        let call = call(handle, "read_all");
        entry.require_open(call)?;
        let native = Arc::clone(&entry.native);
        let bytes = self
            .adapter
            .callback(call, None, |done| native.read_all(length, done))
            .await?;
        Ok(bytes.unwrap_or_default())
    }

    pub async fn stream_write(&self, handle: Handle, bytes: Vec<u8>) -> Result<()> {
        let entry = self.registry.streams.resolve(handle)?;
        let call = call(handle, "write");
        entry.require_open(call)?;
        let native = Arc::clone(&entry.native);
        self.adapter
            .callback(call, None, |done| native.write(bytes, done))
            .await
            .map(|_| ())
    }

    /// Close the write direction. Pending reads drain what the device still sends.
    ///
    /// Closing a stream that never opened, or that is already closed, only
    /// marks it closed.
    pub async fn stream_close(&self, handle: Handle) -> Result<()> {
        let entry = self.registry.streams.resolve(handle)?;
        let previous = entry.set_state(StreamState::Closed);
        if previous != StreamState::Open {
            return Ok(());
        }
        let native = Arc::clone(&entry.native);
        self.adapter
            .callback(call(handle, "close"), None, |done| native.stream_close(done))
            .await
            .map(|_| ())
    }

    /// Release the native stream and remove its handle. Idempotent.
    pub async fn stream_dispose(&self, handle: Handle) -> Result<()> {
        if let Some(entry) = self.registry.streams.remove(handle) {
            entry.set_state(StreamState::Closed);
            self.adapter
                .value(call(handle, "dispose"), || entry.native.close());
            debug!(stream = %handle, "Stream disposed");
        }
        Ok(())
    }

    pub fn stream_state(&self, handle: Handle) -> Result<StreamState> {
        Ok(self.registry.streams.resolve(handle)?.state())
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Host-facing byte stream over a connection.
#[derive(Clone)]
pub struct Stream {
    context: Arc<BridgeContext>,
    handle: Handle,
}

impl Stream {
    pub fn attach(context: Arc<BridgeContext>, handle: Handle) -> Self {
        Self { context, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> Result<StreamState> {
        self.context.stream_state(self.handle)
    }

    pub async fn open(&self, port: u32) -> Result<()> {
        self.context.stream_open(self.handle, port).await
    }

    pub async fn read_some(&self) -> Result<Vec<u8>> {
        self.context.stream_read_some(self.handle).await
    }

    pub async fn read_all(&self, length: usize) -> Result<Vec<u8>> {
        self.context.stream_read_all(self.handle, length).await
    }

    pub async fn write(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.context.stream_write(self.handle, bytes.into()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.context.stream_close(self.handle).await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.context.stream_dispose(self.handle).await
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("handle", &self.handle).finish()
    }
}
