//! Echo and greeting streams.

use bridge_traits::{Completion, ErrorCode, NativeStream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::connection::ConnShared;
use crate::device::StreamService;
use crate::sdk::SdkShared;

#[derive(Default)]
struct EchoState {
    port: Option<u32>,
    buffer: VecDeque<u8>,
    echo: bool,
    write_closed: bool,
    peer_closed: bool,
    released: bool,
}

struct StreamShared {
    state: Mutex<EchoState>,
    changed: Notify,
}

impl EchoState {
    fn at_end(&self) -> bool {
        self.peer_closed || (self.echo && self.write_closed)
    }
}

impl StreamShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, EchoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

enum ReadPoll<T> {
    Ready(ErrorCode, Option<T>),
    Pending,
}

/// Stream served by the device's [`StreamService`](crate::StreamService) for its port.
///
/// Echo ports send every written byte back; once the write direction is closed,
/// reads drain the remaining bytes and then report `END_OF_FILE`. Greeting
/// ports deliver their bytes and then report `END_OF_FILE`.
pub struct LoopbackStream {
    sdk: Arc<SdkShared>,
    connection: Arc<ConnShared>,
    shared: Arc<StreamShared>,
}

impl LoopbackStream {
    pub(crate) fn new(sdk: Arc<SdkShared>, connection: Arc<ConnShared>) -> Self {
        Self {
            sdk,
            connection,
            shared: Arc::new(StreamShared {
                state: Mutex::new(EchoState::default()),
                changed: Notify::new(),
            }),
        }
    }

    /// Complete `done` once `poll` reports readiness.
    fn read_when<F>(&self, done: Completion<Vec<u8>>, mut poll: F)
    where
        F: FnMut(&mut EchoState) -> ReadPoll<Vec<u8>> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.sdk.runtime().spawn(async move {
            loop {
                let notified = shared.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let outcome = {
                    let mut state = shared.lock();
                    poll(&mut *state)
                };
                if let ReadPoll::Ready(code, value) = outcome {
                    done(code, value);
                    return;
                }
                notified.await;
            }
        });
    }
}

fn readable(state: &EchoState) -> Result<(), ErrorCode> {
    if state.released {
        return Err(ErrorCode::ABORTED);
    }
    if state.port.is_none() {
        return Err(ErrorCode::INVALID_STATE);
    }
    Ok(())
}

impl NativeStream for LoopbackStream {
    fn open(&self, stream_port: u32, done: Completion<()>) {
        let code = match self.connection.connected_device() {
            Err(e) => e.code,
            Ok(device) => match device.stream_service(stream_port) {
                None => ErrorCode::NOT_FOUND,
                Some(service) => {
                    let mut state = self.shared.lock();
                    if state.port.is_some() || state.released {
                        ErrorCode::INVALID_STATE
                    } else {
                        state.port = Some(stream_port);
                        match service {
                            StreamService::Echo => state.echo = true,
                            StreamService::Greeting(bytes) => {
                                state.buffer.extend(bytes.iter().copied());
                                state.peer_closed = true;
                            }
                        }
                        ErrorCode::OK
                    }
                }
            },
        };
        self.sdk.complete(done, code, None);
    }

    fn read_some(&self, done: Completion<Vec<u8>>) {
        self.read_when(done, |state| {
            if let Err(code) = readable(state) {
                return ReadPoll::Ready(code, None);
            }
            if !state.buffer.is_empty() {
                let bytes: Vec<u8> = state.buffer.drain(..).collect();
                return ReadPoll::Ready(ErrorCode::OK, Some(bytes));
            }
            if state.at_end() {
                return ReadPoll::Ready(ErrorCode::END_OF_FILE, None);
            }
            ReadPoll::Pending
        });
    }

    fn read_all(&self, length: usize, done: Completion<Vec<u8>>) {
        self.read_when(done, move |state| {
            if let Err(code) = readable(state) {
                return ReadPoll::Ready(code, None);
            }
            if state.buffer.len() >= length {
                let bytes: Vec<u8> = state.buffer.drain(..length).collect();
                return ReadPoll::Ready(ErrorCode::OK, Some(bytes));
            }
            if state.at_end() {
                return ReadPoll::Ready(ErrorCode::END_OF_FILE, None);
            }
            ReadPoll::Pending
        });
    }

    fn write(&self, bytes: Vec<u8>, done: Completion<()>) {
        let code = {
            let mut state = self.shared.lock();
            match readable(&state) {
                Err(code) => code,
                Ok(()) if state.write_closed => ErrorCode::CLOSED,
                Ok(()) => {
                    if state.echo {
                        state.buffer.extend(bytes);
                    }
                    ErrorCode::OK
                }
            }
        };
        self.shared.changed.notify_waiters();
        self.sdk.complete(done, code, None);
    }

    fn stream_close(&self, done: Completion<()>) {
        let code = {
            let mut state = self.shared.lock();
            match readable(&state) {
                Err(code) => code,
                Ok(()) => {
                    state.write_closed = true;
                    ErrorCode::OK
                }
            }
        };
        self.shared.changed.notify_waiters();
        self.sdk.complete(done, code, None);
    }

    fn close(&self) {
        self.shared.lock().released = true;
        self.shared.changed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LoopbackDevice, LoopbackSdk};
    use bridge_traits::{ClientContext, NativeConnection, NativeSdk};
    use tokio::sync::oneshot;

    async fn settle<T: Send + 'static>(start: impl FnOnce(Completion<T>)) -> (ErrorCode, Option<T>) {
        let (tx, rx) = oneshot::channel();
        start(Box::new(move |code, value| {
            tx.send((code, value)).ok();
        }));
        rx.await.unwrap()
    }

    async fn connected() -> Arc<dyn NativeConnection> {
        let sdk = LoopbackSdk::current().unwrap();
        sdk.add_device(
            LoopbackDevice::builder("pr", "de")
                .echo_stream_port(655)
                .greeting_stream_port(656, b"welcome".to_vec())
                .build(),
        );
        let client = sdk.create_client(&ClientContext::default()).unwrap();
        let conn = client.create_connection().unwrap();
        conn.update_options(r#"{"ProductId":"pr","DeviceId":"de","PrivateKey":"k"}"#)
            .unwrap();
        let (code, _) = settle(|done| conn.connect(done)).await;
        assert_eq!(code, ErrorCode::OK);
        conn
    }

    #[tokio::test]
    async fn test_echo_then_end_of_file() {
        let conn = connected().await;
        let stream = conn.create_stream().unwrap();

        assert_eq!(settle(|d| stream.open(655, d)).await.0, ErrorCode::OK);
        assert_eq!(settle(|d| stream.write(b"hello".to_vec(), d)).await.0, ErrorCode::OK);
        assert_eq!(
            settle(|d| stream.read_all(3, d)).await,
            (ErrorCode::OK, Some(b"hel".to_vec()))
        );

        assert_eq!(settle(|d| stream.stream_close(d)).await.0, ErrorCode::OK);
        assert_eq!(
            settle(|d| stream.read_some(d)).await,
            (ErrorCode::OK, Some(b"lo".to_vec()))
        );
        assert_eq!(settle(|d| stream.read_some(d)).await.0, ErrorCode::END_OF_FILE);
    }

    #[tokio::test]
    async fn test_pending_read_wakes_on_write() {
        let conn = connected().await;
        let stream = conn.create_stream().unwrap();
        settle(|d| stream.open(655, d)).await;

        let (tx, rx) = oneshot::channel();
        stream.read_some(Box::new(move |code, value| {
            tx.send((code, value)).ok();
        }));
        settle(|d| stream.write(vec![7, 8], d)).await;

        assert_eq!(rx.await.unwrap(), (ErrorCode::OK, Some(vec![7, 8])));
    }

    #[tokio::test]
    async fn test_greeting_port_ends_after_greeting() {
        let conn = connected().await;
        let stream = conn.create_stream().unwrap();
        settle(|d| stream.open(656, d)).await;

        assert_eq!(settle(|d| stream.write(b"ignored".to_vec(), d)).await.0, ErrorCode::OK);
        assert_eq!(
            settle(|d| stream.read_some(d)).await,
            (ErrorCode::OK, Some(b"welcome".to_vec()))
        );
        assert_eq!(settle(|d| stream.read_all(4, d)).await.0, ErrorCode::END_OF_FILE);
    }

    #[tokio::test]
    async fn test_open_unknown_port() {
        let conn = connected().await;
        let stream = conn.create_stream().unwrap();
        assert_eq!(settle(|d| stream.open(1, d)).await.0, ErrorCode::NOT_FOUND);
    }
}
