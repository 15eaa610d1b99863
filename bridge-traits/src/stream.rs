//! Stream Abstraction
//!
//! Full-duplex byte channel multiplexed over a connection. The SDK serializes
//! operations on a single stream: a read issued after a write completes
//! observes that write's effect on the peer.

use crate::callback::Completion;

pub trait NativeStream: Send + Sync {
    /// Open the stream towards the given device-side stream port.
    fn open(&self, stream_port: u32, done: Completion<()>);

    /// Read whatever is available (at least one byte).
    ///
    /// Completes with [`ErrorCode::END_OF_FILE`](crate::ErrorCode::END_OF_FILE)
    /// once the peer has closed its write direction.
    fn read_some(&self, done: Completion<Vec<u8>>);

    /// Read exactly `length` bytes.
    fn read_all(&self, length: usize, done: Completion<Vec<u8>>);

    fn write(&self, bytes: Vec<u8>, done: Completion<()>);

    /// Close the write direction gracefully.
    fn stream_close(&self, done: Completion<()>);

    /// Release the native stream object.
    fn close(&self);
}
