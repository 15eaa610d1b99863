//! Callback shapes used by the native SDK.

use crate::error::ErrorCode;

/// Completion callback for a fire-and-settle native operation.
///
/// The SDK invokes it exactly once, from any thread, with a status code and
/// an optional value. `Some(value)` is only meaningful when the code is
/// [`ErrorCode::OK`]. Dropping a completion without invoking it is allowed
/// (e.g. when the owning object is released mid-flight); the bridge reports
/// that as an abandoned operation.
pub type Completion<T> = Box<dyn FnOnce(ErrorCode, Option<T>) + Send + 'static>;

/// Opaque token identifying a listener registered with a native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(pub u64);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_completion_crosses_threads() {
        let (tx, rx) = mpsc::channel();
        let done: Completion<Vec<u8>> = Box::new(move |code, value| {
            tx.send((code, value)).ok();
        });

        std::thread::spawn(move || done(ErrorCode::OK, Some(vec![1, 2, 3])))
            .join()
            .unwrap();

        assert_eq!(rx.recv().unwrap(), (ErrorCode::OK, Some(vec![1, 2, 3])));
    }
}
