//! Non-blocking bounded channels for steal requests (MPSC) and tasks (SPSC).
//!
//! Built on `crossbeam_channel::bounded`, used exclusively in try-send /
//! try-recv mode. Nothing here ever parks a thread: the scheduler's hot loop
//! must never block on a channel (see the worker run loop).

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};

/// Sending half of a request or task channel. Cloneable for MPSC request
/// inboxes (one clone handed to every worker that might steal-request this
/// worker); task-inbox senders are only ever held by a single owner at a
/// time by construction (the channel-recycling stack enforces this).
#[derive(Clone)]
pub struct ChanTx<T> {
    inner: Sender<T>,
}

/// Receiving half, owned exclusively by the worker that polls it.
pub struct ChanRx<T> {
    inner: Receiver<T>,
}

/// Allocate a fixed-capacity channel. `capacity` must be `>= 1`; a zero
/// capacity would make every send fail immediately in this rendezvous-free
/// design.
pub fn bounded_channel<T>(capacity: usize) -> (ChanTx<T>, ChanRx<T>) {
    debug_assert!(capacity >= 1);
    let (tx, rx) = bounded(capacity.max(1));
    (ChanTx { inner: tx }, ChanRx { inner: rx })
}

/// Allocate an unbounded channel. Reserved for the external task-injection
/// inbox, which sits outside the steal protocol's non-blocking contract and
/// must never reject a caller's `spawn`.
pub fn unbounded_channel<T>() -> (ChanTx<T>, ChanRx<T>) {
    let (tx, rx) = unbounded();
    (ChanTx { inner: tx }, ChanRx { inner: rx })
}

impl<T> ChanTx<T> {
    /// Non-blocking send. Returns the value back on failure (full or
    /// disconnected) so callers can retry or report `WorkerBlocked`.
    #[inline]
    pub fn try_send(&self, value: T) -> Result<(), T> {
        match self.inner.try_send(value) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(v)) | Err(TrySendError::Disconnected(v)) => Err(v),
        }
    }
}

impl<T> ChanRx<T> {
    /// Non-blocking receive.
    #[inline]
    pub fn try_recv(&self) -> Option<T> {
        match self.inner.try_recv() {
            Ok(v) => Some(v),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Number of messages currently queued, without consuming any.
    #[inline]
    pub fn peek(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
