//! Work-queue bridge between the completion context and the drain worker
//!
//! The completion context must never block, so it only *schedules* work: a
//! single-slot channel carries a wake token to the worker thread. Scheduling
//! while a token is already queued is a no-op, which coalesces bursts of
//! completions into one worker run. A token is consumed before the worker
//! starts draining, so anything queued after that point schedules a new run
//! and no wakeup is lost.

use async_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

/// Handle for the completion context (never blocks)
#[derive(Clone)]
pub struct WorkScheduler {
    tx: Sender<()>,
}

impl WorkScheduler {
    /// Request a worker run
    ///
    /// Returns `true` if a new run was queued, `false` if one was already
    /// pending or the worker has shut down.
    pub fn schedule(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// Stop the worker once any queued run has been delivered
    pub fn shutdown(&self) {
        self.tx.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle for the worker thread (blocking)
pub struct WorkReceiver {
    rx: Receiver<()>,
}

impl WorkReceiver {
    /// Block until a run is scheduled
    ///
    /// Fails once the scheduler has been shut down and no run is pending.
    pub fn wait(&self) -> crate::Result<()> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Check for a scheduled run without blocking
    pub fn try_take(&self) -> crate::Result<bool> {
        match self.rx.try_recv() {
            Ok(()) => Ok(true),
            Err(TryRecvError::Empty) => Ok(false),
            Err(e @ TryRecvError::Closed) => Err(crate::Error::Channel(e.to_string())),
        }
    }
}

/// Create the work queue for one link
///
/// Returns (WorkScheduler for the completion context, WorkReceiver for the worker)
pub fn create_work_queue() -> (WorkScheduler, WorkReceiver) {
    let (tx, rx) = bounded(1);
    (WorkScheduler { tx }, WorkReceiver { rx })
}
