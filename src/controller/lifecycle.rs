//! Async lifecycle harness (C9). `launch_async` is the only way background
//! work gets spawned on the controller; `close` waits for every such task
//! to finish before returning.
//!
//! The increment-before-cancellation-check ordering is load-bearing: if the
//! check ran first, a task could observe "not yet cancelled", then `close`
//! could observe a zero pending-count and return, racing the task's spawn.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{AfasError, Result};

pub struct Lifecycle {
    cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// Decrements the pending-task counter on drop, including on panic, and
/// wakes `close` if it brought the count to zero.
struct PendingGuard {
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawns `task` as a background tokio task, tracked so `close` can
    /// wait for it. Returns `Cancelled` without spawning if `close` has
    /// already begun.
    pub fn launch_async<F, Fut>(&self, task: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);

        if self.cancel.is_cancelled() {
            // Mirror the decrement a normal task completion would perform;
            // no task was actually spawned.
            if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.idle.notify_waiters();
            }
            return Err(AfasError::Cancelled);
        }

        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            idle: Arc::clone(&self.idle),
        };
        let token = self.cancel.clone();

        tokio::spawn(async move {
            let _guard = guard;
            task(token).await;
        });

        Ok(())
    }

    /// Cancels the shared token and waits for every task launched via
    /// `launch_async` to finish. Idempotent: a second call observes zero
    /// pending tasks immediately.
    pub async fn close(&self) {
        self.cancel.cancel();
        loop {
            // Register interest in the next notification *before* checking
            // the counter: if we checked first, a task could drop its guard
            // and call `notify_waiters` in the gap between the check and
            // the `notified()` registration, and that wakeup would be lost
            // forever since `notify_waiters` only wakes already-registered
            // waiters.
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending.load(Ordering::Acquire) == 0 {
                break;
            }

            notified.await;
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
