//! Readiness Barrier
//!
//! Counts in-flight pipeline and update work and fires one-shot `ready` waiters when the
//! count drops to zero.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

type Waiter = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct BarrierState {
    pending: usize,
    waiters: Vec<Waiter>,
}

/// Pending-operation counter with one-shot waiters.
#[derive(Default)]
pub struct ReadyBarrier {
    state: Mutex<BarrierState>,
}

impl ReadyBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one operation as started. The operation ends when the guard drops.
    pub fn begin(self: &Arc<Self>) -> PendingGuard {
        self.state.lock().pending += 1;
        PendingGuard {
            barrier: Arc::clone(self),
        }
    }

    /// Runs `waiter` once nothing is pending: immediately if that is already the case.
    pub fn on_ready<F>(&self, waiter: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.pending == 0 {
            drop(state);
            waiter();
        } else {
            state.waiters.push(Box::new(waiter));
        }
    }

    /// Resolves once nothing is pending.
    pub async fn ready(&self) {
        let (tx, rx) = oneshot::channel();
        self.on_ready(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().pending == 0
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    fn end(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.pending = state.pending.saturating_sub(1);
            if state.pending == 0 {
                std::mem::take(&mut state.waiters)
            } else {
                Vec::new()
            }
        };
        for waiter in waiters {
            waiter();
        }
    }
}

impl std::fmt::Debug for ReadyBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReadyBarrier")
            .field("pending", &state.pending)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

/// Keeps the barrier from firing while alive.
#[must_use]
pub struct PendingGuard {
    barrier: Arc<ReadyBarrier>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.barrier.end();
    }
}
