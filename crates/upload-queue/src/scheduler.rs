//! Single-worker scheduler.
//!
//! One worker loop at most: it takes the earliest queued task, awaits its
//! terminal outcome, and repeats until nothing is queued. Triggering while
//! the worker runs is a no-op.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::executor::{TransferExecutor, TransferOutcome};
use crate::store::TaskStore;

/// Starts and guards the worker loop.
pub struct Scheduler {
    store: Arc<TaskStore>,
    executor: TransferExecutor,
    /// `true` while a worker loop is running.
    active: watch::Sender<bool>,
    runtime: Handle,
}

impl Scheduler {
    /// Creates a scheduler that spawns its worker on `runtime`.
    pub fn new(store: Arc<TaskStore>, executor: TransferExecutor, runtime: Handle) -> Self {
        let (active, _) = watch::channel(false);
        Self {
            store,
            executor,
            active,
            runtime,
        }
    }

    /// Starts the worker unless one is already running.
    ///
    /// Returns `true` if this call started it.
    pub fn trigger(self: &Arc<Self>) -> bool {
        if !self.try_acquire() {
            debug!("worker already active");
            return false;
        }

        debug!("worker started");
        let scheduler = Arc::clone(self);
        self.runtime.spawn(async move { scheduler.run().await });
        true
    }

    /// Returns `true` while a worker loop is running.
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Resolves once no worker loop is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// Sets the active flag if it was clear.
    fn try_acquire(&self) -> bool {
        self.active.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        })
    }

    /// Clears the active flag unless a task is queued.
    ///
    /// The queue is checked while the flag is locked, so a trigger racing
    /// with the release either sees the flag cleared and starts a worker,
    /// or its task is seen here and this worker keeps it.
    fn try_release(&self) -> bool {
        self.active.send_if_modified(|active| {
            if self.store.next_queued().is_some() {
                false
            } else {
                *active = false;
                true
            }
        })
    }

    async fn run(&self) {
        let mut guard = ActiveGuard::new(&self.active);
        loop {
            let Some(id) = self.store.next_queued() else {
                if !self.try_release() {
                    continue;
                }
                guard.disarm();
                debug!("worker idle");
                return;
            };

            match self.executor.execute(id).await {
                Ok(TransferOutcome::Success) => {}
                Ok(TransferOutcome::Failure(reason)) => {
                    debug!(task = %id, %reason, "continuing after failure");
                }
                Ok(TransferOutcome::Canceled) => {
                    debug!(task = %id, "continuing after cancel");
                }
                Err(e) => {
                    // Only reachable if the store changed under us; the next
                    // lookup re-reads it.
                    error!(task = %id, error = %e, "could not start upload");
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

/// Clears the active flag if the worker loop ends without going idle,
/// e.g. when its task panics or the runtime drops it.
struct ActiveGuard<'a> {
    active: &'a watch::Sender<bool>,
    armed: bool,
}

impl<'a> ActiveGuard<'a> {
    fn new(active: &'a watch::Sender<bool>) -> Self {
        Self {
            active,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.active.send_replace(false);
            warn!("worker stopped before the queue drained");
        }
    }
}
