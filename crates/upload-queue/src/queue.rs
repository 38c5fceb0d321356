//! Upload queue façade: admission, retry, cancel and cleanup over one
//! store and one worker.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::EVENT_CHANNEL_CAPACITY;
use crate::admission::{self, AdmissionPolicy, AdmissionReport};
use crate::endpoint::TransferEndpoint;
use crate::error::QueueError;
use crate::executor::{CompletionListeners, TransferExecutor};
use crate::scheduler::Scheduler;
use crate::store::{TaskStore, Transition};
use crate::types::{Payload, QueueEvent, TaskId, TaskSnapshot, TaskStatus};

struct QueueInner {
    store: Arc<TaskStore>,
    policy: AdmissionPolicy,
    scheduler: Arc<Scheduler>,
    listeners: Arc<CompletionListeners>,
    events_rx: Mutex<Option<mpsc::Receiver<QueueEvent>>>,
}

/// Handle to an upload session.
///
/// Clones share the same store and worker. All methods except
/// [`wait_idle`](Self::wait_idle) are synchronous and return immediately;
/// uploads run on a worker task that outlives any single caller.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl UploadQueue {
    /// Creates a queue whose worker runs on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; use
    /// [`with_runtime`](Self::with_runtime) to pass a handle explicitly.
    pub fn new(endpoint: Arc<dyn TransferEndpoint>, policy: AdmissionPolicy) -> Self {
        Self::with_runtime(endpoint, policy, Handle::current())
    }

    /// Creates a queue whose worker runs on `runtime`.
    pub fn with_runtime(
        endpoint: Arc<dyn TransferEndpoint>,
        policy: AdmissionPolicy,
        runtime: Handle,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let store = Arc::new(TaskStore::with_events(events_tx));
        let listeners = Arc::new(CompletionListeners::new());
        let executor =
            TransferExecutor::new(Arc::clone(&store), endpoint, Arc::clone(&listeners));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&store), executor, runtime));

        Self {
            inner: Arc::new(QueueInner {
                store,
                policy,
                scheduler,
                listeners,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<QueueEvent>> {
        self.inner
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Registers a listener invoked once per task that reaches `done`.
    pub fn on_complete(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.listeners.add(Box::new(listener));
    }

    /// Validates and enqueues `payloads`, then starts the worker if any
    /// task was admitted.
    pub fn admit(&self, payloads: impl IntoIterator<Item = Payload>) -> AdmissionReport {
        let report = admission::admit(
            &self.inner.store,
            &self.inner.policy,
            payloads.into_iter().collect(),
        );
        if !report.admitted.is_empty() {
            self.inner.scheduler.trigger();
        }
        report
    }

    /// Requeues a failed task and restarts the worker.
    ///
    /// The task keeps its id and payload. Only valid for tasks in `error`.
    pub fn retry(&self, id: TaskId) -> Result<(), QueueError> {
        self.inner.store.transition(id, Transition::Requeue)?;
        info!(task = %id, "retry requested");
        self.inner.scheduler.trigger();
        Ok(())
    }

    /// Requeues every failed task, in store order. Returns how many were
    /// requeued.
    pub fn retry_failed(&self) -> usize {
        let failed = self
            .inner
            .store
            .list_by_status(|status| status == TaskStatus::Error);

        let requeued = failed
            .iter()
            .filter(|task| {
                self.inner
                    .store
                    .transition(task.id, Transition::Requeue)
                    .is_ok()
            })
            .count();

        if requeued > 0 {
            info!(requeued, "retrying failed uploads");
            self.inner.scheduler.trigger();
        }
        requeued
    }

    /// Requests abort of an uploading task.
    ///
    /// The task settles as `canceled` once the worker observes the request,
    /// unless the endpoint already finished. Rejected for tasks that are not
    /// uploading.
    pub fn cancel(&self, id: TaskId) -> Result<(), QueueError> {
        let handle = self.inner.store.cancel_handle(id)?;
        handle.cancel();
        info!(task = %id, "cancel requested");
        Ok(())
    }

    /// Cancels the uploading task, if any, and returns its id.
    pub fn cancel_active(&self) -> Option<TaskId> {
        let id = self.inner.store.uploading()?;
        self.cancel(id).ok().map(|()| id)
    }

    /// Removes every `done`, `error` and `canceled` task. Returns how many
    /// were removed.
    pub fn clear_finished(&self) -> usize {
        let removed = self.inner.store.clear_finished().len();
        debug!(removed, "cleared finished uploads");
        removed
    }

    /// Removes one terminal task.
    pub fn remove(&self, id: TaskId) -> Result<TaskSnapshot, QueueError> {
        self.inner.store.remove(id)
    }

    /// Returns all tasks in admission order.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.inner.store.snapshot()
    }

    /// Returns one task.
    pub fn task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.inner.store.get(id)
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.inner.policy
    }

    /// Returns `true` while the worker loop is running.
    pub fn is_worker_active(&self) -> bool {
        self.inner.scheduler.is_active()
    }

    /// Resolves once the worker has drained every queued task.
    pub async fn wait_idle(&self) {
        self.inner.scheduler.wait_idle().await;
    }
}
