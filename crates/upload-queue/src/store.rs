//! Ordered, in-memory task store.
//!
//! The store is the single source of truth for task state. Every mutation
//! goes through a method here and happens under one short-lived mutex, so a
//! read that follows a write always observes it. The lock is never held
//! across an `.await`.
//!
//! Status, error message and cancellation handle live together in
//! [`TaskState`], which makes "handle iff uploading" and "message iff error"
//! hold by construction.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::QueueError;
use crate::types::{Payload, QueueEvent, TaskId, TaskSnapshot, TaskStatus, TransferReceipt};

/// A requested status change.
#[derive(Debug, Clone)]
pub enum Transition {
    /// `queued → uploading`, attaching the cancellation handle.
    Start(CancellationToken),
    /// `uploading → done`.
    Complete(TransferReceipt),
    /// `uploading → error` with a message.
    Fail(String),
    /// `uploading → canceled`.
    Cancel,
    /// `error → queued`.
    Requeue,
}

impl Transition {
    fn action(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "be canceled",
            Self::Requeue => "be retried",
        }
    }
}

#[derive(Debug)]
enum TaskState {
    Queued,
    Uploading { cancel: CancellationToken },
    Done,
    Error { message: String },
    Canceled,
}

impl TaskState {
    fn status(&self) -> TaskStatus {
        match self {
            Self::Queued => TaskStatus::Queued,
            Self::Uploading { .. } => TaskStatus::Uploading,
            Self::Done => TaskStatus::Done,
            Self::Error { .. } => TaskStatus::Error,
            Self::Canceled => TaskStatus::Canceled,
        }
    }
}

#[derive(Debug)]
struct TaskRecord {
    id: TaskId,
    payload: Arc<Payload>,
    state: TaskState,
    progress: u8,
    attempts: u32,
    receipt: Option<TransferReceipt>,
    /// Stamped each time the task becomes queued; lower runs first.
    queued_seq: u64,
}

impl TaskRecord {
    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.payload.name().to_string(),
            size: self.payload.size(),
            status: self.state.status(),
            progress: self.progress,
            error: match &self.state {
                TaskState::Error { message } => Some(message.clone()),
                _ => None,
            },
            attempts: self.attempts,
            receipt: self.receipt.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tasks: Vec<TaskRecord>,
    next_seq: u64,
}

impl StoreInner {
    fn find(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn find_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn stamp(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn push(&mut self, payload: Arc<Payload>) -> TaskId {
        let id = TaskId::new();
        let queued_seq = self.stamp();
        self.tasks.push(TaskRecord {
            id,
            payload,
            state: TaskState::Queued,
            progress: 0,
            attempts: 0,
            receipt: None,
            queued_seq,
        });
        id
    }
}

/// Ordered collection of upload tasks, keyed by [`TaskId`].
#[derive(Debug, Default)]
pub struct TaskStore {
    inner: Mutex<StoreInner>,
    events: Option<mpsc::Sender<QueueEvent>>,
}

impl TaskStore {
    /// Creates an empty store that emits no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that reports every change on `events`.
    ///
    /// Events are sent with `try_send` while the store lock is held, so
    /// they arrive in mutation order. A full or closed channel drops them.
    pub fn with_events(events: mpsc::Sender<QueueEvent>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            events: Some(events),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    /// Appends a single queued task.
    pub fn append(&self, payload: Payload) -> TaskId {
        let payload = Arc::new(payload);
        let name = payload.name().to_string();
        let mut inner = self.lock();
        let id = inner.push(payload);
        self.emit(QueueEvent::Admitted { id, name });
        id
    }

    /// Appends the payloads chosen by `select`, atomically with respect to
    /// other mutations.
    ///
    /// `select` receives the current number of tasks and returns the
    /// payloads to append, in order. Returns the new task ids in the same
    /// order.
    pub fn append_with<F>(&self, select: F) -> Vec<TaskId>
    where
        F: FnOnce(usize) -> Vec<Payload>,
    {
        let mut inner = self.lock();
        let current = inner.tasks.len();
        select(current)
            .into_iter()
            .map(|payload| {
                let name = payload.name().to_string();
                let id = inner.push(Arc::new(payload));
                self.emit(QueueEvent::Admitted { id, name });
                id
            })
            .collect()
    }

    /// Returns a snapshot of one task.
    pub fn get(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.lock().find(id).map(TaskRecord::snapshot)
    }

    /// Returns the shared payload of a task.
    pub fn payload(&self, id: TaskId) -> Option<Arc<Payload>> {
        self.lock().find(id).map(|t| Arc::clone(&t.payload))
    }

    /// Returns the cancellation handle of an uploading task.
    pub fn cancel_handle(&self, id: TaskId) -> Result<CancellationToken, QueueError> {
        let inner = self.lock();
        let task = inner.find(id).ok_or(QueueError::TaskNotFound(id))?;
        match &task.state {
            TaskState::Uploading { cancel } => Ok(cancel.clone()),
            _ => Err(QueueError::NotUploading(id)),
        }
    }

    /// Applies a status transition.
    ///
    /// Only the edges of the task state machine are accepted; anything else
    /// returns [`QueueError::InvalidTransition`] and leaves the task as it
    /// was. Starting a task while another one is uploading returns
    /// [`QueueError::TransferInFlight`].
    pub fn transition(&self, id: TaskId, transition: Transition) -> Result<TaskStatus, QueueError> {
        let mut inner = self.lock();

        if matches!(transition, Transition::Start(_))
            && let Some(active) = inner
                .tasks
                .iter()
                .find(|t| t.id != id && matches!(t.state, TaskState::Uploading { .. }))
        {
            return Err(QueueError::TransferInFlight {
                requested: id,
                active: active.id,
            });
        }

        let seq = inner.next_seq;
        let task = inner.find_mut(id).ok_or(QueueError::TaskNotFound(id))?;
        let current = task.state.status();
        let action = transition.action();

        let mut stamped = false;
        match (current, transition) {
            (TaskStatus::Queued, Transition::Start(cancel)) => {
                task.state = TaskState::Uploading { cancel };
                task.progress = 0;
                task.attempts += 1;
            }
            (TaskStatus::Uploading, Transition::Complete(receipt)) => {
                task.state = TaskState::Done;
                task.progress = 100;
                task.receipt = Some(receipt);
            }
            (TaskStatus::Uploading, Transition::Fail(message)) => {
                task.state = TaskState::Error { message };
            }
            (TaskStatus::Uploading, Transition::Cancel) => {
                task.state = TaskState::Canceled;
            }
            (TaskStatus::Error, Transition::Requeue) => {
                task.state = TaskState::Queued;
                task.progress = 0;
                task.queued_seq = seq;
                stamped = true;
            }
            _ => {
                return Err(QueueError::InvalidTransition {
                    id,
                    status: current,
                    action,
                });
            }
        }

        let status = task.state.status();
        if stamped {
            inner.next_seq += 1;
        }
        debug!(task = %id, from = %current, to = %status, "task transition");
        self.emit(QueueEvent::StatusChanged { id, status });
        Ok(status)
    }

    /// Records upload progress for an uploading task.
    ///
    /// Ignored unless the task is uploading. Returns `true` if the stored
    /// percent changed.
    pub fn update_progress(&self, id: TaskId, percent: u8) -> bool {
        let percent = percent.min(100);
        let mut inner = self.lock();
        match inner.find_mut(id) {
            Some(task)
                if matches!(task.state, TaskState::Uploading { .. }) && task.progress != percent =>
            {
                task.progress = percent;
                self.emit(QueueEvent::Progress { id, percent });
                true
            }
            _ => false,
        }
    }

    /// Removes a terminal task.
    ///
    /// Queued and uploading tasks cannot be removed.
    pub fn remove(&self, id: TaskId) -> Result<TaskSnapshot, QueueError> {
        let mut inner = self.lock();
        let index = inner
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(QueueError::TaskNotFound(id))?;

        let status = inner.tasks[index].state.status();
        if !status.is_terminal() {
            return Err(QueueError::InvalidTransition {
                id,
                status,
                action: "be removed",
            });
        }
        let removed = inner.tasks.remove(index).snapshot();
        self.emit(QueueEvent::Removed { id });
        Ok(removed)
    }

    /// Removes every terminal task, keeping the rest in their relative
    /// order. Returns the removed ids.
    pub fn clear_finished(&self) -> Vec<TaskId> {
        let mut removed = Vec::new();
        self.lock().tasks.retain(|t| {
            let keep = !t.state.status().is_terminal();
            if !keep {
                self.emit(QueueEvent::Removed { id: t.id });
                removed.push(t.id);
            }
            keep
        });
        removed
    }

    /// Returns snapshots of the tasks whose status matches, in store order.
    pub fn list_by_status(&self, predicate: impl Fn(TaskStatus) -> bool) -> Vec<TaskSnapshot> {
        self.lock()
            .tasks
            .iter()
            .filter(|t| predicate(t.state.status()))
            .map(TaskRecord::snapshot)
            .collect()
    }

    /// Returns the first task, in store order, matching `predicate`.
    pub fn first_where(&self, predicate: impl Fn(&TaskSnapshot) -> bool) -> Option<TaskSnapshot> {
        self.lock()
            .tasks
            .iter()
            .map(TaskRecord::snapshot)
            .find(|s| predicate(s))
    }

    /// Returns the queued task that became queued first.
    ///
    /// Admission order decides among fresh tasks; a retried task queues
    /// behind everything already waiting.
    pub fn next_queued(&self) -> Option<TaskId> {
        self.lock()
            .tasks
            .iter()
            .filter(|t| matches!(t.state, TaskState::Queued))
            .min_by_key(|t| t.queued_seq)
            .map(|t| t.id)
    }

    /// Returns the id of the uploading task, if any.
    pub fn uploading(&self) -> Option<TaskId> {
        self.lock()
            .tasks
            .iter()
            .find(|t| matches!(t.state, TaskState::Uploading { .. }))
            .map(|t| t.id)
    }

    /// Counts tasks whose status matches.
    pub fn count_where(&self, predicate: impl Fn(TaskStatus) -> bool) -> usize {
        self.lock()
            .tasks
            .iter()
            .filter(|t| predicate(t.state.status()))
            .count()
    }

    /// Returns snapshots of all tasks in store order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.lock().tasks.iter().map(TaskRecord::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }
}
