//! Queue error types.

use crate::types::{TaskId, TaskStatus};

/// Errors produced by queue operations on individual tasks.
///
/// Transfer failures are not represented here: they are absorbed into the
/// task's `error` state and never surface as a `QueueError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {id} cannot {action} while {status}")]
    InvalidTransition {
        id: TaskId,
        status: TaskStatus,
        action: &'static str,
    },

    #[error("task {0} is not uploading")]
    NotUploading(TaskId),

    #[error("task {requested} cannot start: {active} is already uploading")]
    TransferInFlight { requested: TaskId, active: TaskId },
}
