//! Client-side upload queue: admission, single-flight scheduling,
//! cancellation and retry.
//!
//! This crate holds the **state machine** of an upload session. It has no
//! transport dependency: the host provides a [`TransferEndpoint`]
//! implementation that actually moves bytes (see `shareline-http-transfer`).
//!
//! # Pipeline
//!
//! 1. **Admit**: payloads are checked against the [`AdmissionPolicy`]
//!    (queue capacity, then per-payload size) and become `queued` tasks
//! 2. **Schedule**: a single worker picks the earliest queued task
//! 3. **Transfer**: the executor streams it through the endpoint while
//!    mirroring progress into the [`TaskStore`]
//! 4. **Settle**: the task ends `done`, `error` or `canceled`; completion
//!    listeners fire for `done` only, and the worker moves on
//!
//! Failed tasks can be requeued with [`UploadQueue::retry`]; terminal tasks
//! are purged with [`UploadQueue::clear_finished`].

pub mod admission;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod progress;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod types;

pub use admission::{AdmissionPolicy, AdmissionRejection, AdmissionReport, RejectReason};
pub use endpoint::{EndpointError, TransferEndpoint, TransferFuture};
pub use error::QueueError;
pub use executor::{CompletionListeners, TransferExecutor, TransferOutcome};
pub use progress::{ProgressReporter, percent};
pub use queue::UploadQueue;
pub use scheduler::Scheduler;
pub use store::{TaskStore, Transition};
pub use types::{
    Payload, PayloadReader, PayloadSource, QueueEvent, TaskId, TaskSnapshot, TaskStatus,
    TransferReceipt,
};

/// Error message recorded when an endpoint fails without giving a reason.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Upload failed";

/// Capacity of the queue event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
