//! Transfer executor: drives one task through a single upload attempt.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::DEFAULT_FAILURE_MESSAGE;
use crate::endpoint::{EndpointError, TransferEndpoint};
use crate::error::QueueError;
use crate::progress::ProgressReporter;
use crate::store::{TaskStore, Transition};
use crate::types::TaskId;

/// Result of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failure(String),
    Canceled,
}

/// Callback invoked once per task that reaches `done`.
pub type CompletionListener = Box<dyn Fn() + Send + Sync>;

/// Registered completion listeners.
#[derive(Default)]
pub struct CompletionListeners {
    listeners: RwLock<Vec<CompletionListener>>,
}

impl CompletionListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add(&self, listener: CompletionListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Invokes every listener once.
    ///
    /// A panicking listener is logged and skipped; the others still run.
    pub fn notify(&self) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for (index, listener) in listeners.iter().enumerate() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                warn!(listener = index, "completion listener panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs upload attempts against an endpoint and records the results in
/// the store.
pub struct TransferExecutor {
    store: Arc<TaskStore>,
    endpoint: Arc<dyn TransferEndpoint>,
    listeners: Arc<CompletionListeners>,
}

impl TransferExecutor {
    pub fn new(
        store: Arc<TaskStore>,
        endpoint: Arc<dyn TransferEndpoint>,
        listeners: Arc<CompletionListeners>,
    ) -> Self {
        Self {
            store,
            endpoint,
            listeners,
        }
    }

    /// Uploads queued task `id` once and settles it.
    ///
    /// The task goes `queued → uploading` with a fresh cancellation handle
    /// and then ends `done`, `error` or `canceled`. The endpoint future is
    /// raced against the handle; an endpoint result that is ready wins over
    /// a simultaneous cancel, and a cancel drops the endpoint future, which
    /// aborts the transfer. Transfer failures are recorded on the task and
    /// returned as [`TransferOutcome::Failure`], never as `Err`.
    ///
    /// Returns `Err` only if the task cannot be started (unknown, not
    /// queued, or another task is uploading).
    pub async fn execute(&self, id: TaskId) -> Result<TransferOutcome, QueueError> {
        let payload = self.store.payload(id).ok_or(QueueError::TaskNotFound(id))?;
        let cancel = CancellationToken::new();
        self.store.transition(id, Transition::Start(cancel.clone()))?;

        let span = info_span!("upload", task = %id, name = %payload.name());
        async move {
            info!(size = payload.size(), "upload started");

            let progress = ProgressReporter::for_task(Arc::clone(&self.store), id);
            let sent = Arc::clone(&payload);
            // The call itself is inside the guard: an endpoint may panic
            // before it hands back a future.
            let transfer =
                AssertUnwindSafe(async move { self.endpoint.transfer(sent, progress).await })
                    .catch_unwind();

            let result = tokio::select! {
                biased;
                result = transfer => Some(result.unwrap_or_else(|_| {
                    Err(EndpointError::Transport("endpoint panicked".into()))
                })),
                _ = cancel.cancelled() => None,
            };

            let outcome = match result {
                Some(Ok(receipt)) => {
                    self.store.transition(id, Transition::Complete(receipt))?;
                    info!("upload done");
                    TransferOutcome::Success
                }
                // The endpoint may notice the abort itself and report it as
                // an error; that is still a cancellation.
                Some(Err(e)) if cancel.is_cancelled() => {
                    debug!(error = %e, "endpoint error after cancel");
                    self.store.transition(id, Transition::Cancel)?;
                    info!("upload canceled");
                    TransferOutcome::Canceled
                }
                Some(Err(e)) => {
                    let reason = e
                        .reason()
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                    warn!(error = %e, "upload failed");
                    self.store.transition(id, Transition::Fail(reason.clone()))?;
                    TransferOutcome::Failure(reason)
                }
                None => {
                    self.store.transition(id, Transition::Cancel)?;
                    info!("upload canceled");
                    TransferOutcome::Canceled
                }
            };

            if outcome == TransferOutcome::Success {
                self.listeners.notify();
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}
