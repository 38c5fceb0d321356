//! Transfer endpoint trait.
//!
//! `TransferEndpoint` is implemented by the host to bridge the queue to the
//! actual transport (HTTP, a test double, ...).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::progress::ProgressReporter;
use crate::types::{Payload, TransferReceipt};

/// Future returned by [`TransferEndpoint::transfer`].
pub type TransferFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransferReceipt, EndpointError>> + Send + 'a>>;

/// Accepts one payload at a time.
///
/// The executor aborts a transfer by dropping the returned future, so an
/// implementation must release its connection on drop (as `reqwest` and
/// `tokio` I/O do).
pub trait TransferEndpoint: Send + Sync {
    /// Sends `payload`, calling `progress.report(sent, total)` as bytes go
    /// out, and resolves once the remote side accepted or rejected it.
    fn transfer(&self, payload: Arc<Payload>, progress: ProgressReporter) -> TransferFuture<'_>;
}

/// Failure reported by an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a non-success status.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The request never completed (connection, TLS, timeout...).
    #[error("transport error: {0}")]
    Transport(String),
}

impl EndpointError {
    /// Human-readable reason to record on the task, if the endpoint gave one.
    pub fn reason(&self) -> Option<String> {
        let reason = match self {
            Self::Io(e) => e.to_string(),
            Self::Server { message, .. } => message.trim().to_string(),
            Self::Transport(message) => message.trim().to_string(),
        };
        (!reason.is_empty()).then_some(reason)
    }
}
