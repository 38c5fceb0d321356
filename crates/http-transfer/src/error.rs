//! Error types for building an HTTP endpoint.

/// Errors produced while constructing an [`HttpEndpoint`](crate::HttpEndpoint).
///
/// Per-upload failures are reported through
/// [`EndpointError`](shareline_upload_queue::EndpointError) instead.
#[derive(Debug, thiserror::Error)]
pub enum HttpTransferError {
    #[error("invalid upload URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
