//! Multipart upload endpoint over `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode, Url};
use serde::Deserialize;
use shareline_upload_queue::{
    EndpointError, Payload, ProgressReporter, TransferEndpoint, TransferFuture, TransferReceipt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::HttpEndpointConfig;
use crate::error::HttpTransferError;

/// Body returned by the server for a stored upload.
///
/// Every field is optional so an unexpected or empty body still counts as
/// success when the status says so.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    id: Option<serde_json::Value>,
    filename: Option<String>,
    original_filename: Option<String>,
    file_size: Option<u64>,
    message: Option<String>,
}

impl From<UploadResponse> for TransferReceipt {
    fn from(resp: UploadResponse) -> Self {
        let remote_id = resp.id.and_then(|id| match id {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        Self {
            remote_id,
            stored_name: resp.filename.or(resp.original_filename),
            stored_size: resp.file_size,
            message: resp.message,
        }
    }
}

/// Error body of a rejected request.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Uploads payloads to a Shareline server.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: Url,
    field_name: String,
    bearer_token: Option<String>,
    timeout: Option<Duration>,
}

impl HttpEndpoint {
    /// Creates an endpoint sharing `client`'s connection pool.
    pub fn new(
        client: reqwest::Client,
        config: HttpEndpointConfig,
    ) -> Result<Self, HttpTransferError> {
        let joined = config.upload_url();
        let url = Url::parse(&joined)
            .map_err(|e| HttpTransferError::InvalidUrl(format!("{joined}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HttpTransferError::InvalidUrl(format!(
                "{joined}: unsupported scheme {}",
                url.scheme()
            )));
        }

        Ok(Self {
            client,
            url,
            field_name: config.field_name,
            bearer_token: config.bearer_token.filter(|t| !t.is_empty()),
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Creates an endpoint with a default client.
    pub fn from_config(config: HttpEndpointConfig) -> Result<Self, HttpTransferError> {
        let client = reqwest::Client::builder().build()?;
        Self::new(client, config)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn upload(
        &self,
        payload: Arc<Payload>,
        progress: ProgressReporter,
    ) -> Result<TransferReceipt, EndpointError> {
        let total = payload.size();
        let reader = payload.open().await?;

        let mut sent = 0u64;
        let stream = ReaderStream::new(reader).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                progress.report(sent, total);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(payload.name().to_string());
        let form = Form::new().part(self.field_name.clone(), part);

        let mut request = self.client.post(self.url.clone()).multipart(form);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        debug!(url = %self.url, name = %payload.name(), size = total, "sending upload");
        let response = request
            .send()
            .await
            .map_err(|e| EndpointError::Transport(describe(&e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| EndpointError::Transport(describe(&e)))?;
        debug!(%status, bytes = body.len(), "upload response");

        if status.is_success() {
            let parsed: UploadResponse = serde_json::from_slice(&body).unwrap_or_default();
            Ok(parsed.into())
        } else {
            Err(EndpointError::Server {
                status: status.as_u16(),
                message: server_message(status, &body),
            })
        }
    }
}

impl TransferEndpoint for HttpEndpoint {
    fn transfer(&self, payload: Arc<Payload>, progress: ProgressReporter) -> TransferFuture<'_> {
        Box::pin(self.upload(payload, progress))
    }
}

/// The `message` field of an error body, or the status line.
fn server_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string())
}

/// Flattens a reqwest error and its sources into one line.
fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = std::error::Error::source(inner);
    }
    text
}
