//! Endpoint configuration.

use serde::{Deserialize, Serialize};

/// Default server API root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Default upload route, relative to the API root.
pub const DEFAULT_UPLOAD_PATH: &str = "/files/upload";

/// Default multipart field carrying the file.
pub const DEFAULT_FIELD_NAME: &str = "file";

/// Where and how uploads are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEndpointConfig {
    /// API root, e.g. `https://files.example.com/api`.
    pub base_url: String,
    /// Upload route appended to `base_url`.
    pub upload_path: String,
    /// Multipart field name for the file part.
    pub field_name: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// Whole-request timeout in seconds. `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for HttpEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            upload_path: DEFAULT_UPLOAD_PATH.into(),
            field_name: DEFAULT_FIELD_NAME.into(),
            bearer_token: None,
            timeout_secs: None,
        }
    }
}

impl HttpEndpointConfig {
    /// Joins `base_url` and `upload_path` the way a path-prefixed API root
    /// expects: `http://h/api` + `/files/upload` = `http://h/api/files/upload`.
    pub fn upload_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.upload_path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}
