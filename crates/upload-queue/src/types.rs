//! Data types shared by the queue components.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Opaque task identifier, assigned at admission and stable for the
/// task's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of an upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Admitted and waiting for the worker.
    Queued,
    /// Currently being transferred. At most one task is in this state.
    Uploading,
    /// Transferred successfully.
    Done,
    /// The endpoint reported a failure. Can be retried.
    Error,
    /// Aborted by the user while uploading.
    Canceled,
}

impl TaskStatus {
    /// Returns `true` for `done`, `error` and `canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a payload's bytes come from.
#[derive(Clone)]
pub enum PayloadSource {
    /// A file on disk, opened afresh for every attempt.
    File(PathBuf),
    /// An in-memory buffer.
    Memory(Arc<[u8]>),
}

impl fmt::Debug for PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Memory(data) => write!(f, "Memory({} bytes)", data.len()),
        }
    }
}

/// Readable byte stream for one transfer attempt.
pub type PayloadReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// A user-selected unit of data to upload.
///
/// Once admitted, a payload is shared read-only by its task (`Arc<Payload>`)
/// and is never mutated, so a retried task sends exactly the same source.
#[derive(Debug, Clone)]
pub struct Payload {
    name: String,
    size: u64,
    source: PayloadSource,
}

impl Payload {
    /// Creates a payload with an explicitly declared byte length.
    pub fn new(name: impl Into<String>, size: u64, source: PayloadSource) -> Self {
        Self {
            name: name.into(),
            size,
            source,
        }
    }

    /// Creates a payload backed by a file, reading its length from metadata.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            size: metadata.len(),
            source: PayloadSource::File(path.to_path_buf()),
        })
    }

    /// Creates a payload from an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            source: PayloadSource::Memory(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    /// Opens a fresh reader positioned at the first byte.
    pub async fn open(&self) -> io::Result<PayloadReader> {
        match &self.source {
            PayloadSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::new(file))
            }
            PayloadSource::Memory(data) => Ok(Box::new(io::Cursor::new(Arc::clone(data)))),
        }
    }
}

/// What the endpoint reports about a stored upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Server-side identifier of the stored file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Name under which the server stored the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_name: Option<String>,
    /// Size the server recorded, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_size: Option<u64>,
    /// Human-readable message from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Immutable view of a task, as read by presentation code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub size: u64,
    pub status: TaskStatus,
    /// Percent in `[0, 100]`.
    pub progress: u8,
    /// Present only when `status == Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of times the task entered `uploading`.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransferReceipt>,
}

/// Notification emitted whenever the task store changes.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// A payload was admitted as a new queued task.
    Admitted { id: TaskId, name: String },
    /// A task changed status.
    StatusChanged { id: TaskId, status: TaskStatus },
    /// Upload progress changed (only sent when the percent moves).
    Progress { id: TaskId, percent: u8 },
    /// A terminal task was removed from the store.
    Removed { id: TaskId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
        assert_eq!(TaskStatus::Uploading.to_string(), "uploading");
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Uploading.is_terminal());
    }

    #[test]
    fn memory_payload_debug_hides_bytes() {
        let payload = Payload::from_bytes("notes.txt", b"secret".to_vec());
        let debug = format!("{payload:?}");
        assert!(debug.contains("Memory(6 bytes)"));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn from_path_reads_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, vec![7u8; 2048]).unwrap();

        let payload = Payload::from_path(&path).await.unwrap();
        assert_eq!(payload.name(), "report.pdf");
        assert_eq!(payload.size(), 2048);
    }

    #[tokio::test]
    async fn from_path_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = Payload::from_path(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn open_rereads_from_start() {
        let payload = Payload::from_bytes("a.bin", b"hello".to_vec());

        for _ in 0..2 {
            let mut reader = payload.open().await.unwrap();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, b"hello");
        }
    }

    #[tokio::test]
    async fn open_missing_file_fails() {
        let payload = Payload::new(
            "gone.bin",
            10,
            PayloadSource::File(PathBuf::from("/nonexistent/shareline/gone.bin")),
        );
        assert!(payload.open().await.is_err());
    }
}
