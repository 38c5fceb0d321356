//! Byte progress → task percent.

use std::fmt;
use std::sync::Arc;

use crate::store::TaskStore;
use crate::types::TaskId;

type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Converts a byte count into a rounded percent.
///
/// Returns `None` when `total_bytes` is zero (unknown), so callers keep the
/// last known value instead of dividing by zero. The result is clamped to
/// 100.
pub fn percent(bytes_sent: u64, total_bytes: u64) -> Option<u8> {
    if total_bytes == 0 {
        return None;
    }
    let sent = u128::from(bytes_sent.min(total_bytes));
    let total = u128::from(total_bytes);
    // Round half up.
    let pct = (sent * 200 + total) / (total * 2);
    Some(pct.min(100) as u8)
}

/// Handle given to a [`TransferEndpoint`](crate::TransferEndpoint) to report
/// `(bytes_sent, total_bytes)` as the transfer advances.
///
/// Cheap to clone and `'static`, so it can be moved into a body stream.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<ProgressFn>,
}

impl ProgressReporter {
    /// Creates a reporter that forwards raw byte counts to `sink`.
    pub fn new(sink: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Creates a reporter that discards everything.
    pub fn noop() -> Self {
        Self::new(|_, _| {})
    }

    /// Creates a reporter that writes the percent of task `id` into `store`.
    pub(crate) fn for_task(store: Arc<TaskStore>, id: TaskId) -> Self {
        Self::new(move |sent, total| {
            if let Some(pct) = percent(sent, total) {
                store.update_progress(id, pct);
            }
        })
    }

    /// Reports that `bytes_sent` of `total_bytes` have been sent.
    ///
    /// A `total_bytes` of zero means the total is unknown.
    pub fn report(&self, bytes_sent: u64, total_bytes: u64) {
        (self.sink)(bytes_sent, total_bytes);
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}
