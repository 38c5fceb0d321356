//! Admission control: capacity and size checks before a task exists.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::TaskStore;
use crate::types::{Payload, TaskId};

/// Default per-payload size limit: 100 MiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Default queue capacity.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10;

/// Externally configured admission limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionPolicy {
    /// Largest accepted payload, in bytes (inclusive).
    pub max_payload_size: u64,
    /// Largest number of tasks the store may hold after an admission.
    pub max_queue_size: usize,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

/// Why a payload was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The queue had no room left for this payload.
    QueueFull { max_queue_size: usize },
    /// The payload is larger than the size limit.
    TooLarge { size: u64, max: u64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { max_queue_size } => {
                write!(f, "queue limit is {max_queue_size} files")
            }
            Self::TooLarge { max, .. } => {
                write!(f, "exceeds {}MB", max.div_ceil(1024 * 1024))
            }
        }
    }
}

/// A payload that was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRejection {
    pub name: String,
    pub reason: RejectReason,
}

/// Outcome of one admission call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionReport {
    /// New task ids, in input order.
    pub admitted: Vec<TaskId>,
    pub dropped_for_capacity: usize,
    pub dropped_for_size: usize,
    /// One entry per dropped payload, in input order.
    pub rejections: Vec<AdmissionRejection>,
}

impl AdmissionReport {
    pub fn admitted_count(&self) -> usize {
        self.admitted.len()
    }

    /// Returns `true` if any payload was dropped.
    pub fn has_rejections(&self) -> bool {
        !self.rejections.is_empty()
    }
}

/// Splits candidates into the payloads to admit and the rejections.
///
/// Capacity is applied first, on input order: only the first
/// `max_queue_size - current_len` candidates are considered. The size limit
/// is then applied to those.
fn plan(
    current_len: usize,
    policy: &AdmissionPolicy,
    payloads: Vec<Payload>,
) -> (Vec<Payload>, Vec<AdmissionRejection>) {
    let remaining = policy.max_queue_size.saturating_sub(current_len);
    let mut accepted = Vec::with_capacity(payloads.len().min(remaining));
    let mut rejections = Vec::new();

    for (index, payload) in payloads.into_iter().enumerate() {
        if index >= remaining {
            rejections.push(AdmissionRejection {
                name: payload.name().to_string(),
                reason: RejectReason::QueueFull {
                    max_queue_size: policy.max_queue_size,
                },
            });
        } else if payload.size() > policy.max_payload_size {
            rejections.push(AdmissionRejection {
                name: payload.name().to_string(),
                reason: RejectReason::TooLarge {
                    size: payload.size(),
                    max: policy.max_payload_size,
                },
            });
        } else {
            accepted.push(payload);
        }
    }

    (accepted, rejections)
}

/// Validates `payloads` and appends the survivors to `store` as queued
/// tasks, preserving their relative order.
///
/// Never blocks and never touches the network. The capacity check and the
/// append happen atomically, so concurrent admissions cannot overfill the
/// store.
pub fn admit(store: &TaskStore, policy: &AdmissionPolicy, payloads: Vec<Payload>) -> AdmissionReport {
    let candidates = payloads.len();
    let mut rejections = Vec::new();

    let admitted = store.append_with(|current_len| {
        let (accepted, rejected) = plan(current_len, policy, payloads);
        rejections = rejected;
        accepted
    });

    let dropped_for_capacity = rejections
        .iter()
        .filter(|r| matches!(r.reason, RejectReason::QueueFull { .. }))
        .count();
    let dropped_for_size = rejections.len() - dropped_for_capacity;

    for rejection in &rejections {
        warn!(name = %rejection.name, reason = %rejection.reason, "payload rejected");
    }
    if candidates > 0 {
        info!(
            candidates,
            admitted = admitted.len(),
            dropped_for_capacity,
            dropped_for_size,
            "admission complete"
        );
    }

    AdmissionReport {
        admitted,
        dropped_for_capacity,
        dropped_for_size,
        rejections,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::{PayloadSource, TaskStatus};

    const MB: u64 = 1024 * 1024;

    fn sized(name: &str, size: u64) -> Payload {
        Payload::new(name, size, PayloadSource::File(PathBuf::from(name)))
    }

    fn batch(count: usize) -> Vec<Payload> {
        (0..count).map(|i| sized(&format!("f{i}"), 1024)).collect()
    }

    #[test]
    fn capacity_drops_tail_of_batch() {
        let store = TaskStore::new();
        let report = admit(&store, &AdmissionPolicy::default(), batch(12));

        assert_eq!(report.admitted_count(), 10);
        assert_eq!(report.dropped_for_capacity, 2);
        assert_eq!(report.dropped_for_size, 0);
        assert_eq!(store.len(), 10);

        let names: Vec<_> = store.snapshot().into_iter().map(|s| s.name).collect();
        let expected: Vec<_> = (0..10).map(|i| format!("f{i}")).collect();
        assert_eq!(names, expected);

        let dropped: Vec<_> = report.rejections.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(dropped, vec!["f10", "f11"]);
    }

    #[test]
    fn oversized_payload_creates_no_task() {
        let store = TaskStore::new();
        let report = admit(
            &store,
            &AdmissionPolicy::default(),
            vec![sized("big.iso", 150 * MB)],
        );

        assert!(report.admitted.is_empty());
        assert_eq!(report.dropped_for_size, 1);
        assert_eq!(report.dropped_for_capacity, 0);
        assert!(store.is_empty());
        assert_eq!(
            report.rejections[0].reason,
            RejectReason::TooLarge {
                size: 150 * MB,
                max: 100 * MB
            }
        );
    }

    #[test]
    fn exact_limit_is_accepted() {
        let store = TaskStore::new();
        let report = admit(
            &store,
            &AdmissionPolicy::default(),
            vec![sized("edge.bin", 100 * MB), sized("over.bin", 100 * MB + 1)],
        );
        assert_eq!(report.admitted_count(), 1);
        assert_eq!(report.dropped_for_size, 1);
    }

    #[test]
    fn capacity_applies_before_size() {
        let store = TaskStore::new();
        let policy = AdmissionPolicy {
            max_payload_size: 10,
            max_queue_size: 2,
        };
        // The oversized payload is inside the considered window, the last
        // one is cut by capacity even though it is small.
        let report = admit(
            &store,
            &policy,
            vec![sized("a", 5), sized("big", 50), sized("c", 5)],
        );

        assert_eq!(report.admitted_count(), 1);
        assert_eq!(report.dropped_for_size, 1);
        assert_eq!(report.dropped_for_capacity, 1);
        assert_eq!(report.rejections[0].name, "big");
        assert_eq!(report.rejections[1].name, "c");
    }

    #[test]
    fn full_queue_rejects_everything() {
        let store = TaskStore::new();
        let policy = AdmissionPolicy {
            max_payload_size: MB,
            max_queue_size: 3,
        };
        admit(&store, &policy, batch(3));

        let report = admit(&store, &policy, batch(2));
        assert!(report.admitted.is_empty());
        assert_eq!(report.dropped_for_capacity, 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn capacity_counts_terminal_tasks_until_cleared() {
        use crate::store::Transition;
        use tokio_util::sync::CancellationToken;

        let store = TaskStore::new();
        let policy = AdmissionPolicy {
            max_payload_size: MB,
            max_queue_size: 1,
        };
        let report = admit(&store, &policy, batch(1));
        let id = report.admitted[0];
        store
            .transition(id, Transition::Start(CancellationToken::new()))
            .unwrap();
        store.transition(id, Transition::Cancel).unwrap();

        assert_eq!(admit(&store, &policy, batch(1)).dropped_for_capacity, 1);

        store.clear_finished();
        assert_eq!(admit(&store, &policy, batch(1)).admitted_count(), 1);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let store = TaskStore::new();
        let report = admit(&store, &AdmissionPolicy::default(), Vec::new());
        assert_eq!(report, AdmissionReport::default());
        assert!(!report.has_rejections());
    }

    #[test]
    fn admitted_tasks_start_queued() {
        let store = TaskStore::new();
        let report = admit(&store, &AdmissionPolicy::default(), batch(2));
        for id in report.admitted {
            let snap = store.get(id).unwrap();
            assert_eq!(snap.status, TaskStatus::Queued);
            assert_eq!(snap.progress, 0);
        }
    }

    #[test]
    fn concurrent_admissions_never_overfill() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(TaskStore::new());
        let policy = AdmissionPolicy {
            max_payload_size: MB,
            max_queue_size: 25,
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let policy = policy.clone();
                thread::spawn(move || admit(&store, &policy, batch(7)).admitted_count())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 25);
        assert_eq!(store.len(), 25);
    }

    #[test]
    fn reject_reason_messages() {
        assert_eq!(
            RejectReason::QueueFull { max_queue_size: 10 }.to_string(),
            "queue limit is 10 files"
        );
        assert_eq!(
            RejectReason::TooLarge {
                size: 150 * MB,
                max: 100 * MB
            }
            .to_string(),
            "exceeds 100MB"
        );
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: AdmissionPolicy = serde_json::from_str(r#"{"max_queue_size": 4}"#).unwrap();
        assert_eq!(policy.max_queue_size, 4);
        assert_eq!(policy.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }
}
