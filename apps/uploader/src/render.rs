//! Terminal output: live event log and the final summary.

use std::collections::HashMap;

use shareline_upload_queue::{AdmissionReport, QueueEvent, TaskId, TaskSnapshot, TaskStatus};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Logs queue events until the channel closes.
pub async fn log_events(mut events: mpsc::Receiver<QueueEvent>) {
    let mut names: HashMap<TaskId, String> = HashMap::new();

    while let Some(event) = events.recv().await {
        match event {
            QueueEvent::Admitted { id, name } => {
                debug!(task = %id, %name, "queued");
                names.insert(id, name);
            }
            QueueEvent::StatusChanged { id, status } => {
                let name = names.get(&id).map(String::as_str).unwrap_or("?");
                match status {
                    TaskStatus::Queued => info!(%name, "requeued"),
                    TaskStatus::Uploading => info!(%name, "uploading"),
                    TaskStatus::Done => info!(%name, "uploaded"),
                    TaskStatus::Error => warn!(%name, "upload failed"),
                    TaskStatus::Canceled => warn!(%name, "upload canceled"),
                }
            }
            QueueEvent::Progress { id, percent } => {
                if percent % 10 == 0 {
                    let name = names.get(&id).map(String::as_str).unwrap_or("?");
                    debug!(%name, percent, "progress");
                }
            }
            QueueEvent::Removed { id } => {
                names.remove(&id);
            }
        }
    }
}

/// Prints one line per rejected file.
pub fn print_rejections(report: &AdmissionReport) {
    for rejection in &report.rejections {
        eprintln!("skipped  {}: {}", rejection.name, rejection.reason);
    }
}

/// Final tally of a run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub done: usize,
    pub failed: usize,
    pub canceled: usize,
    /// Files dropped at admission or unreadable before it.
    pub skipped: usize,
}

impl Summary {
    pub fn new(tasks: &[TaskSnapshot], skipped: usize) -> Self {
        let count = |status| tasks.iter().filter(|t| t.status == status).count();
        Self {
            done: count(TaskStatus::Done),
            failed: count(TaskStatus::Error),
            canceled: count(TaskStatus::Canceled),
            skipped,
        }
    }

    /// Returns `true` if every requested file was uploaded.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.canceled == 0 && self.skipped == 0
    }
}

/// Formats one result line for a finished task.
pub fn task_line(task: &TaskSnapshot) -> String {
    let mut line = format!("{:<9} {}", task.status.as_str(), task.name);
    match (&task.error, &task.receipt) {
        (Some(error), _) => {
            line.push_str(": ");
            line.push_str(error);
        }
        (None, Some(receipt)) => {
            if let Some(stored) = receipt.stored_name.as_deref().filter(|s| *s != task.name) {
                line.push_str(" -> ");
                line.push_str(stored);
            }
        }
        (None, None) => {}
    }
    if task.attempts > 1 {
        line.push_str(&format!(" ({} attempts)", task.attempts));
    }
    line
}

pub fn print_summary(tasks: &[TaskSnapshot], summary: &Summary) {
    for task in tasks {
        println!("{}", task_line(task));
    }
    println!(
        "{} uploaded, {} failed, {} canceled, {} skipped",
        summary.done, summary.failed, summary.canceled, summary.skipped
    );
}

#[cfg(test)]
mod tests {
    use shareline_upload_queue::TransferReceipt;

    use super::*;

    fn task(name: &str, status: TaskStatus) -> TaskSnapshot {
        TaskSnapshot {
            id: TaskId::new(),
            name: name.into(),
            size: 10,
            status,
            progress: 0,
            error: None,
            attempts: 1,
            receipt: None,
        }
    }

    #[test]
    fn summary_counts() {
        let tasks = vec![
            task("a", TaskStatus::Done),
            task("b", TaskStatus::Done),
            task("c", TaskStatus::Error),
            task("d", TaskStatus::Canceled),
        ];
        let summary = Summary::new(&tasks, 1);
        assert_eq!(
            summary,
            Summary {
                done: 2,
                failed: 1,
                canceled: 1,
                skipped: 1
            }
        );
        assert!(!summary.is_success());
        assert!(Summary::new(&tasks[..2], 0).is_success());
    }

    #[test]
    fn failed_line_shows_reason_and_attempts() {
        let mut t = task("report.pdf", TaskStatus::Error);
        t.error = Some("500 Internal Error".into());
        t.attempts = 3;
        assert_eq!(
            task_line(&t),
            "error     report.pdf: 500 Internal Error (3 attempts)"
        );
    }

    #[test]
    fn done_line_shows_stored_name_when_renamed() {
        let mut t = task("photo.jpg", TaskStatus::Done);
        t.receipt = Some(TransferReceipt {
            stored_name: Some("3f2a-photo.jpg".into()),
            ..Default::default()
        });
        assert_eq!(task_line(&t), "done      photo.jpg -> 3f2a-photo.jpg");

        t.receipt = Some(TransferReceipt {
            stored_name: Some("photo.jpg".into()),
            ..Default::default()
        });
        assert_eq!(task_line(&t), "done      photo.jpg");
    }

    #[tokio::test]
    async fn event_log_ends_when_channel_closes() {
        let (tx, rx) = mpsc::channel(8);
        let id = TaskId::new();
        tx.send(QueueEvent::Admitted {
            id,
            name: "a".into(),
        })
        .await
        .unwrap();
        tx.send(QueueEvent::StatusChanged {
            id,
            status: TaskStatus::Done,
        })
        .await
        .unwrap();
        drop(tx);
        log_events(rx).await;
    }
}
