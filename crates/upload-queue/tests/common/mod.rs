//! Shared test doubles for the scenario tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shareline_upload_queue::{
    EndpointError, Payload, ProgressReporter, TaskId, TaskStatus, TransferEndpoint,
    TransferFuture, TransferReceipt, UploadQueue,
};
use tokio::sync::Notify;

/// What the endpoint does for one attempt of a named payload.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    /// Fail with a server error carrying this message.
    Fail(&'static str),
    /// Report 50%, then wait for [`ScriptedEndpoint::release`] and succeed.
    Hold,
    /// Panic in `transfer` itself, before any future is returned.
    PanicOnCall,
}

/// Endpoint whose behaviour is scripted per payload name. Names without a
/// script (or whose script ran out) succeed immediately.
#[derive(Default)]
pub struct ScriptedEndpoint {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    release: Notify,
    seen: Mutex<Vec<Arc<Payload>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, name: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(steps);
    }

    /// Lets one held transfer finish.
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Every payload handed to the endpoint, one entry per attempt.
    pub fn seen(&self) -> Vec<Arc<Payload>> {
        self.seen.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, name: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name() == name)
            .count()
    }

    /// Highest number of overlapping transfers observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self, name: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed)
    }
}

/// Decrements the in-flight counter even when the transfer is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TransferEndpoint for ScriptedEndpoint {
    fn transfer(&self, payload: Arc<Payload>, progress: ProgressReporter) -> TransferFuture<'_> {
        self.seen.lock().unwrap().push(Arc::clone(&payload));
        let step = self.next_step(payload.name());
        if matches!(step, Step::PanicOnCall) {
            panic!("endpoint refused {}", payload.name());
        }

        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let total = payload.size();
            match step {
                Step::Succeed => {
                    progress.report(total, total);
                    Ok(TransferReceipt {
                        stored_name: Some(payload.name().to_string()),
                        ..Default::default()
                    })
                }
                Step::Fail(message) => Err(EndpointError::Server {
                    status: 500,
                    message: message.to_string(),
                }),
                Step::Hold => {
                    progress.report(total / 2, total);
                    self.release.notified().await;
                    progress.report(total, total);
                    Ok(TransferReceipt::default())
                }
                Step::PanicOnCall => unreachable!(),
            }
        })
    }
}

pub fn payload(name: &str) -> Payload {
    Payload::from_bytes(name, vec![0u8; 1000])
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

pub async fn wait_for_status(queue: &UploadQueue, id: TaskId, status: TaskStatus) {
    eventually(&format!("{id} to be {status}"), || {
        queue.task(id).is_some_and(|t| t.status == status)
    })
    .await;
}

/// Waits until the task is uploading and its held transfer reported 50%.
pub async fn wait_until_held(queue: &UploadQueue, id: TaskId) {
    eventually(&format!("{id} to be held mid-transfer"), || {
        queue
            .task(id)
            .is_some_and(|t| t.status == TaskStatus::Uploading && t.progress == 50)
    })
    .await;
}

pub async fn with_timeout<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
