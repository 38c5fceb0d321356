//! Shareline uploader entry point.

mod cli;
mod config;
mod render;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use shareline_http_transfer::HttpEndpoint;
use shareline_upload_queue::{Payload, UploadQueue};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::UploaderConfig;
use crate::render::Summary;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize structured logging.
    let default_filter = if cli.verbose {
        "info,shareline=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match run(cli).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Summary> {
    let mut config = match UploaderConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        // An explicit --config must be readable.
        Err(e) if cli.config.is_some() => return Err(e),
        Err(e) => {
            warn!(error = %e, "failed to load config, using defaults");
            UploaderConfig::default()
        }
    };
    cli.apply(&mut config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.endpoint.base_url,
        files = cli.files.len(),
        "starting Shareline uploader"
    );

    let mut payloads = Vec::with_capacity(cli.files.len());
    let mut unreadable = 0;
    for path in &cli.files {
        match Payload::from_path(path).await {
            Ok(payload) => payloads.push(payload),
            Err(e) => {
                eprintln!("skipped  {}: {e}", path.display());
                unreadable += 1;
            }
        }
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("shareline-upload/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let endpoint =
        HttpEndpoint::new(client, config.endpoint.clone()).context("configuring server endpoint")?;

    let queue = UploadQueue::new(Arc::new(endpoint), config.admission.clone());

    let completed = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&completed);
    queue.on_complete(move || {
        c.fetch_add(1, Ordering::Relaxed);
    });

    let renderer = queue
        .take_events()
        .map(|events| tokio::spawn(render::log_events(events)));

    let report = queue.admit(payloads);
    render::print_rejections(&report);

    let mut retries_left = config.retries;
    loop {
        if drain(&queue).await {
            info!("interrupted, not retrying");
            break;
        }
        if retries_left == 0 {
            break;
        }
        let requeued = queue.retry_failed();
        if requeued == 0 {
            break;
        }
        retries_left -= 1;
        info!(requeued, remaining = retries_left, "retrying failed uploads");
    }

    let tasks = queue.tasks();
    let summary = Summary::new(&tasks, report.rejections.len() + unreadable);
    info!(completed = completed.load(Ordering::Relaxed), "queue drained");

    // Closing the queue closes the event channel and ends the renderer.
    drop(queue);
    if let Some(renderer) = renderer {
        let _ = tokio::time::timeout(Duration::from_secs(1), renderer).await;
    }

    render::print_summary(&tasks, &summary);
    Ok(summary)
}

/// Waits for the worker to go idle. Ctrl-C cancels the active upload.
///
/// Returns `true` if the user interrupted.
async fn drain(queue: &UploadQueue) -> bool {
    let idle = queue.wait_idle();
    tokio::pin!(idle);

    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = &mut idle => return interrupted,
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    interrupted = true;
                    if let Some(id) = queue.cancel_active() {
                        warn!(task = %id, "canceling current upload");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    (&mut idle).await;
                    return interrupted;
                }
            },
        }
    }
}
