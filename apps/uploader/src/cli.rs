use clap::Parser;
use std::path::PathBuf;

use crate::config::UploaderConfig;

const MB: u64 = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "shareline-upload")]
#[command(version, about = "Upload files to a Shareline server, one at a time")]
#[command(after_help = "Press Ctrl-C to cancel the file currently uploading; queued files continue.")]
pub struct Cli {
    /// Files to upload, in order
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
    /// Read settings from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Server API root, e.g. https://files.example.com/api
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,
    /// Bearer token sent with every upload
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,
    /// Largest accepted file, in MiB
    #[arg(long, value_name = "MB")]
    pub max_size_mb: Option<u64>,
    /// Largest number of files queued at once
    #[arg(long, value_name = "N")]
    pub max_queue: Option<usize>,
    /// Retry failed uploads up to N times after the queue drains
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
    /// Log per-upload detail
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Overrides file settings with the flags that were given.
    pub fn apply(&self, config: &mut UploaderConfig) {
        if let Some(server) = &self.server {
            config.endpoint.base_url = server.clone();
        }
        if let Some(token) = &self.token {
            config.endpoint.bearer_token = Some(token.clone());
        }
        if let Some(mb) = self.max_size_mb {
            config.admission.max_payload_size = mb.saturating_mul(MB);
        }
        if let Some(max_queue) = self.max_queue {
            config.admission.max_queue_size = max_queue;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
    }
}
