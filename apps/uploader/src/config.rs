//! Uploader configuration management.
//!
//! Configuration is stored as TOML in the platform config directory:
//! - Linux: `$XDG_CONFIG_HOME/shareline/uploader.toml` (`~/.config/...`)
//! - macOS: `~/Library/Application Support/shareline/uploader.toml`
//! - Windows: `%APPDATA%\shareline\config\uploader.toml`

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use shareline_http_transfer::HttpEndpointConfig;
use shareline_upload_queue::AdmissionPolicy;

const CONFIG_FILE: &str = "uploader.toml";

/// Uploader configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// How many times failed uploads are retried after the queue drains.
    #[serde(default)]
    pub retries: u32,

    /// Server connection settings.
    #[serde(default)]
    pub endpoint: HttpEndpointConfig,

    /// Queue capacity and per-file size limit.
    #[serde(default)]
    pub admission: AdmissionPolicy,
}

impl UploaderConfig {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// A missing file at the default location is created with defaults; a
    /// missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = config_path()?;
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    let config = UploaderConfig::default();
                    config.save_to(&path)?;
                    Ok(config)
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: UploaderConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (may contain a bearer token).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(proj) = ProjectDirs::from("", "", "shareline") {
        return Ok(proj.config_dir().join(CONFIG_FILE));
    }
    if let Some(base) = BaseDirs::new() {
        return Ok(base
            .home_dir()
            .join(".config")
            .join("shareline")
            .join(CONFIG_FILE));
    }
    anyhow::bail!("cannot determine a configuration directory; pass --config")
}
