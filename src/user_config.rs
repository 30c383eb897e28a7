use crate::supervisor::SupervisorSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "supervisor.toml";

/// Optional on-disk overrides for the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    /// Backend bind host (e.g., "127.0.0.1")
    pub host: Option<String>,
    /// Backend port
    pub port: Option<u16>,
    /// Health checks before giving up on startup
    pub health_max_attempts: Option<u32>,
    /// Pause between health checks
    pub health_interval_ms: Option<u64>,
    /// Per-check timeout
    pub health_timeout_ms: Option<u64>,
    /// Grace period between SIGTERM and SIGKILL
    pub stop_grace_ms: Option<u64>,
}

impl UserConfig {
    /// $BACKEND_SUPERVISOR_CONFIG_DIR/supervisor.toml or ~/.config/backend-supervisor/supervisor.toml
    pub fn config_path() -> PathBuf {
        crate::clienv::config_dir().join(CONFIG_FILE)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading supervisor config");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        tracing::trace!(config = ?config, "Supervisor config loaded");
        Ok(config)
    }

    /// Overlay the values present in the file onto `settings`.
    pub fn apply(&self, settings: &mut SupervisorSettings) {
        if let Some(attempts) = self.health_max_attempts {
            settings.health.max_attempts = attempts;
        }
        if let Some(ms) = self.health_interval_ms {
            settings.health.interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.health_timeout_ms {
            settings.health.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.stop_grace_ms {
            settings.stop_grace = Duration::from_millis(ms);
        }
    }
}
