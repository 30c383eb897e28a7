use crate::supervisor::ProcessEvent;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the backend supervisor.
///
/// Cloneable so that every caller joined on one start attempt receives the
/// same outcome.
#[derive(Error, Debug, Clone)]
pub enum SupervisorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to launch backend '{}': {source}", executable.display())]
    Launch {
        executable: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("backend at {url} did not become ready after {attempts} health checks")]
    StartupTimeout { url: String, attempts: u32 },

    #[error("backend exited during startup: {0}")]
    ExitedDuringStartup(ProcessEvent),

    #[error("backend exited unexpectedly: {0}")]
    UnexpectedExit(ProcessEvent),

    #[error("invalid service URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("start attempt was abandoned before it settled")]
    StartAbandoned,
}

impl SupervisorError {
    /// Stable identifier for the failure category, suitable for choosing a
    /// failure screen or a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Launch { .. } => "launch",
            Self::StartupTimeout { .. } => "startup-timeout",
            Self::ExitedDuringStartup(_) => "exited-during-startup",
            Self::UnexpectedExit(_) => "unexpected-exit",
            Self::InvalidUrl { .. } => "invalid-url",
            Self::HttpClient(_) => "http-client",
            Self::StartAbandoned => "start-abandoned",
        }
    }

    pub(crate) fn launch(executable: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Launch {
            executable: executable.into(),
            source: Arc::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
