//! Environment variable lookups for the host binary.
//!
//! Every variable the host reads is listed here. The library itself never
//! consults the environment; the host resolves these once at startup and
//! passes the results in.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    Mode,
    Host,
    Port,
    SourceRoot,
    ResourcesDir,
    DataDir,
    ConfigDir,
}

impl EnvVar {
    pub const fn as_str(self) -> &'static str {
        match self {
            EnvVar::Mode => "BACKEND_SUPERVISOR_MODE",
            EnvVar::Host => "BACKEND_SUPERVISOR_HOST",
            EnvVar::Port => "BACKEND_SUPERVISOR_PORT",
            EnvVar::SourceRoot => "BACKEND_SUPERVISOR_SOURCE_ROOT",
            EnvVar::ResourcesDir => "BACKEND_SUPERVISOR_RESOURCES_DIR",
            EnvVar::DataDir => "BACKEND_SUPERVISOR_DATA_DIR",
            EnvVar::ConfigDir => "BACKEND_SUPERVISOR_CONFIG_DIR",
        }
    }
}

const APP_SUBDIR: &str = "backend-supervisor";
const FALLBACK_CONFIG_DIR: &str = "~/.config";

/// Non-empty value of `key`, if set.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Runtime mode name ($BACKEND_SUPERVISOR_MODE or the build default)
pub fn runtime_mode() -> String {
    let mode = env_opt(EnvVar::Mode.as_str()).unwrap_or_else(|| default_mode().to_string());
    tracing::trace!(mode = %mode, "Runtime mode");
    mode
}

/// Debug builds run from a source checkout, release builds from a bundle.
pub fn default_mode() -> &'static str {
    if cfg!(debug_assertions) {
        "development"
    } else {
        "production"
    }
}

/// Backend host override ($BACKEND_SUPERVISOR_HOST)
pub fn host() -> Option<String> {
    let val = env_opt(EnvVar::Host.as_str());
    tracing::trace!(value = ?val, "Backend host env var");
    val
}

/// Backend port override ($BACKEND_SUPERVISOR_PORT); unparsable values are ignored
pub fn port() -> Option<u16> {
    let raw = env_opt(EnvVar::Port.as_str())?;
    match raw.parse() {
        Ok(port) => Some(port),
        Err(_) => {
            tracing::warn!(value = %raw, "Ignoring invalid {}", EnvVar::Port.as_str());
            None
        }
    }
}

/// Development source tree ($BACKEND_SUPERVISOR_SOURCE_ROOT or the current directory)
pub fn source_root() -> PathBuf {
    let dir = env_opt(EnvVar::SourceRoot.as_str())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::trace!(dir = %dir.display(), "Resolved source root");
    dir
}

/// Bundled resources root ($BACKEND_SUPERVISOR_RESOURCES_DIR or next to the executable)
pub fn resources_dir() -> Option<PathBuf> {
    let dir = env_opt(EnvVar::ResourcesDir.as_str())
        .map(PathBuf::from)
        .or_else(bundled_resources_dir);
    tracing::trace!(dir = ?dir, "Resolved resources directory");
    dir
}

/// The directory holding the running executable, or `../Resources` inside a
/// macOS app bundle.
fn bundled_resources_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?.to_path_buf();
    if cfg!(target_os = "macos") {
        let bundle_resources = exe_dir.join("..").join("Resources");
        if bundle_resources.is_dir() {
            return Some(bundle_resources);
        }
    }
    Some(exe_dir)
}

/// Backend data directory override ($BACKEND_SUPERVISOR_DATA_DIR)
pub fn data_dir() -> Option<PathBuf> {
    let dir = env_opt(EnvVar::DataDir.as_str()).map(PathBuf::from);
    tracing::trace!(dir = ?dir, "Data directory override");
    dir
}

/// Settings directory ($BACKEND_SUPERVISOR_CONFIG_DIR or ~/.config/backend-supervisor)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(EnvVar::ConfigDir.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
                .join(APP_SUBDIR)
        });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}
