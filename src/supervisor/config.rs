//! Launch-parameter resolution for the backend process.
//!
//! Given an explicit [`RuntimeMode`] and [`Platform`], the resolver derives
//! where the backend executable lives, which directory it runs in, where it
//! keeps its data and which environment it receives. The only filesystem
//! effect is creating the per-user data directory in production mode.

use crate::error::{Result, SupervisorError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Environment variable handed to the backend with its data directory.
pub const BACKEND_DATA_DIR_ENV: &str = "BACKEND_DATA_DIR";
/// Environment variable handed to the backend with the runtime mode.
pub const BACKEND_ENV_ENV: &str = "BACKEND_ENV";

const BACKEND_SUBDIR: &str = "backend";
const VENV_SUBDIR: &str = ".venv";
const DEV_ENTRYPOINT: &str = "main.py";
const DEV_DATA_SUBDIR: &str = "data";
const PRODUCTION_EXECUTABLE: &str = "backend-server";
const APP_SUBDIR: &str = "backend-supervisor";

/// Which launch layout to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Source checkout with a local virtual environment
    Development,
    /// Backend bundled in the host application's resources
    Production,
}

impl RuntimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Development => "development",
            RuntimeMode::Production => "production",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeMode {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RuntimeMode::Development),
            "production" | "prod" => Ok(RuntimeMode::Production),
            other => Err(SupervisorError::Configuration(format!(
                "unknown runtime mode '{other}' (expected 'development' or 'production')"
            ))),
        }
    }
}

/// Operating systems the backend is packaged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub fn current() -> Result<Self> {
        if cfg!(target_os = "linux") {
            Ok(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(Platform::MacOs)
        } else if cfg!(target_os = "windows") {
            Ok(Platform::Windows)
        } else {
            Err(SupervisorError::Configuration(format!(
                "unsupported platform '{}'",
                std::env::consts::OS
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        }
    }

    fn executable_name(&self, stem: &str) -> String {
        match self {
            Platform::Windows => format!("{stem}.exe"),
            Platform::Linux | Platform::MacOs => stem.to_string(),
        }
    }

    fn venv_interpreter(&self, venv: &Path) -> PathBuf {
        match self {
            Platform::Windows => venv.join("Scripts").join("python.exe"),
            Platform::Linux | Platform::MacOs => venv.join("bin").join("python"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" => Ok(Platform::MacOs),
            "windows" | "win32" => Ok(Platform::Windows),
            other => Err(SupervisorError::Configuration(format!(
                "unknown platform '{other}'"
            ))),
        }
    }
}

/// Everything needed to launch one backend process.
///
/// Produced once per start attempt and not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub executable_path: PathBuf,
    /// Arguments placed before `--host`/`--port` (e.g. the entry script)
    pub leading_args: Vec<String>,
    pub working_directory: PathBuf,
    pub data_directory: PathBuf,
    pub environment_variables: BTreeMap<String, String>,
}

impl ServiceConfig {
    /// `http://{host}:{port}`
    pub fn base_url(&self) -> String {
        base_url(&self.host, self.port)
    }

    /// Full argument vector passed to the executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend([
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ]);
        args
    }
}

/// IPv6 literals are bracketed so the authority stays parseable.
pub(crate) fn base_url(host: &str, port: u16) -> String {
    match host.parse::<Ipv6Addr>() {
        Ok(addr) => format!("http://[{addr}]:{port}"),
        Err(_) => format!("http://{host}:{port}"),
    }
}

/// Host-supplied inputs to resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverInputs {
    pub host: String,
    pub port: u16,
    /// Root of the source checkout (development)
    pub source_root: PathBuf,
    /// Bundled resources directory (production, required there)
    pub resources_root: Option<PathBuf>,
    /// Per-user data directory override (production)
    pub data_root: Option<PathBuf>,
}

impl Default for ResolverInputs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            source_root: PathBuf::from("."),
            resources_root: None,
            data_root: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    inputs: ResolverInputs,
}

impl ConfigResolver {
    pub fn new(inputs: ResolverInputs) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> &ResolverInputs {
        &self.inputs
    }

    /// Service URL implied by the inputs, before any config is resolved.
    pub fn base_url(&self) -> String {
        base_url(&self.inputs.host, self.inputs.port)
    }

    pub fn resolve(&self, mode: RuntimeMode, platform: Platform) -> Result<ServiceConfig> {
        if self.inputs.host.trim().is_empty() {
            return Err(SupervisorError::Configuration(
                "backend host must not be empty".to_string(),
            ));
        }
        if self.inputs.port == 0 {
            return Err(SupervisorError::Configuration(
                "backend port must be non-zero".to_string(),
            ));
        }
        let url = self.base_url();
        if let Err(e) = reqwest::Url::parse(&url) {
            return Err(SupervisorError::Configuration(format!(
                "backend host '{}' does not form a valid URL ({url}): {e}",
                self.inputs.host
            )));
        }

        let config = match mode {
            RuntimeMode::Development => self.resolve_development(platform),
            RuntimeMode::Production => self.resolve_production(platform)?,
        };

        tracing::debug!(
            mode = %mode,
            platform = %platform,
            executable = %config.executable_path.display(),
            cwd = %config.working_directory.display(),
            data = %config.data_directory.display(),
            "Resolved backend launch config"
        );
        Ok(config)
    }

    fn resolve_development(&self, platform: Platform) -> ServiceConfig {
        let working_directory = self.inputs.source_root.join(BACKEND_SUBDIR);
        let executable_path = platform.venv_interpreter(&working_directory.join(VENV_SUBDIR));
        let data_directory = working_directory.join(DEV_DATA_SUBDIR);

        let mut env = BTreeMap::new();
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        env.insert(
            BACKEND_ENV_ENV.to_string(),
            RuntimeMode::Development.as_str().to_string(),
        );
        env.insert(
            BACKEND_DATA_DIR_ENV.to_string(),
            data_directory.display().to_string(),
        );

        ServiceConfig {
            host: self.inputs.host.clone(),
            port: self.inputs.port,
            executable_path,
            leading_args: vec![DEV_ENTRYPOINT.to_string()],
            working_directory,
            data_directory,
            environment_variables: env,
        }
    }

    fn resolve_production(&self, platform: Platform) -> Result<ServiceConfig> {
        let resources_root = self.inputs.resources_root.as_ref().ok_or_else(|| {
            SupervisorError::Configuration(
                "production mode requires a bundled resources directory".to_string(),
            )
        })?;

        let working_directory = resources_root.join(BACKEND_SUBDIR);
        let executable_path =
            working_directory.join(platform.executable_name(PRODUCTION_EXECUTABLE));

        let data_directory = match &self.inputs.data_root {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .map(|dir| dir.join(APP_SUBDIR))
                .ok_or_else(|| {
                    SupervisorError::Configuration(
                        "could not determine the per-user data directory".to_string(),
                    )
                })?,
        };

        if !data_directory.exists() {
            std::fs::create_dir_all(&data_directory).map_err(|e| {
                SupervisorError::Configuration(format!(
                    "failed to create data directory {}: {e}",
                    data_directory.display()
                ))
            })?;
            tracing::info!(dir = %data_directory.display(), "Created backend data directory");
        }

        let mut env = BTreeMap::new();
        env.insert(
            BACKEND_ENV_ENV.to_string(),
            RuntimeMode::Production.as_str().to_string(),
        );
        env.insert(
            BACKEND_DATA_DIR_ENV.to_string(),
            data_directory.display().to_string(),
        );

        Ok(ServiceConfig {
            host: self.inputs.host.clone(),
            port: self.inputs.port,
            executable_path,
            leading_args: Vec::new(),
            working_directory,
            data_directory,
            environment_variables: env,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(root: &Path) -> ResolverInputs {
        ResolverInputs {
            source_root: root.join("src-tree"),
            resources_root: Some(root.join("Resources")),
            data_root: Some(root.join("user-data").join("nested")),
            ..ResolverInputs::default()
        }
    }

    #[test]
    fn development_uses_venv_interpreter() {
        let resolver = ConfigResolver::new(inputs(Path::new("/work")));
        let config = resolver
            .resolve(RuntimeMode::Development, Platform::Linux)
            .unwrap();

        assert_eq!(
            config.executable_path,
            PathBuf::from("/work/src-tree/backend/.venv/bin/python")
        );
        assert_eq!(config.working_directory, PathBuf::from("/work/src-tree/backend"));
        assert_eq!(config.leading_args, vec!["main.py"]);
        assert_eq!(
            config.environment_variables.get("PYTHONUNBUFFERED"),
            Some(&"1".to_string())
        );
        assert_eq!(
            config.environment_variables.get(BACKEND_ENV_ENV),
            Some(&"development".to_string())
        );
    }

    #[test]
    fn development_on_windows_uses_scripts_dir() {
        let resolver = ConfigResolver::new(inputs(Path::new("C:/work")));
        let config = resolver
            .resolve(RuntimeMode::Development, Platform::Windows)
            .unwrap();
        assert!(config.executable_path.ends_with("Scripts/python.exe"));
    }

    #[test]
    fn production_resolves_bundled_executable_and_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(inputs(dir.path()));

        let config = resolver
            .resolve(RuntimeMode::Production, Platform::Linux)
            .unwrap();

        assert_eq!(
            config.executable_path,
            dir.path().join("Resources/backend/backend-server")
        );
        assert!(config.leading_args.is_empty());
        assert!(config.data_directory.is_dir());
        assert_eq!(
            config.environment_variables.get(BACKEND_DATA_DIR_ENV),
            Some(&config.data_directory.display().to_string())
        );
    }

    #[test]
    fn production_on_windows_appends_exe() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(inputs(dir.path()));
        let config = resolver
            .resolve(RuntimeMode::Production, Platform::Windows)
            .unwrap();
        assert!(config.executable_path.ends_with("backend-server.exe"));
    }

    #[test]
    fn production_without_resources_root_is_configuration_error() {
        let resolver = ConfigResolver::new(ResolverInputs::default());
        let err = resolver
            .resolve(RuntimeMode::Production, Platform::Linux)
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Configuration(_)));
    }

    #[test]
    fn rejects_zero_port_and_empty_host() {
        let resolver = ConfigResolver::new(ResolverInputs {
            port: 0,
            ..ResolverInputs::default()
        });
        assert!(resolver
            .resolve(RuntimeMode::Development, Platform::Linux)
            .is_err());

        let resolver = ConfigResolver::new(ResolverInputs {
            host: "  ".to_string(),
            ..ResolverInputs::default()
        });
        assert!(resolver
            .resolve(RuntimeMode::Development, Platform::Linux)
            .is_err());
    }

    #[test]
    fn args_append_host_and_port() {
        let resolver = ConfigResolver::new(inputs(Path::new("/work")));
        let config = resolver
            .resolve(RuntimeMode::Development, Platform::MacOs)
            .unwrap();
        assert_eq!(
            config.args(),
            vec!["main.py", "--host", "127.0.0.1", "--port", "8000"]
        );
        assert_eq!(config.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn ipv6_host_is_bracketed_in_service_url() {
        let resolver = ConfigResolver::new(ResolverInputs {
            host: "::1".to_string(),
            ..inputs(Path::new("/work"))
        });
        assert_eq!(resolver.base_url(), "http://[::1]:8000");

        let config = resolver
            .resolve(RuntimeMode::Development, Platform::Linux)
            .unwrap();
        assert_eq!(config.base_url(), "http://[::1]:8000");
        assert_eq!(
            config.args(),
            vec!["main.py", "--host", "::1", "--port", "8000"]
        );
        assert_eq!(
            crate::supervisor::HealthPoller::health_url(&config.base_url())
                .unwrap()
                .as_str(),
            "http://[::1]:8000/health"
        );
    }

    #[test]
    fn host_that_breaks_the_url_is_configuration_error() {
        let resolver = ConfigResolver::new(ResolverInputs {
            host: "bad host".to_string(),
            ..ResolverInputs::default()
        });
        let err = resolver
            .resolve(RuntimeMode::Development, Platform::Linux)
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Configuration(_)));
    }

    #[test]
    fn parses_modes_and_platforms() {
        assert_eq!("prod".parse::<RuntimeMode>().unwrap(), RuntimeMode::Production);
        assert_eq!(
            "Development".parse::<RuntimeMode>().unwrap(),
            RuntimeMode::Development
        );
        assert!("staging".parse::<RuntimeMode>().is_err());

        assert_eq!("darwin".parse::<Platform>().unwrap(), Platform::MacOs);
        assert_eq!("win32".parse::<Platform>().unwrap(), Platform::Windows);
        let err = "plan9".parse::<Platform>().unwrap_err();
        assert!(err.to_string().contains("unknown platform"));
    }
}
