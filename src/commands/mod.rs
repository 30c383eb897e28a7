pub mod check;
pub mod config;
pub mod run;

use crate::args::LaunchArgs;
use anyhow::{Context, Result};
use backend_supervisor::clienv;
use backend_supervisor::supervisor::config::{DEFAULT_HOST, DEFAULT_PORT};
use backend_supervisor::user_config::UserConfig;
use backend_supervisor::{Platform, ResolverInputs, RuntimeMode, SupervisorSettings};

/// Everything the host resolves once at startup before building a supervisor.
pub(crate) struct HostSetup {
    pub mode: RuntimeMode,
    pub platform: Platform,
    pub inputs: ResolverInputs,
    pub settings: SupervisorSettings,
}

impl HostSetup {
    /// Layer CLI flags over environment over `supervisor.toml` over defaults.
    pub fn load(args: &LaunchArgs) -> Result<Self> {
        let file = UserConfig::load()?;

        let mode_name = args.mode.clone().unwrap_or_else(clienv::runtime_mode);
        let mode: RuntimeMode = mode_name
            .parse()
            .with_context(|| format!("Invalid runtime mode '{mode_name}'"))?;
        let platform = Platform::current()?;

        let inputs = ResolverInputs {
            host: args
                .host
                .clone()
                .or_else(clienv::host)
                .or_else(|| file.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args
                .port
                .or_else(clienv::port)
                .or(file.port)
                .unwrap_or(DEFAULT_PORT),
            source_root: clienv::source_root(),
            resources_root: clienv::resources_dir(),
            data_root: clienv::data_dir(),
        };

        let mut settings = SupervisorSettings::default();
        file.apply(&mut settings);

        tracing::debug!(mode = %mode, platform = %platform, inputs = ?inputs, "Host setup resolved");
        Ok(Self {
            mode,
            platform,
            inputs,
            settings,
        })
    }
}
