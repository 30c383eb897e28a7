use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "backend-supervisor")]
#[command(version)]
#[command(about = "Launch, health-check and stop the desktop backend service", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that resolves a launch config.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct LaunchArgs {
    /// Runtime mode: development or production. Can also be set via BACKEND_SUPERVISOR_MODE.
    #[arg(long)]
    pub mode: Option<String>,

    /// Host the backend binds to
    #[arg(long)]
    pub host: Option<String>,

    /// Port the backend listens on
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start the backend, wait until it is healthy, and stop it on Ctrl+C
    Run {
        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Poll a backend's health endpoint until it is ready or the attempts run out
    Check {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Service URL to probe (default: derived from host and port)
        #[arg(long)]
        url: Option<String>,

        /// Maximum number of probes
        #[arg(long)]
        attempts: Option<u32>,

        /// Pause between probes in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Per-probe timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the resolved launch configuration as JSON
    Config {
        #[command(flatten)]
        launch: LaunchArgs,
    },
}
