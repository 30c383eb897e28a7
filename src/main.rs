mod args;
mod commands;

use args::{Cli, Commands};
use backend_supervisor::logging;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init("info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { launch } => commands::run::cmd_run(launch).await?,
        Commands::Check {
            launch,
            url,
            attempts,
            interval_ms,
            timeout_ms,
        } => commands::check::cmd_check(launch, url, attempts, interval_ms, timeout_ms).await?,
        Commands::Config { launch } => commands::config::cmd_config(launch)?,
    }

    Ok(())
}
