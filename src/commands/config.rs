use super::HostSetup;
use crate::args::LaunchArgs;
use anyhow::{Context, Result};
use backend_supervisor::supervisor::ConfigResolver;

pub(crate) fn cmd_config(args: LaunchArgs) -> Result<()> {
    let setup = HostSetup::load(&args)?;
    let config = ConfigResolver::new(setup.inputs).resolve(setup.mode, setup.platform)?;

    let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{json}");
    Ok(())
}
