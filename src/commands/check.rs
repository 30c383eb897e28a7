use super::HostSetup;
use crate::args::LaunchArgs;
use anyhow::{bail, Result};
use backend_supervisor::supervisor::{ConfigResolver, HealthPoller};
use std::time::Duration;

pub(crate) async fn cmd_check(
    args: LaunchArgs,
    url: Option<String>,
    attempts: Option<u32>,
    interval_ms: Option<u64>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let setup = HostSetup::load(&args)?;
    let url = url.unwrap_or_else(|| ConfigResolver::new(setup.inputs).base_url());

    let mut policy = setup.settings.health;
    if let Some(attempts) = attempts {
        policy.max_attempts = attempts;
    }
    if let Some(ms) = interval_ms {
        policy.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = timeout_ms {
        policy.attempt_timeout = Duration::from_millis(ms);
    }

    println!(
        "Checking {} (up to {} attempts, {:?} apart)",
        HealthPoller::health_url(&url)?,
        policy.max_attempts,
        policy.interval
    );

    let poller = HealthPoller::new()?;
    if !poller.wait_until_ready(&url, &policy).await? {
        bail!(
            "Backend at {url} did not become healthy after {} attempts",
            policy.max_attempts
        );
    }

    println!("Backend at {url} is healthy");
    Ok(())
}
