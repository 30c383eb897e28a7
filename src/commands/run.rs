use super::HostSetup;
use crate::args::LaunchArgs;
use anyhow::Result;
use backend_supervisor::{LifecycleState, Supervisor};
use tracing::{info, warn};

const FAILURE_OUTPUT_LINES: usize = 20;

pub(crate) async fn cmd_run(args: LaunchArgs) -> Result<()> {
    let setup = HostSetup::load(&args)?;
    let supervisor = Supervisor::new(setup.mode, setup.platform, setup.inputs, setup.settings)?;

    println!("Starting backend ({} mode)...", supervisor.mode());

    if let Err(e) = supervisor.start().await {
        eprintln!("Backend failed to start: {e}");
        let recent = supervisor.recent_output(FAILURE_OUTPUT_LINES);
        if !recent.is_empty() {
            eprintln!("Last backend output:");
            for line in recent {
                eprintln!("  {line}");
            }
        }
        return Err(e.into());
    }

    println!(
        "Backend ready at {} (PID {})",
        supervisor.service_url(),
        supervisor
            .pid()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    let mut states = supervisor.subscribe();
    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown requested"),
        _ = states.wait_for(|state| *state == LifecycleState::Stopped) => {
            warn!("Backend stopped on its own");
        }
    }

    supervisor.stop().await;
    println!("Backend stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
