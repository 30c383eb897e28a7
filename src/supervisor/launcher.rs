use super::config::ServiceConfig;
use crate::error::{Result, SupervisorError};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// How the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    /// Terminating signal (unix only)
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Terminal event observed on a launched process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Exited(ExitInfo),
    /// Waiting on the process failed; its fate is unknown
    Errored { cause: String },
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessEvent::Exited(info) => info.fmt(f),
            ProcessEvent::Errored { cause } => write!(f, "process error: {cause}"),
        }
    }
}

/// Captured output streams, split off the handle for the output relay.
pub struct ChildOutput {
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Exclusive reference to a launched backend process.
///
/// The OS child itself is owned by a reaper task; the handle talks to it
/// through channels. Dropping the handle kills the process.
pub struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    events: watch::Receiver<Option<ProcessEvent>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// New subscription to the terminal event. Holds `None` until the
    /// process ends.
    pub fn events(&self) -> watch::Receiver<Option<ProcessEvent>> {
        self.events.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.events.borrow().is_some()
    }

    /// Ask the process to exit (SIGTERM on unix).
    pub fn terminate(&mut self) {
        if self.has_exited() {
            return;
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                // SAFETY: kill(2) only reads its integer arguments; an invalid
                // pid makes it fail with ESRCH.
                let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if result != 0 {
                    debug!(
                        pid,
                        error = %std::io::Error::last_os_error(),
                        "SIGTERM delivery failed"
                    );
                }
            }
        }

        #[cfg(not(unix))]
        {
            self.kill();
        }
    }

    /// Force the process to exit. Only the first call has an effect.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Resolves once the process has ended.
    pub async fn wait_exit(&self) -> ProcessEvent {
        let mut events = self.events.clone();
        let observed = events.wait_for(Option::is_some).await.map(|event| event.clone());
        match observed {
            Ok(Some(event)) => event,
            _ => ProcessEvent::Errored {
                cause: "process monitor stopped without reporting an exit".to_string(),
            },
        }
    }
}

/// Spawn the backend described by `config`.
///
/// Standard input is closed and both output streams are piped; the streams
/// are returned separately so they can be attached to an
/// [`OutputRelay`](super::output::OutputRelay). Must be called from within a
/// tokio runtime.
pub fn launch(config: &ServiceConfig) -> Result<(ProcessHandle, ChildOutput)> {
    let mut cmd = Command::new(&config.executable_path);
    cmd.args(config.args())
        .current_dir(&config.working_directory)
        .envs(&config.environment_variables)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| SupervisorError::launch(&config.executable_path, e))?;

    let pid = child.id();
    info!(
        pid = ?pid,
        executable = %config.executable_path.display(),
        host = %config.host,
        port = config.port,
        "Launched backend process"
    );

    let output = ChildOutput {
        stdout: child.stdout.take(),
        stderr: child.stderr.take(),
    };

    let (kill_tx, kill_rx) = oneshot::channel();
    let (events_tx, events_rx) = watch::channel(None);
    tokio::spawn(reap(child, pid, kill_rx, events_tx));

    Ok((
        ProcessHandle {
            pid,
            kill_tx: Some(kill_tx),
            events: events_rx,
        },
        output,
    ))
}

/// Owns the child until it exits, forcing it down on request or when the
/// handle is dropped, then publishes the terminal event.
async fn reap(
    mut child: Child,
    pid: Option<u32>,
    kill_rx: oneshot::Receiver<()>,
    events: watch::Sender<Option<ProcessEvent>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            debug!(pid = ?pid, "Force killing backend process");
            if let Err(e) = child.start_kill() {
                warn!(pid = ?pid, error = %e, "Failed to send kill signal");
            }
            child.wait().await
        }
    };

    let event = match status {
        Ok(status) => ProcessEvent::Exited(ExitInfo::from_status(status)),
        Err(e) => ProcessEvent::Errored {
            cause: e.to_string(),
        },
    };
    debug!(pid = ?pid, event = %event, "Backend process ended");
    events.send_replace(Some(event));
}
