//! Shared fixtures for supervisor integration tests.
//!
//! - `StubBackend` installs a `/bin/sh` script where production mode looks
//!   for the bundled backend executable
//! - `HealthStub` serves `/health` on an ephemeral port with scripted
//!   readiness, standing in for the backend's HTTP side

#![allow(dead_code)]
#![cfg(unix)]

use axum::{http::StatusCode, routing::get, Router};
use backend_supervisor::supervisor::HealthPolicy;
use backend_supervisor::{
    LifecycleState, Platform, ResolverInputs, RuntimeMode, Supervisor, SupervisorSettings,
};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Records its pid, then sleeps until signalled.
pub const SLEEPER: &str = r#"echo $$ >> "$BACKEND_DATA_DIR/spawns"
echo $$ > "$BACKEND_DATA_DIR/pid"
echo "stub backend on $2:$4"
exec sleep 30"#;

/// Like `SLEEPER`, but deaf to SIGTERM.
pub const IGNORES_SIGTERM: &str = r#"trap '' TERM
echo $$ >> "$BACKEND_DATA_DIR/spawns"
echo $$ > "$BACKEND_DATA_DIR/pid"
exec sleep 30"#;

/// Like `SLEEPER`, but first notes whether the previous spawn is still alive.
pub const CHECKS_PREDECESSOR: &str = r#"if [ -f "$BACKEND_DATA_DIR/pid" ] && kill -0 "$(cat "$BACKEND_DATA_DIR/pid")" 2>/dev/null; then
  echo overlap >> "$BACKEND_DATA_DIR/overlaps"
fi
echo $$ >> "$BACKEND_DATA_DIR/spawns"
echo $$ > "$BACKEND_DATA_DIR/pid"
exec sleep 30"#;

/// Dies right away with exit code 3.
pub const CRASHES: &str = r#"echo "fatal: cannot open database" >&2
exit 3"#;

pub struct HealthStub {
    pub port: u16,
    hits: Arc<AtomicUsize>,
}

impl HealthStub {
    /// Answers 503 until the `n`-th probe, then 200.
    pub async fn ready_after(n: usize) -> Self {
        Self::spawn(Some(n)).await
    }

    /// Always answers 503.
    pub async fn never_ready() -> Self {
        Self::spawn(None).await
    }

    async fn spawn(ready_after: Option<usize>) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/health",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    match ready_after {
                        Some(n) if hit >= n => StatusCode::OK,
                        _ => StatusCode::SERVICE_UNAVAILABLE,
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind health stub");
        let port = listener.local_addr().expect("stub address").port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve health stub");
        });

        Self { port, hits }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub struct StubBackend {
    dir: TempDir,
    resources: PathBuf,
    data: PathBuf,
}

impl StubBackend {
    pub fn install(script: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let resources = dir.path().join("Resources");
        let backend_dir = resources.join("backend");
        std::fs::create_dir_all(&backend_dir).expect("create backend dir");

        let exe = backend_dir.join("backend-server");
        std::fs::write(&exe, format!("#!/bin/sh\n{script}\n")).expect("write stub");
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755))
            .expect("chmod stub");

        // Left uncreated: production resolution creates it.
        let data = dir.path().join("user-data");

        Self {
            dir,
            resources,
            data,
        }
    }

    pub fn supervisor(&self, port: u16, settings: SupervisorSettings) -> Supervisor {
        let inputs = ResolverInputs {
            host: "127.0.0.1".to_string(),
            port,
            source_root: self.dir.path().to_path_buf(),
            resources_root: Some(self.resources.clone()),
            data_root: Some(self.data.clone()),
        };
        Supervisor::new(
            RuntimeMode::Production,
            Platform::current().expect("supported platform"),
            inputs,
            settings,
        )
        .expect("build supervisor")
    }

    pub fn spawn_count(&self) -> usize {
        std::fs::read_to_string(self.data.join("spawns"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    /// Spawns that started while their predecessor was still alive.
    pub fn overlap_count(&self) -> usize {
        std::fs::read_to_string(self.data.join("overlaps"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    pub fn recorded_pid(&self) -> Option<i32> {
        std::fs::read_to_string(self.data.join("pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

pub fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        health: HealthPolicy {
            max_attempts: 40,
            interval: Duration::from_millis(50),
            attempt_timeout: Duration::from_millis(500),
        },
        stop_grace: Duration::from_secs(2),
        kill_confirm: Duration::from_secs(2),
        output_lines: 100,
    }
}

pub fn is_alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    unsafe { libc::kill(pid, 0) == 0 }
}

pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub async fn wait_for_state(
    supervisor: &Supervisor,
    state: LifecycleState,
    timeout: Duration,
) -> bool {
    let mut states = supervisor.subscribe();
    tokio::time::timeout(timeout, states.wait_for(|current| *current == state))
        .await
        .map(|reached| reached.is_ok())
        .unwrap_or(false)
}

/// Formatted events emitted on the current thread, for asserting on what
/// the supervisor logged.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Capture INFO and above until the guard drops. Current-thread
    /// runtimes poll every spawned task on this thread, so their events
    /// are captured too.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
