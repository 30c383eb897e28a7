//! The supervisor's state machine and public API.
//!
//! State and the in-flight start outcome live under one synchronous gate,
//! so check-and-transition is atomic. The async bodies of start and stop are
//! serialised by a second, async lock that also owns the process handle.
//! Only a caller that moved the state into `Starting` or `Stopping` (the
//! "leader") takes that lock; everyone else waits on the state channel.

use super::config::{ConfigResolver, Platform, ResolverInputs, RuntimeMode, ServiceConfig};
use super::health::{HealthPolicy, HealthPoller};
use super::launcher::{self, ProcessEvent, ProcessHandle};
use super::log_buffer::{LogBuffer, OutputLine, DEFAULT_MAX_LINES};
use super::output::OutputRelay;
use super::state::LifecycleState;
use crate::error::{Result, SupervisorError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(5_000);
const DEFAULT_KILL_CONFIRM: Duration = Duration::from_millis(5_000);

/// Timing policy for a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub health: HealthPolicy,
    /// How long `stop()` waits after SIGTERM before escalating
    pub stop_grace: Duration,
    /// How long to wait for exit confirmation after a forced kill
    pub kill_confirm: Duration,
    /// Backend output lines retained for `recent_output`
    pub output_lines: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            health: HealthPolicy::default(),
            stop_grace: DEFAULT_STOP_GRACE,
            kill_confirm: DEFAULT_KILL_CONFIRM,
            output_lines: DEFAULT_MAX_LINES,
        }
    }
}

type Outcome = Option<Result<()>>;

struct Gate {
    state: LifecycleState,
    /// Outcome channel of the start attempt in flight, for joiners
    attempt: Option<watch::Receiver<Outcome>>,
    /// Bumped for every start attempt; stale exit monitors compare against it
    generation: u64,
    service_url: String,
    pid: Option<u32>,
}

#[derive(Default)]
struct Slot {
    handle: Option<ProcessHandle>,
    config: Option<ServiceConfig>,
}

struct Inner {
    mode: RuntimeMode,
    platform: Platform,
    resolver: ConfigResolver,
    settings: SupervisorSettings,
    poller: HealthPoller,
    relay: OutputRelay,
    gate: Mutex<Gate>,
    state_tx: watch::Sender<LifecycleState>,
    slot: tokio::sync::Mutex<Slot>,
}

/// Supervises one backend service process.
///
/// Constructed once by the host and shared by reference (or `Arc`).
/// `start()` and `stop()` are idempotent and safe to call concurrently.
pub struct Supervisor {
    inner: Arc<Inner>,
}

enum StartTicket {
    Lead(watch::Sender<Outcome>, u64),
    Join(watch::Receiver<Outcome>),
    Wait(LifecycleState),
}

enum StopTicket {
    Lead,
    Wait(LifecycleState),
}

impl Supervisor {
    pub fn new(
        mode: RuntimeMode,
        platform: Platform,
        inputs: ResolverInputs,
        settings: SupervisorSettings,
    ) -> Result<Self> {
        let resolver = ConfigResolver::new(inputs);
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        let inner = Inner {
            mode,
            platform,
            gate: Mutex::new(Gate {
                state: LifecycleState::Idle,
                attempt: None,
                generation: 0,
                service_url: resolver.base_url(),
                pid: None,
            }),
            resolver,
            settings,
            poller: HealthPoller::new()?,
            relay: OutputRelay::new(Arc::new(LogBuffer::new(settings.output_lines))),
            state_tx,
            slot: tokio::sync::Mutex::new(Slot::default()),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn mode(&self) -> RuntimeMode {
        self.inner.mode
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.gate().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state_tx.subscribe()
    }

    /// `http://{host}:{port}` of the last resolved config. Defined even when
    /// not running; callers check [`is_running`](Self::is_running) first.
    pub fn service_url(&self) -> String {
        self.inner.gate().service_url.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.gate().pid
    }

    /// Most recent `n` lines of backend output.
    pub fn recent_output(&self, n: usize) -> Vec<OutputLine> {
        self.inner.relay.buffer().tail(n)
    }

    /// Launch the backend and wait until it reports healthy.
    ///
    /// Returns immediately when already running. A call made while another
    /// start is in flight shares that attempt's outcome instead of spawning
    /// a second process. A call made during `stop()` waits for the stop to
    /// finish and then starts.
    pub async fn start(&self) -> Result<()> {
        loop {
            let ticket = {
                let mut gate = self.inner.gate();
                match gate.state {
                    LifecycleState::Running => return Ok(()),
                    LifecycleState::Starting => match gate.attempt.clone() {
                        Some(rx) => StartTicket::Join(rx),
                        None => StartTicket::Wait(LifecycleState::Starting),
                    },
                    LifecycleState::Stopping => StartTicket::Wait(LifecycleState::Stopping),
                    LifecycleState::Idle | LifecycleState::Stopped => {
                        let (tx, rx) = watch::channel(None);
                        gate.attempt = Some(rx);
                        gate.generation += 1;
                        let generation = gate.generation;
                        self.inner.transition(&mut gate, LifecycleState::Starting);
                        StartTicket::Lead(tx, generation)
                    }
                }
            };

            match ticket {
                StartTicket::Lead(tx, generation) => return self.lead_start(tx, generation).await,
                StartTicket::Join(rx) => {
                    debug!("Joining in-flight backend start");
                    return join_attempt(rx).await;
                }
                StartTicket::Wait(state) => self.inner.wait_while(state).await,
            }
        }
    }

    /// Terminate the backend: SIGTERM, then SIGKILL once the grace period
    /// passes. A no-op when nothing is running. A call made while a start is
    /// in flight waits for it to settle and then stops.
    pub async fn stop(&self) {
        loop {
            let ticket = {
                let mut gate = self.inner.gate();
                match gate.state {
                    LifecycleState::Idle | LifecycleState::Stopped => return,
                    LifecycleState::Starting | LifecycleState::Stopping => {
                        StopTicket::Wait(gate.state)
                    }
                    LifecycleState::Running => {
                        self.inner.transition(&mut gate, LifecycleState::Stopping);
                        StopTicket::Lead
                    }
                }
            };

            match ticket {
                StopTicket::Lead => return self.lead_stop().await,
                StopTicket::Wait(state) => self.inner.wait_while(state).await,
            }
        }
    }

    async fn lead_start(&self, tx: watch::Sender<Outcome>, generation: u64) -> Result<()> {
        let mut guard = TransitionGuard::new(Arc::clone(&self.inner), LifecycleState::Idle);

        let mut slot = self.inner.slot.lock().await;
        let outcome = self.inner.launch_until_ready(&mut slot, &mut guard).await;

        {
            let mut gate = self.inner.gate();
            gate.attempt = None;
            match &outcome {
                Ok(()) => {
                    gate.pid = slot.handle.as_ref().and_then(ProcessHandle::pid);
                    self.inner.transition(&mut gate, LifecycleState::Running);
                }
                Err(e) => {
                    error!(kind = e.kind(), error = %e, "Backend failed to start");
                    self.inner.transition(&mut gate, LifecycleState::Idle);
                }
            }
            guard.disarm();
        }

        let events = match &outcome {
            Ok(()) => slot.handle.as_ref().map(ProcessHandle::events),
            Err(_) => None,
        };
        drop(slot);
        if let Some(events) = events {
            self.spawn_exit_monitor(events, generation);
        }

        tx.send_replace(Some(outcome.clone()));
        outcome
    }

    async fn lead_stop(&self) {
        let mut guard = TransitionGuard::new(Arc::clone(&self.inner), LifecycleState::Stopped);

        let mut slot = self.inner.slot.lock().await;
        slot.config = None;
        if let Some(handle) = slot.handle.take() {
            guard.track_exit(handle.events());
            self.inner.shutdown(handle).await;
        }
        drop(slot);

        let mut gate = self.inner.gate();
        gate.pid = None;
        self.inner.transition(&mut gate, LifecycleState::Stopped);
        guard.disarm();
    }

    fn spawn_exit_monitor(&self, mut events: watch::Receiver<Option<ProcessEvent>>, generation: u64) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let observed = events
                .wait_for(Option::is_some)
                .await
                .map(|event| event.clone());
            let Ok(Some(event)) = observed else {
                return;
            };
            if let Some(inner) = inner.upgrade() {
                inner.on_process_exit(event, generation);
            }
        });
    }
}

impl Inner {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, gate: &mut Gate, next: LifecycleState) {
        let previous = gate.state;
        gate.state = next;
        self.state_tx.send_replace(next);
        info!(from = %previous, to = %next, "Backend lifecycle transition");
    }

    /// Park until the state is no longer `state`.
    async fn wait_while(&self, state: LifecycleState) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|current| *current != state).await;
    }

    async fn launch_until_ready(
        &self,
        slot: &mut Slot,
        guard: &mut TransitionGuard,
    ) -> Result<()> {
        // A handle left behind by an unexpected exit belongs to a dead process.
        slot.handle = None;
        slot.config = None;

        let config = self.resolver.resolve(self.mode, self.platform)?;
        let base_url = config.base_url();
        self.gate().service_url = base_url.clone();

        let (mut handle, output) = launcher::launch(&config)?;
        guard.track_exit(handle.events());
        self.relay.attach(output);

        let health = &self.settings.health;
        let polled = tokio::select! {
            polled = self.poller.wait_until_ready(&base_url, health) => polled,
            event = handle.wait_exit() => {
                return Err(SupervisorError::ExitedDuringStartup(event));
            }
        };

        match polled {
            Ok(true) => {
                slot.handle = Some(handle);
                slot.config = Some(config);
                Ok(())
            }
            Ok(false) => {
                self.discard(&mut handle).await;
                Err(SupervisorError::StartupTimeout {
                    url: base_url,
                    attempts: health.max_attempts,
                })
            }
            Err(e) => {
                self.discard(&mut handle).await;
                Err(e)
            }
        }
    }

    /// Kill an unhealthy process and wait (bounded) for it to be gone.
    async fn discard(&self, handle: &mut ProcessHandle) {
        handle.kill();
        if tokio::time::timeout(self.settings.kill_confirm, handle.wait_exit())
            .await
            .is_err()
        {
            error!(pid = ?handle.pid(), "Backend did not confirm exit after kill");
        }
    }

    /// Graceful-then-forced termination.
    async fn shutdown(&self, mut handle: ProcessHandle) {
        let pid = handle.pid();
        info!(pid = ?pid, "Stopping backend gracefully");
        handle.terminate();

        match tokio::time::timeout(self.settings.stop_grace, handle.wait_exit()).await {
            Ok(event) => info!(pid = ?pid, event = %event, "Backend stopped"),
            Err(_) => {
                warn!(
                    pid = ?pid,
                    grace_ms = self.settings.stop_grace.as_millis() as u64,
                    "Backend did not stop within grace period, force killing"
                );
                handle.kill();
                match tokio::time::timeout(self.settings.kill_confirm, handle.wait_exit()).await {
                    Ok(event) => info!(pid = ?pid, event = %event, "Backend killed"),
                    Err(_) => error!(pid = ?pid, "Backend did not confirm exit after kill"),
                }
            }
        }
    }

    fn settle_abandoned(&self, fallback: LifecycleState) {
        let mut gate = self.gate();
        self.transition(&mut gate, fallback);
    }

    fn on_process_exit(&self, event: ProcessEvent, generation: u64) {
        let mut gate = self.gate();
        if gate.generation != generation || gate.state != LifecycleState::Running {
            debug!(state = %gate.state, event = %event, "Backend exit observed");
            return;
        }

        let err = SupervisorError::UnexpectedExit(event);
        error!(kind = err.kind(), error = %err, "Backend stopped on its own");
        gate.pid = None;
        self.transition(&mut gate, LifecycleState::Stopped);

        // Nobody leads while Running, so the slot is free.
        if let Ok(mut slot) = self.slot.try_lock() {
            slot.handle = None;
            slot.config = None;
        }
    }
}

/// Wait for the leader of a start attempt to publish its outcome.
async fn join_attempt(mut rx: watch::Receiver<Outcome>) -> Result<()> {
    let observed = rx.wait_for(Option::is_some).await.map(|outcome| outcome.clone());
    match observed {
        Ok(Some(outcome)) => outcome,
        _ => Err(SupervisorError::StartAbandoned),
    }
}

/// Restores a settled state if a leader's future is dropped mid-flight.
///
/// When the dropped leader had a live process, the state stays put until
/// the reaper reports the exit (bounded by `kill_confirm`), so a follow-up
/// `start()` cannot overlap the old process.
struct TransitionGuard {
    inner: Arc<Inner>,
    fallback: LifecycleState,
    armed: bool,
    exit: Option<watch::Receiver<Option<ProcessEvent>>>,
}

impl TransitionGuard {
    fn new(inner: Arc<Inner>, fallback: LifecycleState) -> Self {
        Self {
            inner,
            fallback,
            armed: true,
            exit: None,
        }
    }

    /// Hold the fallback transition until this process has ended.
    fn track_exit(&mut self, events: watch::Receiver<Option<ProcessEvent>>) {
        self.exit = Some(events);
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        {
            let mut gate = self.inner.gate();
            warn!(state = %gate.state, fallback = %self.fallback, "Lifecycle operation abandoned");
            gate.attempt = None;
            gate.pid = None;
        }

        let pending = self.exit.take().filter(|events| events.borrow().is_none());
        let runtime = tokio::runtime::Handle::try_current();
        match (pending, runtime) {
            (Some(mut events), Ok(runtime)) => {
                let inner = Arc::clone(&self.inner);
                let fallback = self.fallback;
                runtime.spawn(async move {
                    let bound = inner.settings.kill_confirm;
                    if tokio::time::timeout(bound, events.wait_for(Option::is_some))
                        .await
                        .is_err()
                    {
                        error!("Abandoned backend did not confirm exit after kill");
                    }
                    inner.settle_abandoned(fallback);
                });
            }
            _ => self.inner.settle_abandoned(self.fallback),
        }
    }
}
