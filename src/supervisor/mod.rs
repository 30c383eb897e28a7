//! Backend service supervisor
//!
//! Starts, health-verifies and stops the long-running backend process the
//! desktop host depends on:
//! - Launch-parameter resolution per runtime mode and platform
//! - Process launch with captured output
//! - Output relay into the host log
//! - Bounded readiness polling over HTTP
//! - Graceful-then-forced shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Supervisor                   │
//! │          (state machine, public API)         │
//! ├───────────────┬───────────────┬──────────────┤
//! │ ConfigResolver│   launcher    │ HealthPoller │
//! │ (paths, env)  │ (reaper task) │ (GET /health)│
//! ├───────────────┴───────────────┴──────────────┤
//! │      OutputRelay (tracing + LogBuffer)       │
//! └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod health;
pub mod launcher;
pub mod lifecycle;
pub mod log_buffer;
pub mod output;
pub mod state;

pub use config::{ConfigResolver, Platform, ResolverInputs, RuntimeMode, ServiceConfig};
pub use health::{HealthCheckResult, HealthPolicy, HealthPoller};
pub use launcher::{launch, ChildOutput, ExitInfo, ProcessEvent, ProcessHandle};
pub use lifecycle::{Supervisor, SupervisorSettings};
pub use log_buffer::{LogBuffer, OutputLine};
pub use output::{OutputRelay, OutputStream};
pub use state::LifecycleState;
