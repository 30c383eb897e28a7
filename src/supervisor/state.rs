use std::fmt;

/// Lifecycle of the supervised backend process.
///
/// `Idle` is the initial state and the state a failed start returns to.
/// `Stopped` is reached after a completed stop or an unexpected exit; a new
/// start re-enters `Starting` from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No process has been started, or the last start failed
    #[default]
    Idle,
    /// Process launched, waiting for the health endpoint
    Starting,
    /// Health endpoint answered; the backend is usable
    Running,
    /// Termination requested, waiting for the process to exit
    Stopping,
    /// Process is gone
    Stopped,
}

impl LifecycleState {
    pub fn is_running(&self) -> bool {
        matches!(self, LifecycleState::Running)
    }

    /// No process exists and none is on its way up or down.
    pub fn is_settled(&self) -> bool {
        matches!(self, LifecycleState::Idle | LifecycleState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_running() {
        assert!(LifecycleState::Running.is_running());
        for state in [
            LifecycleState::Idle,
            LifecycleState::Starting,
            LifecycleState::Stopping,
            LifecycleState::Stopped,
        ] {
            assert!(!state.is_running(), "{state} must not report running");
        }
    }

    #[test]
    fn settled_states() {
        assert!(LifecycleState::Idle.is_settled());
        assert!(LifecycleState::Stopped.is_settled());
        assert!(!LifecycleState::Starting.is_settled());
        assert!(!LifecycleState::Stopping.is_settled());
        assert_eq!(LifecycleState::default(), LifecycleState::Idle);
    }
}
