//! Run state machine
//!
//! Tracks one engine's progress through a run. Every run ends in exactly
//! one terminal state; there is no resume from `Aborted` or `Failed`.

/// Why a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The actuator lost its hardware link
    ConnectionLost,
}

/// Run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// No run has started yet
    #[default]
    Idle,
    /// Program executing
    Running,
    /// Every block executed
    Completed,
    /// Cancelled by the caller
    Aborted,
    /// Stopped by a fatal actuator error
    Failed(FailReason),
}

/// Events that drive run state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// A new run begins
    Start,
    /// The last block finished
    Finish,
    /// Cancellation observed (or the run was dropped)
    Cancel,
    /// The actuator reported connection loss
    LinkLost,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }

    /// Check if this is an end state of a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Aborted | RunState::Failed(_)
        )
    }

    /// Process an event and return the next state
    pub fn transition(self, event: RunEvent) -> Self {
        use RunEvent::*;
        use RunState::*;

        match (self, event) {
            // A run always starts fresh
            (Idle | Completed | Aborted | Failed(_), Start) => Running,

            (Running, Finish) => Completed,
            (Running, Cancel) => Aborted,
            (Running, LinkLost) => Failed(FailReason::ConnectionLost),

            // Default: stay in current state
            _ => self,
        }
    }
}
