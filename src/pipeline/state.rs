//! Run state machine
//!
//! ```text
//! Pending -> Running(stage) -> [AwaitingApproval(stage)] -> Running(next) -> ... -> Completed
//! ```
//!
//! `Rejected`, `Cancelled` and `Failed` are terminal. Any other move is refused.

use crate::pipeline::stage::StageKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running(StageKind),
    AwaitingApproval(StageKind),
    Completed,
    Rejected,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Cancelled | Self::Failed
        )
    }

    fn allows(self, to: RunState) -> bool {
        use RunState::*;
        match (self, to) {
            (Pending, Running(StageKind::Discovery)) => true,
            (Pending, Cancelled) => true,
            (Running(s), AwaitingApproval(t)) => s == t,
            (Running(s), Running(t)) => s.next() == Some(t),
            (Running(StageKind::Validation), Completed) => true,
            (Running(_), Failed | Cancelled) => true,
            // Revision reruns the same stage
            (AwaitingApproval(s), Running(t)) => s == t || s.next() == Some(t),
            (AwaitingApproval(StageKind::Validation), Completed) => true,
            (AwaitingApproval(_), Rejected | Cancelled | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running(stage) => write!(f, "running({stage})"),
            Self::AwaitingApproval(stage) => write!(f, "awaiting_approval({stage})"),
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid run state transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

/// Current state plus the timestamped history of every state entered
#[derive(Debug, Clone, Serialize)]
pub struct RunStateMachine {
    state: RunState,
    history: Vec<(RunState, DateTime<Utc>)>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            history: vec![(RunState::Pending, Utc::now())],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[(RunState, DateTime<Utc>)] {
        &self.history
    }

    pub fn transition(&mut self, to: RunState) -> Result<(), TransitionError> {
        let from = self.state;
        if !from.allows(to) {
            return Err(TransitionError { from, to });
        }

        info!(from = %from, to = %to, "Run state changed");
        self.state = to;
        self.history.push((to, Utc::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StageKind::*;

    #[test]
    fn test_full_happy_path() {
        let mut machine = RunStateMachine::new();
        for to in [
            RunState::Running(Discovery),
            RunState::AwaitingApproval(Discovery),
            RunState::Running(Extraction),
            RunState::Running(Validation),
            RunState::Completed,
        ] {
            machine.transition(to).unwrap();
        }

        assert_eq!(machine.state(), RunState::Completed);
        assert_eq!(machine.history().len(), 6);
    }

    #[test]
    fn test_revision_reruns_same_stage() {
        let mut machine = RunStateMachine::new();
        machine.transition(RunState::Running(Discovery)).unwrap();
        machine.transition(RunState::AwaitingApproval(Discovery)).unwrap();
        machine.transition(RunState::Running(Discovery)).unwrap();
        assert_eq!(machine.state(), RunState::Running(Discovery));
    }

    #[test]
    fn test_rejects_skipping_stages() {
        let mut machine = RunStateMachine::new();
        let err = machine.transition(RunState::Running(Extraction)).unwrap_err();
        assert_eq!(err.from, RunState::Pending);

        machine.transition(RunState::Running(Discovery)).unwrap();
        assert!(machine.transition(RunState::Running(Validation)).is_err());
        assert!(machine.transition(RunState::Completed).is_err());
        assert_eq!(machine.state(), RunState::Running(Discovery));
    }

    #[test]
    fn test_rejection_only_from_approval() {
        let mut machine = RunStateMachine::new();
        machine.transition(RunState::Running(Discovery)).unwrap();
        assert!(machine.transition(RunState::Rejected).is_err());

        machine.transition(RunState::AwaitingApproval(Discovery)).unwrap();
        machine.transition(RunState::Rejected).unwrap();
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [RunState::Failed, RunState::Cancelled] {
            let mut machine = RunStateMachine::new();
            machine.transition(RunState::Running(Discovery)).unwrap();
            machine.transition(terminal).unwrap();
            assert!(machine.transition(RunState::Running(Discovery)).is_err());
            assert!(machine.transition(RunState::Completed).is_err());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RunState::AwaitingApproval(Discovery).to_string(),
            "awaiting_approval(discovery)"
        );
    }
}
