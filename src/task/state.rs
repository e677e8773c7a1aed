//! Task lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// State of the task manager's single task slot.
///
/// # State Machine
///
/// ```text
/// Idle       -> Submitting, Streaming
/// Submitting -> Streaming, Completed, Errored, Cancelled
/// Streaming  -> Completed, Cancelled, TimedOut, Errored
/// Completed | Cancelled | TimedOut | Errored -> Idle
/// ```
///
/// `Submitting -> Completed` covers a backend that answers the submission
/// with the final project instead of a task id.
///
/// # Examples
///
/// ```
/// use flowsync::task::TaskState;
///
/// assert!(TaskState::Streaming.can_transition_to(&TaskState::TimedOut));
/// assert!(!TaskState::Completed.can_transition_to(&TaskState::Streaming));
/// assert!(!TaskState::Idle.can_transition_to(&TaskState::Idle));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// No task.
    #[default]
    Idle,
    /// A submission is in flight.
    Submitting,
    /// The task channel is open and results are streaming.
    Streaming,
    /// The channel closed cleanly (terminal).
    Completed,
    /// The task was cancelled (terminal).
    Cancelled,
    /// The wall-clock ceiling elapsed (terminal).
    TimedOut,
    /// Submission or transport failed (terminal).
    Errored,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Submitting => write!(f, "submitting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

impl TaskState {
    /// Returns `true` for the states that end a task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::TimedOut | Self::Errored
        )
    }

    /// Returns `true` if moving from this state to `next` is allowed.
    ///
    /// Self-transitions are rejected.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self == next {
            return false;
        }

        match self {
            Self::Idle => matches!(next, Self::Submitting | Self::Streaming),
            Self::Submitting => matches!(
                next,
                Self::Streaming | Self::Completed | Self::Errored | Self::Cancelled
            ),
            Self::Streaming => matches!(
                next,
                Self::Completed | Self::Cancelled | Self::TimedOut | Self::Errored
            ),
            Self::Completed | Self::Cancelled | Self::TimedOut | Self::Errored => {
                matches!(next, Self::Idle)
            },
        }
    }

    /// Validates a transition, returning [`Error::InvalidTransition`] when
    /// it is not allowed.
    pub fn validate_transition(&self, next: &Self) -> Result<(), Error> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: *self,
                to: *next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskState; 7] = [
        TaskState::Idle,
        TaskState::Submitting,
        TaskState::Streaming,
        TaskState::Completed,
        TaskState::Cancelled,
        TaskState::TimedOut,
        TaskState::Errored,
    ];

    #[test]
    fn terminal_states_only_return_to_idle() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert_eq!(from.can_transition_to(&to), to == TaskState::Idle);
            }
        }
    }

    #[test]
    fn no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(&state));
        }
    }

    #[test]
    fn streaming_cannot_restart_submission() {
        let err = TaskState::Streaming
            .validate_transition(&TaskState::Submitting)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid task transition from streaming to submitting"
        );
    }

    #[test]
    fn display_matches_serde() {
        for state in ALL {
            let wire = serde_json::to_value(state).unwrap();
            assert_eq!(wire.as_str().unwrap(), state.to_string());
        }
    }
}
