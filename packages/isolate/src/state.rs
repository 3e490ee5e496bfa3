//! The isolate state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an isolate.
///
/// ```text
/// Created -> Running <-> Paused
///    \          |          /
///     `----> Destroyed <--'
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolateState {
    Created,
    Running,
    Paused,
    Destroyed,
}

impl IsolateState {
    pub fn can_transition_to(self, to: IsolateState) -> bool {
        use IsolateState::*;
        matches!(
            (self, to),
            (Created, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Created | Running | Paused, Destroyed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == IsolateState::Destroyed
    }
}

impl fmt::Display for IsolateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IsolateState::Created => "created",
            IsolateState::Running => "running",
            IsolateState::Paused => "paused",
            IsolateState::Destroyed => "destroyed",
        })
    }
}
