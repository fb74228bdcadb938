//! Connector state machine

use crate::{Error, Result};

/// State of an initial connection sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// Initial state (no attempt made yet)
    Idle,

    /// Connect operation in progress
    Attempting,

    /// Sleeping between attempts after a transient failure
    Waiting,

    /// Connection established (terminal)
    Succeeded,

    /// Every attempt failed (terminal)
    Exhausted,
}

impl ConnectorState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectorState) -> bool {
        use ConnectorState::*;

        matches!(
            (self, next),
            (Idle, Attempting)
                | (Attempting, Succeeded)
                | (Attempting, Waiting)
                | (Attempting, Exhausted)
                | (Waiting, Attempting)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectorState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::Config(format!(
                "invalid connector transition from {} to {}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Attempting => write!(f, "attempting"),
            Self::Waiting => write!(f, "waiting"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}
