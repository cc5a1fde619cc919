//! Session state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle of one generation session. Once the session is torn down it is
/// no longer tracked, so there is no explicit destroyed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    CheckingAvailability,
    Downloading,
    CreatingSession,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::CheckingAvailability => "checking_availability",
            SessionState::Downloading => "downloading",
            SessionState::CreatingSession => "creating_session",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Whether moving from `self` to `next` follows the state machine.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) | (_, Failed) => true,
            (Created, CheckingAvailability) => true,
            (CheckingAvailability, Downloading) => true,
            (CheckingAvailability, CreatingSession) => true,
            (Downloading, CreatingSession) => true,
            (CreatingSession, Streaming) => true,
            (Streaming, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
