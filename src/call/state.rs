//! Call lifecycle state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session lifecycle state
///
/// Exactly one call instance exists per session id for its whole life; the
/// state below tracks where in that life the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Offered but not yet answered
    Unanswered,
    /// Answered and joined to media
    Active,
    /// Answered, media on hold
    Held,
    /// Answered but not joined to any media
    Unjoined,
    /// Terminated; no further transitions
    Ended,
}

impl CallState {
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;
        match (self, next) {
            (Unanswered, Active) | (Unanswered, Ended) => true,
            (Active, Held) | (Active, Unjoined) | (Active, Ended) => true,
            (Held, Active) | (Held, Ended) => true,
            (Unjoined, Active) | (Unjoined, Ended) => true,
            _ => false,
        }
    }

    /// True until the session has terminated
    pub fn is_live(&self) -> bool {
        !matches!(self, CallState::Ended)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Unanswered => "unanswered",
            CallState::Active => "active",
            CallState::Held => "held",
            CallState::Unjoined => "unjoined",
            CallState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Hung up locally or by the remote party
    Hangup,
    /// The transport connection failed
    ConnectionLost,
    /// Forced termination during process shutdown
    Shutdown,
    /// Unrecoverable protocol error
    ProtocolError(String),
}
