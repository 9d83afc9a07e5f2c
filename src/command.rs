//! Command model
//!
//! A command is one unit of call-control work shipped to the signaling layer
//! (play a document, collect digits, record, dial, hang up). Each command is
//! correlated with the events that report its progress and lives through the
//! state machine `Pending -> Executing -> {Complete, Stopped, Error}`.

use crate::speech::{Document, Grammar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Engine-local command identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier assigned by the transport when it acknowledges a command;
/// links the command to the events that report its progress
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An output document: either built inline or a reference to a pre-rendered
/// document executed as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputDocument {
    Inline(Document),
    Reference(String),
}

/// Recording parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOptions {
    pub format: String,
    pub max_duration: Option<Duration>,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            max_duration: None,
        }
    }
}

/// Command payload variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Render a speech document to the caller
    Output { document: OutputDocument },
    /// Collect input matching a grammar
    Input { grammar: Grammar },
    /// Record the session
    Record { options: RecordOptions },
    /// Place an outbound call leg
    Dial { to: String, from: Option<String> },
    /// Terminate the session
    Hangup,
}

/// Per-command options
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandOptions {
    pub voice: Option<String>,
    pub renderer: Option<String>,
    pub timeout: Option<Duration>,
}

/// One unit of work sent to the transport boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub kind: CommandKind,
    pub options: CommandOptions,
}

impl Command {
    pub fn new(kind: CommandKind, options: CommandOptions) -> Self {
        Self {
            id: CommandId::new(),
            kind,
            options,
        }
    }

    pub fn hangup() -> Self {
        Self::new(CommandKind::Hangup, CommandOptions::default())
    }
}

/// Why a command reached `Complete`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
    /// Ran to its natural end
    Finished,
    /// Input matched; carries the matched digit
    Match(char),
    /// Input terminated without a grammar match
    NoMatch,
    /// Input terminated without any input arriving
    NoInput,
}

/// Why a command reached `Error`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandFailure {
    /// Local synthetic failure: the command's deadline elapsed
    #[error("timed out")]
    Timeout,
    /// The transport connection dropped while the command was pending
    #[error("connection lost")]
    ConnectionLost,
    /// The transport rejected the command as malformed
    #[error("rejected: {0}")]
    Rejected(String),
    /// The remote end reported the command itself failed
    #[error("{0}")]
    Platform(String),
}

/// Command lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandState {
    Pending,
    Executing,
    Complete(CompletionReason),
    Stopped,
    Error(CommandFailure),
}

impl CommandState {
    /// No further transition occurs from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::Complete(_) | CommandState::Stopped | CommandState::Error(_)
        )
    }
}

/// Live handle to an in-flight command
///
/// Returned once the transport has acknowledged the command. The terminal
/// state can be polled with [`state`](Self::state) or awaited with
/// [`await_terminal`](Self::await_terminal); state changes are observed in
/// the order the call received them.
#[derive(Debug)]
pub struct CommandHandle {
    id: CommandId,
    correlation_id: CorrelationId,
    state: watch::Receiver<CommandState>,
}

impl CommandHandle {
    pub(crate) fn new(
        id: CommandId,
        correlation_id: CorrelationId,
        state: watch::Receiver<CommandState>,
    ) -> Self {
        Self {
            id,
            correlation_id,
            state,
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Current state, without blocking
    pub fn state(&self) -> CommandState {
        self.state.borrow().clone()
    }

    /// Wait until the command reaches a terminal state
    ///
    /// If the owning call goes away before a terminal event arrives, the
    /// command is reported as failed with `ConnectionLost`.
    pub async fn await_terminal(&mut self) -> CommandState {
        loop {
            {
                let current = self.state.borrow_and_update().clone();
                if current.is_terminal() {
                    return current;
                }
            }
            if self.state.changed().await.is_err() {
                return CommandState::Error(CommandFailure::ConnectionLost);
            }
        }
    }
}
