//! Transport boundary
//!
//! The transport is the client library that ships commands to the signaling
//! and media layer and delivers the events that report their progress. The
//! engine only depends on the [`Transport`] trait; [`LoopbackTransport`]
//! provides an in-memory implementation for the demo binary and tests.

pub mod loopback;

pub use loopback::{LoopbackTransport, ScriptedEvent};

use crate::call::{CallId, EventSink};
use crate::command::{Command, CompletionReason, CorrelationId};
use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A command addressed to one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCommand {
    pub call_id: CallId,
    pub command: Command,
}

/// Progress report for an acknowledged command
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolEvent {
    pub correlation_id: CorrelationId,
    pub kind: ProtocolEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEventKind {
    /// The remote end began executing the command
    Started,
    /// The command reached its natural terminal state
    Complete(CompletionReason),
    /// The command was stopped before completing
    Stopped,
    /// The command itself failed on the remote end
    Error(String),
}

/// Errors surfaced by the transport boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("connection lost")]
    ConnectionLost,
    #[error("command rejected: {0}")]
    Rejected(String),
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionLost => EngineError::ConnectionLost,
            TransportError::Rejected(reason) => EngineError::Transport(reason),
        }
    }
}

/// The consumed wire-protocol client
///
/// `send` returns once the remote end has acknowledged receipt; the returned
/// correlation id links the command to its subsequent events. `stop` is a
/// best-effort cancellation request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, command: WireCommand) -> Result<CorrelationId, TransportError>;

    async fn stop(&self, correlation_id: &CorrelationId) -> Result<(), TransportError>;

    /// Register the event-delivery entry point for one session
    fn on_event(&self, call_id: &CallId, sink: EventSink);
}
