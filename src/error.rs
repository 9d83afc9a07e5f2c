//! Engine errors

use thiserror::Error;

/// Standard result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed verb input. Never issues a command; fails the verb synchronously.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The media layer reported that playback of an output command failed.
    /// Fatal to the verb, not to the call.
    #[error("Playback failed: {0}")]
    Playback(String),

    /// A non-output component failed on the protocol side.
    #[error("Component failed: {0}")]
    Component(String),

    /// A command's deadline elapsed before a terminal event arrived.
    #[error("Command timed out")]
    Timeout,

    /// The transport connection dropped while commands were in flight.
    #[error("Connection to the signaling layer was lost")]
    ConnectionLost,

    /// No route matched the inbound session and no fallback is configured.
    #[error("No route matched session: {0}")]
    NoRoute(String),

    /// The process is not admitting new sessions.
    #[error("Service unavailable: process is {0}")]
    ServiceUnavailable(String),

    /// Invalid environment/config values at startup. Fatal to process boot.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Programming-contract violation on a lifecycle state machine.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The transport rejected or failed a request for a reason other than
    /// connection loss.
    #[error("Transport error: {0}")]
    Transport(String),
}
