//! Switchboard - a call-control runtime
//!
//! Routes inbound telephony sessions to application-defined controllers and
//! drives each call through an asynchronous command/event protocol: outputs,
//! digit collection, recording, and interruptible playback, with one actor
//! task owning every session's lifecycle.

pub mod call;
pub mod command;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod process;
pub mod registry;
pub mod router;
pub mod speech;
pub mod statistics;
pub mod transport;

// Re-export commonly used types
pub use call::{CallDirection, CallHandle, CallId, CallState, EndReason, SessionProfile};
pub use config::Config;
pub use controller::{CallController, CallHandler, OutputOptions, PlayItem, SayInput};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use router::Router;
