//! Call: the per-session concurrency unit
//!
//! One actor task owns each session's lifecycle; controllers drive it
//! through a cloneable handle and the transport integration feeds it events.

pub mod actor;
pub mod session;
pub mod state;

pub use actor::{CallHandle, EventSink, RaceOutcome};
pub use session::{CallDirection, CallId, SessionProfile};
pub use state::{CallState, EndReason};

pub(crate) use actor::CallActor;

#[cfg(test)]
pub(crate) use actor::test_support;
