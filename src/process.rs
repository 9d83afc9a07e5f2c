//! Process readiness state machine
//!
//! One instance exists per runtime. The router consults it before admitting
//! new sessions; operators read it for health checks. Transitions are
//! one-directional except the `Running <-> Rejecting` backpressure toggle.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Booting,
    Running,
    /// Temporary backpressure sub-mode of `Running`: new sessions are
    /// refused without shutting down
    Rejecting,
    Stopping,
    Stopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Booting => "booting",
            ProcessState::Running => "running",
            ProcessState::Rejecting => "rejecting",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Process-wide readiness gate
pub struct Process {
    state: RwLock<ProcessState>,
}

impl Process {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProcessState::Booting),
        }
    }

    pub fn current(&self) -> ProcessState {
        *self.state.read().unwrap()
    }

    /// New sessions are admitted only while fully running
    pub fn is_accepting(&self) -> bool {
        self.current() == ProcessState::Running
    }

    /// Startup complete
    pub fn boot_complete(&self) -> Result<ProcessState> {
        self.transition(ProcessState::Running, |from| from == ProcessState::Booting)
    }

    /// Toggle planned backpressure without a full shutdown
    pub fn set_rejecting(&self, rejecting: bool) -> Result<ProcessState> {
        if rejecting {
            self.transition(ProcessState::Rejecting, |from| from == ProcessState::Running)
        } else {
            self.transition(ProcessState::Running, |from| from == ProcessState::Rejecting)
        }
    }

    /// Shutdown requested
    pub fn shutdown(&self) -> Result<ProcessState> {
        self.transition(ProcessState::Stopping, |from| {
            matches!(
                from,
                ProcessState::Booting | ProcessState::Running | ProcessState::Rejecting
            )
        })
    }

    /// Shutdown finished
    pub fn stopped(&self) -> Result<ProcessState> {
        self.transition(ProcessState::Stopped, |from| from == ProcessState::Stopping)
    }

    fn transition(
        &self,
        to: ProcessState,
        valid_from: impl Fn(ProcessState) -> bool,
    ) -> Result<ProcessState> {
        let mut state = self.state.write().unwrap();
        if !valid_from(*state) {
            return Err(EngineError::InvalidStateTransition(format!(
                "cannot transition from {} to {}",
                *state, to
            )));
        }
        let from = *state;
        *state = to;
        Ok(from)
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_lifecycle() {
        let process = Process::new();
        assert_eq!(process.current(), ProcessState::Booting);
        assert!(!process.is_accepting());

        process.boot_complete().unwrap();
        assert_eq!(process.current(), ProcessState::Running);
        assert!(process.is_accepting());

        process.shutdown().unwrap();
        assert_eq!(process.current(), ProcessState::Stopping);

        process.stopped().unwrap();
        assert_eq!(process.current(), ProcessState::Stopped);
    }

    #[test]
    fn test_rejecting_toggle() {
        let process = Process::new();
        process.boot_complete().unwrap();

        process.set_rejecting(true).unwrap();
        assert_eq!(process.current(), ProcessState::Rejecting);
        assert!(!process.is_accepting());

        process.set_rejecting(false).unwrap();
        assert_eq!(process.current(), ProcessState::Running);
        assert!(process.is_accepting());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let process = Process::new();
        assert!(process.stopped().is_err());
        assert!(process.set_rejecting(true).is_err());

        process.boot_complete().unwrap();
        assert!(process.boot_complete().is_err());

        process.shutdown().unwrap();
        process.stopped().unwrap();
        assert!(process.shutdown().is_err());
        assert!(process.boot_complete().is_err());
    }
}
