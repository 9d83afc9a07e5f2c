//! Calls registry
//!
//! Process-wide map from session id to live call handle. Safe for concurrent
//! mutation from many call tasks; callers never take locks themselves.

use crate::call::{CallHandle, CallId};
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct CallRegistry {
    calls: RwLock<HashMap<CallId, CallHandle>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call under its session id
    ///
    /// Exactly one call instance may exist per session id; a duplicate id is
    /// a contract violation and is rejected.
    pub fn register(&self, handle: CallHandle) -> Result<()> {
        let mut calls = self.calls.write().unwrap();
        if calls.contains_key(handle.id()) {
            return Err(EngineError::AlreadyExists(handle.id().to_string()));
        }
        calls.insert(handle.id().clone(), handle);
        Ok(())
    }

    /// Remove a call on termination
    ///
    /// Deregistering an unknown id is a contract violation.
    pub fn deregister(&self, id: &CallId) -> Result<CallHandle> {
        let mut calls = self.calls.write().unwrap();
        calls
            .remove(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub fn find(&self, id: &CallId) -> Option<CallHandle> {
        let calls = self.calls.read().unwrap();
        calls.get(id).cloned()
    }

    /// Point-in-time snapshot of all registered calls
    ///
    /// Concurrent adds/removes during enumeration are not reflected.
    pub fn snapshot(&self) -> Vec<CallHandle> {
        let calls = self.calls.read().unwrap();
        calls.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let calls = self.calls.read().unwrap();
        calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
