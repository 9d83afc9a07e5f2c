//! Session identity and metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique session identifier, stable for the lifetime of the call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
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

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Metadata the signaling layer delivers with a new session
///
/// Route predicates are evaluated against this profile; they must not block
/// or mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProfile {
    pub id: CallId,
    pub direction: CallDirection,
    pub from: String,
    pub to: String,
    pub headers: HashMap<String, String>,
    pub offered_at: DateTime<Utc>,
}

impl SessionProfile {
    pub fn inbound(id: CallId, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id,
            direction: CallDirection::Inbound,
            from: from.into(),
            to: to.into(),
            headers: HashMap::new(),
            offered_at: Utc::now(),
        }
    }

    pub fn outbound(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            id: CallId::random(),
            direction: CallDirection::Outbound,
            from: from.into(),
            to: to.into(),
            headers: HashMap::new(),
            offered_at: Utc::now(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_profile() {
        let profile = SessionProfile::inbound(CallId::new("c1"), "alice", "sip:100@pbx");
        assert_eq!(profile.direction, CallDirection::Inbound);
        assert_eq!(profile.to, "sip:100@pbx");
    }

    #[test]
    fn test_headers() {
        let profile = SessionProfile::inbound(CallId::random(), "alice", "bob")
            .with_header("X-Queue", "support");
        assert_eq!(profile.header("X-Queue"), Some("support"));
        assert_eq!(profile.header("X-Missing"), None);
    }
}
