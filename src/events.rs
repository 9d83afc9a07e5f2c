//! Lifecycle events bus
//!
//! Process-wide publish/subscribe for call lifecycle notifications and
//! uncaught-error propagation. Fan-out is synchronous and in subscription
//! order; one failing subscriber never prevents delivery to the rest.

use crate::call::{CallId, EndReason};
use crate::call::CallDirection;
use crate::process::ProcessState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    CallStarted,
    CallEnded,
    ProcessStateChanged,
    Exception,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    CallStarted {
        call_id: CallId,
        direction: CallDirection,
    },
    CallEnded {
        call_id: CallId,
        reason: EndReason,
    },
    ProcessStateChanged {
        from: ProcessState,
        to: ProcessState,
    },
    Exception {
        message: String,
        call_id: Option<CallId>,
    },
}

type Handler = Arc<dyn Fn(&EventPayload) -> Result<(), String> + Send + Sync>;

/// Cloneable handle to the shared bus
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<EventTopic, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: EventTopic, handler: F)
    where
        F: Fn(&EventPayload) -> Result<(), String> + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.entry(topic).or_default().push(Arc::new(handler));
    }

    /// Deliver a payload to every current subscriber of the topic, in
    /// subscription order
    ///
    /// A subscriber error is reported once on the exception topic; errors
    /// from exception-topic handlers themselves are logged and dropped.
    pub fn trigger(&self, topic: EventTopic, payload: EventPayload) {
        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.read().unwrap();
            subscribers.get(&topic).cloned().unwrap_or_default()
        };

        for handler in handlers {
            if let Err(message) = handler(&payload) {
                if topic == EventTopic::Exception {
                    warn!(error = %message, "exception-topic subscriber failed, dropping");
                } else {
                    warn!(?topic, error = %message, "event subscriber failed");
                    self.trigger(
                        EventTopic::Exception,
                        EventPayload::Exception {
                            message,
                            call_id: None,
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn call_ended(id: &str) -> EventPayload {
        EventPayload::CallEnded {
            call_id: CallId::new(id),
            reason: EndReason::Hangup,
        }
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(EventTopic::CallEnded, move |_| {
                order.write().unwrap().push(tag);
                Ok(())
            });
        }

        bus.trigger(EventTopic::CallEnded, call_ended("c1"));
        assert_eq!(*order.read().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_subscriber_does_not_block_the_rest() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventTopic::CallEnded, |_| Err("boom".to_string()));
        let counter = delivered.clone();
        bus.subscribe(EventTopic::CallEnded, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.trigger(EventTopic::CallEnded, call_ended("c1"));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_error_reported_on_exception_topic() {
        let bus = EventBus::new();
        let exceptions = Arc::new(AtomicUsize::new(0));

        let counter = exceptions.clone();
        bus.subscribe(EventTopic::Exception, move |payload| {
            assert!(matches!(payload, EventPayload::Exception { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.subscribe(EventTopic::CallStarted, |_| Err("boom".to_string()));

        bus.trigger(
            EventTopic::CallStarted,
            EventPayload::CallStarted {
                call_id: CallId::new("c1"),
                direction: CallDirection::Inbound,
            },
        );
        assert_eq!(exceptions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_exception_handler_is_not_retried() {
        let bus = EventBus::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        bus.subscribe(EventTopic::Exception, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("handler is itself broken".to_string())
        });
        bus.subscribe(EventTopic::CallStarted, |_| Err("boom".to_string()));

        bus.trigger(
            EventTopic::CallStarted,
            EventPayload::CallStarted {
                call_id: CallId::new("c1"),
                direction: CallDirection::Inbound,
            },
        );
        // Reported once, then dropped; never recursively retried.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trigger_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.trigger(EventTopic::CallEnded, call_ended("c1"));
    }
}
