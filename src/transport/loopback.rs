//! In-memory transport
//!
//! Drives scripted event sequences for the demo binary and tests. Outputs
//! complete immediately unless a script is queued for them; inputs stay
//! silent unless scripted, mirroring a caller who never presses a key.

use crate::call::{CallId, EventSink};
use crate::command::{CommandKind, CompletionReason, CorrelationId};
use crate::transport::{ProtocolEvent, ProtocolEventKind, Transport, TransportError, WireCommand};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted event with the delay before its delivery
#[derive(Debug, Clone)]
pub struct ScriptedEvent {
    pub delay: Duration,
    pub kind: ProtocolEventKind,
}

impl ScriptedEvent {
    pub fn immediate(kind: ProtocolEventKind) -> Self {
        Self {
            delay: Duration::ZERO,
            kind,
        }
    }

    pub fn after(delay: Duration, kind: ProtocolEventKind) -> Self {
        Self { delay, kind }
    }
}

#[derive(Default)]
struct LoopbackInner {
    sinks: HashMap<CallId, EventSink>,
    in_flight: HashMap<CorrelationId, CallId>,
    output_scripts: VecDeque<Vec<ScriptedEvent>>,
    input_scripts: VecDeque<Vec<ScriptedEvent>>,
    sent: Vec<WireCommand>,
    stops: Vec<CorrelationId>,
    fail_sends: bool,
}

#[derive(Default)]
pub struct LoopbackTransport {
    inner: Mutex<LoopbackInner>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the events for the next output command; an empty script keeps
    /// the command pending forever
    pub fn script_output(&self, events: Vec<ScriptedEvent>) {
        self.inner.lock().unwrap().output_scripts.push_back(events);
    }

    /// Script the events for the next input command
    pub fn script_input(&self, events: Vec<ScriptedEvent>) {
        self.inner.lock().unwrap().input_scripts.push_back(events);
    }

    /// Make every subsequent `send` fail as a lost connection
    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_sends = fail;
    }

    /// Commands sent so far, in order
    pub fn sent(&self) -> Vec<WireCommand> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Stop requests received so far, in order
    pub fn stops(&self) -> Vec<CorrelationId> {
        self.inner.lock().unwrap().stops.clone()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, command: WireCommand) -> Result<CorrelationId, TransportError> {
        let (sink, script, correlation_id) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_sends {
                return Err(TransportError::ConnectionLost);
            }

            let script = match &command.command.kind {
                CommandKind::Output { .. } => {
                    inner.output_scripts.pop_front().unwrap_or_else(|| {
                        vec![ScriptedEvent::immediate(ProtocolEventKind::Complete(
                            CompletionReason::Finished,
                        ))]
                    })
                }
                CommandKind::Input { .. } => {
                    inner.input_scripts.pop_front().unwrap_or_default()
                }
                CommandKind::Record { .. } | CommandKind::Dial { .. } | CommandKind::Hangup => {
                    vec![ScriptedEvent::immediate(ProtocolEventKind::Complete(
                        CompletionReason::Finished,
                    ))]
                }
            };

            let correlation_id = CorrelationId::random();
            let sink = inner.sinks.get(&command.call_id).cloned();
            inner
                .in_flight
                .insert(correlation_id.clone(), command.call_id.clone());
            inner.sent.push(command);
            (sink, script, correlation_id)
        };

        if let Some(sink) = sink {
            let corr = correlation_id.clone();
            tokio::spawn(async move {
                for event in script {
                    if !event.delay.is_zero() {
                        tokio::time::sleep(event.delay).await;
                    }
                    sink.deliver(ProtocolEvent {
                        correlation_id: corr.clone(),
                        kind: event.kind,
                    });
                }
            });
        }

        Ok(correlation_id)
    }

    async fn stop(&self, correlation_id: &CorrelationId) -> Result<(), TransportError> {
        let sink = {
            let mut inner = self.inner.lock().unwrap();
            inner.stops.push(correlation_id.clone());
            inner
                .in_flight
                .get(correlation_id)
                .and_then(|call_id| inner.sinks.get(call_id))
                .cloned()
        };

        if let Some(sink) = sink {
            sink.deliver(ProtocolEvent {
                correlation_id: correlation_id.clone(),
                kind: ProtocolEventKind::Stopped,
            });
        }
        Ok(())
    }

    fn on_event(&self, call_id: &CallId, sink: EventSink) {
        self.inner.lock().unwrap().sinks.insert(call_id.clone(), sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandOptions, OutputDocument};
    use crate::speech::Document;

    fn wire_output(call_id: &CallId) -> WireCommand {
        WireCommand {
            call_id: call_id.clone(),
            command: Command::new(
                CommandKind::Output {
                    document: OutputDocument::Inline(Document::text("hi")),
                },
                CommandOptions::default(),
            ),
        }
    }

    #[tokio::test]
    async fn test_send_acknowledges_with_correlation_id() {
        let transport = LoopbackTransport::new();
        let call_id = CallId::new("c1");

        let first = transport.send(wire_output(&call_id)).await.unwrap();
        let second = transport.send(wire_output(&call_id)).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_sends() {
        let transport = LoopbackTransport::new();
        transport.fail_sends(true);

        let result = transport.send(wire_output(&CallId::new("c1"))).await;
        assert_eq!(result, Err(TransportError::ConnectionLost));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_recorded() {
        let transport = LoopbackTransport::new();
        let correlation_id = transport
            .send(wire_output(&CallId::new("c1")))
            .await
            .unwrap();

        transport.stop(&correlation_id).await.unwrap();
        assert_eq!(transport.stops(), vec![correlation_id]);
    }
}
