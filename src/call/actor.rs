//! Per-call actor
//!
//! Each session gets one task that exclusively owns the command queue and
//! the correlation table. All interaction goes through message passing: a
//! controller submits commands via [`CallHandle`] and the transport
//! integration delivers events via [`EventSink`]. Commands are sent to the
//! transport strictly in submission order; a synchronous verb suspends only
//! the controller's task, never this dispatch loop, so events (including
//! stop acknowledgments) keep flowing while a verb waits.

use crate::call::session::{CallDirection, CallId, SessionProfile};
use crate::call::state::{CallState, EndReason};
use crate::command::{
    Command, CommandFailure, CommandHandle, CommandKind, CommandState, CorrelationId,
};
use crate::error::{EngineError, Result};
use crate::events::{EventBus, EventPayload, EventTopic};
use crate::registry::CallRegistry;
use crate::transport::{ProtocolEvent, ProtocolEventKind, Transport, TransportError, WireCommand};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;
use tracing::{debug, info, warn};

pub(crate) enum CallMessage {
    Submit {
        command: Command,
        reply: oneshot::Sender<Result<CommandHandle>>,
    },
    Event(ProtocolEvent),
    Stop(CorrelationId),
    ForceTimeout(CorrelationId),
    Answered,
    Terminated(EndReason),
}

/// Event-delivery entry point handed to the transport boundary
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<CallMessage>,
}

impl EventSink {
    /// Deliver a protocol event for this session; events for a dead call
    /// are silently dropped
    pub fn deliver(&self, event: ProtocolEvent) {
        let _ = self.tx.send(CallMessage::Event(event));
    }

    /// Signal that the transport connection for this session failed
    pub fn connection_lost(&self) {
        let _ = self
            .tx
            .send(CallMessage::Terminated(EndReason::ConnectionLost));
    }
}

/// Outcome of the interruption race between an output and an input command
#[derive(Debug)]
pub enum RaceOutcome {
    /// The input reached a terminal state first; the output has been stopped
    /// and its terminal event already discarded
    InputWon(CommandState),
    /// The output reached its natural end first; the input was not cancelled
    /// and is returned still live
    OutputDone {
        output: CommandState,
        input: CommandHandle,
    },
}

/// Cloneable client for one call's actor
#[derive(Clone)]
pub struct CallHandle {
    id: CallId,
    direction: CallDirection,
    tx: mpsc::UnboundedSender<CallMessage>,
    state: watch::Receiver<CallState>,
}

impl CallHandle {
    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// Submit a command and return once the transport acknowledges it
    pub async fn execute_async(&self, command: Command) -> Result<CommandHandle> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(CallMessage::Submit { command, reply })
            .map_err(|_| EngineError::ConnectionLost)?;
        response.await.map_err(|_| EngineError::ConnectionLost)?
    }

    /// Submit a command and wait until it reaches a terminal state
    ///
    /// Honors the command's own timeout: when the deadline elapses the
    /// command is forced to a local `Timeout` error and a best-effort stop
    /// is sent to the transport.
    pub async fn execute(&self, command: Command) -> Result<CommandState> {
        let deadline = command.options.timeout;
        let mut handle = self.execute_async(command).await?;
        match deadline {
            Some(duration) => match time::timeout(duration, handle.await_terminal()).await {
                Ok(state) => Ok(state),
                Err(_) => {
                    let _ = self
                        .tx
                        .send(CallMessage::ForceTimeout(handle.correlation_id().clone()));
                    Ok(CommandState::Error(CommandFailure::Timeout))
                }
            },
            None => Ok(handle.await_terminal().await),
        }
    }

    /// Run the interruption race: input submitted first (listening begins
    /// before playback), then output; whichever reaches a terminal state
    /// first wins, deterministically
    pub async fn race_output_input(&self, output: Command, input: Command) -> Result<RaceOutcome> {
        let mut input_handle = self.execute_async(input).await?;
        let mut output_handle = self.execute_async(output).await?;

        tokio::select! {
            biased;
            input_state = input_handle.await_terminal() => {
                self.stop(output_handle.correlation_id().clone());
                let _ = output_handle.await_terminal().await;
                Ok(RaceOutcome::InputWon(input_state))
            }
            output_state = output_handle.await_terminal() => {
                Ok(RaceOutcome::OutputDone {
                    output: output_state,
                    input: input_handle,
                })
            }
        }
    }

    /// Request a best-effort stop for an in-flight command
    pub fn stop(&self, correlation_id: CorrelationId) {
        let _ = self.tx.send(CallMessage::Stop(correlation_id));
    }

    /// Mark the session answered
    pub fn answered(&self) {
        let _ = self.tx.send(CallMessage::Answered);
    }

    /// Terminate the session (transport signaled its end, or forced
    /// termination during shutdown)
    pub fn terminated(&self, reason: EndReason) {
        let _ = self.tx.send(CallMessage::Terminated(reason));
    }

    /// Signal that the transport connection for this session failed
    pub fn connection_lost(&self) {
        self.terminated(EndReason::ConnectionLost);
    }

    /// Deliver a protocol event for this session
    pub fn deliver_event(&self, event: ProtocolEvent) {
        let _ = self.tx.send(CallMessage::Event(event));
    }
}

struct PendingCommand {
    state: watch::Sender<CommandState>,
    is_hangup: bool,
}

/// The actor owning one session's lifecycle
pub(crate) struct CallActor {
    id: CallId,
    state: CallState,
    state_tx: watch::Sender<CallState>,
    transport: Arc<dyn Transport>,
    registry: Arc<CallRegistry>,
    events: EventBus,
    rx: mpsc::UnboundedReceiver<CallMessage>,
    pending: HashMap<CorrelationId, PendingCommand>,
    ended: bool,
}

impl CallActor {
    /// Create the actor, register its handle, and spawn its dispatch loop
    ///
    /// Registration happens before the task starts so a duplicate session id
    /// never spawns a second actor.
    pub(crate) fn spawn(
        profile: &SessionProfile,
        transport: Arc<dyn Transport>,
        registry: Arc<CallRegistry>,
        events: EventBus,
    ) -> Result<CallHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(CallState::Unanswered);

        let handle = CallHandle {
            id: profile.id.clone(),
            direction: profile.direction,
            tx: tx.clone(),
            state: state_rx,
        };
        registry.register(handle.clone())?;

        transport.on_event(&profile.id, EventSink { tx });

        let actor = CallActor {
            id: profile.id.clone(),
            state: CallState::Unanswered,
            state_tx,
            transport,
            registry,
            events,
            rx,
            pending: HashMap::new(),
            ended: false,
        };
        tokio::spawn(actor.run());

        Ok(handle)
    }

    async fn run(mut self) {
        debug!(call_id = %self.id, "call actor started");
        while let Some(message) = self.rx.recv().await {
            match message {
                CallMessage::Submit { command, reply } => {
                    self.handle_submit(command, reply).await;
                }
                CallMessage::Event(event) => self.handle_event(event),
                CallMessage::Stop(correlation_id) => {
                    if let Err(error) = self.transport.stop(&correlation_id).await {
                        warn!(call_id = %self.id, %correlation_id, %error, "stop request failed");
                    }
                }
                CallMessage::ForceTimeout(correlation_id) => {
                    self.handle_force_timeout(correlation_id).await;
                }
                CallMessage::Answered => {
                    if self.state.can_transition_to(CallState::Active) {
                        self.set_state(CallState::Active);
                    }
                }
                CallMessage::Terminated(reason) => self.finish(reason),
            }
            if self.ended {
                break;
            }
        }
        if !self.ended {
            // All handles dropped without an explicit end signal.
            self.finish(EndReason::ConnectionLost);
        }
        debug!(call_id = %self.id, "call actor stopped");
    }

    async fn handle_submit(&mut self, command: Command, reply: oneshot::Sender<Result<CommandHandle>>) {
        if !self.state.is_live() {
            let _ = reply.send(Err(EngineError::ConnectionLost));
            return;
        }

        let command_id = command.id;
        let is_hangup = matches!(command.kind, CommandKind::Hangup);
        let wire = WireCommand {
            call_id: self.id.clone(),
            command,
        };

        match self.transport.send(wire).await {
            Ok(correlation_id) => {
                let (state_tx, state_rx) = watch::channel(CommandState::Executing);
                self.pending.insert(
                    correlation_id.clone(),
                    PendingCommand {
                        state: state_tx,
                        is_hangup,
                    },
                );
                let _ = reply.send(Ok(CommandHandle::new(command_id, correlation_id, state_rx)));
            }
            Err(TransportError::ConnectionLost) => {
                let _ = reply.send(Err(EngineError::ConnectionLost));
                self.finish(EndReason::ConnectionLost);
            }
            Err(error) => {
                let _ = reply.send(Err(error.into()));
            }
        }
    }

    fn handle_event(&mut self, event: ProtocolEvent) {
        let next = match event.kind {
            ProtocolEventKind::Started => CommandState::Executing,
            ProtocolEventKind::Complete(reason) => CommandState::Complete(reason),
            ProtocolEventKind::Stopped => CommandState::Stopped,
            ProtocolEventKind::Error(message) => {
                CommandState::Error(CommandFailure::Platform(message))
            }
        };

        if next.is_terminal() {
            match self.pending.remove(&event.correlation_id) {
                Some(pending) => {
                    let _ = pending.state.send(next);
                    if pending.is_hangup {
                        self.finish(EndReason::Hangup);
                    }
                }
                None => {
                    // Out-of-order or duplicate delivery is expected; never an error.
                    debug!(
                        call_id = %self.id,
                        correlation_id = %event.correlation_id,
                        "dropping event with unknown correlation id"
                    );
                }
            }
        } else if let Some(pending) = self.pending.get(&event.correlation_id) {
            let _ = pending.state.send(next);
        } else {
            debug!(
                call_id = %self.id,
                correlation_id = %event.correlation_id,
                "dropping event with unknown correlation id"
            );
        }
    }

    async fn handle_force_timeout(&mut self, correlation_id: CorrelationId) {
        if let Some(pending) = self.pending.remove(&correlation_id) {
            let _ = pending
                .state
                .send(CommandState::Error(CommandFailure::Timeout));
            if let Err(error) = self.transport.stop(&correlation_id).await {
                warn!(
                    call_id = %self.id,
                    %correlation_id,
                    %error,
                    "stop request after local timeout failed"
                );
            }
        }
    }

    /// Terminate exactly once: fail all pending commands, transition to
    /// `Ended`, deregister, and publish the lifecycle event
    fn finish(&mut self, reason: EndReason) {
        if self.ended {
            return;
        }
        self.ended = true;

        for (_, pending) in self.pending.drain() {
            let _ = pending
                .state
                .send(CommandState::Error(CommandFailure::ConnectionLost));
        }

        self.set_state(CallState::Ended);
        if let Err(error) = self.registry.deregister(&self.id) {
            debug!(call_id = %self.id, %error, "call was not registered at teardown");
        }
        self.events.trigger(
            EventTopic::CallEnded,
            EventPayload::CallEnded {
                call_id: self.id.clone(),
                reason: reason.clone(),
            },
        );
        info!(call_id = %self.id, ?reason, "call ended");
    }

    fn set_state(&mut self, next: CallState) {
        self.state = next;
        let _ = self.state_tx.send(next);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Handle not backed by an actor, for registry tests
    pub(crate) fn detached_handle(id: CallId) -> CallHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(CallState::Unanswered);
        CallHandle {
            id,
            direction: CallDirection::Inbound,
            tx,
            state: state_rx,
        }
    }
}
