//! Engine: runtime assembly and session admission
//!
//! Wires the router, registry, transport, event bus, and statistics into one
//! runtime, owns the process readiness state machine, and runs each routed
//! session's controller in its own task.

use crate::call::{CallActor, CallHandle, EndReason, SessionProfile};
use crate::command::{Command, CommandKind, CommandOptions, CommandState, CompletionReason};
use crate::config::Config;
use crate::controller::{CallController, CallHandler};
use crate::error::{EngineError, Result};
use crate::events::{EventBus, EventPayload, EventTopic};
use crate::process::{Process, ProcessState};
use crate::registry::CallRegistry;
use crate::router::Router;
use crate::statistics::Statistics;
use crate::transport::Transport;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct Engine {
    config: Arc<Config>,
    router: Router,
    transport: Arc<dyn Transport>,
    registry: Arc<CallRegistry>,
    process: Process,
    events: EventBus,
    statistics: Statistics,
    aggregator: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: Config, router: Router, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(CallRegistry::new());
        let statistics = Statistics::new(registry.clone());
        Self {
            config: Arc::new(config),
            router,
            transport,
            registry,
            process: Process::new(),
            events: EventBus::new(),
            statistics,
            aggregator: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    /// Finish boot: hook up statistics, start the aggregation task, and open
    /// the admission gate
    pub fn start(&self) -> Result<()> {
        self.statistics.attach(&self.events);
        let task = self
            .statistics
            .spawn_aggregator(self.config.statistics_interval());
        *self.aggregator.lock().unwrap() = Some(task);

        let from = self.process.boot_complete()?;
        self.publish_transition(from);
        info!("engine running");
        Ok(())
    }

    /// Toggle backpressure: refuse new sessions without shutting down
    pub fn set_rejecting(&self, rejecting: bool) -> Result<()> {
        let from = self.process.set_rejecting(rejecting)?;
        self.publish_transition(from);
        Ok(())
    }

    /// Admit an inbound session: route it, spawn its call actor, and run the
    /// matched controller in its own task
    ///
    /// A refused session (gate closed, no route, duplicate id) never spawns
    /// anything and is counted as rejected.
    pub fn handle_session(&self, profile: SessionProfile) -> Result<CallHandle> {
        self.statistics.record_offered();

        let handler = match self.router.dispatch(&self.process, &profile) {
            Ok(handler) => handler,
            Err(reason) => {
                self.statistics.record_rejected();
                warn!(call_id = %profile.id, %reason, "session refused");
                return Err(reason);
            }
        };

        let call = match CallActor::spawn(
            &profile,
            self.transport.clone(),
            self.registry.clone(),
            self.events.clone(),
        ) {
            Ok(call) => call,
            Err(reason) => {
                self.statistics.record_rejected();
                warn!(call_id = %profile.id, %reason, "session could not be admitted");
                return Err(reason);
            }
        };

        self.statistics.record_routed();
        self.events.trigger(
            EventTopic::CallStarted,
            EventPayload::CallStarted {
                call_id: profile.id.clone(),
                direction: profile.direction,
            },
        );
        info!(call_id = %profile.id, from = %profile.from, to = %profile.to, "session admitted");

        let controller = CallController::new(call.clone(), self.config.clone());
        self.spawn_controller(handler, controller);
        Ok(call)
    }

    /// Originate an outbound call and hand it to the given controller once
    /// the far end answers
    pub fn originate(
        &self,
        to: impl Into<String>,
        from: Option<String>,
        handler: Arc<dyn CallHandler>,
    ) -> Result<CallHandle> {
        if !self.process.is_accepting() {
            return Err(EngineError::ServiceUnavailable(
                self.process.current().to_string(),
            ));
        }

        let to = to.into();
        let profile = SessionProfile::outbound(to.clone(), from.clone().unwrap_or_default());
        let call = CallActor::spawn(
            &profile,
            self.transport.clone(),
            self.registry.clone(),
            self.events.clone(),
        )?;

        self.statistics.record_dialed();
        self.events.trigger(
            EventTopic::CallStarted,
            EventPayload::CallStarted {
                call_id: profile.id.clone(),
                direction: profile.direction,
            },
        );
        info!(call_id = %profile.id, %to, "originating outbound call");

        let dial = Command::new(
            CommandKind::Dial { to, from },
            CommandOptions {
                timeout: Some(self.config.command_timeout()),
                ..CommandOptions::default()
            },
        );
        let controller = CallController::new(call.clone(), self.config.clone());
        let events = self.events.clone();
        let dial_call = call.clone();
        let run = move |mut controller: CallController| async move {
            match dial_call.execute(dial).await {
                Ok(CommandState::Complete(CompletionReason::Finished)) => {
                    dial_call.answered();
                    run_controller(handler, &mut controller, &events).await;
                }
                Ok(state) => {
                    warn!(call_id = %dial_call.id(), ?state, "outbound dial did not connect");
                    dial_call.terminated(EndReason::ProtocolError(format!(
                        "dial failed: {state:?}"
                    )));
                }
                Err(reason) => {
                    warn!(call_id = %dial_call.id(), %reason, "outbound dial failed");
                    dial_call.terminated(EndReason::ProtocolError(reason.to_string()));
                }
            }
        };
        tokio::spawn(run(controller));
        Ok(call)
    }

    /// Stop admitting sessions, drain active calls for up to the grace
    /// period, then force-terminate whatever remains
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_grace(self.config.shutdown_grace()).await
    }

    pub async fn shutdown_with_grace(&self, grace: Duration) -> Result<()> {
        let from = self.process.shutdown()?;
        self.publish_transition(from);
        info!(active = self.registry.len(), "draining active calls");

        let deadline = tokio::time::Instant::now() + grace;
        while !self.registry.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        if !self.registry.is_empty() {
            warn!(
                remaining = self.registry.len(),
                "grace period elapsed, forcing termination"
            );
            for call in self.registry.snapshot() {
                call.terminated(EndReason::Shutdown);
            }
            // Actors process the signal promptly; wait a bounded moment.
            for _ in 0..100 {
                if self.registry.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        if let Some(task) = self.aggregator.lock().unwrap().take() {
            task.abort();
        }
        self.statistics.aggregate();

        let from = self.process.stopped()?;
        self.publish_transition(from);
        info!("engine stopped");
        Ok(())
    }

    fn spawn_controller(&self, handler: Arc<dyn CallHandler>, mut controller: CallController) {
        let events = self.events.clone();
        tokio::spawn(async move {
            run_controller(handler, &mut controller, &events).await;
        });
    }

    fn publish_transition(&self, from: ProcessState) {
        self.events.trigger(
            EventTopic::ProcessStateChanged,
            EventPayload::ProcessStateChanged {
                from,
                to: self.process.current(),
            },
        );
    }
}

/// Run a controller to completion; an error is published on the exception
/// topic and never unwinds past the call's task. Either way, a call still
/// live afterwards is hung up.
async fn run_controller(
    handler: Arc<dyn CallHandler>,
    controller: &mut CallController,
    events: &EventBus,
) {
    controller.begin();
    match handler.run(controller).await {
        Ok(()) => controller.complete(),
        Err(reason) => {
            controller.fail();
            error!(call_id = %controller.call().id(), %reason, "controller failed");
            events.trigger(
                EventTopic::Exception,
                EventPayload::Exception {
                    message: reason.to_string(),
                    call_id: Some(controller.call().id().clone()),
                },
            );
        }
    }
    if controller.call().state().is_live() {
        if let Err(reason) = controller.hangup().await {
            warn!(call_id = %controller.call().id(), %reason, "post-controller hangup failed");
        }
    }
}
