//! Call controllers
//!
//! A controller is the application-facing unit of call logic: it receives a
//! live call handle and drives it through high-level verbs (`say`, `play`,
//! `stream_file`, `hangup`, ...). Every verb comes in a synchronous form
//! that suspends the controller task until the command finishes, and an
//! `_async` form that returns as soon as the transport acknowledges it.

pub mod output;

use crate::call::CallHandle;
use crate::command::{
    Command, CommandFailure, CommandHandle, CommandKind, CommandOptions, CommandState,
    RecordOptions,
};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::speech::Document;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub use output::PlayItem;

/// Application call logic, dispatched to by the router
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn run(&self, controller: &mut CallController) -> Result<()>;
}

/// Controller lifecycle, tracked by the engine around the handler's `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Created,
    Executing,
    Completed,
    Failed,
}

/// Input accepted by `say`: either literal text or a pre-built document
/// that is passed through to the transport unmodified
#[derive(Debug, Clone, PartialEq)]
pub enum SayInput {
    Text(String),
    Document(Document),
}

impl From<&str> for SayInput {
    fn from(text: &str) -> Self {
        SayInput::Text(text.to_string())
    }
}

impl From<String> for SayInput {
    fn from(text: String) -> Self {
        SayInput::Text(text)
    }
}

impl From<Document> for SayInput {
    fn from(document: Document) -> Self {
        SayInput::Document(document)
    }
}

/// Per-verb rendering overrides; unset fields fall back to configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputOptions {
    pub voice: Option<String>,
    pub renderer: Option<String>,
}

/// The verb surface handed to a [`CallHandler`]
pub struct CallController {
    call: CallHandle,
    config: Arc<Config>,
    state: ControllerState,
}

impl CallController {
    pub fn new(call: CallHandle, config: Arc<Config>) -> Self {
        Self {
            call,
            config,
            state: ControllerState::Created,
        }
    }

    pub fn call(&self) -> &CallHandle {
        &self.call
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub(crate) fn begin(&mut self) {
        self.state = ControllerState::Executing;
    }

    pub(crate) fn complete(&mut self) {
        self.state = ControllerState::Completed;
    }

    pub(crate) fn fail(&mut self) {
        self.state = ControllerState::Failed;
    }

    /// Mark the session answered
    pub fn answer(&self) {
        self.call.answered();
    }

    /// Hang the call up and wait for the transport to confirm
    pub async fn hangup(&mut self) -> Result<()> {
        let state = self.call.execute(Command::hangup()).await?;
        debug!(call_id = %self.call.id(), ?state, "hangup completed");
        Ok(())
    }

    /// Speak text (or render a pre-built document) and wait for it to finish
    ///
    /// Empty input is a no-op; nothing reaches the transport.
    pub async fn say(&mut self, input: impl Into<SayInput>, options: OutputOptions) -> Result<()> {
        match self.say_async(input, options).await? {
            Some(mut handle) => finish_output(handle.await_terminal().await),
            None => Ok(()),
        }
    }

    /// Fire-and-forget form of [`say`](Self::say)
    ///
    /// Returns `None` for empty input, otherwise a handle to the in-flight
    /// output command.
    pub async fn say_async(
        &mut self,
        input: impl Into<SayInput>,
        options: OutputOptions,
    ) -> Result<Option<CommandHandle>> {
        let document = match input.into() {
            SayInput::Text(text) if text.is_empty() => Document::new(),
            SayInput::Text(text) => Document::text(text),
            SayInput::Document(document) => document,
        };
        if document.is_empty() {
            return Ok(None);
        }
        let handle = self
            .execute_output_async(document, self.resolve_options(&options))
            .await?;
        Ok(Some(handle))
    }

    /// Alias for [`say`](Self::say)
    pub async fn speak(&mut self, input: impl Into<SayInput>, options: OutputOptions) -> Result<()> {
        self.say(input, options).await
    }

    /// Speak a string character by character
    pub async fn say_characters(&mut self, text: impl ToString) -> Result<()> {
        match self.say_characters_async(text).await? {
            Some(mut handle) => finish_output(handle.await_terminal().await),
            None => Ok(()),
        }
    }

    /// Fire-and-forget form of [`say_characters`](Self::say_characters)
    pub async fn say_characters_async(
        &mut self,
        text: impl ToString,
    ) -> Result<Option<CommandHandle>> {
        let text = text.to_string();
        if text.is_empty() {
            return Ok(None);
        }
        let options = self.resolve_options(&OutputOptions::default());
        let handle = self
            .execute_output_async(Document::characters(text), options)
            .await?;
        Ok(Some(handle))
    }

    /// Record the session and wait for the recording to finish
    pub async fn record(&mut self, options: RecordOptions) -> Result<()> {
        let mut handle = self.record_async(options).await?;
        finish_output(handle.await_terminal().await)
    }

    /// Start a recording and return its handle without waiting
    pub async fn record_async(&mut self, options: RecordOptions) -> Result<CommandHandle> {
        self.call
            .execute_async(Command::new(
                CommandKind::Record { options },
                CommandOptions::default(),
            ))
            .await
    }

    /// Resolve rendering options: explicit overrides win over platform media
    /// defaults, which win over transport client defaults
    fn resolve_options(&self, options: &OutputOptions) -> CommandOptions {
        let media = &self.config.media;
        let client = &self.config.client;
        CommandOptions {
            voice: options
                .voice
                .clone()
                .or_else(|| media.default_voice.clone())
                .or_else(|| client.default_voice.clone()),
            renderer: options
                .renderer
                .clone()
                .or_else(|| media.default_renderer.clone())
                .or_else(|| client.default_renderer.clone()),
            timeout: None,
        }
    }

    async fn execute_output_async(
        &mut self,
        document: Document,
        options: CommandOptions,
    ) -> Result<CommandHandle> {
        self.call
            .execute_async(output_command(document, options))
            .await
    }
}

fn output_command(document: Document, options: CommandOptions) -> Command {
    Command::new(
        CommandKind::Output {
            document: crate::command::OutputDocument::Inline(document),
        },
        options,
    )
}

/// Map an output command's terminal state to the verb result
fn finish_output(state: CommandState) -> Result<()> {
    match state {
        CommandState::Complete(_) | CommandState::Stopped => Ok(()),
        CommandState::Error(failure) => Err(failure_to_error(failure)),
        CommandState::Pending | CommandState::Executing => {
            Err(EngineError::Component("non-terminal command state".to_string()))
        }
    }
}

fn failure_to_error(failure: CommandFailure) -> EngineError {
    match failure {
        CommandFailure::Timeout => EngineError::Timeout,
        CommandFailure::ConnectionLost => EngineError::ConnectionLost,
        CommandFailure::Rejected(message) => EngineError::Component(message),
        CommandFailure::Platform(message) => EngineError::Playback(message),
    }
}
