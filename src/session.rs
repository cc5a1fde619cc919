//! Session Coordination
//!
//! Drives one generation from availability check through provider teardown.
//! Chunks are checked against the cancellation flag before they are
//! accumulated or delivered, and the provider session is destroyed exactly once
//! whichever way the run ends.

use crate::channel::ChannelRegistry;
use crate::error::ApiError;
use crate::model::{ModelLifecycleManager, ModelStatus, TemperaturePolicy};
use crate::protocol::PushMessage;
use crate::provider::CompletionStream;
use crate::types::new_session_id;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod registry;
pub mod state;

pub use registry::{ActiveSessionInfo, ActiveSessions, SessionTicket};
pub use state::SessionState;

/// How the provider is asked to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Stream deltas and push each one to listening clients
    Streaming,
    /// One non-streaming call; nothing is pushed
    SingleShot,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Generated when absent
    pub session_id: Option<String>,
    pub prompt: String,
    pub context: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: TemperaturePolicy,
    pub mode: GenerationMode,
}

impl GenerationRequest {
    pub fn streaming(prompt: impl Into<String>) -> Self {
        Self {
            session_id: None,
            prompt: prompt.into(),
            context: None,
            system_prompt: None,
            temperature: TemperaturePolicy::ProviderDefault,
            mode: GenerationMode::Streaming,
        }
    }

    pub fn single_shot(prompt: impl Into<String>) -> Self {
        Self {
            mode: GenerationMode::SingleShot,
            ..Self::streaming(prompt)
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_temperature(mut self, policy: TemperaturePolicy) -> Self {
        self.temperature = policy;
        self
    }
}

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub session_id: String,
    /// Full text, or the part accumulated before cancellation
    pub text: String,
    pub cancelled: bool,
}

/// Combine the user prompt with optional page context.
pub fn compose_prompt(prompt: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!(
            "Use the following page content to answer.\n\nPage content:\n{}\n\nRequest:\n{}",
            context, prompt
        ),
        None => prompt.to_string(),
    }
}

pub struct SessionCoordinator {
    model: Arc<ModelLifecycleManager>,
    channels: ChannelRegistry,
    active: ActiveSessions,
}

impl SessionCoordinator {
    pub fn new(model: Arc<ModelLifecycleManager>, channels: ChannelRegistry) -> Self {
        Self {
            model,
            channels,
            active: ActiveSessions::new(),
        }
    }

    pub fn active_sessions(&self) -> &ActiveSessions {
        &self.active
    }

    /// Request cancellation. True only when a session was active under `session_id`.
    pub fn cancel(&self, session_id: &str) -> bool {
        let cancelled = self.active.cancel(session_id);
        if cancelled {
            info!(session_id = %session_id, "Cancellation requested");
        } else {
            debug!(session_id = %session_id, "Cancel for inactive session ignored");
        }
        cancelled
    }

    /// Run one generation to a terminal state.
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationOutcome, ApiError> {
        let session_id = request.session_id.clone().unwrap_or_else(new_session_id);
        let mut ticket = self.active.reserve(&session_id)?;

        let result = self.drive(&mut ticket, &request).await;
        match &result {
            Ok(outcome) if outcome.cancelled => {
                ticket.advance(SessionState::Cancelled);
                info!(session_id = %session_id, chars = outcome.text.len(), "Session cancelled");
            }
            Ok(outcome) => {
                ticket.advance(SessionState::Completed);
                info!(session_id = %session_id, chars = outcome.text.len(), "Session completed");
            }
            Err(err) => {
                ticket.advance(SessionState::Failed);
                warn!(session_id = %session_id, category = err.category(), error = %err, "Session failed");
            }
        }
        drop(ticket);
        result
    }

    async fn drive(
        &self,
        ticket: &mut SessionTicket,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, ApiError> {
        ticket.advance(SessionState::CheckingAvailability);
        let report = self.model.check_availability().await;
        match report.status {
            ModelStatus::Ready => {}
            ModelStatus::Downloadable | ModelStatus::Downloading => {
                ticket.advance(SessionState::Downloading);
                self.model.ensure_model_ready(report.status).await?;
            }
            ModelStatus::Unavailable | ModelStatus::ApiNotFound | ModelStatus::Error => {
                return Err(ApiError::Availability(report.message));
            }
        }
        if ticket.is_cancelled() {
            return Ok(cancelled(ticket, String::new()));
        }

        ticket.advance(SessionState::CreatingSession);
        let provider = self
            .model
            .provider()
            .ok_or_else(|| ApiError::Availability("no model provider".to_string()))?;
        let options = self
            .model
            .session_options(request.temperature, request.system_prompt.clone())
            .await;
        debug!(
            session_id = %ticket.session_id(),
            temperature = options.temperature,
            top_k = options.top_k,
            "Creating provider session"
        );
        let handle = provider
            .create_session(options)
            .await
            .map_err(|e| match e {
                ApiError::SessionCreation(_) => e,
                other => ApiError::SessionCreation(other.to_string()),
            })?;
        ticket.attach(handle);
        if ticket.is_cancelled() {
            return Ok(cancelled(ticket, String::new()));
        }

        ticket.advance(SessionState::Streaming);
        let prompt = compose_prompt(&request.prompt, request.context.as_deref());
        let Some(session) = ticket.provider_session() else {
            return Err(ApiError::SessionCreation("provider session missing".to_string()));
        };

        match request.mode {
            GenerationMode::SingleShot => {
                let text = session
                    .prompt(&prompt)
                    .await
                    .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;
                if ticket.is_cancelled() {
                    return Ok(cancelled(ticket, String::new()));
                }
                Ok(completed(ticket, text))
            }
            GenerationMode::Streaming => match session.prompt_streaming(&prompt).await {
                Ok(stream) => self.consume(ticket, stream).await,
                Err(err) => {
                    warn!(
                        session_id = %ticket.session_id(),
                        error = %err,
                        "Streaming unavailable; falling back to a single call"
                    );
                    let text = session
                        .prompt(&prompt)
                        .await
                        .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;
                    if ticket.is_cancelled() {
                        return Ok(cancelled(ticket, String::new()));
                    }
                    self.push_chunk(ticket.session_id(), &text, &text).await;
                    Ok(completed(ticket, text))
                }
            },
        }
    }

    async fn consume(
        &self,
        ticket: &SessionTicket,
        mut stream: CompletionStream,
    ) -> Result<GenerationOutcome, ApiError> {
        let mut full_response = String::new();
        while let Some(item) = stream.next().await {
            if ticket.is_cancelled() {
                debug!(session_id = %ticket.session_id(), "Discarding chunk after cancellation");
                return Ok(cancelled(ticket, full_response));
            }
            let chunk = item.map_err(|e| ApiError::GenerationFailed(e.to_string()))?;
            if chunk.is_empty() {
                continue;
            }
            full_response.push_str(&chunk);
            self.push_chunk(ticket.session_id(), &chunk, &full_response)
                .await;
        }
        if ticket.is_cancelled() {
            return Ok(cancelled(ticket, full_response));
        }
        Ok(completed(ticket, full_response))
    }

    async fn push_chunk(&self, session_id: &str, chunk: &str, full_response: &str) {
        if !self.channels.is_anyone_listening() {
            return;
        }
        let delivered = self
            .channels
            .deliver(&PushMessage::StreamingResponse {
                session_id: session_id.to_string(),
                chunk: chunk.to_string(),
                full_response: full_response.to_string(),
            })
            .await;
        if !delivered {
            debug!(session_id = %session_id, "Chunk not delivered to any client");
        }
    }
}

fn completed(ticket: &SessionTicket, text: String) -> GenerationOutcome {
    GenerationOutcome {
        session_id: ticket.session_id().to_string(),
        text,
        cancelled: false,
    }
}

fn cancelled(ticket: &SessionTicket, text: String) -> GenerationOutcome {
    GenerationOutcome {
        session_id: ticket.session_id().to_string(),
        text,
        cancelled: true,
    }
}
