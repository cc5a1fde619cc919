//! Error types for the tabmind coordination runtime.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the coordination layer.
///
/// `Display` carries the raw diagnostic detail; [`ApiError::user_message`]
/// gives the categorized text that is safe to put in front of a user.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Model unavailable: {0}")]
    Availability(String),

    #[error("Model download failed: {0}")]
    Download(String),

    #[error("Model download already in progress")]
    DownloadInProgress,

    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Streaming unsupported: {0}")]
    StreamingUnsupported(String),

    #[error("Content agent unreachable: {0}")]
    AgentUnreachable(String),

    #[error("Content extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("Session already active: {0}")]
    DuplicateSession(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Stable category tag used in logs and failure payloads.
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::Availability(_) => "availability",
            ApiError::Download(_) => "download",
            ApiError::DownloadInProgress => "download_in_progress",
            ApiError::SessionCreation(_) => "session_creation",
            ApiError::StreamingUnsupported(_) => "streaming_unsupported",
            ApiError::AgentUnreachable(_) => "agent_unreachable",
            ApiError::ExtractionFailed(_) => "extraction_failed",
            ApiError::DeliveryFailure(_) => "delivery",
            ApiError::DuplicateSession(_) => "duplicate_session",
            ApiError::GenerationFailed(_) => "generation",
            ApiError::ProviderError(_) => "provider",
            ApiError::ConfigError(_) => "config",
            ApiError::Protocol(_) => "protocol",
        }
    }

    /// Message suitable for display, without provider internals.
    pub fn user_message(&self) -> String {
        let text = match self {
            ApiError::Availability(_) => {
                "The on-device model is not available. Check that the model runtime is installed and enabled."
            }
            ApiError::Download(_) => {
                "The model download did not finish. Please try again."
            }
            ApiError::DownloadInProgress => {
                "The model is still downloading. Please try again in a few minutes."
            }
            ApiError::SessionCreation(_) => {
                "Could not start a model session. Please try again."
            }
            ApiError::StreamingUnsupported(_) | ApiError::GenerationFailed(_) => {
                "The model could not generate a response. Please try again."
            }
            ApiError::AgentUnreachable(_) | ApiError::ExtractionFailed(_) => {
                "Could not read this page. Try reloading it."
            }
            ApiError::DeliveryFailure(_) => "The response could not be delivered.",
            ApiError::DuplicateSession(_) => {
                "A request with this session id is already running."
            }
            ApiError::ProviderError(_) => "The model provider reported an error.",
            ApiError::ConfigError(_) => "The configuration is invalid.",
            ApiError::Protocol(_) => "The request could not be understood.",
        };
        text.to_string()
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Protocol(err.to_string())
    }
}

/// Non-fatal record of a parameter pulled back into its allowed range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClampWarning {
    pub parameter: String,
    pub requested: f64,
    pub applied: f64,
    pub min: f64,
    pub max: f64,
}

impl std::fmt::Display for ClampWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} outside [{}, {}], using {}",
            self.parameter, self.requested, self.min, self.max, self.applied
        )
    }
}
