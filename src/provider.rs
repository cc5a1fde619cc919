//! Model Provider Abstraction
//!
//! Capability interface for an opaque generative-model provider: availability
//! checks, a download lifecycle with progress events, declared sampling
//! constraints, and sessions that generate either as a stream of text deltas or
//! in a single call.

use crate::error::ApiError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub mod ollama;

pub use ollama::OllamaProvider;

/// Availability as reported by the provider itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Downloadable,
    Downloading,
    Unavailable,
}

/// Sampling constraints declared by the provider. Missing values fall back to
/// the configured ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub default_temperature: Option<f32>,
    pub max_temperature: Option<f32>,
    pub default_top_k: Option<u32>,
    pub max_top_k: Option<u32>,
}

/// Options a provider session is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub temperature: f32,
    pub top_k: u32,
    pub system_prompt: Option<String>,
}

/// Event emitted while a model download is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadEvent {
    /// Percent complete, 0-100
    Progress(u8),
    Complete,
    Error(String),
}

/// Streaming text deltas
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

/// Download progress events
pub type DownloadEvents = Pin<Box<dyn Stream<Item = DownloadEvent> + Send>>;

/// Model provider capability
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Report whether the model can be used now, needs a download, or cannot be used
    async fn availability(&self) -> Result<Availability, ApiError>;

    /// Declared sampling constraints
    async fn params(&self) -> Result<ModelParams, ApiError>;

    /// Start downloading the model; the stream ends after a terminal event
    async fn start_download(&self) -> Result<DownloadEvents, ApiError>;

    /// Create a generation session holding provider resources
    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn ProviderSession>, ApiError>;
}

/// A live provider session. `destroy` releases the provider resource.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// Begin a streaming generation. An error here means streaming could not start.
    async fn prompt_streaming(&self, prompt: &str) -> Result<CompletionStream, ApiError>;

    /// Generate the whole response in one call
    async fn prompt(&self, prompt: &str) -> Result<String, ApiError>;

    fn destroy(&self);
}

/// Provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "gemma3:1b".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
        }
    }
}

impl ProviderSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!(
                "Base URL must start with http:// or https:// (got '{}')",
                self.base_url
            ));
        }
        Ok(())
    }
}
