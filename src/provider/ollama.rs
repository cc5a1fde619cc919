//! Ollama-backed model provider.
//!
//! Availability comes from the local model list, downloads use the streaming
//! pull endpoint, and generation uses the newline-delimited JSON stream of
//! `/api/generate`.

use super::{
    Availability, CompletionStream, DownloadEvent, DownloadEvents, ModelParams, ModelProvider,
    ProviderSession, ProviderSettings, SessionOptions,
};
use crate::error::ApiError;
use async_trait::async_trait;
use futures::{future, Stream, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Ollama does not declare sampling bounds. Its documented temperature default is
// reported; top_k is left to the configured fallback.
const OLLAMA_DEFAULT_TEMPERATURE: f32 = 0.8;

fn build_provider_http_client() -> Result<Client, ApiError> {
    // No overall request timeout: pulls and generations are long-lived streams
    // bounded by the caller's own deadlines.
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        ApiError::ProviderError(format!("Request failed with status {}: {}", status, error))
    } else if error.is_timeout() {
        ApiError::ProviderError(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderError(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    format!("status {}: {}", status, text)
}

/// Ollama provider client
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    pulling: Arc<AtomicBool>,
}

impl OllamaProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ApiError> {
        let client = build_provider_http_client()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            pulling: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn has_model(&self, tags: &TagsResponse) -> bool {
        let latest = format!("{}:latest", self.model);
        tags.models
            .iter()
            .any(|m| m.name == self.model || m.name == latest)
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl PullStatus {
    fn into_event(self) -> Option<DownloadEvent> {
        if let Some(error) = self.error {
            return Some(DownloadEvent::Error(error));
        }
        if self.status.as_deref() == Some("success") {
            return Some(DownloadEvent::Complete);
        }
        match (self.total, self.completed) {
            (Some(total), Some(completed)) if total > 0 => {
                let percent = (completed.saturating_mul(100) / total).min(100);
                Some(DownloadEvent::Progress(percent as u8))
            }
            _ => None,
        }
    }
}

/// Clears the in-flight pull flag when the event stream is dropped.
struct PullGuard(Arc<AtomicBool>);

impl Drop for PullGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn availability(&self) -> Result<Availability, ApiError> {
        if self.pulling.load(Ordering::SeqCst) {
            return Ok(Availability::Downloading);
        }

        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(map_http_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ProviderError(format!(
                "Failed to list models: {}",
                error_body(response).await
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!("Failed to parse models response: {}", e))
        })?;

        if self.has_model(&tags) {
            Ok(Availability::Available)
        } else {
            Ok(Availability::Downloadable)
        }
    }

    async fn params(&self) -> Result<ModelParams, ApiError> {
        Ok(ModelParams {
            default_temperature: Some(OLLAMA_DEFAULT_TEMPERATURE),
            max_temperature: None,
            default_top_k: None,
            max_top_k: None,
        })
    }

    async fn start_download(&self) -> Result<DownloadEvents, ApiError> {
        if self.pulling.swap(true, Ordering::SeqCst) {
            return Err(ApiError::DownloadInProgress);
        }
        let guard = PullGuard(self.pulling.clone());

        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PullRequest {
                model: &self.model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| ApiError::Download(map_http_error(e).to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Download(error_body(response).await));
        }

        debug!(model = %self.model, "Model pull started");
        let events = ndjson_stream::<PullStatus>(response).filter_map(move |line| {
            let _held = &guard;
            future::ready(match line {
                Ok(status) => status.into_event(),
                Err(e) => Some(DownloadEvent::Error(e.to_string())),
            })
        });
        Ok(Box::pin(events))
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn ProviderSession>, ApiError> {
        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            options,
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

struct OllamaSession {
    client: Client,
    base_url: String,
    model: String,
    options: SessionOptions,
    closed: AtomicBool,
}

impl OllamaSession {
    fn ensure_open(&self) -> Result<(), ApiError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ApiError::ProviderError("Session already destroyed".to_string()));
        }
        Ok(())
    }

    async fn generate(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, ApiError> {
        self.ensure_open()?;
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: self.options.system_prompt.as_deref(),
            stream,
            options: GenerateOptions {
                temperature: self.options.temperature,
                top_k: self.options.top_k,
            },
        };
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        if !response.status().is_success() {
            return Err(ApiError::ProviderError(error_body(response).await));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderSession for OllamaSession {
    async fn prompt_streaming(&self, prompt: &str) -> Result<CompletionStream, ApiError> {
        let response = self
            .generate(prompt, true)
            .await
            .map_err(|e| ApiError::StreamingUnsupported(e.to_string()))?;

        let deltas = ndjson_stream::<GenerateChunk>(response).filter_map(|line| {
            future::ready(match line {
                Ok(chunk) => match chunk.error {
                    Some(error) => Some(Err(ApiError::GenerationFailed(error))),
                    None if chunk.response.is_empty() => None,
                    None => Some(Ok(chunk.response)),
                },
                Err(e) => Some(Err(e)),
            })
        });
        Ok(Box::pin(deltas))
    }

    async fn prompt(&self, prompt: &str) -> Result<String, ApiError> {
        let response = self.generate(prompt, false).await?;
        let chunk: GenerateChunk = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!("Failed to parse generate response: {}", e))
        })?;
        match chunk.error {
            Some(error) => Err(ApiError::GenerationFailed(error)),
            None => Ok(chunk.response),
        }
    }

    fn destroy(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!(model = %self.model, "Ollama session destroyed twice");
        }
    }
}

/// Decode a newline-delimited JSON response body into a stream of values.
fn ndjson_stream<T>(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<T, ApiError>> + Send>>
where
    T: DeserializeOwned + Send + 'static,
{
    let bytes = Box::pin(response.bytes_stream());
    let lines = futures::stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line);
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let item = parse_line::<T>(trimmed);
                    return Some((item, (bytes, buffer, finished)));
                }
                if finished {
                    let rest = std::mem::take(&mut buffer);
                    let text = String::from_utf8_lossy(&rest);
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        return None;
                    }
                    let item = parse_line::<T>(trimmed);
                    return Some((item, (bytes, buffer, finished)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        finished = true;
                        buffer.clear();
                        return Some((Err(map_http_error(e)), (bytes, buffer, finished)));
                    }
                    None => finished = true,
                }
            }
        },
    );
    Box::pin(lines)
}

fn parse_line<T: DeserializeOwned>(line: &str) -> Result<T, ApiError> {
    serde_json::from_str(line)
        .map_err(|e| ApiError::ProviderError(format!("Malformed stream line: {}", e)))
}
