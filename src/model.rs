//! Model Lifecycle
//!
//! Maps provider availability onto a fixed status catalog, drives the model
//! download with progress forwarded to clients, and derives clamped sampling
//! parameters for new sessions.

use crate::channel::ChannelRegistry;
use crate::error::ApiError;
use crate::protocol::PushMessage;
use crate::provider::{Availability, DownloadEvent, ModelParams, ModelProvider, SessionOptions};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod sampling;

pub use sampling::{
    validate_parameters, ParamRange, RequestedParameters, SamplingConfig, TemperaturePolicy,
    ValidatedParameters, FALLBACK_DEFAULT_TOP_K,
};

/// Model status reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Ready,
    Downloadable,
    Downloading,
    Unavailable,
    ApiNotFound,
    Error,
}

impl ModelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelStatus::Ready => "ready",
            ModelStatus::Downloadable => "downloadable",
            ModelStatus::Downloading => "downloading",
            ModelStatus::Unavailable => "unavailable",
            ModelStatus::ApiNotFound => "api_not_found",
            ModelStatus::Error => "error",
        }
    }

    /// Whether a generation request can proceed from this status, possibly after a download.
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            ModelStatus::Ready | ModelStatus::Downloadable | ModelStatus::Downloading
        )
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to `checkAPIAvailability`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub status: ModelStatus,
    pub message: String,
}

impl AvailabilityReport {
    fn from_status(status: ModelStatus) -> Self {
        let message = match status {
            ModelStatus::Ready => "Model is ready",
            ModelStatus::Downloadable => "Model can be downloaded; it will download on first use",
            ModelStatus::Downloading => "Model is downloading",
            ModelStatus::Unavailable => "Model is not available on this device",
            ModelStatus::ApiNotFound => "No model provider is configured",
            ModelStatus::Error => "Could not determine model availability",
        };
        Self {
            available: status.is_usable(),
            status,
            message: message.to_string(),
        }
    }
}

/// Progress of the download in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: u8,
    pub active: bool,
}

/// Download deadline and fallback sampling ranges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
    #[serde(default = "default_temperature_range")]
    pub temperature_range: ParamRange<f32>,
    #[serde(default = "default_top_k_range")]
    pub top_k_range: ParamRange<u32>,
}

fn default_download_timeout_ms() -> u64 {
    300_000
}

fn default_temperature_range() -> ParamRange<f32> {
    ParamRange::new(0.0, 2.0)
}

fn default_top_k_range() -> ParamRange<u32> {
    ParamRange::new(1, 8)
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            download_timeout_ms: default_download_timeout_ms(),
            temperature_range: default_temperature_range(),
            top_k_range: default_top_k_range(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.download_timeout_ms == 0 {
            return Err("download_timeout_ms must be greater than zero".to_string());
        }
        if !self.temperature_range.min.is_finite() || !self.temperature_range.max.is_finite() {
            return Err(format!(
                "temperature_range bounds must be finite, got {} and {}",
                self.temperature_range.min, self.temperature_range.max
            ));
        }
        if self.temperature_range.is_inverted() {
            return Err(format!(
                "temperature_range min {} exceeds max {}",
                self.temperature_range.min, self.temperature_range.max
            ));
        }
        if self.top_k_range.is_inverted() {
            return Err(format!(
                "top_k_range min {} exceeds max {}",
                self.top_k_range.min, self.top_k_range.max
            ));
        }
        Ok(())
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

/// Clears the download progress when the download ends or its future is dropped.
struct DownloadSlot<'a> {
    progress: &'a Mutex<Option<DownloadProgress>>,
}

impl Drop for DownloadSlot<'_> {
    fn drop(&mut self) {
        *self.progress.lock() = None;
    }
}

pub struct ModelLifecycleManager {
    provider: Option<Arc<dyn ModelProvider>>,
    channels: ChannelRegistry,
    config: ModelConfig,
    progress: Mutex<Option<DownloadProgress>>,
}

impl ModelLifecycleManager {
    pub fn new(
        provider: Option<Arc<dyn ModelProvider>>,
        channels: ChannelRegistry,
        config: ModelConfig,
    ) -> Self {
        Self {
            provider,
            channels,
            config,
            progress: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> Option<&Arc<dyn ModelProvider>> {
        self.provider.as_ref()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Progress of the download this manager is running, if any
    pub fn progress(&self) -> Option<DownloadProgress> {
        *self.progress.lock()
    }

    /// Query the provider and map its answer onto the status catalog.
    pub async fn check_availability(&self) -> AvailabilityReport {
        let Some(provider) = &self.provider else {
            return AvailabilityReport::from_status(ModelStatus::ApiNotFound);
        };

        match provider.availability().await {
            Ok(availability) => {
                let status = match availability {
                    Availability::Available => ModelStatus::Ready,
                    Availability::Downloadable => ModelStatus::Downloadable,
                    Availability::Downloading => ModelStatus::Downloading,
                    Availability::Unavailable => ModelStatus::Unavailable,
                };
                debug!(provider = provider.provider_name(), status = %status, "Model availability");
                AvailabilityReport::from_status(status)
            }
            Err(err) => {
                warn!(provider = provider.provider_name(), error = %err, "Availability check failed");
                let mut report = AvailabilityReport::from_status(ModelStatus::Error);
                report.message = format!("{}: {}", report.message, err);
                report
            }
        }
    }

    /// Make the model usable, downloading it when that is possible.
    pub async fn ensure_model_ready(&self, status: ModelStatus) -> Result<(), ApiError> {
        match status {
            ModelStatus::Ready => Ok(()),
            ModelStatus::Downloadable => self.download().await,
            ModelStatus::Downloading => Err(ApiError::DownloadInProgress),
            ModelStatus::Unavailable | ModelStatus::ApiNotFound | ModelStatus::Error => Err(
                ApiError::Availability(AvailabilityReport::from_status(status).message),
            ),
        }
    }

    async fn download(&self) -> Result<(), ApiError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ApiError::Availability("no model provider".to_string()))?;

        {
            let mut progress = self.progress.lock();
            if progress.map(|p| p.active).unwrap_or(false) {
                return Err(ApiError::DownloadInProgress);
            }
            *progress = Some(DownloadProgress {
                percent: 0,
                active: true,
            });
        }
        let _slot = DownloadSlot {
            progress: &self.progress,
        };

        info!(provider = provider.provider_name(), "Starting model download");
        let deadline = self.config.download_timeout();
        let result = match tokio::time::timeout(deadline, self.follow_download(provider)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Download(format!(
                "timed out after {}s",
                deadline.as_secs()
            ))),
        };

        match &result {
            Ok(()) => info!("Model download complete"),
            Err(err) => warn!(error = %err, "Model download failed"),
        }
        result
    }

    async fn follow_download(&self, provider: &Arc<dyn ModelProvider>) -> Result<(), ApiError> {
        let mut events = provider.start_download().await.map_err(|err| match err {
            ApiError::DownloadInProgress | ApiError::Download(_) => err,
            other => ApiError::Download(other.to_string()),
        })?;

        while let Some(event) = events.next().await {
            match event {
                DownloadEvent::Progress(percent) => {
                    let percent = percent.min(100);
                    *self.progress.lock() = Some(DownloadProgress {
                        percent,
                        active: true,
                    });
                    debug!(percent, "Model download progress");
                    if self.channels.is_anyone_listening() {
                        self.channels
                            .deliver(&PushMessage::DownloadProgress { progress: percent })
                            .await;
                    }
                }
                DownloadEvent::Complete => return Ok(()),
                DownloadEvent::Error(message) => return Err(ApiError::Download(message)),
            }
        }
        Err(ApiError::Download(
            "download ended without a completion event".to_string(),
        ))
    }

    /// Session options for a generation using `policy`, clamped into range.
    pub async fn session_options(
        &self,
        policy: TemperaturePolicy,
        system_prompt: Option<String>,
    ) -> SessionOptions {
        let declared = match &self.provider {
            Some(provider) => provider.params().await.unwrap_or_else(|err| {
                debug!(error = %err, "Provider parameters unavailable; using fallback ranges");
                ModelParams::default()
            }),
            None => ModelParams::default(),
        };
        let validated = self.validate_parameters(
            RequestedParameters {
                temperature: policy.resolve(&declared),
                top_k: declared.default_top_k.unwrap_or(FALLBACK_DEFAULT_TOP_K),
            },
            &declared,
        );
        SessionOptions {
            temperature: validated.temperature,
            top_k: validated.top_k,
            system_prompt,
        }
    }

    pub fn validate_parameters(
        &self,
        requested: RequestedParameters,
        declared: &ModelParams,
    ) -> ValidatedParameters {
        validate_parameters(
            requested,
            declared,
            self.config.temperature_range,
            self.config.top_k_range,
        )
    }
}
