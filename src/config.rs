//! Configuration System
//!
//! Layered runtime configuration: built-in defaults, an optional user config file,
//! an explicit `--config` file, and `TABMIND__`-prefixed environment variables.
//! Every section validates itself and the root collects all problems at once.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

pub use crate::agent::AgentConfig;
pub use crate::channel::ChannelConfig;
pub use crate::model::{ModelConfig, SamplingConfig};
pub use crate::provider::ProviderSettings;
pub use crate::suggestions::CacheConfig;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabmindConfig {
    /// Model provider endpoint and model selection
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Client connection keepalive and delivery timing
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Content agent probing and extraction
    #[serde(default)]
    pub agent: AgentConfig,

    /// Model lifecycle: download timeout and fallback parameter ranges
    #[serde(default)]
    pub model: ModelConfig,

    /// Temperature policies per use
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Suggestion cache bound
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String),
    Channel(String),
    Agent(String),
    Model(String),
    Sampling(String),
    Cache(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "provider: {}", msg),
            ValidationError::Channel(msg) => write!(f, "channel: {}", msg),
            ValidationError::Agent(msg) => write!(f, "agent: {}", msg),
            ValidationError::Model(msg) => write!(f, "model: {}", msg),
            ValidationError::Sampling(msg) => write!(f, "sampling: {}", msg),
            ValidationError::Cache(msg) => write!(f, "cache: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl TabmindConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if let Err(e) = self.channel.validate() {
            errors.push(ValidationError::Channel(e));
        }
        if let Err(e) = self.agent.validate() {
            errors.push(ValidationError::Agent(e));
        }
        if let Err(e) = self.model.validate() {
            errors.push(ValidationError::Model(e));
        }
        if let Err(e) = self.sampling.validate() {
            errors.push(ValidationError::Sampling(e));
        }
        if let Err(e) = self.cache.validate() {
            errors.push(ValidationError::Cache(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every problem into a single `ApiError`.
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
