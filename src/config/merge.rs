//! Merge rules: built-in defaults applied before any file or environment source.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with the documented defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("provider.base_url", "http://localhost:11434")?
        .set_default("provider.model", "gemma3:1b")?
        .set_default("channel.keepalive_interval_ms", 30_000)?
        .set_default("channel.keepalive_ack_timeout_ms", 5_000)?
        .set_default("channel.delivery_timeout_ms", 5_000)?
        .set_default("agent.probe_timeout_ms", 3_000)?
        .set_default("agent.settle_delay_ms", 500)?
        .set_default("agent.extract_timeout_ms", 10_000)?
        .set_default("agent.max_content_chars", 2_000)?
        .set_default("model.download_timeout_ms", 300_000)?
        .set_default("cache.capacity", 50)
}
