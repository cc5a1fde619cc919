//! Config loading facade.

use super::merge::builder_with_defaults;
use super::sources;
use super::TabmindConfig;
use crate::error::ApiError;
use std::path::Path;

/// Loads and validates [`TabmindConfig`] from all sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, the user config file, and environment overrides.
    pub fn load() -> Result<TabmindConfig, ApiError> {
        Self::load_with(None)
    }

    /// Same as [`ConfigLoader::load`] with an explicit file layered on top of the user file.
    pub fn load_from_file(path: &Path) -> Result<TabmindConfig, ApiError> {
        Self::load_with(Some(path))
    }

    fn load_with(explicit: Option<&Path>) -> Result<TabmindConfig, ApiError> {
        let mut builder = builder_with_defaults()?;
        builder = sources::add_global_file(builder)?;
        if let Some(path) = explicit {
            builder = sources::add_explicit_file(builder, path)?;
        }
        builder = sources::add_environment(builder);

        let config: TabmindConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }
}
