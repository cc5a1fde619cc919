//! CLI output: error mapping and JSON rendering.

use crate::error::ApiError;
use serde::Serialize;

/// Map domain errors to a string for CLI output: the user-facing text, then the detail.
pub fn map_error(e: &ApiError) -> String {
    format!("{}\n  ({}: {})", e.user_message(), e.category(), e)
}

/// Pretty JSON for command output.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(ApiError::from)
}
