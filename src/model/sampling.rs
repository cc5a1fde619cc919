//! Sampling parameters: temperature policy, fallback ranges and clamping.

use crate::error::ClampWarning;
use crate::provider::ModelParams;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-k used when the provider declares no default.
pub const FALLBACK_DEFAULT_TOP_K: u32 = 3;

/// Temperature used when the provider declares no default.
pub const FALLBACK_DEFAULT_TEMPERATURE: f32 = 1.0;

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ParamRange<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }
}

/// How the requested temperature is derived from the provider's declared default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TemperaturePolicy {
    ProviderDefault,
    Fixed { value: f32 },
    Scaled { factor: f32 },
}

impl TemperaturePolicy {
    /// Temperature to request before clamping.
    pub fn resolve(&self, params: &ModelParams) -> f32 {
        let default = params
            .default_temperature
            .unwrap_or(FALLBACK_DEFAULT_TEMPERATURE);
        match self {
            TemperaturePolicy::ProviderDefault => default,
            TemperaturePolicy::Fixed { value } => *value,
            TemperaturePolicy::Scaled { factor } => default * factor,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            TemperaturePolicy::ProviderDefault => Ok(()),
            TemperaturePolicy::Fixed { value } if !value.is_finite() || *value < 0.0 => Err(
                format!("fixed temperature must be a non-negative number (got {})", value),
            ),
            TemperaturePolicy::Scaled { factor } if !factor.is_finite() || *factor <= 0.0 => Err(
                format!("scale factor must be greater than zero (got {})", factor),
            ),
            _ => Ok(()),
        }
    }
}

/// Temperature policy per kind of generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Free-form prompts
    #[serde(default = "default_prompt_policy")]
    pub prompt: TemperaturePolicy,
    /// Suggestion generation
    #[serde(default = "default_suggestions_policy")]
    pub suggestions: TemperaturePolicy,
}

fn default_prompt_policy() -> TemperaturePolicy {
    TemperaturePolicy::ProviderDefault
}

fn default_suggestions_policy() -> TemperaturePolicy {
    TemperaturePolicy::Scaled { factor: 1.2 }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt_policy(),
            suggestions: default_suggestions_policy(),
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.prompt
            .validate()
            .map_err(|e| format!("prompt: {}", e))?;
        self.suggestions
            .validate()
            .map_err(|e| format!("suggestions: {}", e))
    }
}

/// Values asked for by the caller, before clamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestedParameters {
    pub temperature: f32,
    pub top_k: u32,
}

/// Clamped values plus a warning for every adjustment made
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParameters {
    pub temperature: f32,
    pub top_k: u32,
    pub warnings: Vec<ClampWarning>,
}

/// Clamp each requested parameter into the declared range.
///
/// Minimums always come from the fallback ranges; maximums come from the
/// provider when declared. Never fails.
pub fn validate_parameters(
    requested: RequestedParameters,
    declared: &ModelParams,
    temperature_range: ParamRange<f32>,
    top_k_range: ParamRange<u32>,
) -> ValidatedParameters {
    let mut warnings = Vec::new();

    let t_min = temperature_range.min;
    let t_max = declared
        .max_temperature
        .unwrap_or(temperature_range.max)
        .max(t_min);
    let temperature = if requested.temperature.is_nan() {
        t_min
    } else {
        requested.temperature.clamp(t_min, t_max)
    };
    if temperature != requested.temperature {
        warnings.push(ClampWarning {
            parameter: "temperature".to_string(),
            requested: f64::from(requested.temperature),
            applied: f64::from(temperature),
            min: f64::from(t_min),
            max: f64::from(t_max),
        });
    }

    let k_min = top_k_range.min;
    let k_max = declared.max_top_k.unwrap_or(top_k_range.max).max(k_min);
    let top_k = requested.top_k.clamp(k_min, k_max);
    if top_k != requested.top_k {
        warnings.push(ClampWarning {
            parameter: "top_k".to_string(),
            requested: f64::from(requested.top_k),
            applied: f64::from(top_k),
            min: f64::from(k_min),
            max: f64::from(k_max),
        });
    }

    for warning in &warnings {
        warn!(
            parameter = %warning.parameter,
            requested = warning.requested,
            applied = warning.applied,
            "Sampling parameter clamped"
        );
    }

    ValidatedParameters {
        temperature,
        top_k,
        warnings,
    }
}
