//! Generation request types

use serde::{Deserialize, Serialize};

/// Default completion length budget
pub const DEFAULT_MAX_LENGTH: u32 = 512;

/// A single text-generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Full prompt text
    pub prompt: String,

    /// Upper bound on generated tokens
    pub max_length: u32,

    /// Optional system instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// Create a request with the default length budget
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_length: DEFAULT_MAX_LENGTH,
            system: None,
            temperature: None,
        }
    }

    /// Set the length budget
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature, clamped to 0.0 - 2.0
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }
}
