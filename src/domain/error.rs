use thiserror::Error;

/// Core domain errors
///
/// Only `GenerationFailed` raised by a terminal step reaches the caller of the
/// engine; the port failures below are absorbed by the steps that observe them.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Retrieval unavailable: {message}")]
    RetrievalUnavailable { message: String },

    #[error("Generation failed: {provider} - {message}")]
    GenerationFailed { provider: String, message: String },

    #[error("Rerank failed: {message}")]
    RerankFailed { message: String },

    #[error("Verification failed: {message}")]
    VerificationFailed { message: String },

    #[error("Malformed reformulation: {message}")]
    MalformedReformulation { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn retrieval_unavailable(message: impl Into<String>) -> Self {
        Self::RetrievalUnavailable {
            message: message.into(),
        }
    }

    pub fn generation_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rerank_failed(message: impl Into<String>) -> Self {
        Self::RerankFailed {
            message: message.into(),
        }
    }

    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            message: message.into(),
        }
    }

    pub fn malformed_reformulation(message: impl Into<String>) -> Self {
        Self::MalformedReformulation {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error came from the generation port
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, Self::GenerationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_failed_error() {
        let error = DomainError::generation_failed("openai", "HTTP 500");
        assert_eq!(error.to_string(), "Generation failed: openai - HTTP 500");
        assert!(error.is_generation_failure());
    }

    #[test]
    fn test_retrieval_unavailable_error() {
        let error = DomainError::retrieval_unavailable("index offline");
        assert_eq!(error.to_string(), "Retrieval unavailable: index offline");
        assert!(!error.is_generation_failure());
    }

    #[test]
    fn test_validation_error() {
        let error = DomainError::validation("Invalid input");
        assert_eq!(error.to_string(), "Validation error: Invalid input");
    }
}
