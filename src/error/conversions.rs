//! Type Conversions for LlmError
//!
//! This module contains From trait implementations for converting
//! common error types into LlmError.

use super::types::LlmError;

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL in its Display output but never headers,
        // so the provider key cannot leak through here.
        if err.is_timeout() {
            Self::TimeoutError(err.to_string())
        } else if err.is_decode() || err.is_body() {
            Self::StreamError(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for LlmError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigurationError(format!("Invalid YAML configuration: {err}"))
    }
}

impl From<validator::ValidationErrors> for LlmError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigurationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let llm_err: LlmError = json_err.into();
        assert!(matches!(llm_err, LlmError::JsonError(_)));
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{not: [a list").unwrap_err();
        let llm_err: LlmError = yaml_err.into();
        assert!(matches!(llm_err, LlmError::ConfigurationError(_)));
    }
}
