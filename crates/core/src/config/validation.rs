use thiserror::Error;

use crate::errors::CompositionError;

/// Problems found while loading or checking a `ContextConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} = '{value}' is not valid, expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Invalid context configuration: {message}")]
    ValidationFailed { message: String },

    #[error("Malformed JSON context configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

impl From<ConfigError> for CompositionError {
    fn from(error: ConfigError) -> Self {
        CompositionError::Configuration {
            message: error.to_string(),
        }
    }
}

/// Parse a boolean flag the way environment variables are usually written
pub fn parse_flag(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(field, value, "true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("f", "TRUE").unwrap());
        assert!(parse_flag("f", " on ").unwrap());
        assert!(!parse_flag("f", "0").unwrap());

        let error = parse_flag("WIREWORK_STRICT_BINDINGS", "maybe").unwrap_err();
        assert!(error.to_string().contains("WIREWORK_STRICT_BINDINGS"));
    }
}
