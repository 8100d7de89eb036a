use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::config::validation::{parse_flag, ConfigError};

pub const ENV_DEFAULT_STUB: &str = "WIREWORK_DEFAULT_STUB";
pub const ENV_STRICT_BINDINGS: &str = "WIREWORK_STRICT_BINDINGS";
pub const ENV_IMPLICIT_CONSTRUCTION: &str = "WIREWORK_IMPLICIT_CONSTRUCTION";
pub const ENV_EAGER_SINGLETONS: &str = "WIREWORK_EAGER_SINGLETONS";
pub const ENV_MAX_RESOLUTION_DEPTH: &str = "WIREWORK_MAX_RESOLUTION_DEPTH";

/// Configuration trait for composition contexts
pub trait ContextConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Which stub a freshly created proxy manager falls back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StubPolicy {
    /// Zero value for the declared return type
    #[default]
    Default,
    /// Unimplemented-method error
    Error,
}

impl FromStr for StubPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "zero" => Ok(StubPolicy::Default),
            "error" => Ok(StubPolicy::Error),
            _ => Err(ConfigError::invalid_value(
                "default_stub",
                s,
                "default or error",
            )),
        }
    }
}

impl std::fmt::Display for StubPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StubPolicy::Default => write!(f, "default"),
            StubPolicy::Error => write!(f, "error"),
        }
    }
}

/// Behavioural switches of an application context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub default_stub: StubPolicy,
    pub strict_bindings: bool,
    pub implicit_construction: bool,
    pub eager_singletons: bool,
    pub max_resolution_depth: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_stub: StubPolicy::Default,
            strict_bindings: true,
            implicit_construction: true,
            eager_singletons: false,
            max_resolution_depth: 256,
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_stub(mut self, policy: StubPolicy) -> Self {
        self.default_stub = policy;
        self
    }

    pub fn with_strict_bindings(mut self, strict: bool) -> Self {
        self.strict_bindings = strict;
        self
    }

    pub fn with_implicit_construction(mut self, enabled: bool) -> Self {
        self.implicit_construction = enabled;
        self
    }

    pub fn with_eager_singletons(mut self, eager: bool) -> Self {
        self.eager_singletons = eager;
        self
    }

    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// Parse a JSON document, typically a section of a larger application config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

impl ContextConfigTrait for ContextConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var(ENV_DEFAULT_STUB) {
            config.default_stub = value.parse()?;
        }
        if let Ok(value) = env::var(ENV_STRICT_BINDINGS) {
            config.strict_bindings = parse_flag(ENV_STRICT_BINDINGS, &value)?;
        }
        if let Ok(value) = env::var(ENV_IMPLICIT_CONSTRUCTION) {
            config.implicit_construction = parse_flag(ENV_IMPLICIT_CONSTRUCTION, &value)?;
        }
        if let Ok(value) = env::var(ENV_EAGER_SINGLETONS) {
            config.eager_singletons = parse_flag(ENV_EAGER_SINGLETONS, &value)?;
        }
        if let Ok(value) = env::var(ENV_MAX_RESOLUTION_DEPTH) {
            config.max_resolution_depth = value.trim().parse().map_err(|_| {
                ConfigError::invalid_value(ENV_MAX_RESOLUTION_DEPTH, &value, "a positive integer")
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::validation_failed(
                "max_resolution_depth must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ENV_DEFAULT_STUB,
            ENV_STRICT_BINDINGS,
            ENV_IMPLICIT_CONSTRUCTION,
            ENV_EAGER_SINGLETONS,
            ENV_MAX_RESOLUTION_DEPTH,
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = ContextConfig::from_env().unwrap();
        assert_eq!(config, ContextConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var(ENV_DEFAULT_STUB, "error");
        env::set_var(ENV_STRICT_BINDINGS, "false");
        env::set_var(ENV_EAGER_SINGLETONS, "1");
        env::set_var(ENV_MAX_RESOLUTION_DEPTH, "32");

        let config = ContextConfig::from_env().unwrap();
        assert_eq!(config.default_stub, StubPolicy::Error);
        assert!(!config.strict_bindings);
        assert!(config.implicit_construction);
        assert!(config.eager_singletons);
        assert_eq!(config.max_resolution_depth, 32);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        env::set_var(ENV_DEFAULT_STUB, "panic");
        assert!(ContextConfig::from_env().is_err());

        clear_env();
        env::set_var(ENV_MAX_RESOLUTION_DEPTH, "0");
        assert!(matches!(
            ContextConfig::from_env(),
            Err(ConfigError::ValidationFailed { .. })
        ));
        clear_env();
    }

    #[test]
    fn test_from_json_uses_defaults_for_missing_fields() {
        let config = ContextConfig::from_json(r#"{ "default_stub": "error" }"#).unwrap();
        assert_eq!(config.default_stub, StubPolicy::Error);
        assert!(config.strict_bindings);
        assert_eq!(config.max_resolution_depth, 256);
    }

    #[test]
    fn test_stub_policy_round_trip() {
        assert_eq!("Error".parse::<StubPolicy>().unwrap(), StubPolicy::Error);
        assert_eq!(StubPolicy::Default.to_string(), "default");
    }
}
