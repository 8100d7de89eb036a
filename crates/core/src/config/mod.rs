pub mod context_config;
pub mod validation;

pub use context_config::{ContextConfig, ContextConfigTrait, StubPolicy};
pub use validation::ConfigError;
