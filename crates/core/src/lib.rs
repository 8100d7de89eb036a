pub mod config;
pub mod container;
pub mod errors;
pub mod proxy;

// Re-export key types for convenience
pub use config::validation::ConfigError;
pub use config::{ContextConfig, ContextConfigTrait, StubPolicy};
pub use container::{
    ApplicationContext, ApplicationContextBuilder, ComponentCollection, ComponentKey,
    ComponentScope, Inject, Injectable, InstantiationStrategy, PopulateFields, ResolutionContext,
};
pub use errors::{CompositionError, CompositionResult};
pub use proxy::{Advice, MethodAdvisor, MethodSignature, ProxyHandle, ProxyReturn};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
