use std::sync::Arc;

use crate::config::{ContextConfig, ContextConfigTrait, StubPolicy};
use crate::container::autowiring::{Injectable, PopulateFields};
use crate::container::context::ApplicationContext;
use crate::container::key::ComponentKey;
use crate::container::pipeline::{ComponentPostProcessor, ComponentPreProcessor};
use crate::container::strategy::{InstanceStrategy, InstantiationStrategy};
use crate::errors::CompositionResult;
use crate::proxy::handle::ProxyHandle;

type Step = Box<dyn FnOnce(&ApplicationContext) -> CompositionResult<()> + Send>;

/// Builder for an application context with fluent API.
///
/// Registrations are recorded and replayed against the context in order on
/// `build`, so the first failing one is reported there.
pub struct ApplicationContextBuilder {
    config: ContextConfig,
    steps: Vec<Step>,
}

impl ApplicationContextBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            steps: Vec::new(),
        }
    }

    /// Start from the environment configuration
    pub fn from_env() -> CompositionResult<Self> {
        Ok(Self::new().with_config(ContextConfig::from_env()?))
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strict_bindings(mut self, strict: bool) -> Self {
        self.config.strict_bindings = strict;
        self
    }

    pub fn default_stub(mut self, policy: StubPolicy) -> Self {
        self.config.default_stub = policy;
        self
    }

    /// Warm up every singleton when the context is built
    pub fn eager_singletons(mut self, eager: bool) -> Self {
        self.config.eager_singletons = eager;
        self
    }

    pub fn bind<T, S>(mut self, key: ComponentKey, strategy: S, priority: i32) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        self.steps.push(Box::new(move |context: &ApplicationContext| {
            context.register::<T, S>(key, strategy, priority).map(|_| ())
        }));
        self
    }

    /// Bind a pre-built instance under its own type
    pub fn bind_instance<T: ?Sized + Send + Sync + 'static>(self, instance: Arc<T>) -> Self {
        self.bind::<T, _>(ComponentKey::of::<T>(), InstanceStrategy::new(instance), 0)
    }

    pub fn bind_named<T, S>(self, name: impl Into<String>, strategy: S, priority: i32) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        self.bind::<T, S>(ComponentKey::of::<T>().with_name(name), strategy, priority)
    }

    /// Add a member to the unnamed collection of `T`
    pub fn bind_member<T, S>(self, strategy: S, priority: i32) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        self.bind::<T, S>(ComponentKey::collection::<T>(), strategy, priority)
    }

    pub fn override_binding<T, S>(mut self, key: ComponentKey, strategy: S) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        self.steps.push(Box::new(move |context: &ApplicationContext| {
            context.override_binding::<T, S>(key, strategy).map(|_| ())
        }));
        self
    }

    pub fn declare<T: Injectable>(mut self) -> Self {
        self.steps
            .push(Box::new(|context: &ApplicationContext| context.declare::<T>()));
        self
    }

    pub fn pre_processor<P: ComponentPreProcessor + 'static>(mut self, processor: P) -> Self {
        self.steps.push(Box::new(move |context: &ApplicationContext| {
            context.add_pre_processor(processor)
        }));
        self
    }

    pub fn post_processor<P: ComponentPostProcessor + 'static>(mut self, processor: P) -> Self {
        self.steps.push(Box::new(move |context: &ApplicationContext| {
            context.add_post_processor(processor)
        }));
        self
    }

    pub fn field_population<T: PopulateFields>(mut self) -> Self {
        self.steps.push(Box::new(|context: &ApplicationContext| {
            context.enable_field_population::<T>()
        }));
        self
    }

    pub fn proxy_type<T, F>(mut self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(ProxyHandle<T>) -> Arc<T> + Send + Sync + 'static,
    {
        self.steps.push(Box::new(move |context: &ApplicationContext| {
            context.register_proxy_type::<T, F>(factory)
        }));
        self
    }

    /// Build the context, replaying registrations and warming up if configured
    pub fn build(self) -> CompositionResult<ApplicationContext> {
        self.config.validate()?;

        let eager = self.config.eager_singletons;
        let context = ApplicationContext::with_config(self.config);
        for step in self.steps {
            step(&context)?;
        }

        if eager {
            context.warm_up()?;
        }

        tracing::info!(context = %context.id(), eager, "application context built");
        Ok(context)
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApplicationContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContextBuilder")
            .field("config", &self.config)
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::strategy::SupplierStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_registers_in_order() {
        let context = ApplicationContextBuilder::new()
            .bind_instance(Arc::new(8080u16))
            .bind_named::<String, _>(
                "url",
                SupplierStrategy::new(|ctx| {
                    let port = ctx.get::<u16>()?;
                    Ok(Arc::new(format!("http://localhost:{}", port)))
                }),
                0,
            )
            .build()
            .unwrap();

        assert_eq!(*context.get_named::<String>("url").unwrap(), "http://localhost:8080");
    }

    #[test]
    fn test_eager_build_constructs_singletons() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let context = ApplicationContextBuilder::new()
            .eager_singletons(true)
            .bind::<String, _>(
                ComponentKey::of::<String>(),
                SupplierStrategy::new(move |_ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new("warm".to_string()))
                })
                .singleton(),
                0,
            )
            .build()
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        context.get::<String>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_build_reports_conflicts() {
        let result = ApplicationContextBuilder::new()
            .bind_named::<u8, _>("level", InstanceStrategy::new(Arc::new(1u8)), 0)
            .bind_named::<u8, _>("level", InstanceStrategy::new(Arc::new(2u8)), 0)
            .build();

        assert!(result.unwrap_err().is_conflict());
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let result = ApplicationContextBuilder::new()
            .with_config(ContextConfig::new().with_max_resolution_depth(0))
            .build();

        assert!(matches!(
            result,
            Err(crate::errors::CompositionError::Configuration { .. })
        ));
    }
}
