use serde::Serialize;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::container::autowiring::PopulateFields;
use crate::container::instance::ComponentInstance;
use crate::container::key::ComponentKey;
use crate::container::resolver::ResolutionContext;
use crate::errors::{CompositionError, CompositionResult};

/// Decision of a pre-processor about an upcoming construction
#[derive(Debug)]
pub enum PreProcessDecision {
    /// Let construction go ahead
    Continue,
    /// Skip the strategy and use this instance instead
    Replace(ComponentInstance),
    /// Abort resolution of the key
    Veto(String),
}

/// Runs before (or instead of) the winning strategy
pub trait ComponentPreProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs earlier
    fn priority(&self) -> i32 {
        0
    }

    fn applies_to(&self, key: &ComponentKey) -> bool;

    fn process(
        &self,
        ctx: &ResolutionContext<'_>,
        key: &ComponentKey,
    ) -> CompositionResult<PreProcessDecision>;
}

/// Runs on every fresh instance before it is cached or returned
pub trait ComponentPostProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs earlier
    fn priority(&self) -> i32 {
        0
    }

    fn applies_to(&self, key: &ComponentKey) -> bool;

    /// Return the instance to continue with; may be a wrapper of the input
    fn process(
        &self,
        ctx: &ResolutionContext<'_>,
        key: &ComponentKey,
        instance: ComponentInstance,
    ) -> CompositionResult<ComponentInstance>;
}

/// Diagnostic view of a registered processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorInfo {
    pub name: String,
    pub priority: i32,
}

/// Ordered pre- and post-processor sequences of one context
#[derive(Default)]
pub struct ProcessingPipeline {
    pre: RwLock<Vec<Arc<dyn ComponentPreProcessor>>>,
    post: RwLock<Vec<Arc<dyn ComponentPostProcessor>>>,
}

impl ProcessingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_processor(&self, processor: Arc<dyn ComponentPreProcessor>) -> CompositionResult<()> {
        let mut pre = self
            .pre
            .write()
            .map_err(|_| CompositionError::lock("pre_processors"))?;
        let position = pre
            .iter()
            .position(|existing| existing.priority() > processor.priority())
            .unwrap_or(pre.len());
        tracing::debug!(processor = processor.name(), priority = processor.priority(), "pre-processor added");
        pre.insert(position, processor);
        Ok(())
    }

    pub fn add_post_processor(&self, processor: Arc<dyn ComponentPostProcessor>) -> CompositionResult<()> {
        let mut post = self
            .post
            .write()
            .map_err(|_| CompositionError::lock("post_processors"))?;
        let position = post
            .iter()
            .position(|existing| existing.priority() > processor.priority())
            .unwrap_or(post.len());
        tracing::debug!(processor = processor.name(), priority = processor.priority(), "post-processor added");
        post.insert(position, processor);
        Ok(())
    }

    fn applicable_pre(&self, key: &ComponentKey) -> CompositionResult<Vec<Arc<dyn ComponentPreProcessor>>> {
        let pre = self
            .pre
            .read()
            .map_err(|_| CompositionError::lock("pre_processors"))?;
        Ok(pre.iter().filter(|p| p.applies_to(key)).cloned().collect())
    }

    fn applicable_post(&self, key: &ComponentKey) -> CompositionResult<Vec<Arc<dyn ComponentPostProcessor>>> {
        let post = self
            .post
            .read()
            .map_err(|_| CompositionError::lock("post_processors"))?;
        Ok(post.iter().filter(|p| p.applies_to(key)).cloned().collect())
    }

    /// Run applicable pre-processors; `Some` means construction is replaced
    pub(crate) fn run_pre(
        &self,
        ctx: &ResolutionContext<'_>,
        key: &ComponentKey,
    ) -> CompositionResult<Option<ComponentInstance>> {
        for processor in self.applicable_pre(key)? {
            let decision = processor
                .process(ctx, key)
                .map_err(|error| wrap_processor_error(error, key, processor.name()))?;

            match decision {
                PreProcessDecision::Continue => {}
                PreProcessDecision::Replace(instance) => {
                    tracing::trace!(key = %key, processor = processor.name(), "construction replaced by pre-processor");
                    return Ok(Some(instance));
                }
                PreProcessDecision::Veto(reason) => {
                    tracing::debug!(key = %key, processor = processor.name(), %reason, "resolution vetoed");
                    return Err(CompositionError::processing(key, processor.name(), reason));
                }
            }
        }
        Ok(None)
    }

    pub(crate) fn run_post(
        &self,
        ctx: &ResolutionContext<'_>,
        key: &ComponentKey,
        mut instance: ComponentInstance,
    ) -> CompositionResult<ComponentInstance> {
        for processor in self.applicable_post(key)? {
            instance = processor
                .process(ctx, key, instance)
                .map_err(|error| wrap_processor_error(error, key, processor.name()))?;
        }
        Ok(instance)
    }

    pub fn pre_processors(&self) -> Vec<ProcessorInfo> {
        self.pre
            .read()
            .map(|pre| {
                pre.iter()
                    .map(|p| ProcessorInfo {
                        name: p.name().to_string(),
                        priority: p.priority(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn post_processors(&self) -> Vec<ProcessorInfo> {
        self.post
            .read()
            .map(|post| {
                post.iter()
                    .map(|p| ProcessorInfo {
                        name: p.name().to_string(),
                        priority: p.priority(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingPipeline")
            .field("pre", &self.pre_processors())
            .field("post", &self.post_processors())
            .finish()
    }
}

// Failures of nested resolutions keep their own shape; anything else the
// processor raised becomes a processing error naming it.
fn wrap_processor_error(error: CompositionError, key: &ComponentKey, processor: &str) -> CompositionError {
    match error {
        CompositionError::Processing { .. }
        | CompositionError::UnbreakableCycle { .. }
        | CompositionError::ConstructionFailed { .. }
        | CompositionError::UnresolvedComponent { .. } => error,
        other => CompositionError::processing(key, processor, other.to_string()),
    }
}

/// Calls `PopulateFields::populate` on fresh instances of `T`
pub struct FieldPopulationProcessor<T: ?Sized> {
    priority: i32,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: PopulateFields> FieldPopulationProcessor<T> {
    pub const DEFAULT_PRIORITY: i32 = -100;

    pub fn new() -> Self {
        Self {
            priority: Self::DEFAULT_PRIORITY,
            _marker: PhantomData,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<T: PopulateFields> Default for FieldPopulationProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PopulateFields> ComponentPostProcessor for FieldPopulationProcessor<T> {
    fn name(&self) -> &str {
        "field-population"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn applies_to(&self, key: &ComponentKey) -> bool {
        key.is_type::<T>() && !key.is_collection()
    }

    fn process(
        &self,
        ctx: &ResolutionContext<'_>,
        key: &ComponentKey,
        instance: ComponentInstance,
    ) -> CompositionResult<ComponentInstance> {
        let typed = instance
            .downcast::<T>()
            .ok_or_else(|| CompositionError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        typed.populate(ctx)?;
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::context::ApplicationContext;
    use crate::container::strategy::SupplierStrategy;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ComponentPostProcessor for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn applies_to(&self, key: &ComponentKey) -> bool {
            key.is_type::<String>()
        }

        fn process(
            &self,
            _ctx: &ResolutionContext<'_>,
            _key: &ComponentKey,
            instance: ComponentInstance,
        ) -> CompositionResult<ComponentInstance> {
            self.log.lock().unwrap().push(self.name);
            Ok(instance)
        }
    }

    struct Gate;

    impl ComponentPreProcessor for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn applies_to(&self, key: &ComponentKey) -> bool {
            key.name() == Some("forbidden")
        }

        fn process(
            &self,
            _ctx: &ResolutionContext<'_>,
            _key: &ComponentKey,
        ) -> CompositionResult<PreProcessDecision> {
            Ok(PreProcessDecision::Veto("not allowed here".to_string()))
        }
    }

    #[test]
    fn test_post_processors_run_in_ascending_priority() {
        let context = ApplicationContext::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, priority) in [("late", 10), ("early", -5), ("middle", 0), ("middle-second", 0)] {
            context
                .add_post_processor(Recorder {
                    name,
                    priority,
                    log: log.clone(),
                })
                .unwrap();
        }
        context
            .register(
                ComponentKey::of::<String>(),
                SupplierStrategy::new(|_ctx| Ok(Arc::new("value".to_string()))),
                0,
            )
            .unwrap();

        context.get::<String>().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "middle-second", "late"]);

        let names: Vec<String> = context.pipeline().post_processors().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["early", "middle", "middle-second", "late"]);
    }

    #[test]
    fn test_veto_aborts_with_processing_error() {
        let context = ApplicationContext::new();
        context.add_pre_processor(Gate).unwrap();
        context
            .register(
                ComponentKey::named::<String>("forbidden"),
                SupplierStrategy::new(|_ctx| Ok(Arc::new("never".to_string()))),
                0,
            )
            .unwrap();
        context
            .register(
                ComponentKey::named::<String>("allowed"),
                SupplierStrategy::new(|_ctx| Ok(Arc::new("fine".to_string()))),
                0,
            )
            .unwrap();

        let error = context.get_named::<String>("forbidden").unwrap_err();
        assert!(error.is_processing());
        assert!(error.to_string().contains("not allowed here"));
        assert_eq!(*context.get_named::<String>("allowed").unwrap(), "fine");
    }
}
