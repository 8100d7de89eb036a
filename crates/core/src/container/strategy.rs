use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::container::autowiring::Injectable;
use crate::container::collection::ComponentCollection;
use crate::container::instance::ComponentInstance;
use crate::container::resolver::ResolutionContext;
use crate::container::scope::ComponentScope;
use crate::errors::{CompositionError, CompositionResult};

/// Produces one instance of `T` given a resolution context
pub trait InstantiationStrategy<T: ?Sized + Send + Sync + 'static>: Send + Sync + 'static {
    fn instantiate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<Arc<T>>;

    fn scope(&self) -> ComponentScope {
        ComponentScope::Prototype
    }

    /// Human-readable description for diagnostics and conflict messages
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<T, S> InstantiationStrategy<T> for Arc<S>
where
    T: ?Sized + Send + Sync + 'static,
    S: InstantiationStrategy<T> + ?Sized + 'static,
{
    fn instantiate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<Arc<T>> {
        (**self).instantiate(ctx)
    }

    fn scope(&self) -> ComponentScope {
        (**self).scope()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Strategy backed by a closure over the resolution context
pub struct SupplierStrategy<T: ?Sized, F> {
    supplier: F,
    scope: ComponentScope,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T, F> SupplierStrategy<T, F>
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&ResolutionContext<'_>) -> CompositionResult<Arc<T>> + Send + Sync + 'static,
{
    pub fn new(supplier: F) -> Self {
        Self {
            supplier,
            scope: ComponentScope::Prototype,
            _marker: PhantomData,
        }
    }

    pub fn with_scope(mut self, scope: ComponentScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn singleton(self) -> Self {
        self.with_scope(ComponentScope::Singleton)
    }
}

impl<T, F> InstantiationStrategy<T> for SupplierStrategy<T, F>
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&ResolutionContext<'_>) -> CompositionResult<Arc<T>> + Send + Sync + 'static,
{
    fn instantiate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<Arc<T>> {
        (self.supplier)(ctx)
    }

    fn scope(&self) -> ComponentScope {
        self.scope
    }

    fn describe(&self) -> String {
        format!("supplier<{}>", std::any::type_name::<T>())
    }
}

/// Strategy invoking the `Injectable` constructor of `I`, exposed as `T`.
///
/// `T` is usually `I` itself or a trait object `I` implements.
pub struct ConstructorStrategy<T: ?Sized, I> {
    coerce: fn(Arc<I>) -> Arc<T>,
    scope: ComponentScope,
}

impl<I: Injectable> ConstructorStrategy<I, I> {
    pub fn new() -> Self {
        Self {
            coerce: |instance| instance,
            scope: I::scope(),
        }
    }
}

impl<I: Injectable> Default for ConstructorStrategy<I, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static, I: Injectable> ConstructorStrategy<T, I> {
    /// Construct `I` and hand it out as `T`, typically `|i| i as Arc<dyn Trait>`
    pub fn as_interface(coerce: fn(Arc<I>) -> Arc<T>) -> Self {
        Self {
            coerce,
            scope: I::scope(),
        }
    }

    pub fn with_scope(mut self, scope: ComponentScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn singleton(self) -> Self {
        self.with_scope(ComponentScope::Singleton)
    }
}

impl<T: ?Sized + Send + Sync + 'static, I: Injectable> InstantiationStrategy<T>
    for ConstructorStrategy<T, I>
{
    fn instantiate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<Arc<T>> {
        let instance = I::create(ctx)?;
        Ok((self.coerce)(Arc::new(instance)))
    }

    fn scope(&self) -> ComponentScope {
        self.scope
    }

    fn describe(&self) -> String {
        format!("constructor<{}>", std::any::type_name::<I>())
    }
}

/// Strategy handing out a pre-built instance
pub struct InstanceStrategy<T: ?Sized> {
    instance: Arc<T>,
}

impl<T: ?Sized + Send + Sync + 'static> InstanceStrategy<T> {
    pub fn new(instance: Arc<T>) -> Self {
        Self { instance }
    }
}

impl<T: ?Sized + Send + Sync + 'static> InstantiationStrategy<T> for InstanceStrategy<T> {
    fn instantiate(&self, _ctx: &ResolutionContext<'_>) -> CompositionResult<Arc<T>> {
        Ok(self.instance.clone())
    }

    fn scope(&self) -> ComponentScope {
        ComponentScope::Singleton
    }

    fn describe(&self) -> String {
        format!("instance<{}>", std::any::type_name::<T>())
    }
}

/// Caches the first instance produced by an inner strategy.
///
/// Used where no scope record exists, most notably for singleton collection
/// members. Other threads block while the first instance is built; the
/// building thread asking again is a cycle.
pub struct SingletonStrategy<T: ?Sized, S> {
    inner: S,
    instance: Mutex<Option<Arc<T>>>,
    builder: Mutex<Option<ThreadId>>,
}

impl<T, S> SingletonStrategy<T, S>
where
    T: ?Sized + Send + Sync + 'static,
    S: InstantiationStrategy<T>,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            instance: Mutex::new(None),
            builder: Mutex::new(None),
        }
    }

    fn set_builder(&self, builder: Option<ThreadId>) -> CompositionResult<()> {
        *self
            .builder
            .lock()
            .map_err(|_| CompositionError::lock("singleton_strategy"))? = builder;
        Ok(())
    }
}

impl<T, S> InstantiationStrategy<T> for SingletonStrategy<T, S>
where
    T: ?Sized + Send + Sync + 'static,
    S: InstantiationStrategy<T>,
{
    fn instantiate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<Arc<T>> {
        let current = thread::current().id();
        {
            let builder = self
                .builder
                .lock()
                .map_err(|_| CompositionError::lock("singleton_strategy"))?;
            if *builder == Some(current) {
                return Err(CompositionError::UnbreakableCycle {
                    path: ctx.path().path_string(None),
                    cycle_component: self.describe(),
                });
            }
        }

        let mut slot = self
            .instance
            .lock()
            .map_err(|_| CompositionError::lock("singleton_strategy"))?;
        if let Some(instance) = slot.as_ref() {
            return Ok(instance.clone());
        }

        self.set_builder(Some(current))?;
        let result = self.inner.instantiate(ctx);
        self.set_builder(None)?;

        let instance = result?;
        *slot = Some(instance.clone());
        Ok(instance)
    }

    fn scope(&self) -> ComponentScope {
        ComponentScope::Singleton
    }

    fn describe(&self) -> String {
        format!("singleton({})", self.inner.describe())
    }
}

/// Aggregates member strategies into an ordered `ComponentCollection`
pub struct CollectionStrategy<T: ?Sized> {
    members: Vec<(i32, Arc<dyn InstantiationStrategy<T>>)>,
    scope: ComponentScope,
}

impl<T: ?Sized + Send + Sync + 'static> CollectionStrategy<T> {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            scope: ComponentScope::Prototype,
        }
    }

    /// Add a member; equal priorities keep insertion order
    pub fn add<S: InstantiationStrategy<T>>(mut self, strategy: S, priority: i32) -> Self {
        let position = self
            .members
            .iter()
            .position(|(existing, _)| *existing < priority)
            .unwrap_or(self.members.len());
        let member: Arc<dyn InstantiationStrategy<T>> = Arc::new(strategy);
        self.members.insert(position, (priority, member));
        self
    }

    pub fn with_scope(mut self, scope: ComponentScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for CollectionStrategy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> InstantiationStrategy<ComponentCollection<T>>
    for CollectionStrategy<T>
{
    fn instantiate(
        &self,
        ctx: &ResolutionContext<'_>,
    ) -> CompositionResult<Arc<ComponentCollection<T>>> {
        let items = self
            .members
            .iter()
            .map(|(_, member)| member.instantiate(ctx))
            .collect::<CompositionResult<Vec<_>>>()?;
        Ok(Arc::new(ComponentCollection::new(items)))
    }

    fn scope(&self) -> ComponentScope {
        self.scope
    }

    fn describe(&self) -> String {
        format!(
            "collection<{}>[{}]",
            std::any::type_name::<T>(),
            self.members.len()
        )
    }
}

/// Type-erased view of a strategy as stored in binding hierarchies
pub(crate) trait ErasedStrategy: Send + Sync {
    fn instantiate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<ComponentInstance>;

    fn scope(&self) -> ComponentScope;

    fn describe(&self) -> String;
}

pub(crate) struct TypedStrategy<T: ?Sized> {
    inner: Arc<dyn InstantiationStrategy<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> TypedStrategy<T> {
    pub(crate) fn erase<S: InstantiationStrategy<T>>(strategy: S) -> Arc<dyn ErasedStrategy> {
        Arc::new(Self {
            inner: Arc::new(strategy),
        })
    }
}

impl<T: ?Sized + Send + Sync + 'static> ErasedStrategy for TypedStrategy<T> {
    fn instantiate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<ComponentInstance> {
        self.inner.instantiate(ctx).map(ComponentInstance::new)
    }

    fn scope(&self) -> ComponentScope {
        self.inner.scope()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
