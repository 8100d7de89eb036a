use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::config::ContextConfig;
use crate::container::autowiring::{ConstructorTable, Injectable, PopulateFields};
use crate::container::collection::ComponentCollection;
use crate::container::diagnostics::{
    BindingDiagnostics, CollectionDiagnostics, ContextDiagnostics, ScopeDiagnostics,
};
use crate::container::hierarchy::{
    BindingHierarchy, BindingInfo, CollectionHierarchy, RegistrationOutcome,
};
use crate::container::instance::ComponentInstance;
use crate::container::key::ComponentKey;
use crate::container::pipeline::{
    ComponentPostProcessor, ComponentPreProcessor, FieldPopulationProcessor, ProcessingPipeline,
};
use crate::container::registry::{Acquisition, ScopeRegistry};
use crate::container::resolver::{CycleRestart, ResolutionContext};
use crate::container::scope::{ComponentScope, ContextStorage};
use crate::container::strategy::{
    ErasedStrategy, InstantiationStrategy, SingletonStrategy, TypedStrategy,
};
use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::handle::ProxyHandle;
use crate::proxy::manager::ProxyManager;
use crate::proxy::processor::ProxyPostProcessor;
use crate::proxy::registry::ProxyRegistry;
use crate::proxy::stub::MethodStub;

/// The composition engine: bindings, scopes, processors and proxies of one application.
///
/// Registration and resolution both take `&self`; the context is meant to be
/// shared behind an `Arc` across threads once bootstrapping is done.
pub struct ApplicationContext {
    /// Identifier recorded on every log event of this context
    id: Uuid,
    config: ContextConfig,
    /// Single-component bindings by key
    bindings: RwLock<HashMap<ComponentKey, BindingHierarchy>>,
    /// Collection members by collection key
    collections: RwLock<HashMap<ComponentKey, CollectionHierarchy>>,
    /// Assembled singleton collections
    sealed: RwLock<HashMap<ComponentKey, ComponentInstance>>,
    scopes: ScopeRegistry,
    constructors: ConstructorTable,
    pipeline: ProcessingPipeline,
    storage: ContextStorage,
    proxies: ProxyRegistry,
}

impl ApplicationContext {
    /// Create a context with default configuration
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(context = %id, ?config, "application context created");
        Self {
            id,
            proxies: ProxyRegistry::new(config.default_stub),
            config,
            bindings: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
            sealed: RwLock::new(HashMap::new()),
            scopes: ScopeRegistry::new(),
            constructors: ConstructorTable::new(),
            pipeline: ProcessingPipeline::new(),
            storage: ContextStorage::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    // ----------------------------------------------------------------------
    // Registration
    // ----------------------------------------------------------------------

    /// Register `strategy` for `key` at `priority`.
    ///
    /// Collection keys add a member; equal priorities are allowed there. For
    /// single-component keys an occupied priority is a conflict in strict
    /// mode and ignored otherwise, keeping the first registration.
    pub fn register<T, S>(
        &self,
        key: ComponentKey,
        strategy: S,
        priority: i32,
    ) -> CompositionResult<RegistrationOutcome>
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        check_key_type::<T>(&key)?;

        if key.is_collection() {
            self.add_collection_member::<T, S>(key, strategy, priority)?;
            return Ok(RegistrationOutcome::Registered);
        }

        let description = strategy.describe();
        let erased = TypedStrategy::<T>::erase(strategy);
        let outcome = {
            let mut bindings = self.write_bindings()?;
            bindings
                .entry(key.clone())
                .or_insert_with(|| BindingHierarchy::new(key.clone()))
                .register(erased, priority, self.config.strict_bindings)?
        };

        match outcome {
            RegistrationOutcome::Registered => {
                self.scopes.evict(&key)?;
                tracing::debug!(context = %self.id, key = %key, priority, strategy = %description, "binding registered");
            }
            RegistrationOutcome::Ignored => {
                tracing::warn!(
                    context = %self.id,
                    key = %key,
                    priority,
                    strategy = %description,
                    "priority already taken, registration ignored"
                );
            }
        }
        Ok(outcome)
    }

    /// Put `strategy` at `priority`, displacing whatever was registered there
    pub fn replace<T, S>(&self, key: ComponentKey, strategy: S, priority: i32) -> CompositionResult<Option<String>>
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        check_key_type::<T>(&key)?;

        if key.is_collection() {
            let removed = self.unregister(&key, priority)?;
            self.add_collection_member::<T, S>(key, strategy, priority)?;
            return Ok(removed.then(|| format!("collection members at priority {}", priority)));
        }

        let erased = TypedStrategy::<T>::erase(strategy);
        let previous = {
            let mut bindings = self.write_bindings()?;
            bindings
                .entry(key.clone())
                .or_insert_with(|| BindingHierarchy::new(key.clone()))
                .replace(erased, priority)
        };
        self.scopes.evict(&key)?;

        if let Some(previous) = &previous {
            tracing::debug!(context = %self.id, key = %key, priority, replaced = %previous, "binding replaced");
        }
        Ok(previous)
    }

    /// Register above the current highest priority and return the priority used
    pub fn override_binding<T, S>(&self, key: ComponentKey, strategy: S) -> CompositionResult<i32>
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        check_key_type::<T>(&key)?;
        if key.is_collection() {
            return Err(CompositionError::InvalidKey {
                key: key.to_string(),
                message: "collection members cannot be overridden, register another member".to_string(),
            });
        }

        let erased = TypedStrategy::<T>::erase(strategy);
        let priority = {
            let mut bindings = self.write_bindings()?;
            bindings
                .entry(key.clone())
                .or_insert_with(|| BindingHierarchy::new(key.clone()))
                .override_binding(erased)?
        };
        self.scopes.evict(&key)?;

        tracing::warn!(context = %self.id, key = %key, priority, "binding overridden");
        Ok(priority)
    }

    /// Remove the entry registered at `priority`; returns whether anything was removed
    pub fn unregister(&self, key: &ComponentKey, priority: i32) -> CompositionResult<bool> {
        let removed = if key.is_collection() {
            let removed = {
                let mut collections = self.write_collections()?;
                collections
                    .get_mut(key)
                    .map(|collection| collection.remove(priority))
                    .unwrap_or(false)
            };
            if removed {
                self.unseal(key)?;
            }
            removed
        } else {
            let removed = {
                let mut bindings = self.write_bindings()?;
                let removed = bindings
                    .get_mut(key)
                    .map(|hierarchy| hierarchy.remove(priority))
                    .unwrap_or(false);
                if bindings.get(key).map(|h| h.is_empty()).unwrap_or(false) {
                    bindings.remove(key);
                }
                removed
            };
            if removed {
                self.scopes.evict(key)?;
            }
            removed
        };

        if removed {
            tracing::debug!(context = %self.id, key = %key, priority, "binding removed");
        }
        Ok(removed)
    }

    /// Scope of an assembled collection; singleton collections are sealed once
    pub fn set_collection_scope(&self, key: &ComponentKey, scope: ComponentScope) -> CompositionResult<()> {
        {
            let mut collections = self.write_collections()?;
            let collection = collections
                .get_mut(key)
                .ok_or_else(|| CompositionError::unresolved(key))?;
            collection.set_scope(scope);
        }
        self.unseal(key)
    }

    /// Record the constructor of `T` for implicit construction
    pub fn declare<T: Injectable>(&self) -> CompositionResult<()> {
        self.constructors.declare::<T>()?;
        tracing::trace!(context = %self.id, component = std::any::type_name::<T>(), "constructor declared");
        Ok(())
    }

    pub fn constructors(&self) -> &ConstructorTable {
        &self.constructors
    }

    fn add_collection_member<T, S>(&self, key: ComponentKey, strategy: S, priority: i32) -> CompositionResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        S: InstantiationStrategy<T>,
    {
        let erased: Arc<dyn ErasedStrategy> = if strategy.scope().is_singleton() {
            TypedStrategy::<T>::erase(SingletonStrategy::new(strategy))
        } else {
            TypedStrategy::<T>::erase(strategy)
        };

        {
            let mut collections = self.write_collections()?;
            collections
                .entry(key.clone())
                .or_insert_with(|| CollectionHierarchy::new::<T>(key.clone()))
                .add(erased, priority);
        }
        self.unseal(&key)?;

        tracing::debug!(context = %self.id, key = %key, priority, "collection member registered");
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Pipeline
    // ----------------------------------------------------------------------

    pub fn add_pre_processor<P: ComponentPreProcessor + 'static>(&self, processor: P) -> CompositionResult<()> {
        self.pipeline.add_pre_processor(Arc::new(processor))
    }

    pub fn add_post_processor<P: ComponentPostProcessor + 'static>(&self, processor: P) -> CompositionResult<()> {
        self.pipeline.add_post_processor(Arc::new(processor))
    }

    pub fn pipeline(&self) -> &ProcessingPipeline {
        &self.pipeline
    }

    /// State owned by processors across invocations
    pub fn storage(&self) -> &ContextStorage {
        &self.storage
    }

    /// Populate `Inject` fields of every fresh `T`
    pub fn enable_field_population<T: PopulateFields>(&self) -> CompositionResult<()> {
        self.add_post_processor(FieldPopulationProcessor::<T>::new())
    }

    // ----------------------------------------------------------------------
    // Proxies
    // ----------------------------------------------------------------------

    /// Make `T` interceptable: fresh instances get wrapped by `factory` and
    /// dependency cycles through `T` can be broken with a deferred proxy
    pub fn register_proxy_type<T, F>(&self, factory: F) -> CompositionResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(ProxyHandle<T>) -> Arc<T> + Send + Sync + 'static,
    {
        let replaced = self.proxies.register_factory::<T>(Arc::new(factory))?;
        if !replaced {
            self.add_post_processor(ProxyPostProcessor::<T>::new())?;
        }
        tracing::debug!(context = %self.id, proxied = std::any::type_name::<T>(), replaced, "proxy type registered");
        Ok(())
    }

    /// Proxy with no target; every call goes to advisors, then the stub
    pub fn create_proxy<T: ?Sized + Send + Sync + 'static>(&self) -> CompositionResult<Arc<T>> {
        let factory = self.proxy_factory::<T>()?;
        let manager = self.proxies.manager_for::<T>()?;
        Ok(factory(ProxyHandle::detached(manager)))
    }

    /// Proxy around an existing instance
    pub fn create_proxy_for<T: ?Sized + Send + Sync + 'static>(&self, target: Arc<T>) -> CompositionResult<Arc<T>> {
        let factory = self.proxy_factory::<T>()?;
        let manager = self.proxies.manager_for::<T>()?;
        Ok(factory(ProxyHandle::direct(manager, target)))
    }

    /// The interception chain of `T`, created on first request
    pub fn advisors_for<T: ?Sized + Send + Sync + 'static>(&self) -> CompositionResult<Arc<ProxyManager<T>>> {
        self.proxies.manager_for::<T>()
    }

    pub fn stub_for<T: ?Sized + Send + Sync + 'static>(&self) -> CompositionResult<Arc<dyn MethodStub>> {
        self.proxies.manager_for::<T>()?.stub()
    }

    pub fn set_stub_for<T, S>(&self, stub: S) -> CompositionResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        S: MethodStub + 'static,
    {
        self.proxies.manager_for::<T>()?.set_stub(stub)
    }

    pub fn proxies(&self) -> &ProxyRegistry {
        &self.proxies
    }

    fn proxy_factory<T: ?Sized + Send + Sync + 'static>(&self) -> CompositionResult<crate::proxy::ProxyFactory<T>> {
        self.proxies
            .factory::<T>()
            .ok_or_else(|| CompositionError::InvalidKey {
                key: ComponentKey::of::<T>().to_string(),
                message: "type has no registered proxy factory".to_string(),
            })
    }

    // ----------------------------------------------------------------------
    // Resolution
    // ----------------------------------------------------------------------

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> CompositionResult<Arc<T>> {
        self.get_by_key::<T>(&ComponentKey::of::<T>())
    }

    pub fn get_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> CompositionResult<Arc<T>> {
        self.get_by_key::<T>(&ComponentKey::named::<T>(name))
    }

    /// Resolve `key` as `T`. For collection keys `T` is the `ComponentCollection`
    pub fn get_by_key<T: ?Sized + Send + Sync + 'static>(&self, key: &ComponentKey) -> CompositionResult<Arc<T>> {
        let ctx = ResolutionContext::new(self);
        self.resolve_typed::<T>(key, &ctx)
    }

    pub fn collect<T: ?Sized + Send + Sync + 'static>(&self) -> CompositionResult<ComponentCollection<T>> {
        self.collect_by_key::<T>(&ComponentKey::collection::<T>())
    }

    pub fn collect_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> CompositionResult<ComponentCollection<T>> {
        self.collect_by_key::<T>(&ComponentKey::named::<T>(name).collecting())
    }

    pub fn collect_by_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &ComponentKey,
    ) -> CompositionResult<ComponentCollection<T>> {
        let ctx = ResolutionContext::new(self);
        self.collect_in::<T>(key, &ctx)
    }

    pub(crate) fn resolve_typed<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &ComponentKey,
        ctx: &ResolutionContext<'_>,
    ) -> CompositionResult<Arc<T>> {
        let instance = if key.is_collection() {
            self.collection_instance(key, ctx)?
        } else {
            check_key_type::<T>(key)?;
            self.resolve_instance(key, ctx)?
        };

        instance.downcast::<T>().ok_or_else(|| CompositionError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    pub(crate) fn collect_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &ComponentKey,
        ctx: &ResolutionContext<'_>,
    ) -> CompositionResult<ComponentCollection<T>> {
        let key = if key.is_collection() {
            key.clone()
        } else {
            key.clone().collecting()
        };
        check_key_type::<T>(&key)?;

        let instance = self.collection_instance(&key, ctx)?;
        instance
            .downcast::<ComponentCollection<T>>()
            .map(|collection| (*collection).clone())
            .ok_or_else(|| CompositionError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<ComponentCollection<T>>().to_string(),
            })
    }

    fn collection_instance(&self, key: &ComponentKey, ctx: &ResolutionContext<'_>) -> CompositionResult<ComponentInstance> {
        if let Some(sealed) = self.read_sealed()?.get(key) {
            return Ok(sealed.clone());
        }

        let (members, assembler, scope) = {
            let collections = self.read_collections()?;
            match collections.get(key) {
                Some(collection) => (collection.members().to_vec(), collection.assembler(), collection.scope()),
                None => {
                    tracing::trace!(context = %self.id, key = %key, "no members, empty collection");
                    return Ok(key.empty_collection());
                }
            }
        };

        tracing::trace!(context = %self.id, key = %key, members = members.len(), "assembling collection");
        let instance = assembler(&members, ctx).map_err(|error| error.wrap_construction(key))?;

        if scope.is_singleton() {
            let mut sealed = self
                .sealed
                .write()
                .map_err(|_| CompositionError::lock("sealed_collections"))?;
            return Ok(match sealed.entry(key.clone()) {
                Entry::Occupied(existing) => existing.get().clone(),
                Entry::Vacant(slot) => {
                    ctx.record_completed(key);
                    slot.insert(instance).clone()
                }
            });
        }
        Ok(instance)
    }

    fn resolve_instance(&self, key: &ComponentKey, ctx: &ResolutionContext<'_>) -> CompositionResult<ComponentInstance> {
        match self.resolve_once(key, ctx) {
            Err(error) if error.is_cycle() => match ctx.take_restart(key) {
                // enter the loop through `breaker` so it closes on the proxied side
                Some(breaker) => {
                    tracing::debug!(context = %self.id, key = %key, breaker = %breaker, "retrying cycle through interceptable key");
                    self.resolve_once(&breaker, ctx)?;
                    self.resolve_once(key, ctx)
                }
                None => Err(error),
            },
            other => other,
        }
    }

    fn resolve_once(&self, key: &ComponentKey, ctx: &ResolutionContext<'_>) -> CompositionResult<ComponentInstance> {
        tracing::trace!(context = %self.id, key = %key, depth = ctx.depth(), "resolving");

        let strategy = self.winning_strategy(key)?;

        if ctx.is_in_progress(key) {
            return self.handle_cycle(key, ctx);
        }
        if ctx.depth() >= self.config.max_resolution_depth {
            return Err(CompositionError::component(format!(
                "resolution deeper than {} levels: {}",
                self.config.max_resolution_depth,
                ctx.path_string(key)
            )));
        }

        if !strategy.scope().is_singleton() {
            return self.construct(key, &strategy, ctx);
        }

        match self.scopes.acquire(key)? {
            Acquisition::Ready(instance) => Ok(instance),
            // Under construction on this thread, but outside this resolution.
            Acquisition::Reentrant => Err(self.unbreakable(key, ctx)),
            Acquisition::Construct(guard) => {
                let instance = self.construct(key, &strategy, ctx)?;
                guard.complete(instance.clone())?;
                ctx.record_completed(key);
                tracing::debug!(context = %self.id, key = %key, "singleton created");
                Ok(instance)
            }
        }
    }

    fn winning_strategy(&self, key: &ComponentKey) -> CompositionResult<Arc<dyn ErasedStrategy>> {
        let bound = {
            let bindings = self.read_bindings()?;
            bindings
                .get(key)
                .and_then(|hierarchy| hierarchy.highest())
                .map(|entry| entry.strategy.clone())
        };
        if let Some(strategy) = bound {
            return Ok(strategy);
        }

        if self.config.implicit_construction && key.name().is_none() {
            if let Some(strategy) = self.constructors.strategy_for(key) {
                tracing::trace!(context = %self.id, key = %key, "using declared constructor");
                return Ok(strategy);
            }
        }

        Err(CompositionError::unresolved(key))
    }

    fn construct(
        &self,
        key: &ComponentKey,
        strategy: &Arc<dyn ErasedStrategy>,
        ctx: &ResolutionContext<'_>,
    ) -> CompositionResult<ComponentInstance> {
        let mark = ctx.completed_mark();
        ctx.enter(key);
        let result = self.run_construction(key, strategy, ctx);
        ctx.leave();

        let pending = ctx.take_pending_install(key);
        match (result, pending) {
            (Ok(instance), Some(pending)) => {
                pending.install(&instance)?;
                Ok(instance)
            }
            (Ok(instance), None) => Ok(instance),
            (Err(error), pending) => {
                if let Some(pending) = pending {
                    pending.fail(&error.to_string());
                    // anything cached since `mark` may hold the failed proxy
                    self.discard_completed(ctx.completed_since(mark));
                }
                tracing::debug!(context = %self.id, key = %key, %error, "construction failed");
                Err(error)
            }
        }
    }

    fn run_construction(
        &self,
        key: &ComponentKey,
        strategy: &Arc<dyn ErasedStrategy>,
        ctx: &ResolutionContext<'_>,
    ) -> CompositionResult<ComponentInstance> {
        let instance = match self.pipeline.run_pre(ctx, key)? {
            Some(replacement) => replacement,
            None => strategy
                .instantiate(ctx)
                .map_err(|error| error.wrap_construction(key))?,
        };
        self.pipeline.run_post(ctx, key, instance)
    }

    fn discard_completed(&self, keys: Vec<ComponentKey>) {
        for key in keys {
            let discarded = if key.is_collection() {
                self.sealed
                    .write()
                    .map(|mut sealed| sealed.remove(&key).is_some())
                    .unwrap_or(false)
            } else {
                self.scopes.evict(&key).unwrap_or(false)
            };
            if discarded {
                tracing::debug!(context = %self.id, key = %key, "discarded instance built around a failed deferred proxy");
            }
        }
    }

    fn handle_cycle(&self, key: &ComponentKey, ctx: &ResolutionContext<'_>) -> CompositionResult<ComponentInstance> {
        if let Some(pending) = ctx.pending_install(key) {
            return Ok(pending.proxy());
        }

        if let Some(pending) = self.proxies.deferred_proxy(key)? {
            ctx.add_pending_install(key, pending.clone());
            tracing::debug!(context = %self.id, key = %key, path = %ctx.path_string(key), "cycle broken with deferred proxy");
            return Ok(pending.proxy());
        }

        if let Some(breaker) = ctx.cycle_breaker(key, |candidate| self.proxies.is_interceptable_key(candidate)) {
            tracing::trace!(context = %self.id, key = %key, breaker = %breaker, "cycle closed on a key without proxy factory");
            ctx.set_restart(CycleRestart {
                restart: key.clone(),
                breaker,
            });
        }
        Err(self.unbreakable(key, ctx))
    }

    fn unbreakable(&self, key: &ComponentKey, ctx: &ResolutionContext<'_>) -> CompositionError {
        CompositionError::UnbreakableCycle {
            path: ctx.path_string(key),
            cycle_component: key.to_string(),
        }
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Resolve every singleton binding and singleton collection once,
    /// failing on the first error. Returns how many keys were warmed.
    ///
    /// Keys are warmed in a fixed order: interceptable keys first, then by
    /// rendered key.
    pub fn warm_up(&self) -> CompositionResult<usize> {
        let mut singletons: Vec<ComponentKey> = {
            let bindings = self.read_bindings()?;
            bindings
                .iter()
                .filter(|(_, hierarchy)| {
                    hierarchy
                        .highest()
                        .map(|entry| entry.strategy.scope().is_singleton())
                        .unwrap_or(false)
                })
                .map(|(key, _)| key.clone())
                .collect()
        };
        singletons.sort_by_cached_key(|key| (!self.proxies.is_interceptable_key(key), key.to_string()));
        let mut collections: Vec<ComponentKey> = {
            let collections = self.read_collections()?;
            collections
                .iter()
                .filter(|(_, collection)| collection.scope().is_singleton())
                .map(|(key, _)| key.clone())
                .collect()
        };
        collections.sort_by_cached_key(|key| key.to_string());

        for key in &singletons {
            let ctx = ResolutionContext::new(self);
            self.resolve_instance(key, &ctx)?;
        }
        for key in &collections {
            let ctx = ResolutionContext::new(self);
            self.collection_instance(key, &ctx)?;
        }

        let warmed = singletons.len() + collections.len();
        tracing::info!(context = %self.id, warmed, "singletons warmed up");
        Ok(warmed)
    }

    /// Drop cached singletons, sealed collections and proxy managers.
    /// Bindings stay, so the context can resolve again afterwards.
    pub fn shutdown(&self) -> CompositionResult<()> {
        let singletons = self.scopes.clear()?;
        let collections = {
            let mut sealed = self
                .sealed
                .write()
                .map_err(|_| CompositionError::lock("sealed_collections"))?;
            let count = sealed.len();
            sealed.clear();
            count
        };
        let managers = self.proxies.clear_managers()?;

        tracing::info!(context = %self.id, singletons, collections, managers, "application context shut down");
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Introspection
    // ----------------------------------------------------------------------

    /// Whether anything can produce `key`
    pub fn contains(&self, key: &ComponentKey) -> bool {
        if key.is_collection() {
            return true;
        }
        let bound = self
            .read_bindings()
            .map(|bindings| bindings.contains_key(key))
            .unwrap_or(false);
        bound || (self.config.implicit_construction && key.name().is_none() && self.constructors.contains(key))
    }

    /// Bindings of `key` in precedence order
    pub fn bindings_for(&self, key: &ComponentKey) -> Vec<BindingInfo> {
        if key.is_collection() {
            return self
                .read_collections()
                .ok()
                .and_then(|collections| collections.get(key).map(|c| c.order()))
                .unwrap_or_default();
        }
        self.read_bindings()
            .ok()
            .and_then(|bindings| bindings.get(key).map(|h| h.order()))
            .unwrap_or_default()
    }

    pub fn registered_keys(&self) -> Vec<ComponentKey> {
        let mut keys: Vec<ComponentKey> = self
            .read_bindings()
            .map(|bindings| bindings.keys().cloned().collect())
            .unwrap_or_default();
        if let Ok(collections) = self.read_collections() {
            keys.extend(collections.keys().cloned());
        }
        keys.sort_by_key(|key| key.to_string());
        keys
    }

    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    /// Serializable snapshot of the whole context
    pub fn diagnostics(&self) -> CompositionResult<ContextDiagnostics> {
        let mut bindings: Vec<BindingDiagnostics> = self
            .read_bindings()?
            .values()
            .map(|hierarchy| BindingDiagnostics {
                key: hierarchy.key().to_string(),
                bindings: hierarchy.order(),
            })
            .collect();
        bindings.sort_by(|a, b| a.key.cmp(&b.key));

        let sealed: Vec<ComponentKey> = self.read_sealed()?.keys().cloned().collect();
        let mut collections: Vec<CollectionDiagnostics> = self
            .read_collections()?
            .values()
            .map(|collection| CollectionDiagnostics {
                key: collection.key().to_string(),
                scope: collection.scope(),
                sealed: sealed.contains(collection.key()),
                members: collection.order(),
            })
            .collect();
        collections.sort_by(|a, b| a.key.cmp(&b.key));

        let mut scopes: Vec<ScopeDiagnostics> = self
            .scopes
            .states()
            .into_iter()
            .map(|(key, state)| ScopeDiagnostics {
                key: key.to_string(),
                state,
            })
            .collect();
        scopes.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(ContextDiagnostics {
            context_id: self.id,
            captured_at: chrono::Utc::now(),
            config: self.config.clone(),
            bindings,
            collections,
            scopes,
            pre_processors: self.pipeline.pre_processors(),
            post_processors: self.pipeline.post_processors(),
            proxies: self.proxies.managers(),
            declared_constructors: self.constructors.len(),
        })
    }

    // ----------------------------------------------------------------------
    // Lock helpers
    // ----------------------------------------------------------------------

    fn read_bindings(&self) -> CompositionResult<std::sync::RwLockReadGuard<'_, HashMap<ComponentKey, BindingHierarchy>>> {
        self.bindings.read().map_err(|_| CompositionError::lock("bindings"))
    }

    fn write_bindings(&self) -> CompositionResult<std::sync::RwLockWriteGuard<'_, HashMap<ComponentKey, BindingHierarchy>>> {
        self.bindings.write().map_err(|_| CompositionError::lock("bindings"))
    }

    fn read_collections(
        &self,
    ) -> CompositionResult<std::sync::RwLockReadGuard<'_, HashMap<ComponentKey, CollectionHierarchy>>> {
        self.collections.read().map_err(|_| CompositionError::lock("collections"))
    }

    fn write_collections(
        &self,
    ) -> CompositionResult<std::sync::RwLockWriteGuard<'_, HashMap<ComponentKey, CollectionHierarchy>>> {
        self.collections.write().map_err(|_| CompositionError::lock("collections"))
    }

    fn read_sealed(&self) -> CompositionResult<std::sync::RwLockReadGuard<'_, HashMap<ComponentKey, ComponentInstance>>> {
        self.sealed.read().map_err(|_| CompositionError::lock("sealed_collections"))
    }

    fn unseal(&self, key: &ComponentKey) -> CompositionResult<()> {
        let mut sealed = self
            .sealed
            .write()
            .map_err(|_| CompositionError::lock("sealed_collections"))?;
        if sealed.remove(key).is_some() {
            tracing::trace!(context = %self.id, key = %key, "collection unsealed");
        }
        Ok(())
    }
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("keys", &self.registered_keys().len())
            .field("scopes", &self.scopes)
            .field("pipeline", &self.pipeline)
            .field("proxies", &self.proxies)
            .finish()
    }
}

fn check_key_type<T: ?Sized + 'static>(key: &ComponentKey) -> CompositionResult<()> {
    if key.is_type::<T>() {
        return Ok(());
    }
    Err(CompositionError::TypeMismatch {
        key: key.to_string(),
        expected: std::any::type_name::<T>().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::strategy::{InstanceStrategy, SupplierStrategy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn text(value: &'static str) -> InstanceStrategy<String> {
        InstanceStrategy::new(Arc::new(value.to_string()))
    }

    #[test]
    fn test_singleton_resolution_is_idempotent() {
        let context = ApplicationContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        context
            .register(
                ComponentKey::of::<String>(),
                SupplierStrategy::new(move |_ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new("only once".to_string()))
                })
                .singleton(),
                0,
            )
            .unwrap();

        let first = context.get::<String>().unwrap();
        let second = context.get::<String>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prototype_builds_every_time() {
        let context = ApplicationContext::new();
        context
            .register(
                ComponentKey::of::<Vec<u8>>(),
                SupplierStrategy::new(|_ctx| Ok(Arc::new(vec![1u8]))),
                0,
            )
            .unwrap();

        let first = context.get::<Vec<u8>>().unwrap();
        let second = context.get::<Vec<u8>>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_key_type_mismatch_is_rejected() {
        let context = ApplicationContext::new();
        let error = context
            .register(ComponentKey::of::<u32>(), text("wrong"), 0)
            .unwrap_err();
        assert!(matches!(error, CompositionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_non_strict_keeps_first_registration() {
        let context = ApplicationContext::with_config(ContextConfig::new().with_strict_bindings(false));
        let key = ComponentKey::of::<String>();
        assert_eq!(
            context.register(key.clone(), text("first"), 1).unwrap(),
            RegistrationOutcome::Registered
        );
        assert_eq!(
            context.register(key.clone(), text("second"), 1).unwrap(),
            RegistrationOutcome::Ignored
        );
        assert_eq!(*context.get::<String>().unwrap(), "first");
    }

    #[test]
    fn test_replace_and_override() {
        let context = ApplicationContext::new();
        let key = ComponentKey::of::<String>();
        context.register(key.clone(), text("original"), 3).unwrap();
        assert_eq!(*context.get::<String>().unwrap(), "original");

        assert!(context.replace(key.clone(), text("replaced"), 3).unwrap().is_some());
        assert_eq!(*context.get::<String>().unwrap(), "replaced");

        assert_eq!(context.override_binding(key.clone(), text("override")).unwrap(), 4);
        assert_eq!(*context.get::<String>().unwrap(), "override");
        assert_eq!(context.bindings_for(&key).len(), 2);
    }

    #[test]
    fn test_override_at_max_priority_keeps_existing_binding() {
        let context = ApplicationContext::new();
        let key = ComponentKey::of::<String>();
        context.register(key.clone(), text("ceiling"), i32::MAX).unwrap();

        let error = context.override_binding(key.clone(), text("above")).unwrap_err();
        assert!(error.is_conflict());
        assert_eq!(*context.get::<String>().unwrap(), "ceiling");
        assert_eq!(context.bindings_for(&key).len(), 1);
    }

    #[test]
    fn test_unbound_named_key_is_unresolved() {
        let context = ApplicationContext::new();
        let error = context.get_named::<String>("missing").unwrap_err();
        assert!(error.is_unresolved());
        assert!(!context.contains(&ComponentKey::named::<String>("missing")));
    }

    #[test]
    fn test_missing_collection_is_empty() {
        let context = ApplicationContext::new();
        assert!(context.collect::<String>().unwrap().is_empty());
        let via_key = context
            .get_by_key::<ComponentCollection<String>>(&ComponentKey::collection::<String>())
            .unwrap();
        assert!(via_key.is_empty());
    }

    #[test]
    fn test_dependency_failure_is_wrapped_with_requesting_key() {
        let context = ApplicationContext::new();
        context
            .register(
                ComponentKey::of::<String>(),
                SupplierStrategy::new(|ctx| {
                    let port = ctx.get_named::<u16>("port")?;
                    Ok(Arc::new(format!("localhost:{}", port)))
                }),
                0,
            )
            .unwrap();

        let error = context.get::<String>().unwrap_err();
        assert!(error.is_unresolved());
        assert!(matches!(error, CompositionError::ConstructionFailed { ref key, .. } if key.contains("String")));
    }

    #[test]
    fn test_shutdown_forgets_singletons() {
        let context = ApplicationContext::new();
        context
            .register(
                ComponentKey::of::<String>(),
                SupplierStrategy::new(|_ctx| Ok(Arc::new("fresh".to_string()))).singleton(),
                0,
            )
            .unwrap();

        let before = context.get::<String>().unwrap();
        context.shutdown().unwrap();
        let after = context.get::<String>().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
