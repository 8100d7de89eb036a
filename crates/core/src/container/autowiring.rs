use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::container::key::ComponentKey;
use crate::container::resolver::ResolutionContext;
use crate::container::scope::ComponentScope;
use crate::container::strategy::{ConstructorStrategy, ErasedStrategy, TypedStrategy};
use crate::errors::{CompositionError, CompositionResult};

/// Types the context can construct by resolving their own dependencies
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Build an instance, resolving dependencies through `ctx`
    fn create(ctx: &ResolutionContext<'_>) -> CompositionResult<Self>;

    /// Scope used when the type is built through the constructor table
    fn scope() -> ComponentScope {
        ComponentScope::Prototype
    }

    /// Keys this constructor is going to ask for, for diagnostics
    fn dependencies() -> Vec<ComponentKey> {
        Vec::new()
    }
}

struct DeclaredConstructor {
    strategy: Arc<dyn ErasedStrategy>,
    dependencies: Vec<ComponentKey>,
}

/// Constructors declared per concrete type, consulted for unbound keys.
///
/// Stands in for runtime introspection: a type is implicitly constructible
/// only once `declare` has recorded how to build it.
#[derive(Default)]
pub struct ConstructorTable {
    constructors: RwLock<HashMap<TypeId, DeclaredConstructor>>,
}

impl ConstructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare<T: Injectable>(&self) -> CompositionResult<()> {
        let mut constructors = self
            .constructors
            .write()
            .map_err(|_| CompositionError::lock("constructor_table"))?;
        constructors.insert(
            TypeId::of::<T>(),
            DeclaredConstructor {
                strategy: TypedStrategy::<T>::erase(ConstructorStrategy::<T, T>::new()),
                dependencies: T::dependencies(),
            },
        );
        Ok(())
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.constructors
            .read()
            .map(|constructors| constructors.contains_key(&key.type_id()))
            .unwrap_or(false)
    }

    pub(crate) fn strategy_for(&self, key: &ComponentKey) -> Option<Arc<dyn ErasedStrategy>> {
        let constructors = self.constructors.read().ok()?;
        constructors
            .get(&key.type_id())
            .map(|declared| declared.strategy.clone())
    }

    pub fn dependencies_of(&self, key: &ComponentKey) -> Vec<ComponentKey> {
        self.constructors
            .read()
            .ok()
            .and_then(|constructors| {
                constructors
                    .get(&key.type_id())
                    .map(|declared| declared.dependencies.clone())
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.constructors
            .read()
            .map(|constructors| constructors.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConstructorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorTable")
            .field("declared", &self.len())
            .finish()
    }
}

/// Set-once slot filled by field population after construction
pub struct Inject<T: ?Sized> {
    slot: OnceLock<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Inject<T> {
    pub fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Fill the slot; populating twice is an error
    pub fn set(&self, value: Arc<T>) -> CompositionResult<()> {
        self.slot.set(value).map_err(|_| CompositionError::Component {
            message: format!(
                "field of type {} is already populated",
                std::any::type_name::<T>()
            ),
        })
    }

    /// Resolve `T` through `ctx` and fill the slot
    pub fn populate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<()> {
        self.set(ctx.get::<T>()?)
    }

    pub fn populate_named(&self, ctx: &ResolutionContext<'_>, name: &str) -> CompositionResult<()> {
        self.set(ctx.get_named::<T>(name)?)
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.slot.get()
    }

    pub fn is_populated(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for Inject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inject")
            .field("type", &std::any::type_name::<T>())
            .field("populated", &self.slot.get().is_some())
            .finish()
    }
}

/// Components whose `Inject` fields are filled after construction
pub trait PopulateFields: Send + Sync + 'static {
    fn populate(&self, ctx: &ResolutionContext<'_>) -> CompositionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::context::ApplicationContext;

    #[derive(Debug)]
    struct Config {
        url: String,
    }

    impl Injectable for Config {
        fn create(_ctx: &ResolutionContext<'_>) -> CompositionResult<Self> {
            Ok(Self {
                url: "memory://".to_string(),
            })
        }

        fn scope() -> ComponentScope {
            ComponentScope::Singleton
        }
    }

    #[derive(Debug)]
    struct Repository {
        config: Arc<Config>,
    }

    impl Injectable for Repository {
        fn create(ctx: &ResolutionContext<'_>) -> CompositionResult<Self> {
            Ok(Self {
                config: ctx.get::<Config>()?,
            })
        }

        fn dependencies() -> Vec<ComponentKey> {
            vec![ComponentKey::of::<Config>()]
        }
    }

    #[test]
    fn test_declared_constructors_resolve_implicitly() {
        let context = ApplicationContext::new();
        context.declare::<Config>().unwrap();
        context.declare::<Repository>().unwrap();

        let repository = context.get::<Repository>().unwrap();
        assert_eq!(repository.config.url, "memory://");

        // Config is declared singleton, Repository is prototype
        let again = context.get::<Repository>().unwrap();
        assert!(!Arc::ptr_eq(&repository, &again));
        assert!(Arc::ptr_eq(&repository.config, &again.config));

        assert_eq!(
            context.constructors().dependencies_of(&ComponentKey::of::<Repository>()),
            vec![ComponentKey::of::<Config>()]
        );
    }

    #[test]
    fn test_undeclared_type_is_unresolved() {
        let context = ApplicationContext::new();
        let error = context.get::<Repository>().unwrap_err();
        assert!(error.is_unresolved());
    }

    #[test]
    fn test_inject_sets_once() {
        let field: Inject<String> = Inject::new();
        assert!(!field.is_populated());
        field.set(Arc::new("first".to_string())).unwrap();
        assert!(field.set(Arc::new("second".to_string())).is_err());
        assert_eq!(field.get().map(|value| value.as_str()), Some("first"));
    }
}
