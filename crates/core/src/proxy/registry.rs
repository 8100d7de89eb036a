use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::StubPolicy;
use crate::container::key::ComponentKey;
use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::deferred::{DeferredProxy, DeferredTarget, PendingInstall};
use crate::proxy::handle::ProxyHandle;
use crate::proxy::manager::{ErasedManager, ProxyManager, ProxyManagerInfo};

/// Builds the wrapper that implements `T` around a handle
pub type ProxyFactory<T> = Arc<dyn Fn(ProxyHandle<T>) -> Arc<T> + Send + Sync>;

type DeferBuilder = fn(&ProxyRegistry, &ComponentKey) -> CompositionResult<Option<Arc<dyn PendingInstall>>>;

struct RegisteredFactory {
    /// `ProxyFactory<T>` behind `Any`
    factory: Arc<dyn Any + Send + Sync>,
    defer: DeferBuilder,
}

/// Lifecycle of interception for one type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ProxyState {
    Unproxied,
    ManagerCreated { advisors: usize },
}

/// One manager per proxied type plus the wrapper factories of interceptable types
pub struct ProxyRegistry {
    default_stub: StubPolicy,
    managers: Mutex<HashMap<TypeId, Arc<dyn ErasedManager>>>,
    factories: RwLock<HashMap<TypeId, RegisteredFactory>>,
}

impl ProxyRegistry {
    pub fn new(default_stub: StubPolicy) -> Self {
        Self {
            default_stub,
            managers: Mutex::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Manager for `T`, created on first request under the registry lock
    pub fn manager_for<T: ?Sized + Send + Sync + 'static>(&self) -> CompositionResult<Arc<ProxyManager<T>>> {
        let mut managers = self
            .managers
            .lock()
            .map_err(|_| CompositionError::lock("proxy_registry"))?;

        let manager = managers
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                tracing::debug!(proxied = std::any::type_name::<T>(), "proxy manager created");
                Arc::new(ProxyManager::<T>::new(self.default_stub)) as Arc<dyn ErasedManager>
            })
            .clone();

        manager
            .as_any()
            .downcast::<ProxyManager<T>>()
            .map_err(|_| CompositionError::TypeMismatch {
                key: "proxy_registry".to_string(),
                expected: std::any::type_name::<ProxyManager<T>>().to_string(),
            })
    }

    pub fn existing<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<ProxyManager<T>>> {
        let manager = self.managers.lock().ok()?.get(&TypeId::of::<T>())?.clone();
        manager.as_any().downcast::<ProxyManager<T>>().ok()
    }

    pub fn state<T: ?Sized + Send + Sync + 'static>(&self) -> ProxyState {
        match self.existing::<T>() {
            Some(manager) => ProxyState::ManagerCreated {
                advisors: manager.advisor_count(),
            },
            None => ProxyState::Unproxied,
        }
    }

    /// Record the wrapper factory of `T`; returns whether one was already present
    pub fn register_factory<T: ?Sized + Send + Sync + 'static>(
        &self,
        factory: ProxyFactory<T>,
    ) -> CompositionResult<bool> {
        let mut factories = self
            .factories
            .write()
            .map_err(|_| CompositionError::lock("proxy_factories"))?;
        let registered = RegisteredFactory {
            factory: Arc::new(factory),
            defer: defer_with::<T>,
        };
        Ok(factories.insert(TypeId::of::<T>(), registered).is_some())
    }

    pub fn factory<T: ?Sized + Send + Sync + 'static>(&self) -> Option<ProxyFactory<T>> {
        let factories = self.factories.read().ok()?;
        factories
            .get(&TypeId::of::<T>())?
            .factory
            .clone()
            .downcast::<ProxyFactory<T>>()
            .ok()
            .map(|factory| (*factory).clone())
    }

    pub fn is_interceptable<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.is_interceptable_type(TypeId::of::<T>())
    }

    /// Whether a cycle closing on `key` can be broken with a deferred proxy
    pub fn is_interceptable_key(&self, key: &ComponentKey) -> bool {
        !key.is_collection() && self.is_interceptable_type(key.type_id())
    }

    fn is_interceptable_type(&self, type_id: TypeId) -> bool {
        self.factories
            .read()
            .map(|factories| factories.contains_key(&type_id))
            .unwrap_or(false)
    }

    /// Deferred proxy for `key`, or `None` when its type has no factory
    pub(crate) fn deferred_proxy(&self, key: &ComponentKey) -> CompositionResult<Option<Arc<dyn PendingInstall>>> {
        if key.is_collection() {
            return Ok(None);
        }
        let defer = {
            let factories = self
                .factories
                .read()
                .map_err(|_| CompositionError::lock("proxy_factories"))?;
            match factories.get(&key.type_id()) {
                Some(registered) => registered.defer,
                None => return Ok(None),
            }
        };
        defer(self, key)
    }

    /// Snapshot of every manager, sorted by type name
    pub fn managers(&self) -> Vec<ProxyManagerInfo> {
        let managers: Vec<Arc<dyn ErasedManager>> = match self.managers.lock() {
            Ok(managers) => managers.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        let mut infos: Vec<ProxyManagerInfo> = managers.iter().map(|manager| manager.info()).collect();
        infos.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        infos
    }

    /// Drop every manager; factories stay registered
    pub fn clear_managers(&self) -> CompositionResult<usize> {
        let mut managers = self
            .managers
            .lock()
            .map_err(|_| CompositionError::lock("proxy_registry"))?;
        let count = managers.len();
        managers.clear();
        Ok(count)
    }
}

fn defer_with<T: ?Sized + Send + Sync + 'static>(
    registry: &ProxyRegistry,
    key: &ComponentKey,
) -> CompositionResult<Option<Arc<dyn PendingInstall>>> {
    let Some(factory) = registry.factory::<T>() else {
        return Ok(None);
    };
    let manager = registry.manager_for::<T>()?;
    let target = Arc::new(DeferredTarget::<T>::new(key.to_string()));
    let proxy = factory(ProxyHandle::deferred(manager, target.clone()));
    Ok(Some(Arc::new(DeferredProxy::new(target, proxy))))
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new(StubPolicy::default())
    }
}

impl std::fmt::Debug for ProxyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRegistry")
            .field("default_stub", &self.default_stub)
            .field("managers", &self.managers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    trait Mailer: Send + Sync {}

    #[test]
    fn test_manager_created_once_per_type() {
        let registry = Arc::new(ProxyRegistry::default());
        assert_eq!(registry.state::<dyn Mailer>(), ProxyState::Unproxied);

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.manager_for::<dyn Mailer>().unwrap()
                })
            })
            .collect();

        let managers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(managers.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(registry.state::<dyn Mailer>(), ProxyState::ManagerCreated { advisors: 0 });
        assert_eq!(registry.managers().len(), 1);
    }

    #[test]
    fn test_clear_keeps_factories() {
        let registry = ProxyRegistry::new(StubPolicy::Error);
        let factory: ProxyFactory<String> = Arc::new(|handle: ProxyHandle<String>| {
            handle.target().unwrap_or_else(|| Arc::new(String::new()))
        });
        assert!(!registry.register_factory::<String>(factory).unwrap());
        registry.manager_for::<String>().unwrap();

        assert_eq!(registry.clear_managers().unwrap(), 1);
        assert_eq!(registry.state::<String>(), ProxyState::Unproxied);
        assert!(registry.is_interceptable::<String>());
        assert!(registry.factory::<String>().is_some());
    }

    #[test]
    fn test_deferred_proxy_only_for_interceptable_keys() {
        let registry = ProxyRegistry::default();
        let factory: ProxyFactory<String> = Arc::new(|handle: ProxyHandle<String>| {
            handle.target().unwrap_or_else(|| Arc::new(String::new()))
        });
        registry.register_factory::<String>(factory).unwrap();

        assert!(registry.is_interceptable_key(&ComponentKey::named::<String>("motd")));
        assert!(!registry.is_interceptable_key(&ComponentKey::collection::<String>()));
        assert!(!registry.is_interceptable_key(&ComponentKey::of::<u32>()));

        assert!(registry
            .deferred_proxy(&ComponentKey::of::<String>())
            .unwrap()
            .is_some());
        assert!(registry.deferred_proxy(&ComponentKey::of::<u32>()).unwrap().is_none());
        assert!(registry
            .deferred_proxy(&ComponentKey::collection::<String>())
            .unwrap()
            .is_none());
    }
}
