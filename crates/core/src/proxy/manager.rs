use serde::Serialize;
use std::any::Any;
use std::sync::{Arc, RwLock};

use crate::config::StubPolicy;
use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::advisor::MethodAdvisor;
use crate::proxy::handle::MethodSignature;
use crate::proxy::stub::{stub_for_policy, MethodStub};

/// Interception state of one proxied type: its advisor chain and stub
pub struct ProxyManager<T: ?Sized> {
    advisors: RwLock<Vec<Arc<dyn MethodAdvisor<T>>>>,
    stub: RwLock<Arc<dyn MethodStub>>,
}

impl<T: ?Sized + Send + Sync + 'static> ProxyManager<T> {
    pub fn new(policy: StubPolicy) -> Self {
        Self {
            advisors: RwLock::new(Vec::new()),
            stub: RwLock::new(stub_for_policy(policy)),
        }
    }

    /// Add an advisor; lower priorities run first, ties keep registration order
    pub fn add_advisor<A: MethodAdvisor<T> + 'static>(&self, advisor: A) -> CompositionResult<()> {
        let mut advisors = self
            .advisors
            .write()
            .map_err(|_| CompositionError::lock("proxy_advisors"))?;
        let position = advisors
            .iter()
            .position(|existing| existing.priority() > advisor.priority())
            .unwrap_or(advisors.len());
        tracing::debug!(
            proxied = std::any::type_name::<T>(),
            advisor = advisor.name(),
            priority = advisor.priority(),
            "advisor added"
        );
        advisors.insert(position, Arc::new(advisor));
        Ok(())
    }

    /// Remove every advisor with the given name
    pub fn remove_advisor(&self, name: &str) -> CompositionResult<usize> {
        let mut advisors = self
            .advisors
            .write()
            .map_err(|_| CompositionError::lock("proxy_advisors"))?;
        let before = advisors.len();
        advisors.retain(|advisor| advisor.name() != name);
        Ok(before - advisors.len())
    }

    pub fn advisor_count(&self) -> usize {
        self.advisors.read().map(|advisors| advisors.len()).unwrap_or(0)
    }

    pub fn advisor_names(&self) -> Vec<String> {
        self.advisors
            .read()
            .map(|advisors| advisors.iter().map(|a| a.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the advisors applying to `method`, in chain order
    pub(crate) fn advisors_for_method(
        &self,
        method: &MethodSignature,
    ) -> CompositionResult<Vec<Arc<dyn MethodAdvisor<T>>>> {
        let advisors = self
            .advisors
            .read()
            .map_err(|_| CompositionError::lock("proxy_advisors"))?;
        Ok(advisors
            .iter()
            .filter(|advisor| advisor.applies_to(method))
            .cloned()
            .collect())
    }

    pub fn stub(&self) -> CompositionResult<Arc<dyn MethodStub>> {
        self.stub
            .read()
            .map(|stub| stub.clone())
            .map_err(|_| CompositionError::lock("proxy_stub"))
    }

    pub fn set_stub<S: MethodStub + 'static>(&self, stub: S) -> CompositionResult<()> {
        let mut current = self
            .stub
            .write()
            .map_err(|_| CompositionError::lock("proxy_stub"))?;
        tracing::debug!(proxied = std::any::type_name::<T>(), stub = stub.name(), "stub replaced");
        *current = Arc::new(stub);
        Ok(())
    }
}

impl<T: ?Sized + Send + Sync + 'static> std::fmt::Debug for ProxyManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyManager")
            .field("type", &std::any::type_name::<T>())
            .field("advisors", &self.advisor_names())
            .finish()
    }
}

/// Diagnostic view of a proxy manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyManagerInfo {
    pub type_name: String,
    pub advisors: Vec<String>,
    pub stub: String,
}

/// Type-erased manager as kept by the registry
pub(crate) trait ErasedManager: Send + Sync {
    fn info(&self) -> ProxyManagerInfo;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: ?Sized + Send + Sync + 'static> ErasedManager for ProxyManager<T> {
    fn info(&self) -> ProxyManagerInfo {
        ProxyManagerInfo {
            type_name: std::any::type_name::<T>().to_string(),
            advisors: self.advisor_names(),
            stub: self
                .stub()
                .map(|stub| stub.name().to_string())
                .unwrap_or_default(),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::advisor::{Advice, FnAdvisor, Invocation};
    use crate::proxy::stub::ErrorResponseStub;

    trait Clock: Send + Sync {}

    fn named(name: &'static str, priority: i32) -> FnAdvisor<impl Fn(&Invocation<'_, dyn Clock>) -> CompositionResult<Advice> + Send + Sync> {
        FnAdvisor::new(name, priority, |_invocation: &Invocation<'_, dyn Clock>| Ok(Advice::Decline))
    }

    #[test]
    fn test_advisors_sorted_ascending_with_stable_ties() {
        let manager = ProxyManager::<dyn Clock>::new(StubPolicy::Default);
        manager.add_advisor(named("audit", 10)).unwrap();
        manager.add_advisor(named("cache", -1)).unwrap();
        manager.add_advisor(named("metrics", 10)).unwrap();

        assert_eq!(manager.advisor_names(), vec!["cache", "audit", "metrics"]);
        assert_eq!(manager.remove_advisor("audit").unwrap(), 1);
        assert_eq!(manager.advisor_count(), 2);
    }

    #[test]
    fn test_stub_follows_policy_and_can_be_swapped() {
        let manager = ProxyManager::<dyn Clock>::new(StubPolicy::Error);
        assert_eq!(manager.stub().unwrap().name(), "error");

        let manager = ProxyManager::<dyn Clock>::new(StubPolicy::Default);
        assert_eq!(manager.stub().unwrap().name(), "default-value");
        manager.set_stub(ErrorResponseStub).unwrap();
        assert_eq!(manager.info().stub, "error");
    }
}
