use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::container::instance::ComponentInstance;
use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::handle::{MethodSignature, ProxyReturn};

enum Slot<T: ?Sized> {
    Pending,
    Installed(Arc<T>),
    Failed(String),
}

/// Backing instance of a proxy handed out to break a dependency cycle.
///
/// The slot is filled once the component that closed the cycle finishes
/// construction. Until then the constructing thread cannot use the proxy,
/// and any other thread calling it waits for the install.
pub struct DeferredTarget<T: ?Sized> {
    key: String,
    owner: ThreadId,
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

impl<T: ?Sized + Send + Sync + 'static> DeferredTarget<T> {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            owner: thread::current().id(),
            slot: Mutex::new(Slot::Pending),
            settled: Condvar::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn installed(&self) -> Option<Arc<T>> {
        let slot = self.slot.lock().ok()?;
        match &*slot {
            Slot::Installed(target) => Some(target.clone()),
            _ => None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed().is_some()
    }

    pub(crate) fn install(&self, target: Arc<T>) -> CompositionResult<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CompositionError::lock("deferred_target"))?;
        *slot = Slot::Installed(target);
        self.settled.notify_all();
        tracing::debug!(key = %self.key, "deferred target installed");
        Ok(())
    }

    pub(crate) fn fail(&self, reason: &str) {
        if let Ok(mut slot) = self.slot.lock() {
            if matches!(&*slot, Slot::Pending) {
                *slot = Slot::Failed(reason.to_string());
            }
        }
        self.settled.notify_all();
    }

    /// The installed target, waiting for it when called from another thread
    pub(crate) fn wait(&self, method: &MethodSignature) -> CompositionResult<Arc<T>> {
        let current = thread::current().id();
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CompositionError::lock("deferred_target"))?;
        loop {
            match &*slot {
                Slot::Installed(target) => return Ok(target.clone()),
                Slot::Failed(reason) => {
                    return Err(CompositionError::proxy_invocation(
                        std::any::type_name::<T>(),
                        method.name,
                        format!("construction of {} failed: {}", self.key, reason),
                    ))
                }
                Slot::Pending => {}
            }

            if current == self.owner {
                return Err(CompositionError::proxy_invocation(
                    std::any::type_name::<T>(),
                    method.name,
                    format!("{} is still under construction on this thread", self.key),
                ));
            }
            slot = self
                .settled
                .wait(slot)
                .map_err(|_| CompositionError::lock("deferred_target"))?;
        }
    }
}

/// Stub used by deferred proxies once advisors are exhausted
pub struct DeferredStub<T: ?Sized> {
    target: Arc<DeferredTarget<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> DeferredStub<T> {
    pub(crate) fn new(target: Arc<DeferredTarget<T>>) -> Self {
        Self { target }
    }

    /// Forward to the installed target
    pub(crate) fn dispatch<R, F>(&self, method: &MethodSignature, real: &F) -> CompositionResult<R>
    where
        R: ProxyReturn,
        F: Fn(&T) -> CompositionResult<R>,
    {
        let target = self.target.wait(method)?;
        real(&target)
    }
}

/// Type-erased side of a deferred proxy, kept by the resolution that owes it an instance
pub(crate) trait PendingInstall: Send + Sync {
    /// Hand the finished component to the deferred target
    fn install(&self, instance: &ComponentInstance) -> CompositionResult<()>;

    fn fail(&self, reason: &str);

    /// The proxy handed out to break the cycle
    fn proxy(&self) -> ComponentInstance;
}

/// A deferred target together with the proxy built around it
pub(crate) struct DeferredProxy<T: ?Sized> {
    target: Arc<DeferredTarget<T>>,
    proxy: Arc<T>,
}

impl<T: ?Sized + Send + Sync + 'static> DeferredProxy<T> {
    pub(crate) fn new(target: Arc<DeferredTarget<T>>, proxy: Arc<T>) -> Self {
        Self { target, proxy }
    }
}

impl<T: ?Sized + Send + Sync + 'static> PendingInstall for DeferredProxy<T> {
    fn install(&self, instance: &ComponentInstance) -> CompositionResult<()> {
        let target = instance
            .downcast::<T>()
            .ok_or_else(|| CompositionError::TypeMismatch {
                key: self.target.key().to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        self.target.install(target)
    }

    fn fail(&self, reason: &str) {
        self.target.fail(reason);
    }

    fn proxy(&self) -> ComponentInstance {
        ComponentInstance::new(self.proxy.clone())
    }
}
