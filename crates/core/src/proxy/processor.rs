use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::instance::ComponentInstance;
use crate::container::key::ComponentKey;
use crate::container::pipeline::ComponentPostProcessor;
use crate::container::resolver::ResolutionContext;
use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::handle::ProxyHandle;

/// Wraps every fresh instance of an interceptable type in its proxy.
///
/// Runs after the other post-processors so the proxy sees the finished
/// instance. When the instance closes a cycle that was broken with a
/// deferred proxy, that proxy is completed and handed out instead, so every
/// holder shares one wrapper.
pub struct ProxyPostProcessor<T: ?Sized> {
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ProxyPostProcessor<T> {
    pub const PRIORITY: i32 = 1_000;

    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for ProxyPostProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> ComponentPostProcessor for ProxyPostProcessor<T> {
    fn name(&self) -> &str {
        "proxy"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
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
        if let Some(pending) = ctx.take_pending_install(key) {
            pending.install(&instance)?;
            return Ok(pending.proxy());
        }

        let proxies = ctx.context().proxies();
        let factory = proxies
            .factory::<T>()
            .ok_or_else(|| CompositionError::InvalidKey {
                key: key.to_string(),
                message: "type has no registered proxy factory".to_string(),
            })?;
        let target = instance
            .downcast::<T>()
            .ok_or_else(|| CompositionError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })?;

        let manager = proxies.manager_for::<T>()?;
        tracing::trace!(key = %key, advisors = manager.advisor_count(), "instance wrapped in proxy");
        Ok(ComponentInstance::new(factory(ProxyHandle::direct(manager, target))))
    }
}
