use std::any::Any;
use std::sync::Arc;

/// Type-erased handle to a produced component.
///
/// The erased value is always an `Arc<T>` for the component type `T`, which
/// lets unsized targets such as `dyn Trait` travel through the pipeline.
#[derive(Clone)]
pub struct ComponentInstance {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ComponentInstance {
    pub fn new<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self {
            inner: Arc::new(instance),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Recover the typed `Arc<T>`, `None` on a type mismatch
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.downcast_ref::<Arc<T>>().cloned()
    }

    pub fn is<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.inner.is::<Arc<T>>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("type_name", &self.type_name)
            .finish()
    }
}
