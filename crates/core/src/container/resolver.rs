use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::container::collection::ComponentCollection;
use crate::container::context::ApplicationContext;
use crate::container::key::ComponentKey;
use crate::errors::CompositionError;
use crate::proxy::deferred::PendingInstall;

/// Dependency resolution path for cycle detection and error reporting
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    keys: Vec<ComponentKey>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: ComponentKey) {
        self.keys.push(key);
    }

    pub fn pop(&mut self) -> Option<ComponentKey> {
        self.keys.pop()
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.keys.contains(key)
    }

    pub fn depth(&self) -> usize {
        self.keys.len()
    }

    /// Keys from the first occurrence of `key` to the end
    pub fn loop_from<'p>(&'p self, key: &ComponentKey) -> impl Iterator<Item = &'p ComponentKey> + 'p {
        let start = self.keys.iter().position(|entry| entry == key).unwrap_or(self.keys.len());
        self.keys[start..].iter()
    }

    /// Render the path, closing the loop on `closing` when given
    pub fn path_string(&self, closing: Option<&ComponentKey>) -> String {
        self.keys
            .iter()
            .chain(closing)
            .map(|key| key.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// A cycle that closed on a key without a proxy factory, with the
/// interceptable key inside the loop that can break it instead
#[derive(Debug, Clone)]
pub(crate) struct CycleRestart {
    pub(crate) restart: ComponentKey,
    pub(crate) breaker: ComponentKey,
}

/// State of one top-level resolution on one thread.
///
/// Strategies receive it to resolve their own dependencies; going through it
/// (rather than back through the context) is what lets same-thread cycles be
/// recognised and broken.
pub struct ResolutionContext<'a> {
    context: &'a ApplicationContext,
    path: RefCell<ResolutionPath>,
    pending: RefCell<HashMap<ComponentKey, Arc<dyn PendingInstall>>>,
    /// Singletons and sealed collections cached during this resolution, in order
    completed: RefCell<Vec<ComponentKey>>,
    restart: RefCell<Option<CycleRestart>>,
}

impl<'a> ResolutionContext<'a> {
    pub(crate) fn new(context: &'a ApplicationContext) -> Self {
        Self {
            context,
            path: RefCell::new(ResolutionPath::new()),
            pending: RefCell::new(HashMap::new()),
            completed: RefCell::new(Vec::new()),
            restart: RefCell::new(None),
        }
    }

    /// The owning application context
    pub fn context(&self) -> &'a ApplicationContext {
        self.context
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, CompositionError> {
        self.get_by_key::<T>(&ComponentKey::of::<T>())
    }

    pub fn get_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, CompositionError> {
        self.get_by_key::<T>(&ComponentKey::named::<T>(name))
    }

    pub fn get_by_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &ComponentKey,
    ) -> Result<Arc<T>, CompositionError> {
        self.context.resolve_typed::<T>(key, self)
    }

    /// Resolve `T` if anything can produce it, `None` when it is simply unbound
    pub fn try_get<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, CompositionError> {
        match self.get::<T>() {
            Ok(instance) => Ok(Some(instance)),
            Err(CompositionError::UnresolvedComponent { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub fn collect<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<ComponentCollection<T>, CompositionError> {
        self.collect_by_key::<T>(&ComponentKey::collection::<T>())
    }

    pub fn collect_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<ComponentCollection<T>, CompositionError> {
        self.collect_by_key::<T>(&ComponentKey::named::<T>(name).collecting())
    }

    pub fn collect_by_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &ComponentKey,
    ) -> Result<ComponentCollection<T>, CompositionError> {
        self.context.collect_in::<T>(key, self)
    }

    /// Keys currently under construction, outermost first
    pub fn path(&self) -> ResolutionPath {
        self.path.borrow().clone()
    }

    pub(crate) fn is_in_progress(&self, key: &ComponentKey) -> bool {
        self.path.borrow().contains(key)
    }

    pub(crate) fn depth(&self) -> usize {
        self.path.borrow().depth()
    }

    pub(crate) fn enter(&self, key: &ComponentKey) {
        self.path.borrow_mut().push(key.clone());
    }

    pub(crate) fn leave(&self) {
        self.path.borrow_mut().pop();
    }

    pub(crate) fn path_string(&self, closing: &ComponentKey) -> String {
        self.path.borrow().path_string(Some(closing))
    }

    pub(crate) fn pending_install(&self, key: &ComponentKey) -> Option<Arc<dyn PendingInstall>> {
        self.pending.borrow().get(key).cloned()
    }

    pub(crate) fn add_pending_install(&self, key: &ComponentKey, pending: Arc<dyn PendingInstall>) {
        self.pending.borrow_mut().insert(key.clone(), pending);
    }

    pub(crate) fn take_pending_install(&self, key: &ComponentKey) -> Option<Arc<dyn PendingInstall>> {
        self.pending.borrow_mut().remove(key)
    }

    /// Index to hand to `completed_since` later
    pub(crate) fn completed_mark(&self) -> usize {
        self.completed.borrow().len()
    }

    pub(crate) fn record_completed(&self, key: &ComponentKey) {
        self.completed.borrow_mut().push(key.clone());
    }

    /// Forget and return the keys cached after `mark`
    pub(crate) fn completed_since(&self, mark: usize) -> Vec<ComponentKey> {
        let mut completed = self.completed.borrow_mut();
        let mark = mark.min(completed.len());
        completed.split_off(mark)
    }

    pub(crate) fn set_restart(&self, restart: CycleRestart) {
        *self.restart.borrow_mut() = Some(restart);
    }

    /// The interceptable key to resolve before retrying `key`, if a cycle
    /// closing on `key` left one
    pub(crate) fn take_restart(&self, key: &ComponentKey) -> Option<ComponentKey> {
        let mut restart = self.restart.borrow_mut();
        if restart.as_ref().map(|pending| &pending.restart == key).unwrap_or(false) {
            return restart.take().map(|pending| pending.breaker);
        }
        None
    }

    /// First interceptable key inside the loop that `closing` would close
    pub(crate) fn cycle_breaker(
        &self,
        closing: &ComponentKey,
        interceptable: impl Fn(&ComponentKey) -> bool,
    ) -> Option<ComponentKey> {
        self.path
            .borrow()
            .loop_from(closing)
            .find(|key| *key != closing && interceptable(*key))
            .cloned()
    }
}

impl std::fmt::Debug for ResolutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("context", &self.context.id())
            .field("path", &self.path.borrow().path_string(None))
            .finish()
    }
}
