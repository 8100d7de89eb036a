use std::any::Any;

use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::handle::MethodSignature;

/// What an advisor decided about one call
pub enum Advice {
    /// Not interested; the next advisor gets the call
    Decline,
    /// Short-circuit the chain with this value
    Return(Box<dyn Any + Send>),
}

impl Advice {
    pub fn value<R: Any + Send>(value: R) -> Self {
        Advice::Return(Box::new(value))
    }
}

impl std::fmt::Debug for Advice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advice::Decline => write!(f, "Decline"),
            Advice::Return(_) => write!(f, "Return(..)"),
        }
    }
}

/// One intercepted call as seen by an advisor
pub struct Invocation<'a, T: ?Sized> {
    method: &'a MethodSignature,
    args: &'a [&'a dyn Any],
    target: Option<&'a T>,
    proceed: &'a dyn Fn() -> CompositionResult<Box<dyn Any + Send>>,
}

impl<'a, T: ?Sized> Invocation<'a, T> {
    pub(crate) fn new(
        method: &'a MethodSignature,
        args: &'a [&'a dyn Any],
        target: Option<&'a T>,
        proceed: &'a dyn Fn() -> CompositionResult<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            method,
            args,
            target,
            proceed,
        }
    }

    pub fn method(&self) -> &MethodSignature {
        self.method
    }

    pub fn args(&self) -> &[&dyn Any] {
        self.args
    }

    /// Argument at `index`, if present and of type `A`
    pub fn arg<A: Any>(&self, index: usize) -> Option<&A> {
        self.args.get(index).and_then(|arg| arg.downcast_ref::<A>())
    }

    /// The real instance, if the proxy has one available
    pub fn target(&self) -> Option<&T> {
        self.target
    }

    /// Run the rest of the chain and the real implementation
    pub fn proceed(&self) -> CompositionResult<Box<dyn Any + Send>> {
        (self.proceed)()
    }

    /// `proceed` with the result downcast to the method's return type
    pub fn proceed_as<R: Any + Send>(&self) -> CompositionResult<R> {
        let value = self.proceed()?;
        value.downcast::<R>().map(|value| *value).map_err(|_| {
            CompositionError::proxy_invocation(
                self.method.declaring_type,
                self.method.name,
                format!("method does not return {}", std::any::type_name::<R>()),
            )
        })
    }
}

/// Chain-of-responsibility participant around calls on proxies of `T`
pub trait MethodAdvisor<T: ?Sized>: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs earlier
    fn priority(&self) -> i32 {
        0
    }

    fn applies_to(&self, _method: &MethodSignature) -> bool {
        true
    }

    fn advise(&self, invocation: &Invocation<'_, T>) -> CompositionResult<Advice>;
}

/// Advisor built from a closure, for one-off interceptions
pub struct FnAdvisor<F> {
    name: String,
    priority: i32,
    advise: F,
}

impl<F> FnAdvisor<F> {
    pub fn new(name: impl Into<String>, priority: i32, advise: F) -> Self {
        Self {
            name: name.into(),
            priority,
            advise,
        }
    }
}

impl<T, F> MethodAdvisor<T> for FnAdvisor<F>
where
    T: ?Sized + 'static,
    F: Fn(&Invocation<'_, T>) -> CompositionResult<Advice> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn advise(&self, invocation: &Invocation<'_, T>) -> CompositionResult<Advice> {
        (self.advise)(invocation)
    }
}
