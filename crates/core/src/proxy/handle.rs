use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::advisor::{Advice, Invocation, MethodAdvisor};
use crate::proxy::deferred::{DeferredStub, DeferredTarget};
use crate::proxy::manager::ProxyManager;
use crate::proxy::stub::StubCall;

/// Identifies a proxied method for advisors and stubs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub declaring_type: &'static str,
    pub name: &'static str,
}

impl MethodSignature {
    pub const fn new(declaring_type: &'static str, name: &'static str) -> Self {
        Self {
            declaring_type,
            name,
        }
    }
}

impl std::fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// Return types a proxied method may declare.
///
/// `zero_value` is what the default-value stub answers with when nothing
/// handled the call. Absence is spelled `Option::None`; types without a
/// natural zero return `None` here and make the default stub fail.
pub trait ProxyReturn: Any + Send + Sized {
    fn zero_value() -> Option<Self> {
        None
    }
}

macro_rules! zero_return {
    ($zero:expr => $($ty:ty),*) => {
        $(
            impl ProxyReturn for $ty {
                fn zero_value() -> Option<Self> {
                    Some($zero)
                }
            }
        )*
    };
}

zero_return!(0 => u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);
zero_return!(0.0 => f32, f64);
zero_return!(false => bool);
zero_return!(() => ());

impl<T: Send + 'static> ProxyReturn for Option<T> {
    fn zero_value() -> Option<Self> {
        Some(None)
    }
}

impl ProxyReturn for String {}
impl ProxyReturn for &'static str {}
impl<T: Send + 'static> ProxyReturn for Vec<T> {}
impl<T: ?Sized + Send + Sync + 'static> ProxyReturn for Arc<T> {}
impl<T: Send + 'static, E: Send + 'static> ProxyReturn for Result<T, E> {}

/// Identity of the component behind a proxy.
///
/// Two proxies of the same target, and the target itself, share one
/// identity, which keeps proxies interchangeable inside sets and maps.
#[derive(Debug, Clone, Copy)]
pub struct ComponentIdentity {
    address: usize,
    type_name: &'static str,
}

impl ComponentIdentity {
    pub fn of<T: ?Sized>(instance: &Arc<T>) -> Self {
        Self {
            address: Arc::as_ptr(instance) as *const () as usize,
            type_name: std::any::type_name::<T>(),
        }
    }

    fn at<T: ?Sized>(address: usize) -> Self {
        Self {
            address,
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ComponentIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ComponentIdentity {}

impl Hash for ComponentIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl std::fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:#x}", self.type_name, self.address)
    }
}

pub(crate) enum ProxyTarget<T: ?Sized> {
    /// Interface proxy with nothing behind it; the stub answers.
    /// The marker allocation gives the proxy an identity of its own.
    Detached(Arc<()>),
    Direct(Arc<T>),
    Deferred(Arc<DeferredTarget<T>>),
}

impl<T: ?Sized> Clone for ProxyTarget<T> {
    fn clone(&self) -> Self {
        match self {
            ProxyTarget::Detached(marker) => ProxyTarget::Detached(marker.clone()),
            ProxyTarget::Direct(target) => ProxyTarget::Direct(target.clone()),
            ProxyTarget::Deferred(target) => ProxyTarget::Deferred(target.clone()),
        }
    }
}

/// What a hand-written proxy wrapper holds.
///
/// The wrapper implements the proxied trait and routes every method through
/// `invoke` (or `try_invoke` for fallible methods), passing the method's
/// signature, its arguments and a closure calling the real implementation.
/// Equality, hashing and display of the handle follow the proxied identity,
/// so wrappers can simply derive `PartialEq`, `Eq` and `Hash`.
pub struct ProxyHandle<T: ?Sized + Send + Sync + 'static> {
    manager: Arc<ProxyManager<T>>,
    target: ProxyTarget<T>,
}

impl<T: ?Sized + Send + Sync + 'static> ProxyHandle<T> {
    pub(crate) fn detached(manager: Arc<ProxyManager<T>>) -> Self {
        Self {
            manager,
            target: ProxyTarget::Detached(Arc::new(())),
        }
    }

    pub(crate) fn direct(manager: Arc<ProxyManager<T>>, target: Arc<T>) -> Self {
        Self {
            manager,
            target: ProxyTarget::Direct(target),
        }
    }

    pub(crate) fn deferred(manager: Arc<ProxyManager<T>>, target: Arc<DeferredTarget<T>>) -> Self {
        Self {
            manager,
            target: ProxyTarget::Deferred(target),
        }
    }

    pub fn manager(&self) -> &Arc<ProxyManager<T>> {
        &self.manager
    }

    /// The real instance, when there is one and it is available
    pub fn target(&self) -> Option<Arc<T>> {
        match &self.target {
            ProxyTarget::Detached(_) => None,
            ProxyTarget::Direct(target) => Some(target.clone()),
            ProxyTarget::Deferred(deferred) => deferred.installed(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.target, ProxyTarget::Deferred(_))
    }

    pub fn identity(&self) -> ComponentIdentity {
        match &self.target {
            ProxyTarget::Direct(target) => ComponentIdentity::of(target),
            ProxyTarget::Deferred(deferred) => match deferred.installed() {
                Some(target) => ComponentIdentity::of(&target),
                None => ComponentIdentity::at::<T>(Arc::as_ptr(deferred) as usize),
            },
            ProxyTarget::Detached(marker) => ComponentIdentity::at::<T>(Arc::as_ptr(marker) as usize),
        }
    }

    /// Route one call through the advisor chain, then the target or stub
    pub fn invoke<R, F>(&self, method: &MethodSignature, args: &[&dyn Any], real: F) -> CompositionResult<R>
    where
        R: ProxyReturn,
        F: Fn(&T) -> R,
    {
        let advisors = self.manager.advisors_for_method(method)?;
        let call = |target: &T| -> CompositionResult<R> { Ok(real(target)) };
        self.run_chain(&advisors, method, args, &call)
    }

    /// Like `invoke`, for trait methods that already return a `CompositionResult`
    pub fn try_invoke<R, F>(&self, method: &MethodSignature, args: &[&dyn Any], real: F) -> CompositionResult<R>
    where
        R: ProxyReturn,
        F: Fn(&T) -> CompositionResult<R>,
    {
        let advisors = self.manager.advisors_for_method(method)?;
        self.run_chain(&advisors, method, args, &real)
    }

    fn run_chain<R, F>(
        &self,
        advisors: &[Arc<dyn MethodAdvisor<T>>],
        method: &MethodSignature,
        args: &[&dyn Any],
        real: &F,
    ) -> CompositionResult<R>
    where
        R: ProxyReturn,
        F: Fn(&T) -> CompositionResult<R>,
    {
        let Some((advisor, rest)) = advisors.split_first() else {
            return self.exhausted(method, args, real);
        };

        let proceed = || -> CompositionResult<Box<dyn Any + Send>> {
            self.run_chain(rest, method, args, real)
                .map(|value| Box::new(value) as Box<dyn Any + Send>)
        };
        let target = self.target();
        let invocation = Invocation::new(method, args, target.as_deref(), &proceed);

        let advice = advisor
            .advise(&invocation)
            .map_err(|error| self.advisor_error(method, advisor.name(), error))?;

        match advice {
            Advice::Decline => self.run_chain(rest, method, args, real),
            Advice::Return(value) => value.downcast::<R>().map(|value| *value).map_err(|_| {
                CompositionError::proxy_invocation(
                    std::any::type_name::<T>(),
                    method.name,
                    format!(
                        "advisor '{}' returned a value that is not {}",
                        advisor.name(),
                        std::any::type_name::<R>()
                    ),
                )
            }),
        }
    }

    fn exhausted<R, F>(&self, method: &MethodSignature, args: &[&dyn Any], real: &F) -> CompositionResult<R>
    where
        R: ProxyReturn,
        F: Fn(&T) -> CompositionResult<R>,
    {
        match &self.target {
            ProxyTarget::Direct(target) => real(target),
            ProxyTarget::Deferred(deferred) => DeferredStub::new(deferred.clone()).dispatch(method, real),
            ProxyTarget::Detached(_) => {
                let stub = self.manager.stub()?;
                let call = StubCall::new::<T, R>(method, args);
                let value = stub.respond(call)?;
                value.downcast::<R>().map(|value| *value).map_err(|_| {
                    CompositionError::proxy_invocation(
                        std::any::type_name::<T>(),
                        method.name,
                        format!("stub '{}' answered with the wrong type", stub.name()),
                    )
                })
            }
        }
    }

    fn advisor_error(&self, method: &MethodSignature, advisor: &str, error: CompositionError) -> CompositionError {
        match error {
            CompositionError::ProxyInvocation { .. } => error,
            other => CompositionError::proxy_invocation(
                std::any::type_name::<T>(),
                method.name,
                format!("advisor '{}' failed: {}", advisor, other),
            ),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Clone for ProxyHandle<T> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            target: self.target.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> PartialEq for ProxyHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Eq for ProxyHandle<T> {}

impl<T: ?Sized + Send + Sync + 'static> Hash for ProxyHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<T: ?Sized + Send + Sync + 'static> std::fmt::Display for ProxyHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.identity().fmt(f)
    }
}

impl<T: ?Sized + Send + Sync + 'static> std::fmt::Debug for ProxyHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            ProxyTarget::Detached(_) => "detached",
            ProxyTarget::Direct(_) => "direct",
            ProxyTarget::Deferred(_) => "deferred",
        };
        f.debug_struct("ProxyHandle")
            .field("identity", &self.identity())
            .field("target", &target)
            .finish()
    }
}
