use std::any::Any;
use std::sync::Arc;

use crate::config::StubPolicy;
use crate::errors::{CompositionError, CompositionResult};
use crate::proxy::handle::{MethodSignature, ProxyReturn};

/// A call that reached the end of the advisor chain with no target behind it
pub struct StubCall<'a> {
    pub type_name: &'static str,
    pub method: &'a MethodSignature,
    pub args: &'a [&'a dyn Any],
    pub return_type: &'static str,
    /// Zero value of the declared return type, when it has one
    pub zero_value: Option<Box<dyn Any + Send>>,
}

impl<'a> StubCall<'a> {
    pub(crate) fn new<T: ?Sized, R: ProxyReturn>(method: &'a MethodSignature, args: &'a [&'a dyn Any]) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            method,
            args,
            return_type: std::any::type_name::<R>(),
            zero_value: R::zero_value().map(|zero| Box::new(zero) as Box<dyn Any + Send>),
        }
    }
}

/// Fallback answering calls nobody handled
pub trait MethodStub: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a value of the call's return type, or fail
    fn respond(&self, call: StubCall<'_>) -> CompositionResult<Box<dyn Any + Send>>;
}

/// Answers with the zero value of the return type
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValueResponseStub;

impl MethodStub for DefaultValueResponseStub {
    fn name(&self) -> &str {
        "default-value"
    }

    fn respond(&self, call: StubCall<'_>) -> CompositionResult<Box<dyn Any + Send>> {
        let StubCall {
            type_name,
            method,
            return_type,
            zero_value,
            ..
        } = call;
        zero_value.ok_or_else(|| {
            CompositionError::proxy_invocation(
                type_name,
                method.name,
                format!("no zero value for return type {}", return_type),
            )
        })
    }
}

/// Fails every call as unimplemented
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorResponseStub;

impl MethodStub for ErrorResponseStub {
    fn name(&self) -> &str {
        "error"
    }

    fn respond(&self, call: StubCall<'_>) -> CompositionResult<Box<dyn Any + Send>> {
        Err(CompositionError::proxy_invocation(
            call.type_name,
            call.method.name,
            "method is not implemented and no advisor handled it",
        ))
    }
}

pub(crate) fn stub_for_policy(policy: StubPolicy) -> Arc<dyn MethodStub> {
    match policy {
        StubPolicy::Default => Arc::new(DefaultValueResponseStub),
        StubPolicy::Error => Arc::new(ErrorResponseStub),
    }
}
