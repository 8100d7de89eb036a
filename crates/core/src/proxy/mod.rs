//! Method interception for registered component types.
//!
//! A proxied type is a trait (or concrete type) with a hand-written wrapper
//! that holds a [`ProxyHandle`] and forwards each method through it. The
//! handle runs the type's advisor chain and falls back to the real target,
//! the deferred cycle target, or the manager's stub.

pub mod advisor;
pub mod deferred;
pub mod handle;
pub mod manager;
pub mod processor;
pub mod registry;
pub mod stub;

pub use advisor::{Advice, FnAdvisor, Invocation, MethodAdvisor};
pub use deferred::{DeferredStub, DeferredTarget};
pub use handle::{ComponentIdentity, MethodSignature, ProxyHandle, ProxyReturn};
pub use manager::{ProxyManager, ProxyManagerInfo};
pub use processor::ProxyPostProcessor;
pub use registry::{ProxyFactory, ProxyRegistry, ProxyState};
pub use stub::{DefaultValueResponseStub, ErrorResponseStub, MethodStub, StubCall};
