//! Integration tests for interception proxies: advisor chains, stubs and
//! proxies of resolved components.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use wirework_core::config::ContextConfig;
use wirework_core::container::{InstanceStrategy, SupplierStrategy};
use wirework_core::proxy::{
    DefaultValueResponseStub, ErrorResponseStub, FnAdvisor, Invocation, MethodStub, ProxyState,
    StubCall,
};
use wirework_core::{
    Advice, ApplicationContext, ComponentKey, CompositionError, CompositionResult, MethodAdvisor,
    MethodSignature, ProxyHandle, StubPolicy,
};

trait Counter: Send + Sync {
    fn count(&self) -> CompositionResult<u32>;
    fn add(&self, amount: u32) -> CompositionResult<u32>;
    fn label(&self) -> CompositionResult<Option<String>>;
    fn owner(&self) -> CompositionResult<String>;
}

const COUNT: MethodSignature = MethodSignature::new("Counter", "count");
const ADD: MethodSignature = MethodSignature::new("Counter", "add");
const LABEL: MethodSignature = MethodSignature::new("Counter", "label");
const OWNER: MethodSignature = MethodSignature::new("Counter", "owner");

struct CounterProxy {
    handle: ProxyHandle<dyn Counter>,
}

impl Counter for CounterProxy {
    fn count(&self) -> CompositionResult<u32> {
        self.handle.try_invoke(&COUNT, &[], |counter| counter.count())
    }

    fn add(&self, amount: u32) -> CompositionResult<u32> {
        self.handle
            .try_invoke(&ADD, &[&amount], |counter| counter.add(amount))
    }

    fn label(&self) -> CompositionResult<Option<String>> {
        self.handle.try_invoke(&LABEL, &[], |counter| counter.label())
    }

    fn owner(&self) -> CompositionResult<String> {
        self.handle.try_invoke(&OWNER, &[], |counter| counter.owner())
    }
}

#[derive(Default)]
struct AtomicCounter {
    value: AtomicU32,
}

impl Counter for AtomicCounter {
    fn count(&self) -> CompositionResult<u32> {
        Ok(self.value.load(Ordering::SeqCst))
    }

    fn add(&self, amount: u32) -> CompositionResult<u32> {
        Ok(self.value.fetch_add(amount, Ordering::SeqCst) + amount)
    }

    fn label(&self) -> CompositionResult<Option<String>> {
        Ok(Some("atomic".to_string()))
    }

    fn owner(&self) -> CompositionResult<String> {
        Ok("billing".to_string())
    }
}

fn counter_context(config: ContextConfig) -> ApplicationContext {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let context = ApplicationContext::with_config(config);
    context
        .register_proxy_type::<dyn Counter, _>(|handle| Arc::new(CounterProxy { handle }) as Arc<dyn Counter>)
        .unwrap();
    context
}

/// Records every call it sees, then lets the chain continue
struct CallLog {
    name: &'static str,
    priority: i32,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MethodAdvisor<dyn Counter> for CallLog {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn advise(&self, invocation: &Invocation<'_, dyn Counter>) -> CompositionResult<Advice> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, invocation.method().name));
        Ok(Advice::Decline)
    }
}

/// Doubles the result of `add`
struct Doubler;

impl MethodAdvisor<dyn Counter> for Doubler {
    fn name(&self) -> &str {
        "doubler"
    }

    fn applies_to(&self, method: &MethodSignature) -> bool {
        *method == ADD
    }

    fn advise(&self, invocation: &Invocation<'_, dyn Counter>) -> CompositionResult<Advice> {
        let result = invocation.proceed_as::<u32>()?;
        Ok(Advice::value(result * 2))
    }
}

#[test]
fn test_detached_proxy_answers_zero_values() {
    let context = counter_context(ContextConfig::new());
    let proxy = context.create_proxy::<dyn Counter>().unwrap();

    assert_eq!(proxy.count().unwrap(), 0);
    assert_eq!(proxy.add(5).unwrap(), 0);
    assert_eq!(proxy.label().unwrap(), None);

    let error = proxy.owner().unwrap_err();
    assert!(error.is_proxy_invocation());
}

#[test]
fn test_error_stub_policy() {
    let context = counter_context(ContextConfig::new().with_default_stub(StubPolicy::Error));
    let proxy = context.create_proxy::<dyn Counter>().unwrap();

    match proxy.count().unwrap_err() {
        CompositionError::ProxyInvocation { method, .. } => assert_eq!(method, "count"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(context.stub_for::<dyn Counter>().unwrap().name(), "error");
}

#[test]
fn test_stub_can_be_swapped() {
    let context = counter_context(ContextConfig::new());
    let proxy = context.create_proxy::<dyn Counter>().unwrap();

    context.set_stub_for::<dyn Counter, _>(ErrorResponseStub).unwrap();
    assert!(proxy.count().unwrap_err().is_proxy_invocation());

    context
        .set_stub_for::<dyn Counter, _>(DefaultValueResponseStub)
        .unwrap();
    assert_eq!(proxy.count().unwrap(), 0);
}

struct OwnerStub;

impl MethodStub for OwnerStub {
    fn name(&self) -> &str {
        "owner"
    }

    fn respond(&self, call: StubCall<'_>) -> CompositionResult<Box<dyn std::any::Any + Send>> {
        if call.method.name == "owner" {
            return Ok(Box::new("nobody".to_string()));
        }
        call.zero_value.ok_or_else(|| {
            CompositionError::proxy_invocation(call.type_name, call.method.name, "unsupported")
        })
    }
}

#[test]
fn test_custom_stub_answers_unhandled_calls() {
    let context = counter_context(ContextConfig::new());
    context.set_stub_for::<dyn Counter, _>(OwnerStub).unwrap();
    let proxy = context.create_proxy::<dyn Counter>().unwrap();

    assert_eq!(proxy.owner().unwrap(), "nobody");
    assert_eq!(proxy.count().unwrap(), 0);
}

#[test]
fn test_advisor_short_circuits_detached_proxy() {
    let context = counter_context(ContextConfig::new());
    let proxy = context.create_proxy::<dyn Counter>().unwrap();

    context
        .advisors_for::<dyn Counter>()
        .unwrap()
        .add_advisor(FnAdvisor::new(
            "fixed-count",
            0,
            |invocation: &Invocation<'_, dyn Counter>| {
                Ok(if invocation.method().name == "count" {
                    Advice::value(7u32)
                } else {
                    Advice::Decline
                })
            },
        ))
        .unwrap();

    assert_eq!(proxy.count().unwrap(), 7);
    assert_eq!(proxy.add(1).unwrap(), 0);
}

#[test]
fn test_advisors_run_in_priority_order_around_target() {
    let context = counter_context(ContextConfig::new());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let manager = context.advisors_for::<dyn Counter>().unwrap();
    manager
        .add_advisor(CallLog {
            name: "late",
            priority: 10,
            calls: calls.clone(),
        })
        .unwrap();
    manager
        .add_advisor(CallLog {
            name: "early",
            priority: -5,
            calls: calls.clone(),
        })
        .unwrap();
    manager.add_advisor(Doubler).unwrap();

    let proxy = context
        .create_proxy_for::<dyn Counter>(Arc::new(AtomicCounter::default()))
        .unwrap();

    assert_eq!(proxy.add(3).unwrap(), 6);
    assert_eq!(proxy.count().unwrap(), 3);
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["early:add", "late:add", "early:count", "late:count"]
    );
    assert_eq!(manager.advisor_names(), vec!["early", "doubler", "late"]);
}

#[test]
fn test_advisor_reads_arguments() {
    let context = counter_context(ContextConfig::new());
    context
        .advisors_for::<dyn Counter>()
        .unwrap()
        .add_advisor(FnAdvisor::new(
            "cap",
            0,
            |invocation: &Invocation<'_, dyn Counter>| match invocation.arg::<u32>(0) {
                Some(amount) if *amount > 100 => Ok(Advice::value(100u32)),
                _ => Ok(Advice::Decline),
            },
        ))
        .unwrap();

    let proxy = context
        .create_proxy_for::<dyn Counter>(Arc::new(AtomicCounter::default()))
        .unwrap();
    assert_eq!(proxy.add(500).unwrap(), 100);
    assert_eq!(proxy.add(2).unwrap(), 2);
}

#[test]
fn test_advisor_wrong_return_type_fails() {
    let context = counter_context(ContextConfig::new());
    context
        .advisors_for::<dyn Counter>()
        .unwrap()
        .add_advisor(FnAdvisor::new(
            "confused",
            0,
            |_invocation: &Invocation<'_, dyn Counter>| Ok(Advice::value("seven")),
        ))
        .unwrap();

    let proxy = context.create_proxy::<dyn Counter>().unwrap();
    assert!(proxy.count().unwrap_err().is_proxy_invocation());
}

#[test]
fn test_resolved_components_are_proxied() {
    let context = counter_context(ContextConfig::new());
    context
        .register(
            ComponentKey::of::<dyn Counter>(),
            SupplierStrategy::new(|_ctx| Ok(Arc::new(AtomicCounter::default()) as Arc<dyn Counter>)).singleton(),
            0,
        )
        .unwrap();
    context
        .advisors_for::<dyn Counter>()
        .unwrap()
        .add_advisor(Doubler)
        .unwrap();

    let counter = context.get::<dyn Counter>().unwrap();
    assert_eq!(counter.add(4).unwrap(), 8);
    assert_eq!(counter.count().unwrap(), 4);
    assert!(Arc::ptr_eq(&counter, &context.get::<dyn Counter>().unwrap()));
}

#[test]
fn test_removed_advisor_no_longer_applies() {
    let context = counter_context(ContextConfig::new());
    let manager = context.advisors_for::<dyn Counter>().unwrap();
    manager.add_advisor(Doubler).unwrap();

    let proxy = context
        .create_proxy_for::<dyn Counter>(Arc::new(AtomicCounter::default()))
        .unwrap();
    assert_eq!(proxy.add(1).unwrap(), 2);

    assert_eq!(manager.remove_advisor("doubler").unwrap(), 1);
    assert_eq!(proxy.add(1).unwrap(), 2);
    assert_eq!(manager.advisor_count(), 0);
}

#[test]
fn test_proxy_state_reported() {
    let context = counter_context(ContextConfig::new());
    assert!(matches!(
        context.proxies().state::<dyn Counter>(),
        ProxyState::Unproxied
    ));

    context
        .advisors_for::<dyn Counter>()
        .unwrap()
        .add_advisor(Doubler)
        .unwrap();
    assert!(matches!(
        context.proxies().state::<dyn Counter>(),
        ProxyState::ManagerCreated { advisors: 1 }
    ));

    let snapshot = context.diagnostics().unwrap();
    assert_eq!(snapshot.proxies.len(), 1);
    assert_eq!(snapshot.proxies[0].advisors, vec!["doubler"]);
}

#[test]
fn test_proxy_without_factory_is_rejected() {
    let context = ApplicationContext::new();
    context
        .register(
            ComponentKey::of::<u32>(),
            InstanceStrategy::new(Arc::new(1u32)),
            0,
        )
        .unwrap();

    let error = context.create_proxy::<dyn Counter>().err().unwrap();
    assert!(matches!(error, CompositionError::InvalidKey { .. }));
}
