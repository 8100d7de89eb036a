use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;
use uuid::Uuid;

use crate::config::ContextConfig;
use crate::container::hierarchy::BindingInfo;
use crate::container::pipeline::ProcessorInfo;
use crate::container::registry::ScopeState;
use crate::container::scope::ComponentScope;
use crate::proxy::manager::ProxyManagerInfo;

/// Bindings of one key, highest priority first
#[derive(Debug, Clone, Serialize)]
pub struct BindingDiagnostics {
    pub key: String,
    pub bindings: Vec<BindingInfo>,
}

/// Members of one collection key in collection order
#[derive(Debug, Clone, Serialize)]
pub struct CollectionDiagnostics {
    pub key: String,
    pub scope: ComponentScope,
    pub sealed: bool,
    pub members: Vec<BindingInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeDiagnostics {
    pub key: String,
    pub state: ScopeState,
}

/// Point-in-time snapshot of an application context
#[derive(Debug, Clone, Serialize)]
pub struct ContextDiagnostics {
    pub context_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub config: ContextConfig,
    pub bindings: Vec<BindingDiagnostics>,
    pub collections: Vec<CollectionDiagnostics>,
    pub scopes: Vec<ScopeDiagnostics>,
    pub pre_processors: Vec<ProcessorInfo>,
    pub post_processors: Vec<ProcessorInfo>,
    pub proxies: Vec<ProxyManagerInfo>,
    pub declared_constructors: usize,
}

impl ContextDiagnostics {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Number of singletons currently cached
    pub fn ready_singletons(&self) -> usize {
        self.scopes
            .iter()
            .filter(|scope| scope.state == ScopeState::Ready)
            .count()
    }

    /// Plain-text tree of bindings and collections
    pub fn render_tree(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "context {} ({})", self.context_id, self.captured_at.to_rfc3339());

        for binding in &self.bindings {
            let _ = writeln!(output, "├── {}", binding.key);
            for (index, info) in binding.bindings.iter().enumerate() {
                let marker = if index == 0 { "*" } else { " " };
                let _ = writeln!(
                    output,
                    "│   {} [{}] {} ({})",
                    marker, info.priority, info.strategy, info.scope
                );
            }
        }

        for collection in &self.collections {
            let sealed = if collection.sealed { ", sealed" } else { "" };
            let _ = writeln!(output, "├── {} ({}{})", collection.key, collection.scope, sealed);
            for info in &collection.members {
                let _ = writeln!(output, "│     [{}] {}", info.priority, info.strategy);
            }
        }

        let _ = writeln!(
            output,
            "└── {} ready singletons, {} pre / {} post processors, {} proxy managers",
            self.ready_singletons(),
            self.pre_processors.len(),
            self.post_processors.len(),
            self.proxies.len()
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use crate::container::context::ApplicationContext;
    use crate::container::key::ComponentKey;
    use crate::container::strategy::{InstanceStrategy, SupplierStrategy};
    use std::sync::Arc;

    #[test]
    fn test_snapshot_reflects_context() {
        let context = ApplicationContext::new();
        context
            .register(
                ComponentKey::of::<String>(),
                InstanceStrategy::new(Arc::new("root".to_string())),
                5,
            )
            .unwrap();
        context
            .register(
                ComponentKey::of::<String>(),
                SupplierStrategy::new(|_ctx| Ok(Arc::new("fallback".to_string()))),
                1,
            )
            .unwrap();
        context
            .register(
                ComponentKey::collection::<u32>(),
                InstanceStrategy::new(Arc::new(7u32)),
                0,
            )
            .unwrap();
        context.get::<String>().unwrap();

        let snapshot = context.diagnostics().unwrap();
        assert_eq!(snapshot.context_id, context.id());
        assert_eq!(snapshot.bindings.len(), 1);
        let priorities: Vec<i32> = snapshot.bindings[0].bindings.iter().map(|b| b.priority).collect();
        assert_eq!(priorities, vec![5, 1]);
        assert_eq!(snapshot.collections.len(), 1);
        assert_eq!(snapshot.ready_singletons(), 1);

        let json = snapshot.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["bindings"][0]["bindings"][0]["scope"], "singleton");
        assert!(value["captured_at"].is_string());

        let tree = snapshot.render_tree();
        assert!(tree.contains("* [5] instance<alloc::string::String>"));
    }
}
