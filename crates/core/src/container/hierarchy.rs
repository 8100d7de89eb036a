use serde::Serialize;
use std::sync::Arc;

use crate::container::collection::ComponentCollection;
use crate::container::instance::ComponentInstance;
use crate::container::key::ComponentKey;
use crate::container::resolver::ResolutionContext;
use crate::container::scope::ComponentScope;
use crate::container::strategy::ErasedStrategy;
use crate::errors::{CompositionError, CompositionResult};

/// One strategy registered under a key
#[derive(Clone)]
pub(crate) struct BindingEntry {
    pub(crate) priority: i32,
    pub(crate) strategy: Arc<dyn ErasedStrategy>,
}

/// Diagnostic view of a registered strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingInfo {
    pub priority: i32,
    pub scope: ComponentScope,
    pub strategy: String,
}

impl From<&BindingEntry> for BindingInfo {
    fn from(entry: &BindingEntry) -> Self {
        Self {
            priority: entry.priority,
            scope: entry.strategy.scope(),
            strategy: entry.strategy.describe(),
        }
    }
}

/// What a registration call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    /// Non-strict mode kept the earlier binding at the same priority
    Ignored,
}

/// Priority-ordered strategies for one key; the highest priority wins
pub struct BindingHierarchy {
    key: ComponentKey,
    // descending priority, unique priorities
    entries: Vec<BindingEntry>,
}

impl BindingHierarchy {
    pub(crate) fn new(key: ComponentKey) -> Self {
        Self {
            key,
            entries: Vec::new(),
        }
    }

    pub fn key(&self) -> &ComponentKey {
        &self.key
    }

    pub(crate) fn register(
        &mut self,
        strategy: Arc<dyn ErasedStrategy>,
        priority: i32,
        strict: bool,
    ) -> CompositionResult<RegistrationOutcome> {
        if let Some(existing) = self.entries.iter().find(|entry| entry.priority == priority) {
            if strict {
                return Err(CompositionError::ConflictingBinding {
                    key: self.key.to_string(),
                    priority,
                    existing: existing.strategy.describe(),
                });
            }
            return Ok(RegistrationOutcome::Ignored);
        }

        let position = self
            .entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, BindingEntry { priority, strategy });
        Ok(RegistrationOutcome::Registered)
    }

    /// Put `strategy` at `priority`, returning the description of what it displaced
    pub(crate) fn replace(&mut self, strategy: Arc<dyn ErasedStrategy>, priority: i32) -> Option<String> {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.priority == priority) {
            let previous = entry.strategy.describe();
            entry.strategy = strategy;
            return Some(previous);
        }

        // priority is free now, so registration cannot conflict
        let _ = self.register(strategy, priority, true);
        None
    }

    /// Register above the current maximum and return the priority used.
    /// Fails when the maximum is already `i32::MAX`.
    pub(crate) fn override_binding(&mut self, strategy: Arc<dyn ErasedStrategy>) -> CompositionResult<i32> {
        let priority = match self.entries.first() {
            None => 0,
            Some(highest) => highest
                .priority
                .checked_add(1)
                .ok_or_else(|| CompositionError::ConflictingBinding {
                    key: self.key.to_string(),
                    priority: highest.priority,
                    existing: highest.strategy.describe(),
                })?,
        };
        self.entries.insert(0, BindingEntry { priority, strategy });
        Ok(priority)
    }

    pub(crate) fn remove(&mut self, priority: i32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.priority != priority);
        self.entries.len() != before
    }

    pub(crate) fn highest(&self) -> Option<&BindingEntry> {
        self.entries.first()
    }

    pub fn highest_priority(&self) -> Option<i32> {
        self.entries.first().map(|entry| entry.priority)
    }

    /// Every binding in precedence order
    pub fn order(&self) -> Vec<BindingInfo> {
        self.entries.iter().map(BindingInfo::from).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) type CollectionAssembler =
    fn(&[BindingEntry], &ResolutionContext<'_>) -> CompositionResult<ComponentInstance>;

/// Members registered under a collection key.
///
/// Equal priorities are allowed here; they keep registration order.
pub struct CollectionHierarchy {
    key: ComponentKey,
    members: Vec<BindingEntry>,
    assembler: CollectionAssembler,
    scope: ComponentScope,
}

impl CollectionHierarchy {
    pub(crate) fn new<T: ?Sized + Send + Sync + 'static>(key: ComponentKey) -> Self {
        Self {
            key,
            members: Vec::new(),
            assembler: assemble_collection::<T>,
            scope: ComponentScope::Prototype,
        }
    }

    pub fn key(&self) -> &ComponentKey {
        &self.key
    }

    pub(crate) fn add(&mut self, strategy: Arc<dyn ErasedStrategy>, priority: i32) {
        let position = self
            .members
            .iter()
            .position(|member| member.priority < priority)
            .unwrap_or(self.members.len());
        self.members.insert(position, BindingEntry { priority, strategy });
    }

    pub(crate) fn remove(&mut self, priority: i32) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member.priority != priority);
        self.members.len() != before
    }

    pub(crate) fn members(&self) -> &[BindingEntry] {
        &self.members
    }

    pub(crate) fn assembler(&self) -> CollectionAssembler {
        self.assembler
    }

    pub fn scope(&self) -> ComponentScope {
        self.scope
    }

    pub(crate) fn set_scope(&mut self, scope: ComponentScope) {
        self.scope = scope;
    }

    pub fn order(&self) -> Vec<BindingInfo> {
        self.members.iter().map(BindingInfo::from).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn assemble_collection<T: ?Sized + Send + Sync + 'static>(
    members: &[BindingEntry],
    ctx: &ResolutionContext<'_>,
) -> CompositionResult<ComponentInstance> {
    let mut items = Vec::with_capacity(members.len());
    for member in members {
        let instance = member.strategy.instantiate(ctx)?;
        let typed = instance
            .downcast::<T>()
            .ok_or_else(|| CompositionError::TypeMismatch {
                key: member.strategy.describe(),
                expected: std::any::type_name::<T>().to_string(),
            })?;
        items.push(typed);
    }
    Ok(ComponentInstance::new(Arc::new(ComponentCollection::new(items))))
}

/// Empty collection instance for the element type `T`
pub(crate) fn empty_collection<T: ?Sized + Send + Sync + 'static>() -> ComponentInstance {
    ComponentInstance::new(Arc::new(ComponentCollection::<T>::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::strategy::{InstanceStrategy, TypedStrategy};

    fn text(value: &str) -> Arc<dyn ErasedStrategy> {
        TypedStrategy::<String>::erase(InstanceStrategy::new(Arc::new(value.to_string())))
    }

    fn described(value: &str) -> String {
        text(value).describe()
    }

    #[test]
    fn test_highest_priority_wins() {
        let mut hierarchy = BindingHierarchy::new(ComponentKey::of::<String>());
        hierarchy.register(text("five"), 5, true).unwrap();
        hierarchy.register(text("ten"), 10, true).unwrap();
        hierarchy.register(text("one"), 1, true).unwrap();

        assert_eq!(hierarchy.highest_priority(), Some(10));
        let priorities: Vec<i32> = hierarchy.order().iter().map(|info| info.priority).collect();
        assert_eq!(priorities, vec![10, 5, 1]);

        assert!(hierarchy.remove(10));
        assert_eq!(hierarchy.highest_priority(), Some(5));
        assert!(!hierarchy.remove(10));
    }

    #[test]
    fn test_occupied_priority_conflicts_when_strict() {
        let mut hierarchy = BindingHierarchy::new(ComponentKey::of::<String>());
        hierarchy.register(text("first"), 3, true).unwrap();

        let error = hierarchy.register(text("second"), 3, true).unwrap_err();
        assert!(error.is_conflict());

        let outcome = hierarchy.register(text("second"), 3, false).unwrap();
        assert_eq!(outcome, RegistrationOutcome::Ignored);
        assert_eq!(hierarchy.len(), 1);
    }

    #[test]
    fn test_override_goes_above_current_maximum() {
        let mut hierarchy = BindingHierarchy::new(ComponentKey::of::<String>());
        assert_eq!(hierarchy.override_binding(text("a")).unwrap(), 0);
        hierarchy.register(text("b"), 41, true).unwrap();
        assert_eq!(hierarchy.override_binding(text("c")).unwrap(), 42);
        assert_eq!(hierarchy.highest_priority(), Some(42));
    }

    #[test]
    fn test_override_above_max_priority_conflicts() {
        let mut hierarchy = BindingHierarchy::new(ComponentKey::of::<String>());
        hierarchy.register(text("top"), i32::MAX, true).unwrap();

        match hierarchy.override_binding(text("higher")).unwrap_err() {
            CompositionError::ConflictingBinding { priority, existing, .. } => {
                assert_eq!(priority, i32::MAX);
                assert_eq!(existing, described("top"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(hierarchy.len(), 1);
        let priorities: Vec<i32> = hierarchy.order().iter().map(|info| info.priority).collect();
        assert_eq!(priorities, vec![i32::MAX]);
    }

    #[test]
    fn test_replace_swaps_in_place() {
        let mut hierarchy = BindingHierarchy::new(ComponentKey::of::<String>());
        assert!(hierarchy.replace(text("a"), 2).is_none());
        assert_eq!(hierarchy.replace(text("b"), 2), Some(described("a")));
        assert_eq!(hierarchy.len(), 1);
    }

    #[test]
    fn test_collection_members_keep_registration_order_on_ties() {
        let mut collection = CollectionHierarchy::new::<String>(ComponentKey::collection::<String>());
        collection.add(text("admin"), 0);
        collection.add(text("user"), 12);
        collection.add(text("guest"), 0);

        let priorities: Vec<i32> = collection.order().iter().map(|info| info.priority).collect();
        assert_eq!(priorities, vec![12, 0, 0]);
        assert_eq!(collection.len(), 3);
    }
}
