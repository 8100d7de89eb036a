use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::CompositionError;

/// Lifetime policy of a resolved component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentScope {
    /// One instance per context
    Singleton,
    /// New instance for each request
    #[default]
    Prototype,
}

impl ComponentScope {
    pub fn is_singleton(&self) -> bool {
        matches!(self, ComponentScope::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, ComponentScope::Prototype)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentScope::Singleton => "singleton",
            ComponentScope::Prototype => "prototype",
        }
    }
}

impl std::fmt::Display for ComponentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ComponentScope {
    type Err = CompositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(ComponentScope::Singleton),
            "prototype" | "transient" => Ok(ComponentScope::Prototype),
            _ => Err(CompositionError::Configuration {
                message: format!("unknown component scope '{}'", s),
            }),
        }
    }
}

/// Context-owned type map where processors keep state across invocations
#[derive(Default)]
pub struct ContextStorage {
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ContextStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stored value of type `S`, inserting `S::default()` first if absent
    pub fn get_or_default<S>(&self) -> Result<Arc<S>, CompositionError>
    where
        S: Default + Send + Sync + 'static,
    {
        if let Some(existing) = self.get::<S>()? {
            return Ok(existing);
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| CompositionError::lock("context_storage"))?;
        let entry = entries
            .entry(TypeId::of::<S>())
            .or_insert_with(|| Arc::new(S::default()) as Arc<dyn Any + Send + Sync>)
            .clone();

        entry
            .downcast::<S>()
            .map_err(|_| CompositionError::TypeMismatch {
                key: "context_storage".to_string(),
                expected: std::any::type_name::<S>().to_string(),
            })
    }

    pub fn get<S: Send + Sync + 'static>(&self) -> Result<Option<Arc<S>>, CompositionError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CompositionError::lock("context_storage"))?;
        Ok(entries
            .get(&TypeId::of::<S>())
            .and_then(|entry| entry.clone().downcast::<S>().ok()))
    }

    /// Store a value, replacing any previous value of the same type
    pub fn insert<S: Send + Sync + 'static>(&self, value: S) -> Result<(), CompositionError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CompositionError::lock("context_storage"))?;
        entries.insert(TypeId::of::<S>(), Arc::new(value));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl std::fmt::Debug for ContextStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStorage")
            .field("entries", &self.len())
            .finish()
    }
}
