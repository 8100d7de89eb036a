use serde::Serialize;
use std::any::TypeId;
use std::hash::{Hash, Hasher};

use crate::container::hierarchy::empty_collection;
use crate::container::instance::ComponentInstance;

/// Identifier under which a component is registered and requested.
///
/// Equality and hashing cover the target type, the optional qualifier name
/// and the collection flag. The captured type name and empty-collection
/// constructor ride along so untyped code paths can still report and answer
/// for the type.
#[derive(Debug, Clone)]
pub struct ComponentKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<String>,
    collect: bool,
    empty_collection: fn() -> ComponentInstance,
}

impl ComponentKey {
    /// Key for a type
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: None,
            collect: false,
            empty_collection: empty_collection::<T>,
        }
    }

    /// Key for a type qualified by name
    pub fn named<T: ?Sized + Send + Sync + 'static>(name: impl Into<String>) -> Self {
        Self::of::<T>().with_name(name)
    }

    /// Collection key aggregating every member registered for a type
    pub fn collection<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::of::<T>().collecting()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn collecting(mut self) -> Self {
        self.collect = true;
        self
    }

    /// The same key with the collection flag cleared
    pub fn element_key(&self) -> Self {
        Self {
            collect: false,
            ..self.clone()
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_collection(&self) -> bool {
        self.collect
    }

    /// An empty `ComponentCollection` of this key's type
    pub(crate) fn empty_collection(&self) -> ComponentInstance {
        (self.empty_collection)()
    }

    /// Whether this key targets `T`
    pub fn is_type<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name && self.collect == other.collect
    }
}

impl Eq for ComponentKey {}

impl Hash for ComponentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
        self.collect.hash(state);
    }
}

impl std::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.type_name, self.name.as_deref().unwrap_or("default"))?;
        if self.collect {
            write!(f, "[*]")?;
        }
        Ok(())
    }
}

impl Serialize for ComponentKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    trait Greeter: Send + Sync {}

    #[test]
    fn test_structural_equality() {
        assert_eq!(ComponentKey::of::<String>(), ComponentKey::of::<String>());
        assert_ne!(ComponentKey::of::<String>(), ComponentKey::named::<String>("names"));
        assert_ne!(ComponentKey::of::<String>(), ComponentKey::collection::<String>());
        assert_ne!(ComponentKey::of::<String>(), ComponentKey::of::<u32>());

        let keys: HashSet<_> = [
            ComponentKey::named::<String>("names").collecting(),
            ComponentKey::named::<String>("names").collecting(),
            ComponentKey::named::<String>("names"),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_element_key_drops_collect_flag_only() {
        let key = ComponentKey::named::<String>("names").collecting();
        let element = key.element_key();

        assert!(!element.is_collection());
        assert_eq!(element.name(), Some("names"));
        assert!(element.is_type::<String>());
    }

    #[test]
    fn test_display_includes_type_name() {
        let key = ComponentKey::of::<dyn Greeter>();
        assert!(key.to_string().contains("Greeter"));
        assert!(key.to_string().ends_with("(default)"));
        assert!(ComponentKey::collection::<u8>().to_string().ends_with("[*]"));
    }
}
