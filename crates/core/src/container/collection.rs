use std::sync::Arc;

/// Immutable, ordered sequence of components gathered from collection bindings
pub struct ComponentCollection<T: ?Sized> {
    items: Arc<[Arc<T>]>,
}

impl<T: ?Sized> ComponentCollection<T> {
    pub fn new(items: Vec<Arc<T>>) -> Self {
        Self {
            items: items.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&Arc<T>> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Arc<T>] {
        &self.items
    }
}

impl<T: ?Sized + PartialEq> ComponentCollection<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.items.iter().any(|existing| **existing == *item)
    }
}

impl<T: ?Sized> Clone for ComponentCollection<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: ?Sized> Default for ComponentCollection<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, T: ?Sized> IntoIterator for &'a ComponentCollection<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: ?Sized + std::fmt::Debug> std::fmt::Debug for ComponentCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
