//! Typed key/value storage attached to calls.
//!
//! Keys carry their value type, so lookups never need a caller-side cast.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

/// Typed key for [`Attributes`].
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// Create a key. Keys with the same name but different types do not collide.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Key name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeKey({})", self.name)
    }
}

type Slot = (TypeId, &'static str);

/// Concurrent attribute map.
#[derive(Default)]
pub struct Attributes {
    values: DashMap<Slot, Arc<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T: 'static>(key: &AttributeKey<T>) -> Slot {
        (TypeId::of::<T>(), key.name)
    }

    /// Store `value`, replacing any previous value for `key`.
    pub fn put<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>, value: T) {
        self.values.insert(Self::slot(key), Arc::new(value));
    }

    /// Value for `key`, if present.
    pub fn get<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        let value = self.values.get(&Self::slot(key))?.value().clone();
        value.downcast::<T>().ok()
    }

    /// Value for `key`, inserting `init()` first when absent.
    pub fn compute_if_absent<T, F>(&self, key: &AttributeKey<T>, init: F) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let value = self
            .values
            .entry(Self::slot(key))
            .or_insert_with(|| Arc::new(init()))
            .value()
            .clone();
        value.downcast::<T>().ok()
    }

    pub fn contains<T: 'static>(&self, key: &AttributeKey<T>) -> bool {
        self.values.contains_key(&Self::slot(key))
    }

    /// Remove the value for `key`, returning it.
    pub fn remove<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        let (_, value) = self.values.remove(&Self::slot(key))?;
        value.downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self.values.iter().map(|e| e.key().1).collect();
        f.debug_struct("Attributes").field("keys", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: AttributeKey<String> = AttributeKey::new("name");
    const COUNT: AttributeKey<u32> = AttributeKey::new("name");

    #[test]
    fn test_put_get_remove() {
        let attrs = Attributes::new();
        assert!(attrs.get(&NAME).is_none());

        attrs.put(&NAME, "alpha".to_string());
        assert_eq!(attrs.get(&NAME).as_deref().map(String::as_str), Some("alpha"));

        attrs.put(&NAME, "beta".to_string());
        assert_eq!(attrs.len(), 1);

        let removed = attrs.remove(&NAME).unwrap();
        assert_eq!(removed.as_str(), "beta");
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_same_name_different_type_do_not_collide() {
        let attrs = Attributes::new();
        attrs.put(&NAME, "x".to_string());
        attrs.put(&COUNT, 7);
        assert_eq!(*attrs.get(&COUNT).unwrap(), 7);
        assert_eq!(attrs.get(&NAME).unwrap().as_str(), "x");
    }

    #[test]
    fn test_compute_if_absent_runs_once() {
        let attrs = Attributes::new();
        assert_eq!(*attrs.compute_if_absent(&COUNT, || 1).unwrap(), 1);
        assert_eq!(*attrs.compute_if_absent(&COUNT, || 2).unwrap(), 1);
    }
}
