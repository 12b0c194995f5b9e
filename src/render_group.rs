//! Grouping of renderable records by a shared render handle.
//!
//! Records that share a handle are submitted together. Handles compare by
//! identity, never by contents: two distinct handles with equal contents are
//! different groups.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity key around an optional shared handle.
///
/// Equal when both are absent or both point at the same allocation. An
/// absent handle hashes as `0`.
#[derive(Debug)]
pub struct RenderGroupKey<T>(Option<Arc<T>>);

impl<T> RenderGroupKey<T> {
    /// Key for `handle`.
    pub fn new(handle: Arc<T>) -> Self {
        Self(Some(handle))
    }

    /// Key for records without a handle.
    pub fn none() -> Self {
        Self(None)
    }

    /// The wrapped handle.
    pub fn handle(&self) -> Option<&Arc<T>> {
        self.0.as_ref()
    }

    fn address(&self) -> usize {
        self.0.as_ref().map_or(0, |handle| Arc::as_ptr(handle) as *const () as usize)
    }
}

impl<T> Clone for RenderGroupKey<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for RenderGroupKey<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> PartialEq for RenderGroupKey<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Eq for RenderGroupKey<T> {}

impl<T> Hash for RenderGroupKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

/// Buckets `items` by key, keeping first-seen group order and item order
/// within each group.
pub fn group_by_key<T, I, K>(items: I) -> Vec<(RenderGroupKey<T>, Vec<K>)>
where
    I: IntoIterator<Item = (RenderGroupKey<T>, K)>,
{
    let mut index: HashMap<RenderGroupKey<T>, usize> = HashMap::new();
    let mut groups: Vec<(RenderGroupKey<T>, Vec<K>)> = Vec::new();
    for (key, item) in items {
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(item),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![item]));
            }
        }
    }
    groups
}
