//! Resource pools - bulk release of handle references
//!
//! A pool owns references. Adding the same resource twice means the pool
//! owns two references to it and releases both on `release_all`.

use std::collections::HashMap;

use super::handle::{HandleId, ResourceHandle};

pub struct ResourcePool<T> {
    entries: HashMap<HandleId, Vec<ResourceHandle<T>>>,
}

impl<T> ResourcePool<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Take ownership of one reference
    pub fn add(&mut self, handle: ResourceHandle<T>) {
        self.entries.entry(handle.id()).or_default().push(handle);
    }

    /// References the pool holds to the same resource as `handle`
    pub fn count(&self, handle: &ResourceHandle<T>) -> usize {
        self.entries.get(&handle.id()).map_or(0, Vec::len)
    }

    pub fn contains(&self, handle: &ResourceHandle<T>) -> bool {
        self.entries.contains_key(&handle.id())
    }

    /// Number of distinct resources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of references held
    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every reference the pool holds and empty it
    ///
    /// # Returns
    /// Number of references released; zero on an already-empty pool
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for (_, handles) in self.entries.drain() {
            for handle in handles {
                handle.release();
                released += 1;
            }
        }
        released
    }
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ResourcePool<T> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl<T> std::fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("resources", &self.len())
            .field("references", &self.total())
            .finish()
    }
}
