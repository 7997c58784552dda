//! Named resource map - the registry of live handles for one cache
//!
//! `find_or_create` is the single serialized entry point. It either adds a
//! reference to an existing entry or inserts a placeholder in `Created`
//! state before the lock is dropped, so no second caller can start a second
//! load for the same name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::{ResourceHandle, ResourceSlot, ResourceState};

/// Registry of live handles keyed by name, for one resource type
pub struct NamedResourceMap<T> {
    kind: Arc<str>,
    entries: Mutex<HashMap<String, Arc<ResourceSlot<T>>>>,
}

impl<T> NamedResourceMap<T> {
    /// Create an empty map for the given resource type label
    pub fn new(kind: &str) -> Arc<Self> {
        Arc::new(Self {
            kind: Arc::from(kind),
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Look up `name`, inserting a `Created` placeholder if it is absent
    ///
    /// # Returns
    /// The handle (one new reference) and whether this call created it
    pub fn find_or_create(self: &Arc<Self>, name: &str) -> (ResourceHandle<T>, bool) {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get(name) {
            slot.add_ref();
            return (ResourceHandle::adopt(Arc::clone(slot)), false);
        }

        let slot = Arc::new(ResourceSlot::new(
            name,
            Arc::clone(&self.kind),
            Arc::downgrade(self),
        ));
        entries.insert(name.to_string(), Arc::clone(&slot));
        (ResourceHandle::adopt(slot), true)
    }

    /// Look up `name` without creating it
    pub fn find(&self, name: &str) -> Option<ResourceHandle<T>> {
        let entries = self.entries.lock();
        entries.get(name).map(|slot| {
            slot.add_ref();
            ResourceHandle::adopt(Arc::clone(slot))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Names of all live entries, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// States of all live entries
    pub(crate) fn states(&self) -> Vec<ResourceState> {
        self.entries.lock().values().map(|slot| slot.state()).collect()
    }

    /// Drop the reference that may be the last one, under the map lock
    ///
    /// The entry is removed only if it is still this slot; a slot detached
    /// by `detach_all` may share its name with a newer entry.
    pub(crate) fn release_last(&self, slot: &Arc<ResourceSlot<T>>) -> usize {
        let mut entries = self.entries.lock();
        let remaining = slot.decrement_final();
        if remaining == 0 {
            let owned = entries
                .get(slot.name())
                .is_some_and(|current| Arc::ptr_eq(current, slot));
            if owned {
                entries.remove(slot.name());
                log::debug!("Removed {} resource '{}'", self.kind, slot.name());
            }
        }
        remaining
    }

    /// Remove every entry regardless of outstanding references
    ///
    /// # Returns
    /// The detached slots, so the caller can report what was still in use
    pub(crate) fn detach_all(&self) -> Vec<Arc<ResourceSlot<T>>> {
        let mut entries = self.entries.lock();
        entries.drain().map(|(_, slot)| slot).collect()
    }
}

impl<T> std::fmt::Debug for NamedResourceMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedResourceMap")
            .field("kind", &self.kind)
            .field("entries", &self.len())
            .finish()
    }
}
