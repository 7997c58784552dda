// Per-type cache registry
//
// Provides `ResourceCaches`, which maps payload types to their
// `ResourceCache<T>`. Together with the cache's own name map this gives the
// (type, name) key: two caches never share entries, so the same name can be
// loaded as text in one and as raw bytes in another.
//
// The registry is built once at startup and passed by reference to whoever
// needs a cache; there is no global instance.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use super::cache::{CacheStats, ResourceCache};

/// Type-erased operations every registered cache supports
pub trait AnyResourceCache: Send + Sync {
    fn kind(&self) -> &str;
    fn stats(&self) -> CacheStats;
    fn shutdown(&self);
}

impl<T: Send + Sync + 'static> AnyResourceCache for ResourceCache<T> {
    fn kind(&self) -> &str {
        ResourceCache::kind(self)
    }

    fn stats(&self) -> CacheStats {
        ResourceCache::stats(self)
    }

    fn shutdown(&self) {
        ResourceCache::shutdown(self)
    }
}

struct CacheEntry {
    /// Holds an `Arc<ResourceCache<T>>` for the entry's `TypeId`
    typed: Box<dyn Any + Send + Sync>,
    erased: Arc<dyn AnyResourceCache>,
}

/// Registry of resource caches keyed by payload type.
#[derive(Default)]
pub struct ResourceCaches {
    by_type: HashMap<TypeId, CacheEntry>,
    /// Kind label -> type, in registration order
    kinds: Vec<(String, TypeId)>,
}

impl ResourceCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the cache for payload type `T`.
    ///
    /// A cache already registered for `T` is replaced and returned.
    pub fn register<T: Send + Sync + 'static>(
        &mut self,
        cache: Arc<ResourceCache<T>>,
    ) -> Option<Arc<ResourceCache<T>>> {
        let type_id = TypeId::of::<T>();
        let kind = cache.kind().to_string();
        log::debug!("Registering {} cache", kind);

        let entry = CacheEntry {
            typed: Box::new(Arc::clone(&cache)),
            erased: cache,
        };

        let previous = self.by_type.insert(type_id, entry);
        self.kinds.retain(|(_, id)| *id != type_id);
        self.kinds.push((kind, type_id));

        previous.and_then(|entry| entry.typed.downcast::<Arc<ResourceCache<T>>>().ok().map(|b| *b))
    }

    /// The cache for payload type `T`, if registered.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<ResourceCache<T>>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.typed.downcast_ref::<Arc<ResourceCache<T>>>())
            .cloned()
    }

    /// Look up a cache by its kind label.
    pub fn by_kind(&self, kind: &str) -> Option<Arc<dyn AnyResourceCache>> {
        self.kinds
            .iter()
            .find(|(k, _)| k == kind)
            .and_then(|(_, id)| self.by_type.get(id))
            .map(|entry| Arc::clone(&entry.erased))
    }

    /// Kind labels in registration order.
    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn count(&self) -> usize {
        self.by_type.len()
    }

    /// Stats for every cache, by kind label.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        self.kinds
            .iter()
            .filter_map(|(kind, id)| {
                self.by_type
                    .get(id)
                    .map(|entry| (kind.clone(), entry.erased.stats()))
            })
            .collect()
    }

    /// Shut down every cache, most recently registered first.
    pub fn shutdown_all(&self) {
        for (kind, id) in self.kinds.iter().rev() {
            if let Some(entry) = self.by_type.get(id) {
                log::debug!("Shutting down {} cache", kind);
                entry.erased.shutdown();
            }
        }
    }
}

impl std::fmt::Debug for ResourceCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCaches")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::io::MemoryProvider;
    use crate::resource::loader::{BytesLoader, TextLoader};

    fn caches() -> ResourceCaches {
        let config = CacheConfig::default().with_workers(0);
        let text = Arc::new(ResourceCache::new("TEXT", config.clone(), TextLoader).unwrap());
        let bytes = Arc::new(ResourceCache::new("BYTES", config, BytesLoader).unwrap());

        let memory = Arc::new(MemoryProvider::new("mem"));
        memory.insert("greeting", b"hello".to_vec());
        text.register_provider(memory.clone(), 0);
        bytes.register_provider(memory, 0);

        let mut caches = ResourceCaches::new();
        caches.register(text);
        caches.register(bytes);
        caches
    }

    #[test]
    fn test_get_by_type() {
        let caches = caches();
        assert_eq!(caches.count(), 2);

        let text = caches.get::<String>().unwrap();
        let bytes = caches.get::<Vec<u8>>().unwrap();
        assert!(caches.get::<u32>().is_none());

        let as_text = text.load("greeting");
        let as_bytes = bytes.load("greeting");
        assert_eq!(as_text.payload().map(String::as_str), Some("hello"));
        assert_eq!(as_bytes.payload().map(Vec::as_slice), Some(&b"hello"[..]));
    }

    #[test]
    fn test_same_name_is_distinct_per_type() {
        let caches = caches();
        let text = caches.get::<String>().unwrap();
        let bytes = caches.get::<Vec<u8>>().unwrap();

        let _held = text.load("greeting");
        assert!(text.contains("greeting"));
        assert!(!bytes.contains("greeting"));
    }

    #[test]
    fn test_by_kind_and_shutdown_all() {
        let caches = caches();
        assert_eq!(caches.kinds(), vec!["TEXT", "BYTES"]);

        let text = caches.get::<String>().unwrap();
        let handle = text.load("greeting");
        assert_eq!(caches.by_kind("TEXT").unwrap().stats().ready, 1);
        assert!(caches.by_kind("AUDIO").is_none());

        caches.shutdown_all();
        assert_eq!(text.stats().live, 0);
        // Handles outlive shutdown and keep their payload.
        assert_eq!(handle.payload().map(String::as_str), Some("hello"));
    }

    #[test]
    fn test_register_replaces_previous() {
        let mut caches = caches();
        let replacement = Arc::new(
            ResourceCache::new("TEXT2", CacheConfig::default().with_workers(0), TextLoader).unwrap(),
        );
        let previous = caches.register(replacement).unwrap();
        assert_eq!(previous.kind(), "TEXT");
        assert_eq!(caches.count(), 2);
        assert_eq!(caches.kinds(), vec!["BYTES", "TEXT2"]);
    }
}
