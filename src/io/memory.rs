// In-memory resource provider

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::resource::{ProviderError, ResourceProvider, ResourceStream};

/// Named byte blobs held in memory
///
/// Useful for resources embedded in the binary and for tests. Blobs can be
/// added and removed while the provider is registered.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    label: String,
    blobs: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryProvider {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace a blob
    pub fn insert(&self, name: &str, bytes: impl Into<Arc<[u8]>>) {
        self.blobs.write().insert(name.to_string(), bytes.into());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.blobs.write().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

/// Cursor over a shared blob
struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl ResourceProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn can_resolve(&self, name: &str) -> bool {
        self.blobs.read().contains_key(name)
    }

    fn open_stream(&self, name: &str) -> Result<ResourceStream, ProviderError> {
        let blob = self
            .blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                provider: self.label.clone(),
                name: name.to_string(),
            })?;
        Ok(Box::new(Cursor::new(SharedBytes(blob))))
    }
}
