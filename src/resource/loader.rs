//! Type-specific loaders
//!
//! A loader turns the stream a provider opened into a payload. Each
//! `ResourceCache<T>` owns exactly one loader for its payload type.

use std::io::{self, Read};

use super::cache::CacheCore;
use super::handle::ResourceHandle;

/// Why a loader could not build a payload
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Reading the stream failed
    #[error("I/O error reading '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    /// The bytes were read but are not a valid resource
    #[error("invalid data in '{name}': {reason}")]
    InvalidData { name: String, reason: String },
    /// Anything else the loader wants to report
    #[error("{0}")]
    Other(String),
}

impl LoadError {
    pub fn io(name: &str, source: io::Error) -> Self {
        LoadError::Io {
            name: name.to_string(),
            source,
        }
    }

    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        LoadError::InvalidData {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// What a loader knows about the load it is running
///
/// Gives access to the owning cache so a loader can request other
/// resources of the same type. No cache lock is held while a loader runs.
pub struct LoadContext<'a, T> {
    name: &'a str,
    provider: &'a str,
    core: &'a CacheCore<T>,
}

impl<'a, T> LoadContext<'a, T> {
    pub(crate) fn new(name: &'a str, provider: &'a str, core: &'a CacheCore<T>) -> Self {
        Self {
            name,
            provider,
            core,
        }
    }

    /// Name of the resource being loaded
    pub fn name(&self) -> &str {
        self.name
    }

    /// Name of the provider that opened the stream
    pub fn provider(&self) -> &str {
        self.provider
    }

    /// Resource type label of the owning cache
    pub fn kind(&self) -> &str {
        self.core.kind()
    }
}

impl<T: Send + Sync + 'static> LoadContext<'_, T> {
    /// Load another resource from the same cache and wait for it
    ///
    /// Loading a name that is already being loaded further up the same
    /// chain never completes; loaders must not form cycles.
    pub fn load_child(&self, name: &str) -> ResourceHandle<T> {
        self.core.load(name, Default::default())
    }

    /// Queue another resource from the same cache without waiting
    pub fn load_child_async(&self, name: &str, priority: i32) -> ResourceHandle<T> {
        self.core.load_async(name, Default::default(), priority)
    }
}

/// Builds payloads of one type from streams
pub trait ResourceLoader<T>: Send + Sync {
    fn load(&self, stream: &mut dyn Read, ctx: &LoadContext<'_, T>) -> Result<T, LoadError>;
}

impl<T, F> ResourceLoader<T> for F
where
    F: Fn(&mut dyn Read, &LoadContext<'_, T>) -> Result<T, LoadError> + Send + Sync,
{
    fn load(&self, stream: &mut dyn Read, ctx: &LoadContext<'_, T>) -> Result<T, LoadError> {
        self(stream, ctx)
    }
}

/// Pin a closure to the loader signature so its argument types are inferred
///
/// ```no_run
/// use std::io::Read;
///
/// use rescache::config::CacheConfig;
/// use rescache::resource::{loader_fn, LoadError, ResourceCache};
///
/// let sizes = loader_fn(|stream, ctx| {
///     let mut bytes = Vec::new();
///     stream.read_to_end(&mut bytes).map_err(|e| LoadError::io(ctx.name(), e))?;
///     Ok(bytes.len())
/// });
/// let cache = ResourceCache::new("SIZE", CacheConfig::default(), sizes)?;
/// # Ok::<(), rescache::threading::ThreadError>(())
/// ```
pub fn loader_fn<T, F>(f: F) -> F
where
    F: Fn(&mut dyn Read, &LoadContext<'_, T>) -> Result<T, LoadError> + Send + Sync,
{
    f
}

/// Loader that reads the whole stream into memory
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesLoader;

impl ResourceLoader<Vec<u8>> for BytesLoader {
    fn load(&self, stream: &mut dyn Read, ctx: &LoadContext<'_, Vec<u8>>) -> Result<Vec<u8>, LoadError> {
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .map_err(|e| LoadError::io(ctx.name(), e))?;
        Ok(bytes)
    }
}

/// Loader that reads the stream as UTF-8 text
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl ResourceLoader<String> for TextLoader {
    fn load(&self, stream: &mut dyn Read, ctx: &LoadContext<'_, String>) -> Result<String, LoadError> {
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .map_err(|e| LoadError::io(ctx.name(), e))?;
        String::from_utf8(bytes).map_err(|e| LoadError::invalid(ctx.name(), e.to_string()))
    }
}
