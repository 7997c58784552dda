//! Provider registry - pluggable, priority-ordered sources of resource streams
//!
//! A provider turns a resource name into a byte stream. Providers are
//! queried from highest to lowest priority; providers registered with the
//! same priority are queried in registration order. Providers registered
//! with `auto_lookup = false` are only used when a caller names them
//! explicitly.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Raw byte stream handed from a provider to a loader
pub type ResourceStream = Box<dyn Read + Send>;

/// Errors raised while resolving a name to a stream
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No provider could resolve the name
    #[error("no provider can resolve '{0}'")]
    Unresolved(String),
    /// The explicitly requested provider is not registered
    #[error("provider {0} is not registered")]
    UnknownProvider(ProviderId),
    /// The provider does not have the resource
    #[error("'{name}' not found in {provider}")]
    NotFound { provider: String, name: String },
    /// The name is not acceptable to the provider (path traversal, etc.)
    #[error("invalid resource name '{0}'")]
    InvalidName(String),
    /// I/O error while opening the stream
    #[error("I/O error opening '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    /// Archive could not be read
    #[error("archive error: {0}")]
    Archive(String),
}

/// A source that can open streams by resource name
pub trait ResourceProvider: Send + Sync {
    /// Label used in diagnostics and in `ResourceHandle::provider_used`
    fn name(&self) -> &str;

    /// Whether `open_stream` is expected to succeed for `name`
    fn can_resolve(&self, name: &str) -> bool;

    /// Open a stream for `name`
    fn open_stream(&self, name: &str) -> Result<ResourceStream, ProviderError>;
}

/// Identifies one registration; returned by `register`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which providers a load may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderSelection {
    /// Walk all auto-lookup providers in priority order
    #[default]
    Auto,
    /// Use only this provider, whether or not it is auto-lookup
    Explicit(ProviderId),
}

/// Public view of one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub name: String,
    pub priority: i32,
    pub auto_lookup: bool,
}

/// A stream together with the provider that produced it
pub struct ResolvedStream {
    pub provider: String,
    pub stream: ResourceStream,
}

impl std::fmt::Debug for ResolvedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedStream")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct ProviderRegistration {
    id: ProviderId,
    provider: Arc<dyn ResourceProvider>,
    priority: i32,
    auto_lookup: bool,
}

/// Ordered set of registered providers
#[derive(Default)]
pub struct ProviderRegistry {
    /// Kept sorted: priority descending, then registration order
    registrations: RwLock<Vec<ProviderRegistration>>,
    next_id: AtomicU64,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider
    ///
    /// # Arguments
    /// * `provider` - The source to add
    /// * `priority` - Higher values are queried first
    /// * `auto_lookup` - Whether `ProviderSelection::Auto` may use it
    pub fn register(
        &self,
        provider: Arc<dyn ResourceProvider>,
        priority: i32,
        auto_lookup: bool,
    ) -> ProviderId {
        let id = ProviderId(self.next_id.fetch_add(1, Ordering::Relaxed));
        log::debug!(
            "Registering provider '{}' {} (priority {}, auto_lookup {})",
            provider.name(),
            id,
            priority,
            auto_lookup
        );

        let mut registrations = self.registrations.write();
        // Insert after every registration of equal or higher priority.
        let position = registrations
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(registrations.len());
        registrations.insert(
            position,
            ProviderRegistration {
                id,
                provider,
                priority,
                auto_lookup,
            },
        );
        id
    }

    /// Remove a registration
    ///
    /// # Returns
    /// `true` if it was registered
    pub fn unregister(&self, id: ProviderId) -> bool {
        let mut registrations = self.registrations.write();
        match registrations.iter().position(|r| r.id == id) {
            Some(index) => {
                let removed = registrations.remove(index);
                log::debug!("Unregistered provider '{}' {}", removed.provider.name(), id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Registrations in query order
    pub fn registrations(&self) -> Vec<ProviderInfo> {
        self.registrations
            .read()
            .iter()
            .map(|r| ProviderInfo {
                id: r.id,
                name: r.provider.name().to_string(),
                priority: r.priority,
                auto_lookup: r.auto_lookup,
            })
            .collect()
    }

    /// Resolve `name` to a stream
    ///
    /// The registry lock is only held while taking a snapshot of the
    /// candidates; providers are queried without it.
    pub fn resolve(
        &self,
        name: &str,
        selection: ProviderSelection,
    ) -> Result<ResolvedStream, ProviderError> {
        match selection {
            ProviderSelection::Auto => self.resolve_auto(name),
            ProviderSelection::Explicit(id) => self.resolve_explicit(name, id),
        }
    }

    fn resolve_auto(&self, name: &str) -> Result<ResolvedStream, ProviderError> {
        let candidates: Vec<ProviderRegistration> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.auto_lookup)
            .cloned()
            .collect();

        for candidate in candidates {
            if !candidate.provider.can_resolve(name) {
                continue;
            }
            match candidate.provider.open_stream(name) {
                Ok(stream) => {
                    return Ok(ResolvedStream {
                        provider: candidate.provider.name().to_string(),
                        stream,
                    })
                }
                Err(e) => {
                    log::warn!(
                        "Provider '{}' claimed '{}' but failed to open it: {}",
                        candidate.provider.name(),
                        name,
                        e
                    );
                }
            }
        }

        Err(ProviderError::Unresolved(name.to_string()))
    }

    fn resolve_explicit(&self, name: &str, id: ProviderId) -> Result<ResolvedStream, ProviderError> {
        let provider = self
            .registrations
            .read()
            .iter()
            .find(|r| r.id == id)
            .map(|r| Arc::clone(&r.provider))
            .ok_or(ProviderError::UnknownProvider(id))?;

        if !provider.can_resolve(name) {
            return Err(ProviderError::NotFound {
                provider: provider.name().to_string(),
                name: name.to_string(),
            });
        }

        let stream = provider.open_stream(name)?;
        Ok(ResolvedStream {
            provider: provider.name().to_string(),
            stream,
        })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.registrations()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryProvider;
    use rstest::rstest;

    fn memory(label: &str, names: &[&str]) -> Arc<MemoryProvider> {
        let provider = MemoryProvider::new(label);
        for name in names {
            provider.insert(name, label.as_bytes().to_vec());
        }
        Arc::new(provider)
    }

    fn read_all(resolved: ResolvedStream) -> String {
        let mut out = String::new();
        let mut stream = resolved.stream;
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[rstest]
    #[case::higher_priority_wins(&[("low", 0), ("high", 10)], "high")]
    #[case::tie_goes_to_first_registered(&[("first", 5), ("second", 5)], "first")]
    #[case::negative_priority_last(&[("neg", -1), ("zero", 0)], "zero")]
    fn test_auto_resolution_order(#[case] providers: &[(&str, i32)], #[case] expected: &str) {
        let registry = ProviderRegistry::new();
        for (label, priority) in providers {
            registry.register(memory(label, &["x"]), *priority, true);
        }

        let resolved = registry.resolve("x", ProviderSelection::Auto).unwrap();
        assert_eq!(resolved.provider, expected);
        assert_eq!(read_all(resolved), expected);
    }

    #[test]
    fn test_auto_skips_providers_without_name() {
        let registry = ProviderRegistry::new();
        registry.register(memory("empty", &[]), 10, true);
        registry.register(memory("full", &["x"]), 0, true);

        let resolved = registry.resolve("x", ProviderSelection::Auto).unwrap();
        assert_eq!(resolved.provider, "full");
    }

    #[test]
    fn test_auto_skips_non_auto_lookup() {
        let registry = ProviderRegistry::new();
        let hidden = registry.register(memory("hidden", &["x"]), 10, false);

        assert!(matches!(
            registry.resolve("x", ProviderSelection::Auto),
            Err(ProviderError::Unresolved(_))
        ));

        let resolved = registry
            .resolve("x", ProviderSelection::Explicit(hidden))
            .unwrap();
        assert_eq!(resolved.provider, "hidden");
    }

    #[test]
    fn test_explicit_unknown_and_missing() {
        let registry = ProviderRegistry::new();
        let id = registry.register(memory("mem", &["x"]), 0, true);

        assert!(matches!(
            registry.resolve("y", ProviderSelection::Explicit(id)),
            Err(ProviderError::NotFound { .. })
        ));

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(matches!(
            registry.resolve("x", ProviderSelection::Explicit(id)),
            Err(ProviderError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_empty_registry_is_unresolved() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        let err = registry.resolve("missing", ProviderSelection::Auto).unwrap_err();
        assert_eq!(err.to_string(), "no provider can resolve 'missing'");
    }

    #[test]
    fn test_registrations_listed_in_query_order() {
        let registry = ProviderRegistry::new();
        registry.register(memory("a", &[]), 1, true);
        registry.register(memory("b", &[]), 3, false);
        registry.register(memory("c", &[]), 1, true);

        let names: Vec<String> = registry
            .registrations()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(registry.len(), 3);
    }
}
