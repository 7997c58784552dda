// Resource Module
// Named resource handles, stream providers and the asynchronous loading cache

pub mod cache;
pub mod handle;
pub mod loader;
pub mod map;
pub mod pool;
pub mod propfile;
pub mod provider;
pub mod queue;
pub mod type_registry;
pub mod worker;


pub use cache::{CacheStats, ResourceCache};
pub use handle::{HandleId, ResourceHandle, ResourceState};
pub use loader::{loader_fn, BytesLoader, LoadContext, LoadError, ResourceLoader, TextLoader};
pub use map::NamedResourceMap;
pub use pool::ResourcePool;
pub use propfile::{parse_propfile, PropertyError, PropertyFile};
pub use provider::{
    ProviderError, ProviderId, ProviderInfo, ProviderRegistry, ProviderSelection, ResolvedStream,
    ResourceProvider, ResourceStream,
};
pub use queue::PriorityLoadQueue;
pub use type_registry::{AnyResourceCache, ResourceCaches};
pub use worker::WorkerPool;
