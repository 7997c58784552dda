//! Resource cache - the façade over map, providers, queue and workers
//!
//! One `ResourceCache<T>` exists per payload type. It guarantees that the
//! loader for a given name runs at most once while any handle to that name
//! is alive, whether the name is requested with `load`, `load_async`, or
//! both at once from many threads.
//!
//! # Claiming
//! A handle starts `Created`. The first thread to move it to `Loading` runs
//! the loader; every other caller waits on the handle. Workers claim items
//! as they dequeue them, and a synchronous `load` that meets a queued
//! handle claims it and runs the load inline. Queue items whose handle was
//! already claimed are dropped when dequeued.
//!
//! # Locking
//! The map lock is held only for lookup and insertion. The provider
//! registry lock is held only while snapshotting candidates. No lock is held
//! while a provider opens a stream or a loader runs.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::threading::{ThreadError, WakeSignal};

use super::handle::{ResourceHandle, ResourceSlot, ResourceState};
use super::loader::{LoadContext, ResourceLoader};
use super::map::NamedResourceMap;
use super::provider::{
    ProviderId, ProviderInfo, ProviderRegistry, ProviderSelection, ResolvedStream,
    ResourceProvider,
};
use super::queue::{PriorityLoadQueue, WorkItem};
use super::worker::WorkerPool;

/// Snapshot of a cache's bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries in the map
    pub live: usize,
    pub loading: usize,
    pub ready: usize,
    pub failed: usize,
    /// Items waiting in the load queue
    pub queued: usize,
    /// Loader runs since the cache was created
    pub loads_started: u64,
}

/// State shared between the façade, its workers and running loaders
pub(crate) struct CacheCore<T> {
    kind: Arc<str>,
    map: Arc<NamedResourceMap<T>>,
    providers: ProviderRegistry,
    loader: Box<dyn ResourceLoader<T>>,
    queue: Arc<PriorityLoadQueue<WorkItem<T>>>,
    wake: Arc<WakeSignal>,
    loads_started: AtomicU64,
    /// Set at shutdown; asynchronous requests then run on the caller
    closed: AtomicBool,
    drain_on_shutdown: bool,
}

impl<T> CacheCore<T> {
    pub(crate) fn kind(&self) -> &str {
        &self.kind
    }
}

impl<T: Send + Sync + 'static> CacheCore<T> {
    pub(crate) fn load(&self, name: &str, selection: ProviderSelection) -> ResourceHandle<T> {
        let (handle, _) = self.map.find_or_create(name);
        if handle.slot().try_claim() {
            self.run_load(handle.slot(), selection);
        } else {
            handle.wait();
        }
        handle
    }

    pub(crate) fn load_async(
        &self,
        name: &str,
        selection: ProviderSelection,
        priority: i32,
    ) -> ResourceHandle<T> {
        let (handle, created) = self.map.find_or_create(name);
        if !created {
            return handle;
        }

        if self.closed.load(Ordering::SeqCst) {
            if handle.slot().try_claim() {
                self.run_load(handle.slot(), selection);
            }
            return handle;
        }

        self.enqueue(&handle, selection, priority);
        handle
    }

    fn enqueue(&self, handle: &ResourceHandle<T>, selection: ProviderSelection, priority: i32) {
        self.queue.push(
            WorkItem {
                slot: Arc::clone(handle.slot()),
                selection,
            },
            priority,
        );
        self.wake.signal();

        // Shutdown may have settled the queue between the check and the push.
        if self.closed.load(Ordering::SeqCst) {
            self.settle_queue();
        }
    }

    /// Run or fail whatever is still queued once the workers are gone
    fn settle_queue(&self) {
        if self.drain_on_shutdown {
            let ran = self.flush();
            if ran > 0 {
                log::debug!("Ran {} queued {} load(s) at shutdown", ran, self.kind);
            }
        } else {
            let failed = self.fail_queued("cache shut down");
            if failed > 0 {
                log::debug!("Cancelled {} queued {} load(s)", failed, self.kind);
            }
        }
    }

    /// Run one dequeued item if nobody has claimed its handle yet
    pub(crate) fn execute(&self, item: WorkItem<T>) {
        if item.slot.ref_count() == 0 {
            log::debug!(
                "Skipping {} resource '{}': released before loading",
                self.kind,
                item.slot.name()
            );
            return;
        }
        if item.slot.try_claim() {
            self.run_load(&item.slot, item.selection);
        }
    }

    /// Run queued items on the calling thread until the queue is empty
    pub(crate) fn flush(&self) -> usize {
        let mut ran = 0;
        while let Some(item) = self.queue.pop() {
            self.execute(item);
            ran += 1;
        }
        ran
    }

    /// Fail every queued item that has not been claimed
    fn fail_queued(&self, reason: &str) -> usize {
        let mut failed = 0;
        for item in self.queue.drain() {
            if item.slot.try_claim() {
                item.slot.complete_failed(None, reason.to_string());
                failed += 1;
            }
        }
        failed
    }

    /// Resolve, construct and publish; the caller has claimed `slot`
    fn run_load(&self, slot: &Arc<ResourceSlot<T>>, selection: ProviderSelection) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
        let name = slot.name();

        let resolved = panic::catch_unwind(AssertUnwindSafe(|| {
            self.providers.resolve(name, selection)
        }));
        let resolved = match resolved {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(e)) => {
                log::warn!("Failed to resolve {} resource '{}': {}", self.kind, name, e);
                slot.complete_failed(None, e.to_string());
                return;
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                log::error!(
                    "Provider panicked resolving {} resource '{}': {}",
                    self.kind,
                    name,
                    message
                );
                slot.complete_failed(None, format!("provider panicked: {}", message));
                return;
            }
        };

        let ResolvedStream {
            provider,
            mut stream,
        } = resolved;

        let outcome = {
            let ctx = LoadContext::new(name, &provider, self);
            panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(&mut *stream, &ctx)))
        };
        drop(stream);

        match outcome {
            Ok(Ok(payload)) => slot.complete_ready(payload, provider),
            Ok(Err(e)) => {
                log::warn!(
                    "Failed to load {} resource '{}' from {}: {}",
                    self.kind,
                    name,
                    provider,
                    e
                );
                slot.complete_failed(Some(provider), e.to_string());
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                log::error!(
                    "Loader for {} resource '{}' panicked: {}",
                    self.kind,
                    name,
                    message
                );
                slot.complete_failed(Some(provider), format!("loader panicked: {}", message));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Named-resource cache for one payload type
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use rescache::config::CacheConfig;
/// use rescache::io::MemoryProvider;
/// use rescache::resource::{ResourceCache, TextLoader};
///
/// let cache = ResourceCache::new("TEXT", CacheConfig::default(), TextLoader)?;
/// let content = Arc::new(MemoryProvider::new("embedded"));
/// content.insert("greeting.txt", b"hello".to_vec());
/// cache.register_provider(content, 0);
///
/// let handle = cache.load("greeting.txt");
/// assert_eq!(handle.payload().map(String::as_str), Some("hello"));
/// # Ok::<(), rescache::threading::ThreadError>(())
/// ```
pub struct ResourceCache<T: Send + Sync + 'static> {
    core: Arc<CacheCore<T>>,
    workers: Mutex<Option<WorkerPool>>,
    config: CacheConfig,
}

impl<T: Send + Sync + 'static> ResourceCache<T> {
    /// Create a cache and start its background workers
    ///
    /// # Arguments
    /// * `kind` - Resource type label used in diagnostics
    /// * `config` - Worker count, worker thread names, shutdown behavior
    /// * `loader` - Builds payloads from provider streams
    ///
    /// # Errors
    /// Returns `ThreadError::SpawnFailed` if a worker thread cannot be started
    pub fn new<L>(kind: &str, config: CacheConfig, loader: L) -> Result<Self, ThreadError>
    where
        L: ResourceLoader<T> + 'static,
    {
        let queue = Arc::new(PriorityLoadQueue::new());
        let wake = Arc::new(WakeSignal::new());
        let core = Arc::new(CacheCore {
            kind: Arc::from(kind),
            map: NamedResourceMap::new(kind),
            providers: ProviderRegistry::new(),
            loader: Box::new(loader),
            queue: Arc::clone(&queue),
            wake: Arc::clone(&wake),
            loads_started: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            drain_on_shutdown: config.drain_on_shutdown,
        });

        let job_core = Arc::clone(&core);
        let workers = WorkerPool::start(
            config.background_worker_threads,
            &config.worker_name,
            queue,
            wake,
            move |item| job_core.execute(item),
        )?;

        log::debug!(
            "Created {} cache with {} background worker(s)",
            kind,
            config.background_worker_threads
        );

        Ok(Self {
            core,
            workers: Mutex::new(Some(workers)),
            config,
        })
    }

    pub fn kind(&self) -> &str {
        self.core.kind()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of running background workers
    pub fn worker_count(&self) -> usize {
        self.workers.lock().as_ref().map_or(0, WorkerPool::len)
    }

    /// Register a provider that takes part in automatic lookup
    pub fn register_provider(&self, provider: Arc<dyn ResourceProvider>, priority: i32) -> ProviderId {
        self.core.providers.register(provider, priority, true)
    }

    /// Register a provider, choosing whether automatic lookup may use it
    pub fn register_provider_with(
        &self,
        provider: Arc<dyn ResourceProvider>,
        priority: i32,
        auto_lookup: bool,
    ) -> ProviderId {
        self.core.providers.register(provider, priority, auto_lookup)
    }

    pub fn unregister_provider(&self, id: ProviderId) -> bool {
        self.core.providers.unregister(id)
    }

    /// Registered providers in query order
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.core.providers.registrations()
    }

    /// Load `name` and wait until it is `Ready` or `LoadFailed`
    ///
    /// Failures are reported through the handle's state, never as an error.
    pub fn load(&self, name: &str) -> ResourceHandle<T> {
        self.core.load(name, ProviderSelection::Auto)
    }

    /// Like `load`, but only the given provider may supply the stream
    pub fn load_from(&self, name: &str, provider: ProviderId) -> ResourceHandle<T> {
        self.core.load(name, ProviderSelection::Explicit(provider))
    }

    /// Return a handle immediately and load in the background
    ///
    /// Only the request that creates the entry is queued; later requests for
    /// the same name share the first one's handle and priority.
    pub fn load_async(&self, name: &str, priority: i32) -> ResourceHandle<T> {
        self.core.load_async(name, ProviderSelection::Auto, priority)
    }

    pub fn load_async_from(&self, name: &str, provider: ProviderId, priority: i32) -> ResourceHandle<T> {
        self.core
            .load_async(name, ProviderSelection::Explicit(provider), priority)
    }

    /// Queue every name, then wait until each one has finished
    ///
    /// With no background workers the queue is run on the calling thread
    /// before waiting.
    ///
    /// # Returns
    /// One handle per name, in the order given
    pub fn load_batch<S: AsRef<str>>(&self, names: &[S], priority: i32) -> Vec<ResourceHandle<T>> {
        let handles: Vec<_> = names
            .iter()
            .map(|name| self.load_async(name.as_ref(), priority))
            .collect();

        if self.worker_count() == 0 {
            self.flush();
        }
        for handle in &handles {
            handle.wait();
        }
        handles
    }

    /// Existing handle for `name`, without loading anything
    pub fn get(&self, name: &str) -> Option<ResourceHandle<T>> {
        self.core.map.find(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.core.map.contains(name)
    }

    /// Names currently in the cache, sorted
    pub fn names(&self) -> Vec<String> {
        self.core.map.names()
    }

    /// Add a reference to `handle`
    ///
    /// # Returns
    /// The new handle and the reference count after the increment
    pub fn add_ref(&self, handle: &ResourceHandle<T>) -> (ResourceHandle<T>, usize) {
        handle.add_ref()
    }

    /// Give up one reference
    ///
    /// # Returns
    /// References left; at zero the name is gone from the cache
    pub fn release(&self, handle: ResourceHandle<T>) -> usize {
        handle.release()
    }

    pub fn is_ready(&self, handle: &ResourceHandle<T>) -> bool {
        handle.is_ready()
    }

    pub fn state(&self, handle: &ResourceHandle<T>) -> ResourceState {
        handle.state()
    }

    /// Run every queued load on the calling thread
    ///
    /// # Returns
    /// Number of queue items processed
    pub fn flush(&self) -> usize {
        self.core.flush()
    }

    /// Detach every entry from the cache
    ///
    /// Outstanding handles stay valid and keep their payloads, but later
    /// requests for the same names start fresh entries.
    ///
    /// # Returns
    /// Number of entries detached
    pub fn release_all(&self) -> usize {
        let detached = self.core.map.detach_all();
        if !detached.is_empty() {
            log::debug!("Detached {} {} resource(s)", detached.len(), self.core.kind);
        }
        detached.len()
    }

    /// Stop the workers, finish or fail queued loads, then detach everything
    ///
    /// Safe to call more than once. Requests made afterwards still work but
    /// run on the calling thread.
    pub fn shutdown(&self) {
        self.core.closed.store(true, Ordering::SeqCst);

        let workers = self.workers.lock().take();
        if let Some(mut workers) = workers {
            workers.shutdown();
        }

        self.core.settle_queue();

        let live = self.release_all();
        if live > 0 {
            log::warn!(
                "{} cache shut down with {} resource(s) still referenced",
                self.core.kind,
                live
            );
        }
    }

    pub fn stats(&self) -> CacheStats {
        let states = self.core.map.states();
        let count = |wanted: ResourceState| states.iter().filter(|s| **s == wanted).count();
        CacheStats {
            live: states.len(),
            loading: count(ResourceState::Loading),
            ready: count(ResourceState::Ready),
            failed: count(ResourceState::LoadFailed),
            queued: self.core.queue.len(),
            loads_started: self.core.loads_started.load(Ordering::Relaxed),
        }
    }
}

impl<T: Send + Sync + 'static> Drop for ResourceCache<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for ResourceCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("kind", &self.core.kind)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryProvider;
    use crate::resource::BytesLoader;

    fn closed_cache(drain: bool) -> ResourceCache<Vec<u8>> {
        let config = CacheConfig::default()
            .with_workers(0)
            .with_drain_on_shutdown(drain);
        let cache = ResourceCache::new("BYTES", config, BytesLoader).unwrap();
        let memory = Arc::new(MemoryProvider::new("mem"));
        memory.insert("a", b"1".to_vec());
        cache.register_provider(memory, 0);
        cache.core.closed.store(true, Ordering::SeqCst);
        cache
    }

    #[test]
    fn test_enqueue_after_close_fails_without_drain() {
        let cache = closed_cache(false);
        let (handle, created) = cache.core.map.find_or_create("a");
        assert!(created);

        cache.core.enqueue(&handle, ProviderSelection::Auto, 0);
        assert!(handle.is_failed());
        assert_eq!(handle.failure(), Some("cache shut down"));
        assert_eq!(cache.stats().loads_started, 0);
        assert!(cache.core.queue.is_empty());
    }

    #[test]
    fn test_enqueue_after_close_runs_with_drain() {
        let cache = closed_cache(true);
        let (handle, _) = cache.core.map.find_or_create("a");

        cache.core.enqueue(&handle, ProviderSelection::Auto, 0);
        assert!(handle.is_ready());
        assert!(cache.core.queue.is_empty());
    }
}
