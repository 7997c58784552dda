//! Resource handles - counted, state-tagged references to one named resource
//!
//! A `ResourceHandle` is what callers of the cache hold. Each live handle
//! value is one counted reference: cloning adds a reference, dropping (or
//! calling `release`) removes one. When the count reaches zero the entry is
//! removed from its `NamedResourceMap` before the payload is destroyed.
//!
//! # State machine
//! ```text
//! Created -> Loading -> Ready
//!                    \-> LoadFailed
//! ```
//! `Ready` and `LoadFailed` are terminal for the lifetime of the handle.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use super::map::NamedResourceMap;

/// Load state of a resource
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Placeholder inserted, no thread has started loading it
    Created = 0,
    /// A thread has claimed the load and is running it
    Loading = 1,
    /// Payload is available
    Ready = 2,
    /// Resolution or construction failed; there is no payload
    LoadFailed = 3,
}

impl ResourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ResourceState::Created,
            1 => ResourceState::Loading,
            2 => ResourceState::Ready,
            _ => ResourceState::LoadFailed,
        }
    }

    /// `Ready` or `LoadFailed`
    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceState::Ready | ResourceState::LoadFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::Created => "CREATED",
            ResourceState::Loading => "LOADING",
            ResourceState::Ready => "READY",
            ResourceState::LoadFailed => "LOAD_FAILED",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a handle's underlying resource, stable while any reference lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(usize);

/// Shared state behind every handle to the same (type, name)
pub(crate) struct ResourceSlot<T> {
    name: String,
    kind: Arc<str>,
    state: AtomicU8,
    ref_count: AtomicUsize,
    payload: OnceLock<T>,
    provider: OnceLock<String>,
    failure: OnceLock<String>,
    /// Subscribers waiting for the terminal state; also the completion lock
    completion: Mutex<Vec<Sender<ResourceState>>>,
    completed: Condvar,
    owner: Weak<NamedResourceMap<T>>,
}

impl<T> ResourceSlot<T> {
    /// New placeholder in `Created` state holding one reference
    pub(crate) fn new(name: &str, kind: Arc<str>, owner: Weak<NamedResourceMap<T>>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            state: AtomicU8::new(ResourceState::Created as u8),
            ref_count: AtomicUsize::new(1),
            payload: OnceLock::new(),
            provider: OnceLock::new(),
            failure: OnceLock::new(),
            completion: Mutex::new(Vec::new()),
            completed: Condvar::new(),
            owner,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Increment the count; the caller must already hold a reference or the map lock
    pub(crate) fn add_ref(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the count and return the number of references left
    ///
    /// Decrements that cannot reach zero are lock-free. The decrement that
    /// may reach zero is done under the owning map's lock, so a concurrent
    /// lookup can never revive an entry that is being torn down.
    pub(crate) fn release(self: &Arc<Self>) -> usize {
        let mut current = self.ref_count.load(Ordering::Acquire);
        while current > 1 {
            match self.ref_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current - 1,
                Err(actual) => current = actual,
            }
        }

        match self.owner.upgrade() {
            Some(map) => map.release_last(self),
            None => self.decrement_final(),
        }
    }

    /// Final decrement; the map calls this while holding its lock
    pub(crate) fn decrement_final(&self) -> usize {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            // Undo the underflow; only reachable through a bookkeeping bug.
            self.ref_count.fetch_add(1, Ordering::AcqRel);
            log::warn!("Releasing an unreferenced {} resource '{}'", self.kind, self.name);
            return 0;
        }
        previous - 1
    }

    /// Transition `Created -> Loading`; exactly one caller wins
    pub(crate) fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(
                ResourceState::Created as u8,
                ResourceState::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn complete_ready(&self, payload: T, provider: String) {
        let _ = self.payload.set(payload);
        let _ = self.provider.set(provider);
        self.finish(ResourceState::Ready);
    }

    pub(crate) fn complete_failed(&self, provider: Option<String>, reason: String) {
        if let Some(p) = provider {
            let _ = self.provider.set(p);
        }
        let _ = self.failure.set(reason);
        self.finish(ResourceState::LoadFailed);
    }

    fn finish(&self, state: ResourceState) {
        let subscribers = {
            let mut subscribers = self.completion.lock();
            // Payload writes above happen-before this release store.
            self.state.store(state as u8, Ordering::Release);
            self.completed.notify_all();
            std::mem::take(&mut *subscribers)
        };

        for subscriber in subscribers {
            let _ = subscriber.send(state);
        }
    }

    fn wait(&self) -> ResourceState {
        let state = self.state();
        if state.is_terminal() {
            return state;
        }

        let mut guard = self.completion.lock();
        loop {
            let state = self.state();
            if state.is_terminal() {
                return state;
            }
            self.completed.wait(&mut guard);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> Option<ResourceState> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.completion.lock();
        loop {
            let state = self.state();
            if state.is_terminal() {
                return Some(state);
            }
            if self.completed.wait_until(&mut guard, deadline).timed_out() {
                let state = self.state();
                return state.is_terminal().then_some(state);
            }
        }
    }

    fn subscribe(&self) -> Receiver<ResourceState> {
        let (tx, rx) = channel::bounded(1);
        let mut subscribers = self.completion.lock();
        let state = self.state();
        if state.is_terminal() {
            let _ = tx.send(state);
        } else {
            subscribers.push(tx);
        }
        rx
    }
}

/// A counted reference to one named resource
///
/// Cloning is `AddRef`; dropping is `Release`. Two handles refer to the same
/// resource iff `ptr_eq` is true.
pub struct ResourceHandle<T> {
    slot: Arc<ResourceSlot<T>>,
    released: bool,
}

impl<T> ResourceHandle<T> {
    /// Wrap a slot whose count already includes this reference
    pub(crate) fn adopt(slot: Arc<ResourceSlot<T>>) -> Self {
        Self {
            slot,
            released: false,
        }
    }

    pub(crate) fn slot(&self) -> &Arc<ResourceSlot<T>> {
        &self.slot
    }

    /// The name this resource was requested under
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Resource type label of the owning cache
    pub fn kind(&self) -> &str {
        &self.slot.kind
    }

    pub fn state(&self) -> ResourceState {
        self.slot.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ResourceState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.state() == ResourceState::LoadFailed
    }

    /// Current number of counted references
    pub fn ref_count(&self) -> usize {
        self.slot.ref_count()
    }

    /// The loaded object, present iff the state is `Ready`
    pub fn payload(&self) -> Option<&T> {
        if self.is_ready() {
            self.slot.payload.get()
        } else {
            None
        }
    }

    /// Name of the provider that produced the stream, once known
    pub fn provider_used(&self) -> Option<&str> {
        if self.state().is_terminal() {
            self.slot.provider.get().map(String::as_str)
        } else {
            None
        }
    }

    /// Why the load failed, if it did
    pub fn failure(&self) -> Option<&str> {
        if self.is_failed() {
            self.slot.failure.get().map(String::as_str)
        } else {
            None
        }
    }

    /// Block until the resource reaches a terminal state
    pub fn wait(&self) -> ResourceState {
        self.slot.wait()
    }

    /// Like `wait`, giving up after `timeout`
    ///
    /// # Returns
    /// The terminal state, or `None` if the load is still in flight
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ResourceState> {
        self.slot.wait_timeout(timeout)
    }

    /// Receive the terminal state exactly once
    ///
    /// The receiver yields immediately if the resource has already finished.
    pub fn subscribe(&self) -> Receiver<ResourceState> {
        self.slot.subscribe()
    }

    pub fn id(&self) -> HandleId {
        HandleId(Arc::as_ptr(&self.slot) as *const () as usize)
    }

    pub fn ptr_eq(&self, other: &ResourceHandle<T>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Add a reference
    ///
    /// # Returns
    /// The new handle and the reference count after the increment
    pub fn add_ref(&self) -> (ResourceHandle<T>, usize) {
        let count = self.slot.add_ref();
        (ResourceHandle::adopt(Arc::clone(&self.slot)), count)
    }

    /// Give up this reference
    ///
    /// # Returns
    /// The number of references left; at zero the entry has been removed
    /// from its cache and the payload is destroyed once no other thread is
    /// still reading it
    pub fn release(mut self) -> usize {
        self.released = true;
        self.slot.release()
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        self.add_ref().0
    }
}

impl<T> Drop for ResourceHandle<T> {
    fn drop(&mut self) {
        if !self.released {
            self.slot.release();
        }
    }
}

impl<T> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("state", &self.state())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
