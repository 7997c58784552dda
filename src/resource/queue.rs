//! Priority load queue
//!
//! Pending asynchronous loads ordered by priority (higher first). Items with
//! equal priority come out in the order they were pushed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::ResourceSlot;
use super::provider::ProviderSelection;

/// One queued asynchronous load
pub(crate) struct WorkItem<T> {
    pub(crate) slot: Arc<ResourceSlot<T>>,
    pub(crate) selection: ProviderSelection,
}

struct Queued<I> {
    priority: i32,
    seq: u64,
    item: I,
}

impl<I> PartialEq for Queued<I> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<I> Eq for Queued<I> {}

impl<I> PartialOrd for Queued<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I> Ord for Queued<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then the earlier push.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState<I> {
    heap: BinaryHeap<Queued<I>>,
    next_seq: u64,
}

/// Thread-safe max-priority queue with FIFO tie-breaking
pub struct PriorityLoadQueue<I> {
    state: Mutex<QueueState<I>>,
}

impl<I> PriorityLoadQueue<I> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn push(&self, item: I, priority: i32) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Queued {
            priority,
            seq,
            item,
        });
    }

    /// Remove the highest-priority item
    pub fn pop(&self) -> Option<I> {
        self.state.lock().heap.pop().map(|queued| queued.item)
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// Remove every item, in the order `pop` would have returned them
    pub fn drain(&self) -> Vec<I> {
        let heap = std::mem::take(&mut self.state.lock().heap);
        heap.into_sorted_vec()
            .into_iter()
            .rev()
            .map(|queued| queued.item)
            .collect()
    }
}

impl<I> Default for PriorityLoadQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> std::fmt::Debug for PriorityLoadQueue<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityLoadQueue")
            .field("len", &self.len())
            .finish()
    }
}
