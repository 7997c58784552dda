//! Threading primitives for the resource loader
//!
//! This module provides the named thread wrapper used by the worker pool and
//! the wake signal the pool's threads sleep on.
//!
//! # Design Notes
//!
//! The wake signal is a condition variable paired with two counters:
//! - a generation counter, bumped by `broadcast()`, which releases every
//!   thread that was already waiting
//! - a pending-signal counter, bumped by `signal()`, which releases exactly one
//!   waiter and is remembered if nobody is waiting yet
//!
//! Remembered signals mean an enqueue that races ahead of an idle worker is
//! never lost: the worker consumes the signal on its next `wait()`. Closing
//! the signal is the stop flag: it is set under the same lock the waiters
//! check, so a worker cannot miss it between finishing a job and waiting.


use parking_lot::{Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Error type for threading operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadError {
    /// Thread spawn failed
    #[error("Thread spawn failed: {0}")]
    SpawnFailed(String),
    /// Thread join failed
    #[error("Thread join failed: {0}")]
    JoinFailed(String),
}

pub type Result<T> = std::result::Result<T, ThreadError>;

// ============================================================================
// Thread Handle
// ============================================================================

/// Handle to a spawned thread
///
/// Wraps a `JoinHandle` and keeps the thread's name for diagnostics.
pub struct Thread<T> {
    handle: Option<JoinHandle<T>>,
    name: Option<String>,
}

impl<T> Thread<T> {
    /// Spawn a new thread that executes the given function
    ///
    /// # Errors
    /// Returns `ThreadError::SpawnFailed` if thread creation fails
    pub fn spawn<F>(name: Option<&str>, f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut builder = thread::Builder::new();
        if let Some(n) = name {
            builder = builder.name(n.to_string());
        }

        let handle = builder
            .spawn(f)
            .map_err(|e| ThreadError::SpawnFailed(format!("Failed to spawn thread: {}", e)))?;

        Ok(Self {
            handle: Some(handle),
            name: name.map(String::from),
        })
    }

    /// Wait for the thread to finish and return its result
    ///
    /// # Errors
    /// Returns `ThreadError::JoinFailed` if the thread panicked
    pub fn join(mut self) -> Result<T> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ThreadError::JoinFailed(format!("{} panicked", self.describe()))),
            None => Err(ThreadError::JoinFailed("Thread already joined".to_string())),
        }
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// The name the thread was spawned with
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(n) => format!("thread '{}'", n),
            None => "unnamed thread".to_string(),
        }
    }
}

impl<T> std::fmt::Debug for Thread<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// Wake Signal
// ============================================================================

/// Counters guarded by the wake signal's lock
#[derive(Debug, Default)]
struct WakeState {
    /// Incremented on each broadcast
    generation: u64,
    /// Signals not yet consumed by a waiter
    pending_signals: u64,
    /// Set once by `close()`; waiters return immediately afterwards
    closed: bool,
}

/// Wake-one / wake-all signal for idle worker threads
#[derive(Debug, Default)]
pub struct WakeSignal {
    state: Mutex<WakeState>,
    condvar: Condvar,
}

impl WakeSignal {
    /// Create a new signal with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a signal is consumed, a broadcast happens, or the signal is closed
    ///
    /// # Returns
    /// `false` once the signal has been closed, `true` otherwise
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        let my_generation = state.generation;

        loop {
            if state.closed {
                return false;
            }
            if state.generation != my_generation {
                return true;
            }
            if state.pending_signals > 0 {
                state.pending_signals -= 1;
                return true;
            }
            self.condvar.wait(&mut state);
        }
    }

    /// Wait with a timeout
    ///
    /// # Returns
    /// `true` if woken by a signal or broadcast, `false` if the timeout
    /// elapsed or the signal is closed
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let my_generation = state.generation;

        loop {
            if state.closed {
                return false;
            }
            if state.generation != my_generation {
                return true;
            }
            if state.pending_signals > 0 {
                state.pending_signals -= 1;
                return true;
            }
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                // A signal may have landed together with the timeout.
                if !state.closed && state.pending_signals > 0 {
                    state.pending_signals -= 1;
                    return true;
                }
                return !state.closed && state.generation != my_generation;
            }
        }
    }

    /// Wake exactly one waiter, or the next thread to wait
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.pending_signals += 1;
        self.condvar.notify_one();
    }

    /// Wake every thread currently waiting
    pub fn broadcast(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Close the signal and wake everyone; all later waits return `false`
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.generation = state.generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of signals raised but not yet consumed
    pub fn pending(&self) -> u64 {
        self.state.lock().pending_signals
    }
}
