//! Background worker pool
//!
//! N named threads sleep on a shared `WakeSignal`. Each wake pops at most one
//! item from the queue and hands it to the job callback. Enqueuers call
//! `WakeSignal::signal` once per item, so no item is left behind while a
//! worker is idle.

use std::sync::Arc;

use crate::threading::{Thread, ThreadError, WakeSignal};

use super::queue::PriorityLoadQueue;

pub struct WorkerPool {
    threads: Vec<Thread<()>>,
    wake: Arc<WakeSignal>,
}

impl WorkerPool {
    /// Spawn `count` workers named `{name_prefix}-{index}`
    ///
    /// If any spawn fails the already-running workers are stopped before the
    /// error is returned.
    pub fn start<I, F>(
        count: usize,
        name_prefix: &str,
        queue: Arc<PriorityLoadQueue<I>>,
        wake: Arc<WakeSignal>,
        job: F,
    ) -> Result<Self, ThreadError>
    where
        I: Send + 'static,
        F: Fn(I) + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let mut pool = Self {
            threads: Vec::with_capacity(count),
            wake: Arc::clone(&wake),
        };

        for index in 0..count {
            let name = format!("{}-{}", name_prefix, index);
            let queue = Arc::clone(&queue);
            let wake = Arc::clone(&wake);
            let job = Arc::clone(&job);
            let thread_name = name.clone();

            let spawned = Thread::spawn(Some(name.as_str()), move || {
                log::debug!("Worker {} started", thread_name);
                while wake.wait() {
                    if let Some(item) = queue.pop() {
                        job(item);
                    }
                }
                log::debug!("Worker {} stopped", thread_name);
            });

            match spawned {
                Ok(thread) => pool.threads.push(thread),
                Err(e) => {
                    pool.shutdown();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    /// Number of threads still owned by the pool
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Close the wake signal and join every worker
    ///
    /// Workers finish the job they are running; queued items are left in
    /// the queue for the caller.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }

        self.wake.close();
        for thread in self.threads.drain(..) {
            if let Err(e) = thread.join() {
                log::error!("{}", e);
            }
        }
        log::debug!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish()
    }
}
