//! Fixed-size thread pool built on [`crate::mpmc::Queue`].
//!
//! Workers pull boxed closures off a shared bounded MPMC queue. There is no
//! priority scheduling and no per-worker affinity — every worker competes
//! for every task (spec Non-goals rule out priority scheduling entirely).

use crate::error::CoreError;
use crate::mpmc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Construction parameters for a [`ThreadPool`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Config {
    /// Validates the configuration, returning the corresponding error kind
    /// for whichever field is invalid.
    fn validate(self) -> Result<(), CoreError> {
        if self.worker_count == 0 {
            return Err(CoreError::InvalidThreadCount);
        }
        if self.queue_capacity == 0 {
            return Err(CoreError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

struct Shared {
    queue: mpmc::Queue<Task>,
    stop: AtomicBool,
    in_flight: std::sync::atomic::AtomicUsize,
}

/// A fixed set of worker threads draining a shared bounded task queue.
///
/// Dropping the pool signals every worker to stop once the queue drains and
/// joins them — `deinit` is not a separate method the caller must remember
/// to call.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl ThreadPool {
    /// Starts a pool with `config.worker_count` workers backed by a queue of
    /// `config.queue_capacity` slots.
    pub fn new(config: Config) -> Result<Self, CoreError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: mpmc::Queue::with_capacity(config.queue_capacity),
            stop: AtomicBool::new(false),
            in_flight: std::sync::atomic::AtomicUsize::new(0),
        });

        let workers = (0..config.worker_count)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("corelib-worker-{id}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Ok(Self { shared, workers })
    }

    /// Submits a task for execution by some worker. Returns `false` instead
    /// of blocking if the queue is currently full.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.in_flight.fetch_add(1, Ordering::Relaxed);
        match self.shared.queue.try_enqueue(Box::new(task)) {
            Ok(()) => true,
            Err(_) => {
                self.shared.in_flight.fetch_sub(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Like [`spawn`](Self::spawn), but blocks until the queue has room
    /// instead of returning `false`. Always succeeds.
    pub fn spawn_blocking<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.in_flight.fetch_add(1, Ordering::Relaxed);
        self.shared.queue.enqueue(Box::new(task));
    }

    /// `true` if no tasks are queued or currently executing.
    pub fn is_empty(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) == 0
    }
}

fn worker_loop(shared: &Shared) {
    let mut backoff = crate::backoff::Backoff::new();
    loop {
        match shared.queue.try_dequeue() {
            Some(task) => {
                backoff.reset();
                task();
                shared.in_flight.fetch_sub(1, Ordering::Release);
            }
            None => {
                if shared.stop.load(Ordering::Acquire) {
                    return;
                }
                backoff.snooze();
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    #[test]
    fn rejects_zero_worker_count() {
        let err = ThreadPool::new(Config {
            worker_count: 0,
            queue_capacity: 8,
        })
        .unwrap_err();
        assert_eq!(err, CoreError::InvalidThreadCount);
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let err = ThreadPool::new(Config {
            worker_count: 2,
            queue_capacity: 0,
        })
        .unwrap_err();
        assert_eq!(err, CoreError::InvalidQueueCapacity);
    }

    #[test]
    fn e5_four_workers_two_producers_ten_tasks_each() {
        let pool = ThreadPool::new(Config {
            worker_count: 4,
            queue_capacity: 16,
        })
        .unwrap();

        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..2 {
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                pool.spawn_blocking(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }

        while !pool.is_empty() {
            thread::yield_now();
        }
        drop(pool);

        assert_eq!(counter.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn spawn_returns_false_when_queue_full_and_workers_stalled() {
        let pool = ThreadPool::new(Config {
            worker_count: 1,
            queue_capacity: 1,
        })
        .unwrap();

        // Occupy the single worker indefinitely so the queue can fill up.
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        pool.spawn_blocking(move || {
            let _ = rx.recv();
        });
        thread::sleep(Duration::from_millis(20));

        // Worker is busy; fill the 1-slot queue, then overflow it.
        assert!(pool.spawn(|| {}));
        assert!(!pool.spawn(|| {}));

        let _ = tx.send(());
    }
}
