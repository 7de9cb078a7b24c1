//! Fixed-size scoped worker pool driving an evaluation pass.
//!
//! The pool is an explicit object passed into the evaluation entry
//! point; nothing here is global or static. One pool may be shared
//! across multiple graphs. Workers are scoped threads, so a pass is a
//! single barrier: submit all ready work, then wait for drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// A fixed-size pool of worker threads.
pub struct WorkerPool {
    num_threads: usize,
}

impl WorkerPool {
    /// Creates a pool with the given number of worker threads
    /// (at least one).
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }

    /// Creates a pool sized to the available hardware concurrency.
    pub fn default_threads() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Creates a single-threaded pool (debug/no-threads mode).
    pub fn single_threaded() -> Self {
        Self::new(1)
    }

    /// Returns the configured thread count.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs workers against `queue` until it drains.
    ///
    /// Each worker repeatedly pops a task and hands it to `work`; the
    /// closure may push follow-up tasks into the queue. Returns once
    /// the queue is empty and no task is in flight.
    pub(crate) fn run<T: Send>(&self, queue: &TaskQueue<T>, work: impl Fn(T) + Sync) {
        std::thread::scope(|scope| {
            for _ in 0..self.num_threads {
                scope.spawn(|| {
                    while let Some(task) = queue.pop() {
                        work(task);
                        queue.task_done();
                    }
                });
            }
        });
    }

    /// Applies `f` to every index in `0..len`, splitting the range
    /// across workers in chunks of at least `min_chunk`. Small ranges
    /// run inline on the calling thread.
    pub(crate) fn for_each_index(&self, len: usize, min_chunk: usize, f: impl Fn(usize) + Sync) {
        if self.num_threads == 1 || len <= min_chunk {
            for i in 0..len {
                f(i);
            }
            return;
        }
        let next = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..self.num_threads {
                scope.spawn(|| loop {
                    let start = next.fetch_add(min_chunk, Ordering::Relaxed);
                    if start >= len {
                        break;
                    }
                    for i in start..(start + min_chunk).min(len) {
                        f(i);
                    }
                });
            }
        });
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::default_threads()
    }
}

/// A blocking work queue tracking in-flight tasks for drain detection.
///
/// `outstanding` counts queued plus currently-executing tasks; when it
/// reaches zero the pass is over and blocked workers wake up and exit.
pub(crate) struct TaskQueue<T> {
    inner: Mutex<VecDeque<T>>,
    cond: Condvar,
    outstanding: AtomicUsize,
}

impl<T> TaskQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Submits a task. Never blocks the submitting thread.
    pub(crate) fn push(&self, task: T) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.inner.lock().push_back(task);
        self.cond.notify_one();
    }

    /// Pops the next task, blocking while the queue is empty but work
    /// is still in flight. Returns `None` once the pass has drained.
    pub(crate) fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = inner.pop_front() {
                return Some(task);
            }
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return None;
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Marks a popped task finished. The last finisher wakes all
    /// blocked workers so they can observe the drain.
    pub(crate) fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _lock = self.inner.lock();
            self.cond.notify_all();
        }
    }
}
