//! Control task queue
//!
//! Serializes control commands (seek, timeline update, stop) from producer
//! threads into the decode worker. The queue is a mutex-protected FIFO with
//! a condition variable signaled on insertion; the worker's only blocking
//! point is [`TaskQueue::wait_for_and_run`].
//!
//! Entries are either runnable commands or captured failures: a failure
//! enqueued by some other thread (e.g. the output stream's error callback)
//! re-surfaces out of the consumer's drain call, marshalling the error onto
//! the thread that can report it.
//!
//! A drain executes everything queued at wake-up under one critical section;
//! entries added during a drain are guaranteed to be seen by the next drain,
//! never lost, never executed twice.

use crate::error::{Error, Result};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tracing::trace;

type TaskFn<C> = Box<dyn FnOnce(&mut C) -> Result<()> + Send>;

enum Entry<C> {
    /// A command to run against the consumer's context
    Run { label: &'static str, job: TaskFn<C> },
    /// A captured failure to re-surface on the draining thread
    Fail(Error),
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Queue id currently being drained on this thread (0 = none).
    /// Used to assert the no-reentrant-add contract.
    static DRAINING: Cell<u64> = const { Cell::new(0) };
}

/// Restores the thread-local drain marker even when a task fails or panics.
struct DrainGuard {
    prev: u64,
}

impl DrainGuard {
    fn enter(queue_id: u64) -> Self {
        let prev = DRAINING.with(|d| d.replace(queue_id));
        DrainGuard { prev }
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let prev = self.prev;
        DRAINING.with(|d| d.set(prev));
    }
}

/// Mutex-protected command queue with blocking wait-and-run semantics.
///
/// `C` is the consumer-side context commands execute against (the decode
/// worker's mutable state).
pub struct TaskQueue<C> {
    id: u64,
    entries: Mutex<VecDeque<Entry<C>>>,
    task_added: Condvar,
    observers: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
}

impl<C> Default for TaskQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TaskQueue<C> {
    pub fn new() -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            entries: Mutex::new(VecDeque::new()),
            task_added: Condvar::new(),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Append a command. Always succeeds.
    ///
    /// # Panics
    /// Panics when called from inside a task draining this same queue:
    /// recursive acquisition is a programming error, not a recoverable one.
    pub fn add_task<F>(&self, label: &'static str, job: F)
    where
        F: FnOnce(&mut C) -> Result<()> + Send + 'static,
    {
        self.push(Entry::Run {
            label,
            job: Box::new(job),
        });
    }

    /// Append a captured failure; it propagates out of the consumer's next
    /// drain call.
    pub fn add_failure(&self, error: Error) {
        self.push(Entry::Fail(error));
    }

    fn push(&self, entry: Entry<C>) {
        assert!(
            DRAINING.with(|d| d.get()) != self.id,
            "task added while draining the same queue (recursive lock acquisition)"
        );

        {
            let mut entries = self.entries.lock().unwrap();
            entries.push_back(entry);
        }
        self.task_added.notify_all();

        // Each registered observer is notified exactly once per insertion.
        let observers: Vec<_> = self.observers.lock().unwrap().clone();
        for observer in observers {
            observer();
        }
    }

    /// Register a callback invoked once per insertion (in addition to the
    /// condition variable), e.g. to wake an event loop that owns other fds.
    ///
    /// # Panics
    /// Panics when the same callback (same `Arc`) is registered twice.
    pub fn add_observer(&self, observer: Arc<dyn Fn() + Send + Sync>) {
        let mut observers = self.observers.lock().unwrap();
        assert!(
            !observers.iter().any(|o| Arc::ptr_eq(o, &observer)),
            "task-added observer registered twice"
        );
        observers.push(observer);
    }

    /// Block until at least one entry is queued, then drain everything
    /// queued at that moment under one critical section. Returns the number
    /// of commands executed, or the first failure encountered (remaining
    /// entries stay queued).
    pub fn wait_for_and_run(&self, ctx: &mut C) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap();
        while entries.is_empty() {
            entries = self.task_added.wait(entries).unwrap();
        }
        self.drain(&mut entries, ctx)
    }

    /// Non-blocking drain; no-op when empty.
    pub fn run_all(&self, ctx: &mut C) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap();
        self.drain(&mut entries, ctx)
    }

    fn drain(&self, entries: &mut VecDeque<Entry<C>>, ctx: &mut C) -> Result<usize> {
        let _guard = DrainGuard::enter(self.id);
        let mut executed = 0;
        while let Some(entry) = entries.pop_front() {
            match entry {
                Entry::Run { label, job } => {
                    trace!(label, "running control task");
                    job(ctx)?;
                    executed += 1;
                }
                Entry::Fail(error) => return Err(error),
            }
        }
        Ok(executed)
    }
}
