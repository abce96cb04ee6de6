//! # Worker handles and the shared reference-count table.
//!
//! A worker is any long-lived collaborator that must be torn down exactly
//! once ([`Worker::terminate`]). Several [`Async`](crate::Async) instances
//! may hold the same worker; the [`WorkerTable`] counts holders by worker
//! identity (the `Rc` allocation) and terminates the worker when the last
//! holder releases it.
//!
//! ## Rules
//! - Identity is pointer identity of the `Rc<dyn Worker>`; clones of one `Rc` are the same worker.
//! - `terminate` runs with no table borrow held.
//! - Instances built without an explicit table share the thread-local [`WorkerTable::shared`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Collaborator torn down when its last holder lets go.
pub trait Worker {
    fn terminate(&self);
}

/// Shared worker handle.
pub type WorkerRef = Rc<dyn Worker>;

/// Closure-backed worker: the closure is the destructor.
///
/// # Example
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use asyncvisor::{Worker, WorkerFn};
///
/// let stopped = Rc::new(Cell::new(false));
/// let flag = stopped.clone();
/// let worker = WorkerFn::new(move || flag.set(true));
///
/// worker.terminate();
/// assert!(stopped.get());
/// ```
pub struct WorkerFn<F> {
    f: F,
}

impl<F: Fn()> WorkerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: Fn() + 'static> WorkerFn<F> {
    /// Creates the worker and returns it as a shared handle.
    pub fn rc(f: F) -> WorkerRef {
        Rc::new(Self::new(f))
    }
}

impl<F: Fn()> Worker for WorkerFn<F> {
    fn terminate(&self) {
        (self.f)()
    }
}

impl<F> fmt::Debug for WorkerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkerFn(..)")
    }
}

/// Identity of a worker handle.
pub(crate) fn identity(worker: &WorkerRef) -> usize {
    Rc::as_ptr(worker) as *const () as usize
}

struct Holders {
    worker: WorkerRef,
    count: usize,
}

/// Reference counts of workers held by one or more registries.
#[derive(Clone, Default)]
pub struct WorkerTable {
    entries: Rc<RefCell<HashMap<usize, Holders>>>,
}

thread_local! {
    static SHARED: WorkerTable = WorkerTable::default();
}

impl WorkerTable {
    /// Creates an isolated table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread-local table shared by every instance built without one.
    pub fn shared() -> Self {
        SHARED.with(Clone::clone)
    }

    /// Number of holders of `worker`.
    pub fn holders(&self, worker: &WorkerRef) -> usize {
        self.entries
            .borrow()
            .get(&identity(worker))
            .map_or(0, |entry| entry.count)
    }

    /// Registers one more holder; returns the new count.
    pub(crate) fn acquire(&self, worker: &WorkerRef) -> usize {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(identity(worker)).or_insert_with(|| Holders {
            worker: Rc::clone(worker),
            count: 0,
        });
        entry.count += 1;
        entry.count
    }

    /// Drops one holder; terminates the worker when none remain.
    ///
    /// Returns `true` if the worker was terminated.
    pub(crate) fn release(&self, worker: &WorkerRef) -> bool {
        let key = identity(worker);
        let last = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(&key) else {
                return false;
            };
            entry.count = entry.count.saturating_sub(1);
            if entry.count > 0 {
                return false;
            }
            entries.remove(&key)
        };

        match last {
            Some(entry) => {
                entry.worker.terminate();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for WorkerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTable")
            .field("workers", &self.entries.borrow().len())
            .finish()
    }
}
