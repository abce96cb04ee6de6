//! # Async: the registry handle.
//!
//! [`Async`] owns one [`Registry`] plus the injected host primitives. Every
//! façade (`set_timeout`, `on`, `promise`, ...) is a method on it and funnels
//! into the three engines implemented in the sibling modules:
//!
//! - `register` builds links, resolves label collisions and builds trampolines
//! - `cancel` resolves addresses and tears links down
//! - `mark` toggles mute/suspend and replays deferred firings
//!
//! ## Rules
//! - The handle is `!Send`; clones share one registry.
//! - No `RefCell` borrow is held while user code runs, so handlers may call
//!   back into the same instance.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tokio::sync::broadcast;

use crate::config::AsyncConfig;
use crate::events::{Bus, Event};
use crate::host::Host;
use crate::registry::{LinkInfo, OperationId, OperationKind, Registry};
use crate::worker::WorkerTable;

use super::builder::AsyncBuilder;
use super::options::{Address, Mark};

/// Shared state of one registry instance.
pub(crate) struct Inner {
    pub(crate) registry: RefCell<Registry>,
    pub(crate) host: Host,
    pub(crate) cfg: AsyncConfig,
    pub(crate) bus: Bus,
    pub(crate) workers: WorkerTable,
    /// Worker identity → link id, for per-instance de-duplication.
    pub(crate) held_workers: RefCell<HashMap<usize, OperationId>>,
}

impl Inner {
    pub(crate) fn new(host: Host, cfg: AsyncConfig, workers: WorkerTable) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self {
            registry: RefCell::new(Registry::new()),
            host,
            cfg,
            bus,
            workers,
            held_workers: RefCell::new(HashMap::new()),
        }
    }

    /// Publishes an event built lazily, only if someone listens.
    pub(crate) fn publish(&self, make: impl FnOnce() -> Event) {
        if self.bus.has_subscribers() {
            self.bus.publish(make());
        }
    }
}

/// Registry of labeled, grouped, cancellable async operations.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use asyncvisor::{Address, Async, ManualHost, OperationKind, TaskOptions};
///
/// let host = ManualHost::new();
/// let tasks = Async::new(host.host());
///
/// tasks.set_timeout(|| {}, Duration::from_secs(1), TaskOptions::new().group("ui")).unwrap();
/// tasks.set_timeout(|| {}, Duration::from_secs(1), TaskOptions::new().group("net")).unwrap();
/// assert_eq!(tasks.len(&OperationKind::Timeout), 2);
///
/// tasks.clear_timeout(Address::new().group("net"));
/// assert_eq!(tasks.len(&OperationKind::Timeout), 1);
/// ```
#[derive(Clone)]
pub struct Async {
    pub(crate) inner: Rc<Inner>,
}

impl Async {
    /// Creates an instance with the default configuration and the shared worker table.
    pub fn new(host: Host) -> Self {
        AsyncBuilder::new(host).build()
    }

    /// Starts a builder for a customized instance.
    pub fn builder(host: Host) -> AsyncBuilder {
        AsyncBuilder::new(host)
    }

    pub(crate) fn from_inner(inner: Rc<Inner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Rc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &AsyncConfig {
        &self.inner.cfg
    }

    pub fn host(&self) -> &Host {
        &self.inner.host
    }

    pub fn worker_table(&self) -> &WorkerTable {
        &self.inner.workers
    }

    /// Subscribes to registry events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// True if an operation with `id` is registered under `kind`.
    pub fn contains(&self, kind: &OperationKind, id: OperationId) -> bool {
        self.inner
            .registry
            .borrow()
            .cache(kind)
            .is_some_and(|cache| cache.contains(id))
    }

    /// Snapshot of a registered operation.
    pub fn info(&self, kind: &OperationKind, id: OperationId) -> Option<LinkInfo> {
        self.inner
            .registry
            .borrow()
            .cache(kind)?
            .get(id)
            .map(|link| link.info())
    }

    /// Number of registered operations of `kind`.
    pub fn len(&self, kind: &OperationKind) -> usize {
        self.inner
            .registry
            .borrow()
            .cache(kind)
            .map_or(0, |cache| cache.len())
    }

    /// True if no operation of `kind` is registered.
    pub fn is_empty(&self, kind: &OperationKind) -> bool {
        self.len(kind) == 0
    }

    /// Clears the operations of `kind` selected by `addr`; returns how many were cleared.
    ///
    /// An address with neither id nor group reaches the root bucket and every group.
    pub fn clear(&self, kind: &OperationKind, addr: impl Into<Address>) -> usize {
        let addr = addr.into();
        let all_groups = addr.is_unscoped();
        self.inner.clear_scoped(kind, &addr, all_groups)
    }

    /// Applies `mark` to the operations of `kind` selected by `addr`.
    ///
    /// Addressing follows [`clear`](Self::clear).
    pub fn mark(&self, kind: &OperationKind, mark: Mark, addr: impl Into<Address>) -> usize {
        let addr = addr.into();
        let all_groups = addr.is_unscoped();
        self.inner.mark_scoped(kind, mark, &addr, all_groups)
    }

    /// Clears matching operations of every kind.
    pub fn clear_all(&self, addr: impl Into<Address>) -> usize {
        let addr = addr.into();
        self.kinds()
            .iter()
            .map(|kind| self.clear(kind, addr.clone()))
            .sum()
    }

    pub fn mute_all(&self, addr: impl Into<Address>) -> usize {
        self.mark_every_kind(Mark::Muted, addr.into())
    }

    pub fn unmute_all(&self, addr: impl Into<Address>) -> usize {
        self.mark_every_kind(Mark::Unmuted, addr.into())
    }

    pub fn suspend_all(&self, addr: impl Into<Address>) -> usize {
        self.mark_every_kind(Mark::Paused, addr.into())
    }

    pub fn unsuspend_all(&self, addr: impl Into<Address>) -> usize {
        self.mark_every_kind(Mark::Unpaused, addr.into())
    }

    fn mark_every_kind(&self, mark: Mark, addr: Address) -> usize {
        self.kinds()
            .iter()
            .map(|kind| self.mark(kind, mark, addr.clone()))
            .sum()
    }

    fn kinds(&self) -> Vec<OperationKind> {
        self.inner.registry.borrow().kinds()
    }
}

impl fmt::Debug for Async {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Async")
            .field("host", &self.inner.host)
            .field("cfg", &self.inner.cfg)
            .field("kinds", &self.kinds())
            .finish()
    }
}
