//! # Lifecycle events emitted by the registry engines.
//!
//! [`EventKind`] groups what the engines report:
//! - **Registration events**: an operation was registered, merged into a survivor, or replaced
//! - **Firing events**: the host fired an operation (run, deferred, or dropped)
//! - **Control events**: clear, mute/unmute, suspend/unsuspend, worker termination
//!
//! The [`Event`] struct carries the operation identity (kind, id, label, group)
//! plus optional metadata.
//!
//! ## Ordering
//! `seq` is process-wide and strictly increasing, so events from several
//! `Async` instances can be merged back into publish order.
//!
//! ## Example
//! ```rust
//! use asyncvisor::{Event, EventKind, OperationKind};
//!
//! let ev = Event::new(EventKind::OperationCleared)
//!     .with_operation(OperationKind::Timeout)
//!     .with_label("search")
//!     .with_reason("explicit");
//!
//! assert_eq!(ev.kind, EventKind::OperationCleared);
//! assert_eq!(ev.reason.as_deref(), Some("explicit"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::registry::{Key, LinkInfo, OperationId, OperationKind};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of registry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registration events ===
    /// A new link was installed.
    OperationRegistered,

    /// A `Join::Yes` registration merged into an existing link.
    ///
    /// Sets `id` to the survivor.
    OperationMerged,

    /// A link was evicted by a newer registration under the same label.
    ///
    /// Sets `replaced_by`.
    OperationReplaced,

    // === Firing events ===
    /// The host fired an operation and its payload ran.
    OperationFired,

    /// A suspended one-shot fired; the firing was queued for replay.
    FiringDeferred,

    /// A firing was dropped (muted, or a suspended periodic operation).
    FiringDropped,

    /// A periodic operation settled for good and was unregistered.
    OperationCompleted,

    // === Control events ===
    /// A link was cleared explicitly.
    OperationCleared,

    OperationMuted,
    OperationUnmuted,
    OperationSuspended,

    /// A link was unsuspended; `reason` holds the number of replayed firings.
    OperationUnsuspended,

    /// The last holder released a worker and it was terminated.
    WorkerTerminated,
}

/// Registry event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Registry partition of the operation.
    pub operation: Option<OperationKind>,
    /// Operation id.
    pub id: Option<OperationId>,
    pub label: Option<Key>,
    pub group: Option<Key>,
    /// Newcomer that evicted this operation (collisions only).
    pub replaced_by: Option<OperationId>,
    /// Human-readable detail.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            operation: None,
            id: None,
            label: None,
            group: None,
            replaced_by: None,
            reason: None,
        }
    }

    /// Creates an event describing `link`.
    pub(crate) fn for_link(kind: EventKind, link: &LinkInfo) -> Self {
        let mut ev = Event::new(kind)
            .with_operation(link.kind.clone())
            .with_id(link.id);
        ev.label = link.label.clone();
        ev.group = link.group.clone();
        ev
    }

    #[inline]
    pub fn with_operation(mut self, kind: OperationKind) -> Self {
        self.operation = Some(kind);
        self
    }

    #[inline]
    pub fn with_id(mut self, id: OperationId) -> Self {
        self.id = Some(id);
        self
    }

    #[inline]
    pub fn with_label(mut self, label: impl Into<Key>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[inline]
    pub fn with_group(mut self, group: impl Into<Key>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[inline]
    pub fn with_replaced_by(mut self, id: OperationId) -> Self {
        self.replaced_by = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn is_collision(&self) -> bool {
        matches!(self.kind, EventKind::OperationReplaced)
    }
}
