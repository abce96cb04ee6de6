//! # Link: the registry record of one operation.
//!
//! A [`Link`] carries the operation identity, its state flags, the queue of
//! firings captured while suspended, and the handlers run when it completes
//! or is cleared.
//!
//! ## Rules
//! - `on_clear` handlers and `on_complete` continuations run in registration order.
//! - `clear_fn` (host teardown) runs at most once; it is dropped uncalled when
//!   a one-shot operation fires normally.
//! - `detach` runs when a one-shot link is removed by its own firing.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::error::AsyncError;
use crate::registry::key::{Key, OperationId, OperationKind};

/// Type-erased result value shared by every joined caller.
pub type Value = Rc<dyn Any>;

/// Settled result of an operation.
pub type Settled = Result<Value, AsyncError>;

/// Handler invoked when a link is cleared.
pub type ClearHandler = Rc<dyn Fn(&ClearContext)>;

/// Handler invoked on the survivor when a `Join::Yes` registration merges into it.
pub type MergeHandler = Rc<dyn Fn(&LinkInfo)>;

/// Host teardown run once on clear.
pub(crate) type ClearFn = Box<dyn FnOnce(&ClearContext)>;

/// Host teardown run when a one-shot link removes itself by firing.
pub(crate) type Detach = Box<dyn FnOnce()>;

/// Firing captured while the link was suspended.
pub(crate) type Deferred = Box<dyn FnOnce()>;

/// Result of running an operation payload.
pub enum Outcome {
    /// Completed with a value.
    Value(Value),
    /// Failed synchronously.
    Failed(AsyncError),
    /// Completes later; settled on the host spawner.
    Pending(LocalBoxFuture<'static, Settled>),
    /// Nothing to report yet (periodic operations keep their continuations).
    Continue,
}

impl Outcome {
    /// Wraps a concrete value.
    pub fn value<T: 'static>(value: T) -> Self {
        Outcome::Value(Rc::new(value))
    }

    /// Wraps a future that resolves to the operation result.
    pub fn pending<T, F>(fut: F) -> Self
    where
        T: 'static,
        F: Future<Output = anyhow::Result<T>> + 'static,
    {
        Outcome::Pending(
            async move {
                fut.await
                    .map(|v| Rc::new(v) as Value)
                    .map_err(AsyncError::failed)
            }
            .boxed_local(),
        )
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::value(())
    }
}

impl From<Settled> for Outcome {
    fn from(settled: Settled) -> Self {
        match settled {
            Ok(value) => Outcome::Value(value),
            Err(err) => Outcome::Failed(err),
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(_) => f.write_str("Outcome::Value(..)"),
            Outcome::Failed(err) => write!(f, "Outcome::Failed({err:?})"),
            Outcome::Pending(_) => f.write_str("Outcome::Pending(..)"),
            Outcome::Continue => f.write_str("Outcome::Continue"),
        }
    }
}

/// One awaiting caller: receives the operation's settled result exactly once.
pub(crate) struct Continuation(Box<dyn FnOnce(Settled)>);

impl Continuation {
    pub(crate) fn new(settle: impl FnOnce(Settled) + 'static) -> Self {
        Self(Box::new(settle))
    }

    #[inline]
    pub(crate) fn settle(self, settled: Settled) {
        (self.0)(settled)
    }
}

/// Collision policy for labeled registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Join {
    /// Evict the occupant; its awaiting callers are rejected.
    #[default]
    No,
    /// Merge into the occupant and return its id.
    Yes,
    /// Evict the occupant and hand its awaiting callers to the new operation.
    ///
    /// Decided by the incoming registration: the occupant's own `join` is not consulted.
    Replace,
}

/// Why a link was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// Cleared by an explicit `clear_*` call.
    Explicit,
    /// Evicted by a newer registration under the same label.
    Replaced,
    /// A periodic operation settled for good (e.g. `wait`).
    Completed,
}

impl ClearReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ClearReason::Explicit => "explicit",
            ClearReason::Replaced => "replaced",
            ClearReason::Completed => "completed",
        }
    }
}

/// Context passed to clear handlers and host teardown.
#[derive(Debug, Clone)]
pub struct ClearContext {
    pub kind: OperationKind,
    pub id: OperationId,
    pub label: Option<Key>,
    pub group: Option<Key>,
    /// Join policy of the registration that caused the clear.
    pub join: Join,
    /// The operation that took over the label, for collisions.
    pub replaced_by: Option<OperationId>,
    pub reason: ClearReason,
}

impl ClearContext {
    /// True if the link lost a label collision.
    #[inline]
    pub fn is_collision(&self) -> bool {
        self.replaced_by.is_some()
    }
}

/// Read-only snapshot of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub id: OperationId,
    pub kind: OperationKind,
    pub label: Option<Key>,
    pub group: Option<Key>,
    pub periodic: bool,
    pub paused: bool,
    pub muted: bool,
}

/// Registry record of one operation.
pub(crate) struct Link {
    pub(crate) id: OperationId,
    pub(crate) kind: OperationKind,
    pub(crate) label: Option<Key>,
    pub(crate) group: Option<Key>,
    pub(crate) join: Join,
    pub(crate) periodic: bool,
    /// Number of evicted predecessors whose callers were handed to this link.
    pub(crate) depth: usize,

    pub(crate) paused: bool,
    pub(crate) muted: bool,
    pub(crate) deferred: VecDeque<Deferred>,

    pub(crate) clear_fn: Option<ClearFn>,
    pub(crate) detach: Option<Detach>,
    pub(crate) on_complete: Vec<Continuation>,
    pub(crate) on_clear: Vec<ClearHandler>,

    /// Type-erased trampoline, handed to callers merging into this link.
    pub(crate) trampoline: Option<Rc<dyn Any>>,
}

impl Link {
    /// Creates a link with cleared flags and empty queues.
    pub(crate) fn new(
        id: OperationId,
        kind: OperationKind,
        label: Option<Key>,
        group: Option<Key>,
        join: Join,
        periodic: bool,
    ) -> Self {
        Self {
            id,
            kind,
            label,
            group,
            join,
            periodic,
            depth: 0,
            paused: false,
            muted: false,
            deferred: VecDeque::new(),
            clear_fn: None,
            detach: None,
            on_complete: Vec::new(),
            on_clear: Vec::new(),
            trampoline: None,
        }
    }

    pub(crate) fn info(&self) -> LinkInfo {
        LinkInfo {
            id: self.id,
            kind: self.kind.clone(),
            label: self.label.clone(),
            group: self.group.clone(),
            periodic: self.periodic,
            paused: self.paused,
            muted: self.muted,
        }
    }

    pub(crate) fn context(
        &self,
        reason: ClearReason,
        join: Join,
        replaced_by: Option<OperationId>,
    ) -> ClearContext {
        ClearContext {
            kind: self.kind.clone(),
            id: self.id,
            label: self.label.clone(),
            group: self.group.clone(),
            join,
            replaced_by,
            reason,
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("group", &self.group)
            .field("paused", &self.paused)
            .field("muted", &self.muted)
            .field("deferred", &self.deferred.len())
            .field("on_complete", &self.on_complete.len())
            .field("on_clear", &self.on_clear.len())
            .finish()
    }
}
