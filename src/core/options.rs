//! # Registration options and clear/mark addresses.
//!
//! [`TaskOptions`] is what a caller attaches to a registration (label,
//! group, join policy, handlers). [`Address`] selects existing operations
//! for the cancellation and marking engines.
//!
//! ## Address resolution
//! ```text
//! group = Pattern(re)   → every named group matching re
//! group = Key(k)        → bucket k
//! group unset, id only  → wherever that id lives
//! group unset           → root bucket (or root + all groups for the façades)
//!
//! inside a bucket: label → its occupant | id → that link | neither → all links
//! ```

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::registry::{ClearContext, ClearHandler, Join, Key, LinkInfo, MergeHandler, OperationId};

/// Options of one registration.
///
/// # Example
/// ```
/// use asyncvisor::{Join, TaskOptions};
///
/// let opts = TaskOptions::new()
///     .label("search")
///     .group("net")
///     .join(Join::Replace)
///     .on_clear(|ctx| println!("{} cleared", ctx.id));
/// ```
#[derive(Clone, Default)]
pub struct TaskOptions {
    pub(crate) label: Option<Key>,
    pub(crate) group: Option<Key>,
    pub(crate) join: Join,
    pub(crate) on_clear: Vec<ClearHandler>,
    pub(crate) on_merge: Vec<MergeHandler>,
    pub(crate) single: Option<bool>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label slot the operation occupies. Collisions follow [`join`](Self::join).
    pub fn label(mut self, label: impl Into<Key>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Group bucket the operation lives in.
    pub fn group(mut self, group: impl Into<Key>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.join = join;
        self
    }

    /// Adds a handler run when the operation is cleared or replaced.
    pub fn on_clear(mut self, handler: impl Fn(&ClearContext) + 'static) -> Self {
        self.on_clear.push(Rc::new(handler));
        self
    }

    /// Adds a handler run with the survivor's info when this registration merges into it.
    pub fn on_merge(mut self, handler: impl Fn(&LinkInfo) + 'static) -> Self {
        self.on_merge.push(Rc::new(handler));
        self
    }

    /// Overrides the one-shot/periodic default of proxies, listeners and workers.
    pub fn single(mut self, single: bool) -> Self {
        self.single = Some(single);
        self
    }

    pub(crate) fn with_group_if_unset(mut self, group: impl FnOnce() -> Key) -> Self {
        if self.group.is_none() {
            self.group = Some(group());
        }
        self
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("label", &self.label)
            .field("group", &self.group)
            .field("join", &self.join)
            .field("on_clear", &self.on_clear.len())
            .field("on_merge", &self.on_merge.len())
            .field("single", &self.single)
            .finish()
    }
}

/// Group part of an [`Address`].
#[derive(Clone, Debug)]
pub enum GroupSelector {
    /// One literal group.
    Key(Key),
    /// Every named group whose key matches.
    Pattern(Regex),
}

/// Selects operations for clear and mark calls.
///
/// # Example
/// ```
/// use asyncvisor::Address;
/// use regex::Regex;
///
/// let by_label = Address::new().label("search");
/// let by_group = Address::new().group_matching(Regex::new("^net:").unwrap());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Address {
    pub(crate) id: Option<OperationId>,
    pub(crate) label: Option<Key>,
    pub(crate) group: Option<GroupSelector>,
}

impl Address {
    /// Empty address: every operation of the kind.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: OperationId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn label(mut self, label: impl Into<Key>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn group(mut self, group: impl Into<Key>) -> Self {
        self.group = Some(GroupSelector::Key(group.into()));
        self
    }

    /// Selects every named group matching `pattern`.
    pub fn group_matching(mut self, pattern: Regex) -> Self {
        self.group = Some(GroupSelector::Pattern(pattern));
        self
    }

    /// True when neither an id nor a group narrows the address.
    pub(crate) fn is_unscoped(&self) -> bool {
        self.id.is_none() && self.group.is_none()
    }
}

impl From<OperationId> for Address {
    fn from(id: OperationId) -> Self {
        Address::new().id(id)
    }
}

/// State change applied by the marking engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// Firings of one-shots are queued; periodic firings are dropped.
    Paused,
    /// Firings have no effect.
    Muted,
    /// Replays queued firings, then clears both flags.
    Unpaused,
    Unmuted,
}

impl Mark {
    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Paused => "suspend",
            Mark::Muted => "mute",
            Mark::Unpaused => "unsuspend",
            Mark::Unmuted => "unmute",
        }
    }
}
