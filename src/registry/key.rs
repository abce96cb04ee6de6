//! # Identity types: operation ids, label/group keys and operation kinds.
//!
//! - [`OperationId`] is an opaque handle minted from a process-wide counter.
//!   Native host ids (timer handles, listener tokens) never leak out of a link.
//! - [`Key`] names a label or a group: either a string or an anonymous token
//!   that can only be matched by the value that created it.
//! - [`OperationKind`] selects the registry partition.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Global counter for operation ids.
static OPERATION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Global counter for anonymous keys.
static ANONYMOUS_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque handle of a registered operation.
///
/// Ids are unique across every registry in the process and increase
/// monotonically, so ordering by id is ordering by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        Self(OPERATION_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value (for logs).
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Label or group key.
///
/// ```
/// use asyncvisor::Key;
///
/// let a = Key::anonymous();
/// let b = Key::anonymous();
/// assert_ne!(a, b);
/// assert_eq!(Key::from("search"), Key::named("search"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// String key, matchable by group patterns.
    Named(Arc<str>),
    /// Unique token; equal only to its own clones.
    Anonymous(u64),
}

impl Key {
    /// Creates a named key.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Key::Named(name.into())
    }

    /// Creates a fresh anonymous key.
    pub fn anonymous() -> Self {
        Key::Anonymous(ANONYMOUS_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Returns the name for [`Key::Named`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Named(name) => Some(name),
            Key::Anonymous(_) => None,
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Named(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Named(name.into())
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Named(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Named(name) => f.write_str(name),
            Key::Anonymous(token) => write!(f, "<anonymous#{token}>"),
        }
    }
}

/// Registry partition an operation lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Timeout,
    Interval,
    Immediate,
    IdleCallback,
    Worker,
    Request,
    Promise,
    Proxy,
    EventListener,
    /// Caller-defined partition.
    Custom(Arc<str>),
}

impl OperationKind {
    /// Number of built-in kinds.
    pub(crate) const BUILTIN: usize = 9;

    /// Creates a custom kind.
    pub fn custom(name: impl Into<Arc<str>>) -> Self {
        OperationKind::Custom(name.into())
    }

    /// Stable name used in logs and events.
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::Timeout => "timeout",
            OperationKind::Interval => "interval",
            OperationKind::Immediate => "immediate",
            OperationKind::IdleCallback => "idleCallback",
            OperationKind::Worker => "worker",
            OperationKind::Request => "request",
            OperationKind::Promise => "promise",
            OperationKind::Proxy => "proxy",
            OperationKind::EventListener => "eventListener",
            OperationKind::Custom(name) => name,
        }
    }

    /// Slot of a built-in kind, `None` for custom kinds.
    pub(crate) fn slot(&self) -> Option<usize> {
        match self {
            OperationKind::Timeout => Some(0),
            OperationKind::Interval => Some(1),
            OperationKind::Immediate => Some(2),
            OperationKind::IdleCallback => Some(3),
            OperationKind::Worker => Some(4),
            OperationKind::Request => Some(5),
            OperationKind::Promise => Some(6),
            OperationKind::Proxy => Some(7),
            OperationKind::EventListener => Some(8),
            OperationKind::Custom(_) => None,
        }
    }

    /// Inverse of [`slot`](Self::slot).
    pub(crate) fn from_slot(slot: usize) -> Option<Self> {
        let kind = match slot {
            0 => OperationKind::Timeout,
            1 => OperationKind::Interval,
            2 => OperationKind::Immediate,
            3 => OperationKind::IdleCallback,
            4 => OperationKind::Worker,
            5 => OperationKind::Request,
            6 => OperationKind::Promise,
            7 => OperationKind::Proxy,
            8 => OperationKind::EventListener,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_monotonically() {
        let a = OperationId::next();
        let b = OperationId::next();
        assert!(b > a);
    }

    #[test]
    fn slots_round_trip_for_builtin_kinds() {
        for slot in 0..OperationKind::BUILTIN {
            let kind = OperationKind::from_slot(slot).expect("builtin slot");
            assert_eq!(kind.slot(), Some(slot));
        }
        assert_eq!(OperationKind::custom("x").slot(), None);
        assert!(OperationKind::from_slot(OperationKind::BUILTIN).is_none());
    }

    #[test]
    fn anonymous_keys_have_no_name() {
        let key = Key::anonymous();
        assert!(key.as_str().is_none());
        assert_eq!(key.clone(), key);
    }
}
