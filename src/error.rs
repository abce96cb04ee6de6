//! Error types used by the registry, its façades and awaited operations.
//!
//! A single enum, [`AsyncError`], covers three classes of failure:
//!
//! - **Configuration**: a façade cannot reach a host primitive or the collaborator
//!   it was handed is unusable ([`AsyncError::Unavailable`], [`AsyncError::Configuration`]).
//!   These are returned synchronously from the `set_*` / `on` calls.
//! - **Cancellation**: an awaited operation was cleared or lost a label collision
//!   ([`AsyncError::Cleared`]). The attached [`ClearContext`] tells which.
//! - **Payload**: the wrapped future or callback failed ([`AsyncError::Failed`]).
//!
//! Every variant is cheap to clone: joined callers of one operation all observe
//! the same error value.

use std::borrow::Cow;
use std::sync::Arc;

use thiserror::Error;

use crate::registry::ClearContext;

/// # Errors produced by the async registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum AsyncError {
    /// The host does not provide the primitive this façade wraps.
    #[error("host primitive `{primitive}` is not available")]
    Unavailable {
        /// Name of the missing primitive (e.g. `"timers"`).
        primitive: &'static str,
    },

    /// A collaborator (emitter, worker, ...) cannot be driven the way the façade needs.
    #[error("invalid collaborator: {reason}")]
    Configuration {
        /// What is missing or wrong.
        reason: Cow<'static, str>,
    },

    /// The operation was cleared before it settled.
    ///
    /// When `replaced_by` is set on the context the operation lost a label collision.
    #[error("operation {} was cleared", .0.id)]
    Cleared(Box<ClearContext>),

    /// The wrapped payload failed.
    #[error("operation failed: {0}")]
    Failed(Arc<anyhow::Error>),

    /// A joined caller expected a different result type than the survivor produced.
    #[error("operation result is not a `{expected}`")]
    TypeMismatch {
        /// Type the caller awaited.
        expected: &'static str,
    },

    /// The operation was dropped without ever settling (e.g. a muted one-shot fired).
    #[error("operation was dropped before it settled")]
    Abandoned,
}

impl AsyncError {
    /// Wraps a payload error.
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        AsyncError::Failed(Arc::new(err.into()))
    }

    /// Builds a configuration error.
    pub fn configuration(reason: impl Into<Cow<'static, str>>) -> Self {
        AsyncError::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use asyncvisor::AsyncError;
    ///
    /// let err = AsyncError::Unavailable { primitive: "timers" };
    /// assert_eq!(err.as_label(), "async_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            AsyncError::Unavailable { .. } => "async_unavailable",
            AsyncError::Configuration { .. } => "async_configuration",
            AsyncError::Cleared(ctx) if ctx.is_collision() => "async_collision",
            AsyncError::Cleared(_) => "async_cleared",
            AsyncError::Failed(_) => "async_failed",
            AsyncError::TypeMismatch { .. } => "async_type_mismatch",
            AsyncError::Abandoned => "async_abandoned",
        }
    }

    /// True if the operation was cleared (explicitly or by a collision).
    pub fn is_cleared(&self) -> bool {
        matches!(self, AsyncError::Cleared(_))
    }

    /// True if the operation lost a label collision.
    pub fn is_collision(&self) -> bool {
        matches!(self, AsyncError::Cleared(ctx) if ctx.is_collision())
    }

    /// Returns the clear context for [`AsyncError::Cleared`].
    pub fn clear_context(&self) -> Option<&ClearContext> {
        match self {
            AsyncError::Cleared(ctx) => Some(ctx),
            _ => None,
        }
    }
}
