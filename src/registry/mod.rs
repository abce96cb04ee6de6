//! Registry data model: links, buckets and per-kind caches.
//!
//! ## Contents
//! - [`OperationId`], [`Key`], [`OperationKind`] identity types
//! - [`ClearContext`], [`LinkInfo`], [`Join`], [`Outcome`] public link-facing types
//! - `Link`, `Bucket`, `KindCache`, `Registry` internal storage
//!
//! The engines in `core` are the only code that mutates this model.

mod bucket;
mod key;
mod link;

pub(crate) use bucket::Registry;
pub use key::{Key, OperationId, OperationKind};
pub(crate) use link::{ClearFn, Continuation, Deferred, Detach, Link};
pub use link::{
    ClearContext, ClearHandler, ClearReason, Join, LinkInfo, MergeHandler, Outcome, Settled, Value,
};
