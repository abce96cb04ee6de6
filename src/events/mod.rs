//! Registry events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the registration, cancellation and marking engines, trampolines,
//!   and the worker table (termination).
//! - **Consumers**: anything holding a receiver from [`Async::subscribe`](crate::Async::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
