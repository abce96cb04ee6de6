//! Registry core: the handle and its three engines.
//!
//! The only public types from this module are [`Async`], its builder and the
//! option/address types every façade takes.
//!
//! Internal modules:
//! - [`handle`]: `Async`, shared state, inspection, blanket controls;
//! - [`register`]: registration engine, trampolines, link teardown;
//! - [`cancel`]: address resolution and the cancellation engine;
//! - [`mark`]: mute/suspend flags and deferred replay;
//! - [`options`]: `TaskOptions`, `Address`, `Mark`.

mod builder;
mod cancel;
mod handle;
mod mark;
mod options;
mod register;

#[cfg(test)]
mod tests;

pub use builder::AsyncBuilder;
pub use handle::Async;
pub(crate) use handle::Inner;
pub use options::{Address, GroupSelector, Mark, TaskOptions};
pub use register::Trampoline;
pub(crate) use register::{Registered, Registration};
