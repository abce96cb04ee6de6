//! # Registry configuration.
//!
//! Provides [`AsyncConfig`], the settings of one [`Async`](crate::Async) instance.
//!
//! ## Sentinel values
//! - `max_replace_depth = 0` → continuations are never handed over on replace;
//!   every evicted awaiting caller is rejected
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Configuration for an [`Async`](crate::Async) instance.
///
/// ## Field semantics
/// - `max_replace_depth`: how many `Join::Replace` evictions may hand their
///   awaiting callers down one chain before callers get rejected instead
/// - `wait_poll`: polling period of [`Async::wait`](crate::Async::wait)
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct AsyncConfig {
    /// Maximum length of a replace chain that carries awaiting callers.
    ///
    /// An evicted link hands its callers to the newcomer only while its own
    /// depth is below this value; the newcomer's depth becomes `depth + 1`.
    pub max_replace_depth: usize,

    /// Interval at which `wait` re-checks its predicate.
    pub wait_poll: Duration,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Receivers that lag behind more than `bus_capacity` events observe
    /// `Lagged` and skip the oldest ones.
    pub bus_capacity: usize,
}

impl AsyncConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the `wait` polling period clamped to at least one millisecond.
    #[inline]
    pub fn wait_poll_clamped(&self) -> Duration {
        self.wait_poll.max(Duration::from_millis(1))
    }
}

impl Default for AsyncConfig {
    /// Default configuration:
    ///
    /// - `max_replace_depth = 25`
    /// - `wait_poll = 15ms`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            max_replace_depth: 25,
            wait_poll: Duration::from_millis(15),
            bus_capacity: 1024,
        }
    }
}
