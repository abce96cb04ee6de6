//! Host primitives the registry wraps.
//!
//! The registry never runs timers or dispatches events itself. Each façade
//! drives one of the traits below, injected on a [`Host`]. A façade whose
//! primitive is missing fails with [`AsyncError::Unavailable`].
//!
//! ## Contents
//! - [`Timers`], [`Immediates`], [`IdleCallbacks`], [`Spawner`] host seams
//! - [`ManualHost`] deterministic fake clock for tests and simulations
//! - `TokioHost` real timers on a Tokio `LocalSet` (feature `tokio-host`)

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;

use crate::error::AsyncError;

mod manual;
#[cfg(feature = "tokio-host")]
mod tokio_host;

pub use manual::ManualHost;
#[cfg(feature = "tokio-host")]
pub use tokio_host::TokioHost;

/// Callback fired by a host timer.
pub type Callback = Rc<dyn Fn()>;

/// Callback fired by the host idle scheduler.
pub type IdleCallback = Rc<dyn Fn(IdleDeadline)>;

/// Host-side handle of a scheduled primitive. Never leaves a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(pub u64);

/// Timer primitives (`setTimeout` / `setInterval` equivalents).
pub trait Timers {
    fn set_timeout(&self, callback: Callback, delay: Duration) -> NativeId;
    fn clear_timeout(&self, id: NativeId);
    fn set_interval(&self, callback: Callback, period: Duration) -> NativeId;
    fn clear_interval(&self, id: NativeId);
}

/// Run-after-current-turn primitive.
pub trait Immediates {
    fn set_immediate(&self, callback: Callback) -> NativeId;
    fn clear_immediate(&self, id: NativeId);
}

/// Deadline handed to idle callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleDeadline {
    /// True if the callback ran because its timeout elapsed.
    pub did_timeout: bool,
    /// Idle time left in the current slot.
    pub time_remaining: Duration,
}

/// Idle-slot scheduler (`requestIdleCallback` equivalent).
pub trait IdleCallbacks {
    /// Schedules `callback` for the next idle slot, or after `timeout` at the latest.
    fn request_idle_callback(&self, callback: IdleCallback, timeout: Option<Duration>) -> NativeId;
    fn cancel_idle_callback(&self, id: NativeId);
}

/// Executor for futures produced by operation payloads.
pub trait Spawner {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>);
}

/// Set of host primitives injected into an [`Async`](crate::Async) instance.
///
/// # Example
/// ```
/// use std::rc::Rc;
/// use asyncvisor::{Host, ManualHost};
///
/// let clock = ManualHost::new();
/// let host = Host::new().with_timers(Rc::new(clock.clone()));
/// assert!(host.timers().is_ok());
/// assert!(host.spawner().is_err());
/// ```
#[derive(Clone, Default)]
pub struct Host {
    timers: Option<Rc<dyn Timers>>,
    immediates: Option<Rc<dyn Immediates>>,
    idle: Option<Rc<dyn IdleCallbacks>>,
    spawner: Option<Rc<dyn Spawner>>,
}

impl Host {
    /// Creates a host without any primitive.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timers(mut self, timers: Rc<dyn Timers>) -> Self {
        self.timers = Some(timers);
        self
    }

    pub fn with_immediates(mut self, immediates: Rc<dyn Immediates>) -> Self {
        self.immediates = Some(immediates);
        self
    }

    pub fn with_idle_callbacks(mut self, idle: Rc<dyn IdleCallbacks>) -> Self {
        self.idle = Some(idle);
        self
    }

    pub fn with_spawner(mut self, spawner: Rc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn timers(&self) -> Result<&Rc<dyn Timers>, AsyncError> {
        self.timers
            .as_ref()
            .ok_or(AsyncError::Unavailable { primitive: "timers" })
    }

    pub fn immediates(&self) -> Result<&Rc<dyn Immediates>, AsyncError> {
        self.immediates.as_ref().ok_or(AsyncError::Unavailable {
            primitive: "immediates",
        })
    }

    pub fn idle_callbacks(&self) -> Result<&Rc<dyn IdleCallbacks>, AsyncError> {
        self.idle.as_ref().ok_or(AsyncError::Unavailable {
            primitive: "idle callbacks",
        })
    }

    pub fn spawner(&self) -> Result<&Rc<dyn Spawner>, AsyncError> {
        self.spawner
            .as_ref()
            .ok_or(AsyncError::Unavailable { primitive: "spawner" })
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("timers", &self.timers.is_some())
            .field("immediates", &self.immediates.is_some())
            .field("idle", &self.idle.is_some())
            .field("spawner", &self.spawner.is_some())
            .finish()
    }
}
