//! # Tokio-backed host.
//!
//! [`TokioHost`] maps every primitive onto a task spawned with
//! [`tokio::task::spawn_local`], so it must be used from inside a
//! [`tokio::task::LocalSet`]. Cancelling a primitive aborts its task.
//!
//! Tokio has no notion of an idle slot: idle callbacks run after the
//! scheduler has yielded once, with a fixed [`IDLE_BUDGET`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{
    Callback, IdleCallback, IdleCallbacks, IdleDeadline, Immediates, NativeId, Spawner, Timers,
};

/// Idle time reported to idle callbacks.
pub const IDLE_BUDGET: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Tasks {
    next_id: u64,
    running: HashMap<NativeId, AbortHandle>,
}

/// Host running primitives as local Tokio tasks.
#[derive(Clone, Default)]
pub struct TokioHost {
    tasks: Rc<RefCell<Tasks>>,
}

impl TokioHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a [`Host`](super::Host) exposing every primitive.
    pub fn host(&self) -> super::Host {
        let me = Rc::new(self.clone());
        super::Host::new()
            .with_timers(me.clone())
            .with_immediates(me.clone())
            .with_idle_callbacks(me.clone())
            .with_spawner(me)
    }

    /// Number of primitives still scheduled.
    pub fn active(&self) -> usize {
        self.tasks.borrow().running.len()
    }

    /// Spawns `make(id)` and tracks its abort handle under a fresh id.
    fn track<F>(&self, make: impl FnOnce(NativeId, Rc<RefCell<Tasks>>) -> F) -> NativeId
    where
        F: std::future::Future<Output = ()> + 'static,
    {
        let id = {
            let mut tasks = self.tasks.borrow_mut();
            tasks.next_id += 1;
            NativeId(tasks.next_id)
        };
        let handle = tokio::task::spawn_local(make(id, Rc::clone(&self.tasks)));
        self.tasks
            .borrow_mut()
            .running
            .insert(id, handle.abort_handle());
        id
    }

    fn cancel(&self, id: NativeId) {
        let handle = self.tasks.borrow_mut().running.remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Forgets a finished one-shot task.
fn finish(tasks: &Rc<RefCell<Tasks>>, id: NativeId) {
    tasks.borrow_mut().running.remove(&id);
}

impl Timers for TokioHost {
    fn set_timeout(&self, callback: Callback, delay: Duration) -> NativeId {
        self.track(|id, tasks| async move {
            time::sleep(delay).await;
            finish(&tasks, id);
            callback();
        })
    }

    fn clear_timeout(&self, id: NativeId) {
        self.cancel(id);
    }

    fn set_interval(&self, callback: Callback, period: Duration) -> NativeId {
        let period = period.max(Duration::from_millis(1));
        self.track(|_, _| async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        })
    }

    fn clear_interval(&self, id: NativeId) {
        self.cancel(id);
    }
}

impl Immediates for TokioHost {
    fn set_immediate(&self, callback: Callback) -> NativeId {
        self.track(|id, tasks| async move {
            finish(&tasks, id);
            callback();
        })
    }

    fn clear_immediate(&self, id: NativeId) {
        self.cancel(id);
    }
}

impl IdleCallbacks for TokioHost {
    fn request_idle_callback(&self, callback: IdleCallback, _timeout: Option<Duration>) -> NativeId {
        self.track(|id, tasks| async move {
            tokio::task::yield_now().await;
            finish(&tasks, id);
            callback(IdleDeadline {
                did_timeout: false,
                time_remaining: IDLE_BUDGET,
            });
        })
    }

    fn cancel_idle_callback(&self, id: NativeId) {
        self.cancel(id);
    }
}

impl Spawner for TokioHost {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) {
        drop(tokio::task::spawn_local(fut));
    }
}

impl fmt::Debug for TokioHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioHost")
            .field("active", &self.active())
            .finish()
    }
}
