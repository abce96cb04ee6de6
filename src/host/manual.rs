//! # Deterministic fake-clock host.
//!
//! [`ManualHost`] implements every host trait on a virtual clock that only
//! moves when the caller says so. Nothing fires on its own:
//!
//! - [`advance`](ManualHost::advance) moves the clock and fires due timers
//!   (and idle callbacks whose timeout elapsed) in deadline order
//! - [`run_immediates`](ManualHost::run_immediates) drains the immediate queue
//! - [`run_idle`](ManualHost::run_idle) grants one idle slot
//! - [`run_until_stalled`](ManualHost::run_until_stalled) polls spawned futures
//!
//! Callbacks always run without any internal borrow held, so they may
//! schedule or cancel other primitives on the same host.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use tracing::warn;

use super::{
    Callback, IdleCallback, IdleCallbacks, IdleDeadline, Immediates, NativeId, Spawner, Timers,
};

/// Shortest interval period; a zero period would never let the clock move.
const MIN_PERIOD: Duration = Duration::from_millis(1);

struct Timer {
    id: NativeId,
    callback: Callback,
    period: Option<Duration>,
}

struct Idle {
    callback: IdleCallback,
    deadline: Option<Duration>,
}

#[derive(Default)]
struct State {
    now: Duration,
    next_id: u64,
    seq: u64,
    timers: BTreeMap<(Duration, u64), Timer>,
    slots: HashMap<NativeId, (Duration, u64)>,
    immediates: VecDeque<(NativeId, Callback)>,
    idle: BTreeMap<NativeId, Idle>,
}

impl State {
    fn mint(&mut self) -> NativeId {
        self.next_id += 1;
        NativeId(self.next_id)
    }

    fn schedule(&mut self, deadline: Duration, timer: Timer) {
        self.seq += 1;
        let slot = (deadline, self.seq);
        self.slots.insert(timer.id, slot);
        self.timers.insert(slot, timer);
    }

    fn cancel(&mut self, id: NativeId) {
        if let Some(slot) = self.slots.remove(&id) {
            self.timers.remove(&slot);
        }
    }

    /// Pops the earliest timer due at or before `until`, rescheduling periodic ones.
    fn pop_due(&mut self, until: Duration) -> Option<Callback> {
        let (&(deadline, _), _) = self.timers.first_key_value()?;
        if deadline > until {
            return None;
        }
        let (_, timer) = self.timers.pop_first()?;
        self.slots.remove(&timer.id);
        self.now = deadline;

        let callback = Rc::clone(&timer.callback);
        if let Some(period) = timer.period {
            self.schedule(deadline + period, timer);
        }
        Some(callback)
    }

    fn pop_expired_idle(&mut self, until: Duration) -> Option<IdleCallback> {
        let id = self
            .idle
            .iter()
            .find(|(_, entry)| entry.deadline.is_some_and(|d| d <= until))
            .map(|(id, _)| *id)?;
        self.idle.remove(&id).map(|entry| entry.callback)
    }
}

/// Host driven by an explicit virtual clock.
///
/// Cloning yields another handle to the same clock.
///
/// # Example
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
/// use asyncvisor::{Async, ManualHost, TaskOptions};
///
/// let host = ManualHost::new();
/// let tasks = Async::new(host.host());
/// let fired = Rc::new(Cell::new(false));
///
/// let flag = fired.clone();
/// tasks
///     .set_timeout(move || flag.set(true), Duration::from_millis(10), TaskOptions::new())
///     .unwrap();
///
/// host.advance(Duration::from_millis(9));
/// assert!(!fired.get());
/// host.advance(Duration::from_millis(1));
/// assert!(fired.get());
/// ```
#[derive(Clone)]
pub struct ManualHost {
    state: Rc<RefCell<State>>,
    pool: Rc<RefCell<LocalPool>>,
    spawner: LocalSpawner,
}

impl ManualHost {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            state: Rc::new(RefCell::new(State::default())),
            pool: Rc::new(RefCell::new(pool)),
            spawner,
        }
    }

    /// Builds a [`Host`](super::Host) exposing every primitive of this clock.
    pub fn host(&self) -> super::Host {
        let me = Rc::new(self.clone());
        super::Host::new()
            .with_timers(me.clone())
            .with_immediates(me.clone())
            .with_idle_callbacks(me.clone())
            .with_spawner(me)
    }

    /// Current virtual time since creation.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of scheduled timers and intervals.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Moves the clock forward by `by`, firing everything that falls due.
    ///
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let until = self.now() + by;
        let mut fired = 0;

        loop {
            let next = self.state.borrow_mut().pop_due(until);
            let Some(callback) = next else { break };
            callback();
            fired += 1;
        }

        self.state.borrow_mut().now = until;

        loop {
            let next = self.state.borrow_mut().pop_expired_idle(until);
            let Some(callback) = next else { break };
            callback(IdleDeadline {
                did_timeout: true,
                time_remaining: Duration::ZERO,
            });
            fired += 1;
        }
        fired
    }

    /// Runs the immediates queued so far. Immediates queued while running wait for the next call.
    pub fn run_immediates(&self) -> usize {
        let batch = std::mem::take(&mut self.state.borrow_mut().immediates);
        let count = batch.len();
        for (_, callback) in batch {
            callback();
        }
        count
    }

    /// Grants one idle slot of `budget` to every pending idle callback.
    pub fn run_idle(&self, budget: Duration) -> usize {
        let batch = std::mem::take(&mut self.state.borrow_mut().idle);
        let count = batch.len();
        for (_, entry) in batch {
            (entry.callback)(IdleDeadline {
                did_timeout: false,
                time_remaining: budget,
            });
        }
        count
    }

    /// Polls spawned futures until none can make progress.
    pub fn run_until_stalled(&self) {
        match self.pool.try_borrow_mut() {
            Ok(mut pool) => pool.run_until_stalled(),
            Err(_) => warn!("run_until_stalled called re-entrantly; ignored"),
        }
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualHost")
            .field("now", &state.now)
            .field("timers", &state.timers.len())
            .field("immediates", &state.immediates.len())
            .field("idle", &state.idle.len())
            .finish()
    }
}

impl Timers for ManualHost {
    fn set_timeout(&self, callback: Callback, delay: Duration) -> NativeId {
        let mut state = self.state.borrow_mut();
        let id = state.mint();
        let deadline = state.now + delay;
        state.schedule(
            deadline,
            Timer {
                id,
                callback,
                period: None,
            },
        );
        id
    }

    fn clear_timeout(&self, id: NativeId) {
        self.state.borrow_mut().cancel(id);
    }

    fn set_interval(&self, callback: Callback, period: Duration) -> NativeId {
        let period = period.max(MIN_PERIOD);
        let mut state = self.state.borrow_mut();
        let id = state.mint();
        let deadline = state.now + period;
        state.schedule(
            deadline,
            Timer {
                id,
                callback,
                period: Some(period),
            },
        );
        id
    }

    fn clear_interval(&self, id: NativeId) {
        self.state.borrow_mut().cancel(id);
    }
}

impl Immediates for ManualHost {
    fn set_immediate(&self, callback: Callback) -> NativeId {
        let mut state = self.state.borrow_mut();
        let id = state.mint();
        state.immediates.push_back((id, callback));
        id
    }

    fn clear_immediate(&self, id: NativeId) {
        self.state
            .borrow_mut()
            .immediates
            .retain(|(queued, _)| *queued != id);
    }
}

impl IdleCallbacks for ManualHost {
    fn request_idle_callback(&self, callback: IdleCallback, timeout: Option<Duration>) -> NativeId {
        let mut state = self.state.borrow_mut();
        let id = state.mint();
        let deadline = timeout.map(|t| state.now + t);
        state.idle.insert(id, Idle { callback, deadline });
        id
    }

    fn cancel_idle_callback(&self, id: NativeId) {
        self.state.borrow_mut().idle.remove(&id);
    }
}

impl Spawner for ManualHost {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) {
        if let Err(err) = self.spawner.spawn_local(fut) {
            warn!(error = %err, "manual host executor is shut down; future dropped");
        }
    }
}
