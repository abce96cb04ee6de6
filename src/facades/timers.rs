//! Timer façades: timeout, interval, immediate and idle callback.
//!
//! The `schedule_*` helpers take a payload and an optional continuation so
//! the promise sugar (`sleep`, `next_tick`, `idle`, `wait`) shares one path
//! with the public `set_*` calls.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::core::{Async, Registration, TaskOptions, Trampoline};
use crate::error::AsyncError;
use crate::host::IdleDeadline;
use crate::registry::{ClearContext, ClearFn, Continuation, OperationId, OperationKind, Outcome};

impl Async {
    /// Runs `f` once after `delay`.
    pub fn set_timeout(
        &self,
        f: impl FnOnce() + 'static,
        delay: Duration,
        opts: TaskOptions,
    ) -> Result<OperationId, AsyncError> {
        let f = Cell::new(Some(f));
        self.schedule_timeout(
            move |()| {
                if let Some(f) = f.take() {
                    f();
                }
                Outcome::Continue
            },
            delay,
            opts,
            None,
        )
    }

    /// Runs `f` every `period` until cleared.
    pub fn set_interval(
        &self,
        f: impl Fn() + 'static,
        period: Duration,
        opts: TaskOptions,
    ) -> Result<OperationId, AsyncError> {
        self.schedule_interval(
            move |()| {
                f();
                Outcome::Continue
            },
            period,
            opts,
            None,
        )
    }

    /// Runs `f` once after the current turn.
    pub fn set_immediate(
        &self,
        f: impl FnOnce() + 'static,
        opts: TaskOptions,
    ) -> Result<OperationId, AsyncError> {
        let f = Cell::new(Some(f));
        self.schedule_immediate(
            move |()| {
                if let Some(f) = f.take() {
                    f();
                }
                Outcome::Continue
            },
            opts,
            None,
        )
    }

    /// Runs `f` in the next idle slot, or after `timeout` at the latest.
    pub fn request_idle_callback(
        &self,
        f: impl FnOnce(IdleDeadline) + 'static,
        timeout: Option<Duration>,
        opts: TaskOptions,
    ) -> Result<OperationId, AsyncError> {
        let f = Cell::new(Some(f));
        self.schedule_idle(
            move |deadline| {
                if let Some(f) = f.take() {
                    f(deadline);
                }
                Outcome::Continue
            },
            timeout,
            opts,
            None,
        )
    }

    controls!(
        OperationKind::Timeout,
        "timeout",
        clear_timeout,
        mute_timeout,
        unmute_timeout,
        suspend_timeout,
        unsuspend_timeout
    );

    controls!(
        OperationKind::Interval,
        "interval",
        clear_interval,
        mute_interval,
        unmute_interval,
        suspend_interval,
        unsuspend_interval
    );

    controls!(
        OperationKind::Immediate,
        "immediate",
        clear_immediate,
        mute_immediate,
        unmute_immediate,
        suspend_immediate,
        unsuspend_immediate
    );

    controls!(
        OperationKind::IdleCallback,
        "idle callback",
        clear_idle_callback,
        mute_idle_callback,
        unmute_idle_callback,
        suspend_idle_callback,
        unsuspend_idle_callback
    );

    pub(crate) fn schedule_timeout(
        &self,
        payload: impl Fn(()) -> Outcome + 'static,
        delay: Duration,
        opts: TaskOptions,
        continuation: Option<Continuation>,
    ) -> Result<OperationId, AsyncError> {
        let timers = self.inner.host.timers()?.clone();
        let reg = Registration::new(OperationKind::Timeout, opts, payload).wrapper(
            move |trampoline: Trampoline<()>| {
                let native = timers.set_timeout(Rc::new(move || trampoline.call(())), delay);
                let clear: ClearFn = Box::new(move |_: &ClearContext| timers.clear_timeout(native));
                Ok(Some(clear))
            },
        );
        self.register_with(reg, continuation)
    }

    pub(crate) fn schedule_interval(
        &self,
        payload: impl Fn(()) -> Outcome + 'static,
        period: Duration,
        opts: TaskOptions,
        continuation: Option<Continuation>,
    ) -> Result<OperationId, AsyncError> {
        self.interval_registration(payload, period, opts, continuation, false)
    }

    /// Interval that unregisters itself when its payload first settles.
    pub(crate) fn schedule_poll(
        &self,
        payload: impl Fn(()) -> Outcome + 'static,
        period: Duration,
        opts: TaskOptions,
        continuation: Continuation,
    ) -> Result<OperationId, AsyncError> {
        self.interval_registration(payload, period, opts, Some(continuation), true)
    }

    fn interval_registration(
        &self,
        payload: impl Fn(()) -> Outcome + 'static,
        period: Duration,
        opts: TaskOptions,
        continuation: Option<Continuation>,
        settle_once: bool,
    ) -> Result<OperationId, AsyncError> {
        let timers = self.inner.host.timers()?.clone();
        let reg = Registration::new(OperationKind::Interval, opts, payload).periodic(true);
        let reg = if settle_once { reg.settle_once() } else { reg };
        let reg = reg.wrapper(move |trampoline: Trampoline<()>| {
            let native = timers.set_interval(Rc::new(move || trampoline.call(())), period);
            let clear: ClearFn = Box::new(move |_: &ClearContext| timers.clear_interval(native));
            Ok(Some(clear))
        });
        self.register_with(reg, continuation)
    }

    pub(crate) fn schedule_immediate(
        &self,
        payload: impl Fn(()) -> Outcome + 'static,
        opts: TaskOptions,
        continuation: Option<Continuation>,
    ) -> Result<OperationId, AsyncError> {
        let immediates = self.inner.host.immediates()?.clone();
        let reg = Registration::new(OperationKind::Immediate, opts, payload).wrapper(
            move |trampoline: Trampoline<()>| {
                let native = immediates.set_immediate(Rc::new(move || trampoline.call(())));
                let clear: ClearFn =
                    Box::new(move |_: &ClearContext| immediates.clear_immediate(native));
                Ok(Some(clear))
            },
        );
        self.register_with(reg, continuation)
    }

    pub(crate) fn schedule_idle(
        &self,
        payload: impl Fn(IdleDeadline) -> Outcome + 'static,
        timeout: Option<Duration>,
        opts: TaskOptions,
        continuation: Option<Continuation>,
    ) -> Result<OperationId, AsyncError> {
        let idle = self.inner.host.idle_callbacks()?.clone();
        let reg = Registration::new(OperationKind::IdleCallback, opts, payload).wrapper(
            move |trampoline: Trampoline<IdleDeadline>| {
                let native = idle.request_idle_callback(
                    Rc::new(move |deadline: IdleDeadline| trampoline.call(deadline)),
                    timeout,
                );
                let clear: ClearFn = Box::new(move |_: &ClearContext| idle.cancel_idle_callback(native));
                Ok(Some(clear))
            },
        );
        self.register_with(reg, continuation)
    }

    /// Registers `reg`, attaching `continuation` when given, and returns the link id.
    pub(crate) fn register_with<A: 'static>(
        &self,
        reg: Registration<'_, A>,
        continuation: Option<Continuation>,
    ) -> Result<OperationId, AsyncError> {
        let reg = match continuation {
            Some(continuation) => reg.continuation(continuation),
            None => reg,
        };
        self.inner.register(reg).map(|registered| registered.id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::host::ManualHost;
    use crate::registry::Join;
    use crate::worker::WorkerTable;

    fn setup() -> (ManualHost, Async) {
        let host = ManualHost::new();
        let tasks = Async::builder(host.host())
            .with_worker_table(WorkerTable::new())
            .build();
        (host, tasks)
    }

    #[test]
    fn timeout_fires_once_and_unregisters() {
        let (host, tasks) = setup();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let id = tasks
            .set_timeout(move || h.set(h.get() + 1), Duration::from_millis(20), TaskOptions::new())
            .unwrap();

        host.advance(Duration::from_millis(19));
        assert_eq!(hits.get(), 0);
        assert!(tasks.contains(&OperationKind::Timeout, id));

        host.advance(Duration::from_millis(30));
        assert_eq!(hits.get(), 1);
        assert!(!tasks.contains(&OperationKind::Timeout, id));
        assert_eq!(tasks.clear_timeout(id), 0);
    }

    #[test]
    fn interval_keeps_firing_until_cleared() {
        let (host, tasks) = setup();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let id = tasks
            .set_interval(move || h.set(h.get() + 1), Duration::from_millis(10), TaskOptions::new())
            .unwrap();

        host.advance(Duration::from_millis(35));
        assert_eq!(hits.get(), 3);

        assert_eq!(tasks.clear_interval(id), 1);
        host.advance(Duration::from_millis(50));
        assert_eq!(hits.get(), 3);
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn labeled_timeout_replaces_its_predecessor() {
        let (host, tasks) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["first", "second"] {
            let l = log.clone();
            tasks
                .set_timeout(
                    move || l.borrow_mut().push(name),
                    Duration::from_millis(10),
                    TaskOptions::new().label("save").join(Join::Replace),
                )
                .unwrap();
        }

        host.advance(Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn immediates_run_on_the_next_turn() {
        let (host, tasks) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        tasks
            .set_immediate(move || o.borrow_mut().push("a"), TaskOptions::new())
            .unwrap();
        let o = order.clone();
        let dropped = tasks
            .set_immediate(move || o.borrow_mut().push("b"), TaskOptions::new())
            .unwrap();
        assert_eq!(tasks.clear_immediate(dropped), 1);
        assert!(order.borrow().is_empty());

        host.run_immediates();
        assert_eq!(*order.borrow(), vec!["a"]);
        assert!(tasks.is_empty(&OperationKind::Immediate));
    }

    #[test]
    fn idle_callback_reports_its_deadline() {
        let (host, tasks) = setup();
        let seen = Rc::new(Cell::new(None));

        let s = seen.clone();
        tasks
            .request_idle_callback(move |deadline| s.set(Some(deadline)), None, TaskOptions::new())
            .unwrap();
        host.run_idle(Duration::from_millis(8));
        let deadline = seen.get().expect("idle callback ran");
        assert!(!deadline.did_timeout);
        assert_eq!(deadline.time_remaining, Duration::from_millis(8));

        let s = seen.clone();
        tasks
            .request_idle_callback(
                move |deadline| s.set(Some(deadline)),
                Some(Duration::from_millis(5)),
                TaskOptions::new(),
            )
            .unwrap();
        host.advance(Duration::from_millis(5));
        assert!(seen.get().is_some_and(|d| d.did_timeout));
        assert!(tasks.is_empty(&OperationKind::IdleCallback));
    }

    #[test]
    fn clear_all_spans_every_kind() {
        let (_host, tasks) = setup();
        let opts = || TaskOptions::new().group("screen");
        tasks.set_timeout(|| {}, Duration::from_millis(5), opts()).unwrap();
        tasks.set_interval(|| {}, Duration::from_millis(5), opts()).unwrap();
        tasks.set_immediate(|| {}, opts()).unwrap();
        tasks.set_immediate(|| {}, TaskOptions::new()).unwrap();

        let screen = crate::core::Address::new().group("screen");
        assert_eq!(tasks.clear_all(screen), 3);
        assert_eq!(tasks.len(&OperationKind::Immediate), 1);
    }
}
