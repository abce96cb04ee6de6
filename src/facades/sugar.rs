//! Promise sugar built from the timer and listener façades.
//!
//! Each helper registers an ordinary operation with a continuation, so it
//! can be labeled, grouped, joined and cleared like any other:
//!
//! | helper       | kind          | resolves with          |
//! |--------------|---------------|------------------------|
//! | `sleep`      | timeout       | `()`                   |
//! | `next_tick`  | immediate     | `()`                   |
//! | `idle`       | idle callback | `IdleDeadline`         |
//! | `wait`       | interval      | `()` once predicate holds |
//! | `once_event` | listener      | the event payload      |
//!
//! Registration failures (missing host primitive) surface as the awaited error.

use std::rc::Rc;
use std::time::Duration;

use tracing::warn;

use crate::core::{Async, TaskOptions};
use crate::emitter::Emitter;
use crate::error::AsyncError;
use crate::host::IdleDeadline;
use crate::registry::{Continuation, Join, Key, OperationId, Outcome};

use super::awaitable::Awaitable;
use super::proxy::Proxy;

impl Async {
    /// Resolves after `delay`.
    pub fn sleep(&self, delay: Duration, opts: TaskOptions) -> Awaitable<()> {
        self.awaiting("sleep", |continuation| {
            self.schedule_timeout(|()| Outcome::Continue, delay, opts, Some(continuation))
        })
    }

    /// Resolves after the current turn.
    pub fn next_tick(&self, opts: TaskOptions) -> Awaitable<()> {
        self.awaiting("next_tick", |continuation| {
            self.schedule_immediate(|()| Outcome::Continue, opts, Some(continuation))
        })
    }

    /// Resolves in the next idle slot, or after `timeout` at the latest.
    pub fn idle(&self, timeout: Option<Duration>, opts: TaskOptions) -> Awaitable<IdleDeadline> {
        self.awaiting("idle", |continuation| {
            self.schedule_idle(Outcome::value, timeout, opts, Some(continuation))
        })
    }

    /// Resolves once `predicate` returns `true`.
    ///
    /// The predicate is checked immediately, then every
    /// [`AsyncConfig::wait_poll`](crate::AsyncConfig::wait_poll). The polling
    /// interval unregisters itself when the predicate holds.
    pub fn wait(&self, predicate: impl Fn() -> bool + 'static, opts: TaskOptions) -> Awaitable<()> {
        if predicate() {
            return Awaitable::ready(());
        }
        let period = self.inner.cfg.wait_poll_clamped();
        self.awaiting("wait", |continuation| {
            self.schedule_poll(
                move |()| {
                    if predicate() {
                        Outcome::value(())
                    } else {
                        Outcome::Continue
                    }
                },
                period,
                opts,
                continuation,
            )
        })
    }

    /// Resolves with the payload of the next `event` dispatched by `emitter`.
    pub fn once_event<E, R>(&self, emitter: &R, event: &str, opts: TaskOptions) -> Awaitable<E>
    where
        E: Clone + 'static,
        R: Emitter<E> + ?Sized,
    {
        self.awaiting("once_event", |continuation| {
            self.listen(
                emitter,
                event,
                |payload: E| Outcome::value(payload),
                opts.single(true),
                Some(continuation),
            )
        })
    }

    /// Proxy that runs `f` once calls stop for `delay`, with the last call's arguments.
    ///
    /// Every call replaces the pending timeout under `opts.label` (an
    /// anonymous label if unset).
    pub fn debounce<A: 'static>(
        &self,
        f: impl Fn(A) + 'static,
        delay: Duration,
        opts: TaskOptions,
    ) -> Result<Proxy<A>, AsyncError> {
        self.deferring_proxy(f, delay, opts, Join::No)
    }

    /// Proxy that runs `f` at most once per `delay`, with the first call's arguments.
    ///
    /// Calls made while a timeout is pending merge into it.
    pub fn throttle<A: 'static>(
        &self,
        f: impl Fn(A) + 'static,
        delay: Duration,
        opts: TaskOptions,
    ) -> Result<Proxy<A>, AsyncError> {
        self.deferring_proxy(f, delay, opts, Join::Yes)
    }

    fn deferring_proxy<A: 'static>(
        &self,
        f: impl Fn(A) + 'static,
        delay: Duration,
        opts: TaskOptions,
        join: Join,
    ) -> Result<Proxy<A>, AsyncError> {
        self.inner.host.timers()?;

        let label = opts.label.clone().unwrap_or_else(Key::anonymous);
        let group = opts.group.clone();
        let weak = self.downgrade();
        let f = Rc::new(f);

        self.proxy(
            move |args: A| {
                let Some(inner) = weak.upgrade() else { return };
                let tasks = Async::from_inner(inner);
                let mut timer = TaskOptions::new().label(label.clone()).join(join);
                if let Some(group) = &group {
                    timer = timer.group(group.clone());
                }
                let f = Rc::clone(&f);
                if let Err(err) = tasks.set_timeout(move || f(args), delay, timer) {
                    warn!(error = %err, "deferred proxy call not scheduled");
                }
            },
            opts.single(false),
        )
    }

    fn awaiting<T: Clone + 'static>(
        &self,
        what: &'static str,
        register: impl FnOnce(Continuation) -> Result<OperationId, AsyncError>,
    ) -> Awaitable<T> {
        let (continuation, awaitable) = Awaitable::channel();
        match register(continuation) {
            Ok(id) => awaitable.with_id(id),
            Err(err) => {
                warn!(helper = what, error = %err, "operation not scheduled");
                Awaitable::failed(err)
            }
        }
    }
}
