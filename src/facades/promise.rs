//! Promise and request façades.
//!
//! Both spawn the wrapped future on the host [`Spawner`](crate::Spawner) and
//! park the caller on the link:
//!
//! - clearing a **promise** aborts the future (`futures::future::abortable`)
//! - clearing a **request** cancels the [`CancellationToken`] handed to its factory
//!
//! Callers merged with `Join::Yes` receive the survivor's result. Callers of
//! an operation replaced with `Join::Replace` receive the newcomer's result.

use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::abortable;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::{Async, Registration, TaskOptions, Trampoline};
use crate::error::AsyncError;
use crate::registry::{ClearContext, ClearFn, OperationKind, Outcome, Settled, Value};

use super::awaitable::Awaitable;

impl Async {
    /// Runs `fut` as a cancellable, joinable operation.
    ///
    /// # Example
    /// ```
    /// use futures::FutureExt;
    /// use asyncvisor::{Async, ManualHost, TaskOptions};
    ///
    /// let host = ManualHost::new();
    /// let tasks = Async::new(host.host());
    ///
    /// let answer = tasks.promise(async { Ok::<_, anyhow::Error>(42u32) }, TaskOptions::new());
    /// host.run_until_stalled();
    /// assert_eq!(answer.now_or_never().unwrap().unwrap(), 42);
    /// ```
    pub fn promise<T, F>(&self, fut: F, opts: TaskOptions) -> Awaitable<T>
    where
        T: Clone + 'static,
        F: Future<Output = anyhow::Result<T>> + 'static,
    {
        self.spawn_settled(OperationKind::Promise, opts, move |trampoline| {
            let (task, handle) = abortable(async move {
                let settled: Settled = fut
                    .await
                    .map(|value| Rc::new(value) as Value)
                    .map_err(AsyncError::failed);
                trampoline.call(settled);
            });
            let clear: ClearFn = Box::new(move |_: &ClearContext| handle.abort());
            (task.map(|_| ()).boxed_local(), clear)
        })
    }

    /// Runs the future built by `factory` with a cancellation token.
    ///
    /// Clearing the operation cancels the token; the future decides how to
    /// wind down, and its eventual result is ignored.
    pub fn request<T, F, Fut>(&self, factory: F, opts: TaskOptions) -> Awaitable<T>
    where
        T: Clone + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        self.spawn_settled(OperationKind::Request, opts, move |trampoline| {
            let token = CancellationToken::new();
            let fut = factory(token.clone());
            let task = async move {
                let settled: Settled = fut
                    .await
                    .map(|value| Rc::new(value) as Value)
                    .map_err(AsyncError::failed);
                trampoline.call(settled);
            };
            let clear: ClearFn = Box::new(move |_: &ClearContext| token.cancel());
            (task.boxed_local(), clear)
        })
    }

    controls!(
        OperationKind::Promise,
        "promise",
        clear_promise,
        mute_promise,
        unmute_promise,
        suspend_promise,
        unsuspend_promise
    );

    controls!(
        OperationKind::Request,
        "request",
        clear_request,
        mute_request,
        unmute_request,
        suspend_request,
        unsuspend_request
    );

    /// Registers a one-shot link fired by a spawned future.
    ///
    /// `start` receives the trampoline and returns the future to spawn plus
    /// the teardown that stops it.
    fn spawn_settled<T, S>(&self, kind: OperationKind, opts: TaskOptions, start: S) -> Awaitable<T>
    where
        T: Clone + 'static,
        S: FnOnce(Trampoline<Settled>) -> (futures::future::LocalBoxFuture<'static, ()>, ClearFn),
    {
        let spawner = match self.inner.host.spawner() {
            Ok(spawner) => Rc::clone(spawner),
            Err(err) => {
                warn!(kind = %kind, "no spawner; operation not started");
                return Awaitable::failed(err);
            }
        };

        let (continuation, awaitable) = Awaitable::<T>::channel();
        let reg = Registration::new(kind, opts, |settled: Settled| Outcome::from(settled))
            .continuation(continuation)
            .wrapper(move |trampoline: Trampoline<Settled>| {
                let (task, clear) = start(trampoline);
                spawner.spawn_local(task);
                Ok(Some(clear))
            });

        match self.inner.register(reg) {
            Ok(registered) => awaitable.with_id(registered.id),
            Err(err) => Awaitable::failed(err),
        }
    }
}
