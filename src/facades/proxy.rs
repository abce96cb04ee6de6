//! Proxy façade: callables routed through the registry.
//!
//! A [`Proxy`] has no host primitive behind it. The caller fires it with
//! [`Proxy::call`], and the call goes through the same trampoline as a timer
//! firing: it is ignored once the proxy is cleared, dropped while muted and
//! queued while suspended (single proxies only).

use std::any::type_name;
use std::fmt;

use crate::core::{Async, Registration, TaskOptions, Trampoline};
use crate::error::AsyncError;
use crate::registry::{OperationId, OperationKind, Outcome};

/// Registered callable.
pub struct Proxy<A> {
    id: OperationId,
    trampoline: Trampoline<A>,
}

impl<A> Proxy<A> {
    /// Id of the underlying operation (the survivor after a merge).
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Fires the proxy with `args`.
    pub fn call(&self, args: A) {
        self.trampoline.call(args)
    }
}

impl<A> Clone for Proxy<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            trampoline: self.trampoline.clone(),
        }
    }
}

impl<A> fmt::Debug for Proxy<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy").field("id", &self.id).finish()
    }
}

impl Async {
    /// Wraps `f` as a proxy. Single (one-shot) unless `opts.single(false)`.
    ///
    /// # Example
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use asyncvisor::{Async, Host, OperationKind, TaskOptions};
    ///
    /// let tasks = Async::new(Host::new());
    /// let sum = Rc::new(Cell::new(0));
    /// let s = sum.clone();
    /// let add = tasks.proxy(move |n: i32| s.set(s.get() + n), TaskOptions::new()).unwrap();
    ///
    /// add.call(2);
    /// add.call(3); // single proxies unregister on their first call
    /// assert_eq!(sum.get(), 2);
    /// assert!(!tasks.contains(&OperationKind::Proxy, add.id()));
    /// ```
    pub fn proxy<A: 'static>(
        &self,
        f: impl Fn(A) + 'static,
        opts: TaskOptions,
    ) -> Result<Proxy<A>, AsyncError> {
        self.proxy_in(
            OperationKind::Proxy,
            move |args| {
                f(args);
                Outcome::Continue
            },
            opts,
        )
    }

    /// Registers a proxy under any kind, with full control over its outcome.
    ///
    /// Custom kinds get the generic controls: [`clear`](Async::clear) and
    /// [`mark`](Async::mark).
    pub fn proxy_in<A: 'static>(
        &self,
        kind: OperationKind,
        f: impl Fn(A) -> Outcome + 'static,
        opts: TaskOptions,
    ) -> Result<Proxy<A>, AsyncError> {
        let periodic = !opts.single.unwrap_or(true);
        let reg = Registration::new(kind, opts, f).periodic(periodic);
        let registered = self.inner.register(reg)?;
        let trampoline = registered.trampoline.ok_or(AsyncError::TypeMismatch {
            expected: type_name::<A>(),
        })?;
        Ok(Proxy {
            id: registered.id,
            trampoline,
        })
    }

    controls!(
        OperationKind::Proxy,
        "proxy",
        clear_proxy,
        mute_proxy,
        unmute_proxy,
        suspend_proxy,
        unsuspend_proxy
    );
}
