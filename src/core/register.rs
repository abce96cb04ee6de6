//! # Registration engine and trampolines.
//!
//! ## Flow
//! ```text
//! register(Registration)
//!   ├─ label occupied && Join::Yes ─► append continuation to survivor
//!   │                                 run on_merge(survivor info), return survivor id
//!   ├─ mint id, build Trampoline(id)
//!   ├─ wrapper(trampoline) ─► host registration, returns clear_fn
//!   ├─ build Link, evict label occupant (Replaced)
//!   └─ insert Link, publish OperationRegistered
//!
//! Trampoline::call(args)
//!   ├─ link gone                  ─► no-op
//!   ├─ muted one-shot             ─► remove silently (detach runs, callers abandoned),
//!   │                                also when suspended with nothing queued
//!   ├─ muted / paused periodic    ─► drop the firing
//!   ├─ paused one-shot            ─► muted = true, queue replay(args)
//!   ├─ one-shot                   ─► remove, detach, payload, settle callers
//!   └─ periodic                   ─► payload; settle callers unless Outcome::Continue
//! ```
//!
//! ## Rules
//! - A trampoline holds a weak reference to the registry and resolves its link by id on every call.
//! - No registry borrow is held while the payload, detach, handlers or continuations run.

use std::any::Any;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::error::AsyncError;
use crate::events::{Event, EventKind};
use crate::registry::{
    ClearFn, ClearReason, Continuation, Detach, Join, Link, OperationId, OperationKind, Outcome,
    Value,
};

use super::handle::Inner;
use super::options::TaskOptions;

/// Operation body run by the trampoline.
pub(crate) type Payload<A> = Rc<dyn Fn(A) -> Outcome>;

/// Host registration step: receives the trampoline, returns the host teardown.
pub(crate) type Wrapper<'w, A> =
    Box<dyn FnOnce(Trampoline<A>) -> Result<Option<ClearFn>, AsyncError> + 'w>;

/// Entry point a host primitive calls when the operation fires.
pub struct Trampoline<A> {
    fire: Rc<dyn Fn(A)>,
}

impl<A: 'static> Trampoline<A> {
    fn new(
        inner: Weak<Inner>,
        kind: OperationKind,
        id: OperationId,
        payload: Payload<A>,
        settle_once: bool,
    ) -> Self {
        let fire = move |args: A| on_fire(&inner, &kind, id, &payload, settle_once, args);
        Self {
            fire: Rc::new(fire),
        }
    }
}

impl<A> Trampoline<A> {
    /// Fires the operation with `args`.
    #[inline]
    pub fn call(&self, args: A) {
        (self.fire)(args)
    }
}

impl<A> Clone for Trampoline<A> {
    fn clone(&self) -> Self {
        Self {
            fire: Rc::clone(&self.fire),
        }
    }
}

impl<A> fmt::Debug for Trampoline<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Trampoline(..)")
    }
}

/// Input of the registration engine.
pub(crate) struct Registration<'w, A> {
    kind: OperationKind,
    opts: TaskOptions,
    periodic: bool,
    settle_once: bool,
    payload: Payload<A>,
    continuation: Option<Continuation>,
    wrapper: Option<Wrapper<'w, A>>,
    detach: Option<Detach>,
}

impl<'w, A: 'static> Registration<'w, A> {
    /// One-shot registration without host wrapper.
    pub(crate) fn new(
        kind: OperationKind,
        opts: TaskOptions,
        payload: impl Fn(A) -> Outcome + 'static,
    ) -> Self {
        Self {
            kind,
            opts,
            periodic: false,
            settle_once: false,
            payload: Rc::new(payload),
            continuation: None,
            wrapper: None,
            detach: None,
        }
    }

    pub(crate) fn periodic(mut self, periodic: bool) -> Self {
        self.periodic = periodic;
        self
    }

    /// Periodic link that unregisters itself the first time its payload settles.
    pub(crate) fn settle_once(mut self) -> Self {
        self.periodic = true;
        self.settle_once = true;
        self
    }

    pub(crate) fn continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = Some(continuation);
        self
    }

    pub(crate) fn wrapper(
        mut self,
        wrapper: impl FnOnce(Trampoline<A>) -> Result<Option<ClearFn>, AsyncError> + 'w,
    ) -> Self {
        self.wrapper = Some(Box::new(wrapper));
        self
    }

    pub(crate) fn detach(mut self, detach: impl FnOnce() + 'static) -> Self {
        self.detach = Some(Box::new(detach));
        self
    }
}

/// Result of the registration engine.
pub(crate) struct Registered<A> {
    pub(crate) id: OperationId,
    /// True if the call merged into an existing link.
    pub(crate) merged: bool,
    /// Trampoline of the link; `None` if a survivor's trampoline has another argument type.
    pub(crate) trampoline: Option<Trampoline<A>>,
}

impl Inner {
    pub(crate) fn register<A: 'static>(
        self: &Rc<Self>,
        reg: Registration<'_, A>,
    ) -> Result<Registered<A>, AsyncError> {
        let Registration {
            kind,
            opts,
            periodic,
            settle_once,
            payload,
            mut continuation,
            wrapper,
            detach,
        } = reg;
        let TaskOptions {
            label,
            group,
            join,
            on_clear,
            on_merge,
            ..
        } = opts;

        if join == Join::Yes
            && let Some(label) = &label
        {
            let survivor = {
                let mut registry = self.registry.borrow_mut();
                registry
                    .cache_mut(&kind)
                    .and_then(|cache| {
                        let id = cache.bucket(group.as_ref())?.resolve_label(label)?;
                        cache.get_mut(id)
                    })
                    .map(|link| {
                        link.on_complete.extend(continuation.take());
                        (link.info(), link.trampoline.clone())
                    })
            };

            if let Some((info, trampoline)) = survivor {
                for handler in &on_merge {
                    handler(&info);
                }
                debug!(kind = %kind, id = %info.id, label = %label, "operation merged");
                self.publish(|| Event::for_link(EventKind::OperationMerged, &info));

                let trampoline = trampoline
                    .and_then(|t| t.downcast::<Trampoline<A>>().ok())
                    .map(|t| (*t).clone());
                return Ok(Registered {
                    id: info.id,
                    merged: true,
                    trampoline,
                });
            }
        }

        let id = OperationId::next();
        let trampoline = Trampoline::new(Rc::downgrade(self), kind.clone(), id, payload, settle_once);
        let clear_fn = match wrapper {
            Some(wrap) => wrap(trampoline.clone())?,
            None => None,
        };

        let mut link = Link::new(id, kind.clone(), label.clone(), group.clone(), join, periodic);
        link.clear_fn = clear_fn;
        link.detach = detach;
        link.on_clear = on_clear;
        link.on_complete.extend(continuation);
        link.trampoline = Some(Rc::new(trampoline.clone()) as Rc<dyn Any>);

        let occupant = label.as_ref().and_then(|label| {
            self.registry
                .borrow_mut()
                .cache_mut(&kind)?
                .take_labeled(group.as_ref(), label)
        });
        if let Some(occupant) = occupant {
            self.finalize_clear(occupant, Some(&mut link), ClearReason::Replaced, join);
        }

        let info = link.info();
        self.registry.borrow_mut().cache_or_create(&kind).insert(link);

        debug!(
            kind = %kind,
            id = %id,
            label = ?info.label,
            group = ?info.group,
            periodic,
            "operation registered"
        );
        self.publish(|| Event::for_link(EventKind::OperationRegistered, &info));

        Ok(Registered {
            id,
            merged: false,
            trampoline: Some(trampoline),
        })
    }

    /// Tears down a link already removed from its bucket.
    ///
    /// Order: `on_clear` handlers, continuations (handed to `survivor` or
    /// rejected), `clear_fn`.
    ///
    /// `on_clear` handlers travel to the survivor only together with
    /// continuations. A replace chain with nobody awaiting runs each
    /// evicted link's handlers once, at eviction, and never again.
    pub(crate) fn finalize_clear(
        &self,
        mut link: Link,
        survivor: Option<&mut Link>,
        reason: ClearReason,
        join: Join,
    ) {
        let ctx = link.context(reason, join, survivor.as_ref().map(|s| s.id));

        for handler in &link.on_clear {
            handler(&ctx);
        }

        let continuations = mem::take(&mut link.on_complete);
        if !continuations.is_empty() {
            match survivor {
                Some(survivor)
                    if join == Join::Replace && link.depth < self.cfg.max_replace_depth =>
                {
                    survivor.depth = survivor.depth.max(link.depth + 1);
                    survivor.on_complete.extend(continuations);
                    survivor.on_clear.extend(link.on_clear.iter().cloned());
                    trace!(
                        from = %link.id,
                        to = %survivor.id,
                        depth = survivor.depth,
                        "continuations handed over"
                    );
                }
                _ => {
                    let err = AsyncError::Cleared(Box::new(ctx.clone()));
                    for continuation in continuations {
                        continuation.settle(Err(err.clone()));
                    }
                }
            }
        }

        if let Some(clear) = link.clear_fn.take() {
            clear(&ctx);
        }

        debug!(
            kind = %ctx.kind,
            id = %ctx.id,
            replaced_by = ?ctx.replaced_by,
            reason = ctx.reason.as_str(),
            "operation cleared"
        );
        self.publish(|| {
            let kind = if ctx.is_collision() {
                EventKind::OperationReplaced
            } else {
                EventKind::OperationCleared
            };
            let mut ev = Event::for_link(kind, &link.info()).with_reason(ctx.reason.as_str());
            ev.replaced_by = ctx.replaced_by;
            ev
        });
    }

    /// Delivers a settled outcome to `continuations`.
    pub(crate) fn settle(&self, continuations: Vec<Continuation>, outcome: Outcome) {
        match outcome {
            Outcome::Value(value) => {
                for continuation in continuations {
                    continuation.settle(Ok(Rc::clone(&value)));
                }
            }
            Outcome::Continue => {
                let unit: Value = Rc::new(());
                for continuation in continuations {
                    continuation.settle(Ok(Rc::clone(&unit)));
                }
            }
            Outcome::Failed(err) => {
                for continuation in continuations {
                    continuation.settle(Err(err.clone()));
                }
            }
            Outcome::Pending(fut) => match self.host.spawner() {
                Ok(spawner) => spawner.spawn_local(
                    async move {
                        let settled = fut.await;
                        for continuation in continuations {
                            continuation.settle(settled.clone());
                        }
                    }
                    .boxed_local(),
                ),
                Err(err) => {
                    warn!("pending outcome without a spawner; rejecting callers");
                    for continuation in continuations {
                        continuation.settle(Err(err.clone()));
                    }
                }
            },
        }
    }
}

enum Step {
    /// Muted one-shot: remove without running.
    Discard,
    /// Ignore this firing.
    Drop,
    /// Queue the firing for replay on unsuspend.
    Defer,
    Deliver,
    Tick,
}

fn on_fire<A: 'static>(
    weak: &Weak<Inner>,
    kind: &OperationKind,
    id: OperationId,
    payload: &Payload<A>,
    settle_once: bool,
    args: A,
) {
    let Some(inner) = weak.upgrade() else { return };

    let step = {
        let registry = inner.registry.borrow();
        let Some(link) = registry.cache(kind).and_then(|cache| cache.get(id)) else {
            return;
        };
        match (link.periodic, link.muted, link.paused) {
            (false, true, false) => Step::Discard,
            // Muted by the caller, not by an earlier deferral: the host
            // primitive is spent and nothing would ever replay it.
            (false, true, true) if link.deferred.is_empty() => Step::Discard,
            (false, false, true) => Step::Defer,
            (false, false, false) => Step::Deliver,
            (true, false, false) => Step::Tick,
            _ => Step::Drop,
        }
    };

    match step {
        Step::Discard => {
            let removed = inner
                .registry
                .borrow_mut()
                .cache_mut(kind)
                .and_then(|cache| cache.remove(id));
            if let Some(mut link) = removed {
                if let Some(detach) = link.detach.take() {
                    detach();
                }
                trace!(kind = %kind, id = %id, "muted operation fired; dropped");
                inner.publish(|| {
                    Event::for_link(EventKind::FiringDropped, &link.info()).with_reason("muted")
                });
            }
        }
        Step::Drop => {
            trace!(kind = %kind, id = %id, "firing dropped");
            inner.publish(|| {
                Event::new(EventKind::FiringDropped)
                    .with_operation(kind.clone())
                    .with_id(id)
            });
        }
        Step::Defer => {
            let replay = {
                let weak = weak.clone();
                let kind = kind.clone();
                let payload = Rc::clone(payload);
                move || {
                    if let Some(inner) = weak.upgrade() {
                        deliver(&inner, &kind, id, &payload, args);
                    }
                }
            };
            if let Some(link) = inner
                .registry
                .borrow_mut()
                .cache_mut(kind)
                .and_then(|cache| cache.get_mut(id))
            {
                link.muted = true;
                link.deferred.push_back(Box::new(replay));
            }
            trace!(kind = %kind, id = %id, "firing deferred");
            inner.publish(|| {
                Event::new(EventKind::FiringDeferred)
                    .with_operation(kind.clone())
                    .with_id(id)
            });
        }
        Step::Deliver => deliver(&inner, kind, id, payload, args),
        Step::Tick => tick(&inner, kind, id, payload, settle_once, args),
    }
}

/// Runs a one-shot operation: unregister, detach, payload, settle.
fn deliver<A: 'static>(inner: &Rc<Inner>, kind: &OperationKind, id: OperationId, payload: &Payload<A>, args: A) {
    let removed = inner
        .registry
        .borrow_mut()
        .cache_mut(kind)
        .and_then(|cache| cache.remove(id));
    let Some(mut link) = removed else { return };

    let detach = link.detach.take();
    let continuations = mem::take(&mut link.on_complete);
    let info = link.info();
    drop(link);

    if let Some(detach) = detach {
        detach();
    }
    trace!(kind = %kind, id = %id, "operation fired");
    inner.publish(|| Event::for_link(EventKind::OperationFired, &info));

    let outcome = payload(args);
    inner.settle(continuations, outcome);
}

/// Runs one firing of a periodic operation.
fn tick<A: 'static>(
    inner: &Rc<Inner>,
    kind: &OperationKind,
    id: OperationId,
    payload: &Payload<A>,
    settle_once: bool,
    args: A,
) {
    trace!(kind = %kind, id = %id, "periodic operation fired");
    inner.publish(|| {
        Event::new(EventKind::OperationFired)
            .with_operation(kind.clone())
            .with_id(id)
    });

    let outcome = payload(args);
    if matches!(outcome, Outcome::Continue) {
        return;
    }

    let (continuations, finished) = {
        let mut registry = inner.registry.borrow_mut();
        let Some(cache) = registry.cache_mut(kind) else {
            return;
        };
        if settle_once {
            let Some(mut link) = cache.remove(id) else {
                return;
            };
            (mem::take(&mut link.on_complete), Some(link))
        } else {
            let Some(link) = cache.get_mut(id) else {
                return;
            };
            (mem::take(&mut link.on_complete), None)
        }
    };

    if let Some(mut link) = finished {
        let ctx = link.context(ClearReason::Completed, link.join, None);
        if let Some(clear) = link.clear_fn.take() {
            clear(&ctx);
        }
        debug!(kind = %kind, id = %id, "operation completed");
        inner.publish(|| Event::for_link(EventKind::OperationCompleted, &link.info()));
    }

    inner.settle(continuations, outcome);
}
