//! Event listener façade: `on`, `once`, `off`.
//!
//! ## Rules
//! - One link per event name; the default group is the event name.
//! - `once` is `on` with `single(true)`. A single listener unsubscribes from
//!   the emitter before the handler runs, unless the emitter removed it
//!   natively.
//! - Clearing a listener link calls the emitter's unsubscribe exactly once.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::{Async, Registration, TaskOptions, Trampoline};
use crate::emitter::{Emitter, Listener, Unsubscribe};
use crate::error::AsyncError;
use crate::registry::{ClearContext, ClearFn, Continuation, Key, OperationId, OperationKind, Outcome};

/// One or more event names.
///
/// A single string is split on whitespace; list items are taken verbatim.
///
/// ```
/// use asyncvisor::EventNames;
///
/// let names = EventNames::from("open close");
/// assert_eq!(names.iter().collect::<Vec<_>>(), vec!["open", "close"]);
/// assert_eq!(EventNames::from(["a b"]).len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames(Vec<String>);

impl EventNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for EventNames {
    fn from(names: &str) -> Self {
        EventNames(names.split_whitespace().map(str::to_owned).collect())
    }
}

impl From<String> for EventNames {
    fn from(names: String) -> Self {
        EventNames::from(names.as_str())
    }
}

impl From<Vec<String>> for EventNames {
    fn from(names: Vec<String>) -> Self {
        EventNames(names)
    }
}

impl From<Vec<&str>> for EventNames {
    fn from(names: Vec<&str>) -> Self {
        EventNames(names.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EventNames {
    fn from(names: [&str; N]) -> Self {
        EventNames(names.into_iter().map(str::to_owned).collect())
    }
}

impl Async {
    /// Attaches `handler` to every event in `events`; returns one id per event.
    ///
    /// If attaching to any event fails, the listeners attached so far are
    /// cleared and the error is returned.
    pub fn on<E, R>(
        &self,
        emitter: &R,
        events: impl Into<EventNames>,
        handler: impl Fn(&E) + 'static,
        opts: TaskOptions,
    ) -> Result<Vec<OperationId>, AsyncError>
    where
        E: Clone + 'static,
        R: Emitter<E> + ?Sized,
    {
        let names = events.into();
        if names.is_empty() {
            return Err(AsyncError::configuration("no event names given"));
        }

        let handler: Rc<dyn Fn(&E)> = Rc::new(handler);
        let mut ids = Vec::with_capacity(names.len());
        for name in names.iter() {
            let handler = Rc::clone(&handler);
            let payload = move |event: E| {
                handler(&event);
                Outcome::Continue
            };
            match self.listen(emitter, name, payload, opts.clone(), None) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    for id in ids {
                        self.clear_listener(id);
                    }
                    return Err(err);
                }
            }
        }
        Ok(ids)
    }

    /// [`on`](Self::on) with `single(true)`: each listener runs at most once.
    pub fn once<E, R>(
        &self,
        emitter: &R,
        events: impl Into<EventNames>,
        handler: impl Fn(&E) + 'static,
        opts: TaskOptions,
    ) -> Result<Vec<OperationId>, AsyncError>
    where
        E: Clone + 'static,
        R: Emitter<E> + ?Sized,
    {
        self.on(emitter, events, handler, opts.single(true))
    }

    /// Detaches the listeners selected by `addr`.
    pub fn off(&self, addr: impl Into<crate::core::Address>) -> usize {
        self.clear_listener(addr)
    }

    controls!(
        OperationKind::EventListener,
        "listener",
        clear_listener,
        mute_listener,
        unmute_listener,
        suspend_listener,
        unsuspend_listener
    );

    /// Registers one listener link for `name`.
    pub(crate) fn listen<E, R>(
        &self,
        emitter: &R,
        name: &str,
        payload: impl Fn(E) -> Outcome + 'static,
        opts: TaskOptions,
        continuation: Option<Continuation>,
    ) -> Result<OperationId, AsyncError>
    where
        E: Clone + 'static,
        R: Emitter<E> + ?Sized,
    {
        let single = opts.single.unwrap_or(false);
        let opts = opts.with_group_if_unset(|| Key::from(name));
        let remover: Rc<RefCell<Option<Unsubscribe>>> = Rc::default();
        let native_once = Rc::new(Cell::new(false));

        let attach = {
            let remover = Rc::clone(&remover);
            let native_once = Rc::clone(&native_once);
            move |trampoline: Trampoline<E>| {
                let listener: Listener<E> = Rc::new(move |event: &E| trampoline.call(event.clone()));
                let native = if single {
                    emitter.add_once_listener(name, Rc::clone(&listener))
                } else {
                    None
                };
                let unsubscribe = match native {
                    Some(result) => {
                        native_once.set(true);
                        result?
                    }
                    None => emitter.add_listener(name, listener)?,
                };
                *remover.borrow_mut() = Some(unsubscribe);

                let clear: ClearFn = Box::new(move |_: &ClearContext| {
                    let unsubscribe = remover.borrow_mut().take();
                    if let Some(unsubscribe) = unsubscribe {
                        unsubscribe();
                    }
                });
                Ok(Some(clear))
            }
        };

        let reg = Registration::new(OperationKind::EventListener, opts, payload)
            .periodic(!single)
            .wrapper(attach)
            .detach(move || {
                let unsubscribe = remover.borrow_mut().take();
                if !native_once.get()
                    && let Some(unsubscribe) = unsubscribe
                {
                    unsubscribe();
                }
            });
        self.register_with(reg, continuation)
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::core::Address;
    use crate::emitter::{EmitterFn, EventEmitter};
    use crate::host::Host;
    use crate::worker::WorkerTable;

    fn tasks() -> Async {
        Async::builder(Host::new())
            .with_worker_table(WorkerTable::new())
            .build()
    }

    fn counter() -> (Rc<Cell<u32>>, impl Fn(&u32) + Clone + 'static) {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        (hits, move |n: &u32| h.set(h.get() + n))
    }

    #[test]
    fn space_separated_names_get_one_link_each() {
        let tasks = tasks();
        let emitter = EventEmitter::<u32>::new();
        let (hits, handler) = counter();

        let ids = tasks
            .on(&emitter, "open close", handler, TaskOptions::new())
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(emitter.listener_count("open"), 1);
        assert_eq!(emitter.listener_count("close"), 1);

        emitter.emit("open", &1);
        emitter.emit("close", &10);
        emitter.emit("open", &100);
        assert_eq!(hits.get(), 111);
    }

    #[test]
    fn listeners_are_grouped_by_event_name() {
        let tasks = tasks();
        let emitter = EventEmitter::<u32>::new();
        let (_, handler) = counter();
        tasks
            .on(&emitter, ["open", "close"], handler, TaskOptions::new())
            .unwrap();

        assert_eq!(tasks.off(Address::new().group("open")), 1);
        assert_eq!(emitter.listener_count("open"), 0);
        assert_eq!(emitter.listener_count("close"), 1);
    }

    #[test]
    fn off_unsubscribes_exactly_once() {
        let tasks = tasks();
        let emitter = EventEmitter::<u32>::new();
        let (hits, handler) = counter();
        let ids = tasks.on(&emitter, "tick", handler, TaskOptions::new()).unwrap();

        assert_eq!(tasks.off(ids[0]), 1);
        assert_eq!(tasks.off(ids[0]), 0);
        assert_eq!(emitter.emit("tick", &1), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn once_detaches_before_the_handler_runs() {
        let tasks = tasks();
        let emitter = EventEmitter::<u32>::new();
        let (hits, handler) = counter();
        let ids = tasks.once(&emitter, "tick", handler, TaskOptions::new()).unwrap();

        emitter.emit("tick", &1);
        emitter.emit("tick", &1);
        assert_eq!(hits.get(), 1);
        assert_eq!(emitter.listener_count("tick"), 0);
        assert!(!tasks.contains(&OperationKind::EventListener, ids[0]));
    }

    #[test]
    fn native_once_is_not_unsubscribed_twice() {
        struct NativeOnce {
            inner: EventEmitter<u32>,
            removals: Rc<Cell<u32>>,
        }

        impl Emitter<u32> for NativeOnce {
            fn add_listener(
                &self,
                event: &str,
                listener: Listener<u32>,
            ) -> Result<Unsubscribe, AsyncError> {
                self.inner.add_listener(event, listener)
            }

            fn add_once_listener(
                &self,
                event: &str,
                listener: Listener<u32>,
            ) -> Option<Result<Unsubscribe, AsyncError>> {
                let removals = Rc::clone(&self.removals);
                let unsubscribe = self.inner.on(event, move |n: &u32| listener(n));
                Some(Ok(Box::new(move || {
                    removals.set(removals.get() + 1);
                    unsubscribe();
                })))
            }
        }

        let tasks = tasks();
        let emitter = NativeOnce {
            inner: EventEmitter::new(),
            removals: Rc::default(),
        };
        let (hits, handler) = counter();
        tasks.once(&emitter, "tick", handler, TaskOptions::new()).unwrap();

        emitter.inner.emit("tick", &1);
        assert_eq!(hits.get(), 1);
        assert_eq!(emitter.removals.get(), 0);
    }

    #[test]
    fn emitter_without_remover_rejects_and_rolls_back() {
        let tasks = tasks();
        let emitter = EmitterFn::new(|event: &str, _: Listener<u32>| -> Option<Unsubscribe> {
            (event == "ok").then(|| Box::new(|| {}) as Unsubscribe)
        });
        let (_, handler) = counter();

        let err = tasks
            .on(&emitter, "ok broken", handler, TaskOptions::new())
            .unwrap_err();
        assert_eq!(err.as_label(), "async_configuration");
        assert!(tasks.is_empty(&OperationKind::EventListener));
    }

    #[test]
    fn empty_event_list_is_rejected() {
        let tasks = tasks();
        let emitter = EventEmitter::<u32>::new();
        let (_, handler) = counter();
        assert!(tasks.on(&emitter, "  ", handler, TaskOptions::new()).is_err());
    }

    #[test]
    fn once_event_resolves_with_the_payload() {
        let tasks = tasks();
        let emitter = EventEmitter::<u32>::new();
        let next = tasks.once_event(&emitter, "tick", TaskOptions::new());

        emitter.emit("tick", &7);
        emitter.emit("tick", &8);
        assert_eq!(next.now_or_never().expect("settled").unwrap(), 7);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn muted_listener_skips_dispatches() {
        let tasks = tasks();
        let emitter = EventEmitter::<u32>::new();
        let (hits, handler) = counter();
        tasks.on(&emitter, "tick", handler, TaskOptions::new()).unwrap();

        tasks.mute_listener(Address::new().group("tick"));
        emitter.emit("tick", &1);
        tasks.unmute_listener(Address::new().group("tick"));
        emitter.emit("tick", &2);
        assert_eq!(hits.get(), 2);
    }
}
