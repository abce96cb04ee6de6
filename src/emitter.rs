//! # Event emitters driven by the listener façade.
//!
//! [`Emitter`] is the seam between the registry and whatever dispatches
//! events. An emitter must hand back an [`Unsubscribe`] for every listener
//! it accepts; the registry calls it when the listener link is cleared.
//!
//! Two implementations ship with the crate:
//! - [`EventEmitter`] a minimal in-process emitter keyed by event name
//! - [`EmitterFn`] adapts a closure `Fn(&str, Listener<E>) -> Option<Unsubscribe>`
//!
//! ## Example
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use asyncvisor::{Async, EventEmitter, Host, TaskOptions};
//!
//! let tasks = Async::new(Host::new());
//! let emitter = EventEmitter::<u32>::new();
//! let seen = Rc::new(Cell::new(0));
//!
//! let s = seen.clone();
//! let ids = tasks
//!     .on(&emitter, "tick", move |n: &u32| s.set(*n), TaskOptions::new())
//!     .unwrap();
//!
//! emitter.emit("tick", &7);
//! assert_eq!(seen.get(), 7);
//!
//! tasks.clear_listener(ids[0]);
//! assert_eq!(emitter.listener_count("tick"), 0);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::AsyncError;

/// Listener handed to an emitter.
pub type Listener<E> = Rc<dyn Fn(&E)>;

/// Removes a listener from its emitter.
pub type Unsubscribe = Box<dyn FnOnce()>;

/// Something listeners can be attached to and removed from.
pub trait Emitter<E> {
    /// Attaches a persistent listener for `event`.
    fn add_listener(&self, event: &str, listener: Listener<E>) -> Result<Unsubscribe, AsyncError>;

    /// Attaches a listener the emitter removes itself after the first dispatch.
    ///
    /// Returns `None` when the emitter has no native once; the registry then
    /// unsubscribes the listener itself before the handler runs.
    fn add_once_listener(
        &self,
        event: &str,
        listener: Listener<E>,
    ) -> Option<Result<Unsubscribe, AsyncError>> {
        let _ = (event, listener);
        None
    }
}

/// Closure-backed emitter.
///
/// The closure returns `None` when it cannot remove the listener later,
/// which makes registration fail with [`AsyncError::Configuration`].
pub struct EmitterFn<F> {
    f: F,
}

impl<F> EmitterFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<E, F> Emitter<E> for EmitterFn<F>
where
    F: Fn(&str, Listener<E>) -> Option<Unsubscribe>,
{
    fn add_listener(&self, event: &str, listener: Listener<E>) -> Result<Unsubscribe, AsyncError> {
        (self.f)(event, listener).ok_or_else(|| {
            AsyncError::configuration(format!("emitter cannot remove listeners of `{event}`"))
        })
    }
}

impl<F> fmt::Debug for EmitterFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EmitterFn(..)")
    }
}

struct Slots<E> {
    next: u64,
    listeners: HashMap<String, Vec<(u64, Listener<E>)>>,
}

/// Minimal single-threaded event emitter.
///
/// Cloning yields another handle to the same listener table.
pub struct EventEmitter<E> {
    slots: Rc<RefCell<Slots<E>>>,
}

impl<E: 'static> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                next: 0,
                listeners: HashMap::new(),
            })),
        }
    }

    /// Attaches `listener` to `event` and returns its remover.
    pub fn on(&self, event: &str, listener: impl Fn(&E) + 'static) -> Unsubscribe {
        self.attach(event, Rc::new(listener))
    }

    /// Dispatches `payload` to every listener of `event`; returns how many ran.
    ///
    /// Listeners added or removed during dispatch take effect on the next emit.
    pub fn emit(&self, event: &str, payload: &E) -> usize {
        let snapshot: Vec<Listener<E>> = self
            .slots
            .borrow()
            .listeners
            .get(event)
            .map(|list| list.iter().map(|(_, l)| Rc::clone(l)).collect())
            .unwrap_or_default();
        for listener in &snapshot {
            listener(payload);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.slots
            .borrow()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }

    fn attach(&self, event: &str, listener: Listener<E>) -> Unsubscribe {
        let token = {
            let mut slots = self.slots.borrow_mut();
            slots.next += 1;
            let token = slots.next;
            slots
                .listeners
                .entry(event.to_owned())
                .or_default()
                .push((token, listener));
            token
        };

        let weak: Weak<RefCell<Slots<E>>> = Rc::downgrade(&self.slots);
        let event = event.to_owned();
        Box::new(move || {
            let Some(slots) = weak.upgrade() else { return };
            let mut slots = slots.borrow_mut();
            if let Some(list) = slots.listeners.get_mut(&event) {
                list.retain(|(t, _)| *t != token);
                if list.is_empty() {
                    slots.listeners.remove(&event);
                }
            }
        })
    }
}

impl<E: 'static> Emitter<E> for EventEmitter<E> {
    fn add_listener(&self, event: &str, listener: Listener<E>) -> Result<Unsubscribe, AsyncError> {
        Ok(self.attach(event, listener))
    }
}

impl<E: 'static> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            slots: Rc::clone(&self.slots),
        }
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.borrow();
        f.debug_struct("EventEmitter")
            .field("events", &slots.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn unsubscribe_removes_only_its_listener() {
        let emitter = EventEmitter::<()>::new();
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        let first = emitter.on("ping", move |_| h.set(h.get() + 1));
        let h = hits.clone();
        let _second = emitter.on("ping", move |_| h.set(h.get() + 10));

        assert_eq!(emitter.emit("ping", &()), 2);
        first();
        assert_eq!(emitter.emit("ping", &()), 1);
        assert_eq!(hits.get(), 21);
    }

    #[test]
    fn closure_emitter_without_remover_is_a_configuration_error() {
        let emitter = EmitterFn::new(|_: &str, _: Listener<()>| -> Option<Unsubscribe> { None });
        let listener: Listener<()> = Rc::new(|_: &()| {});
        let err = match emitter.add_listener("x", listener) {
            Err(err) => err,
            Ok(_) => panic!("expected a configuration error"),
        };
        assert_eq!(err.as_label(), "async_configuration");
    }
}
