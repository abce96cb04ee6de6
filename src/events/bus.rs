//! # Event bus for broadcasting registry events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. The engines
//! publish from inside synchronous calls, so publishing must never block and
//! must not need a running executor; `broadcast::Sender::send` satisfies both.
//!
//! ## Rules
//! - `publish()` returns immediately, from any engine call, with or without an executor.
//! - One ring buffer of `bus_capacity` events is shared by every receiver.
//! - A receiver that falls behind sees `RecvError::Lagged(n)` and resumes at the oldest kept event.
//! - Events sent while nobody subscribes are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for registry events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Sends `ev` to every live receiver; dropped when there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// True if at least one receiver is alive.
    ///
    /// Lets hot paths skip building events nobody will see.
    #[inline]
    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn publish_without_receivers_is_a_no_op() {
        let bus = Bus::new(0);
        assert!(!bus.has_subscribers());
        bus.publish(Event::new(EventKind::OperationFired));
    }

    #[test]
    fn receivers_see_events_in_order() {
        let bus = Bus::new(4);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::OperationRegistered));
        bus.publish(Event::new(EventKind::OperationCleared));

        let first = rx.try_recv().expect("first");
        let second = rx.try_recv().expect("second");
        assert_eq!(first.kind, EventKind::OperationRegistered);
        assert_eq!(second.kind, EventKind::OperationCleared);
        assert!(second.seq > first.seq);
    }
}
