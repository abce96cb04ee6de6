//! # State-marking engine.
//!
//! Toggles `muted` / `paused` on the links an [`Address`] selects.
//!
//! ## Rules
//! - `Paused` and `Muted` only set a flag; the host primitive keeps firing.
//! - `Unpaused` replays the deferred queue in FIFO order, synchronously and
//!   without any registry borrow held, then clears both flags if the link
//!   still exists.

use std::mem;
use std::rc::Rc;

use tracing::debug;

use crate::events::{Event, EventKind};
use crate::registry::{OperationId, OperationKind};

use super::handle::Inner;
use super::options::{Address, Mark};

impl Inner {
    /// Applies `mark` to every link selected by `addr`; returns how many were found.
    pub(crate) fn mark_scoped(
        self: &Rc<Self>,
        kind: &OperationKind,
        mark: Mark,
        addr: &Address,
        all_groups: bool,
    ) -> usize {
        let ids = self.targets(kind, addr, all_groups);
        ids.into_iter()
            .filter(|&id| self.mark_one(kind, mark, id))
            .count()
    }

    fn mark_one(&self, kind: &OperationKind, mark: Mark, id: OperationId) -> bool {
        let (info, replayed) = match mark {
            Mark::Unpaused => {
                let deferred = {
                    let mut registry = self.registry.borrow_mut();
                    let Some(link) = registry.cache_mut(kind).and_then(|c| c.get_mut(id)) else {
                        return false;
                    };
                    mem::take(&mut link.deferred)
                };
                let replayed = deferred.len();
                for replay in deferred {
                    replay();
                }

                let mut registry = self.registry.borrow_mut();
                let info = registry
                    .cache_mut(kind)
                    .and_then(|c| c.get_mut(id))
                    .map(|link| {
                        link.paused = false;
                        link.muted = false;
                        link.deferred.clear();
                        link.info()
                    });
                (info, replayed)
            }
            flag => {
                let mut registry = self.registry.borrow_mut();
                let Some(link) = registry.cache_mut(kind).and_then(|c| c.get_mut(id)) else {
                    return false;
                };
                match flag {
                    Mark::Paused => link.paused = true,
                    Mark::Muted => link.muted = true,
                    Mark::Unmuted => link.muted = false,
                    Mark::Unpaused => {}
                }
                (Some(link.info()), 0)
            }
        };

        debug!(kind = %kind, id = %id, mark = mark.as_str(), replayed, "operation marked");

        let event = match mark {
            Mark::Paused => EventKind::OperationSuspended,
            Mark::Muted => EventKind::OperationMuted,
            Mark::Unmuted => EventKind::OperationUnmuted,
            Mark::Unpaused => EventKind::OperationUnsuspended,
        };
        self.publish(|| {
            let ev = match &info {
                Some(info) => Event::for_link(event, info),
                None => Event::new(event).with_operation(kind.clone()).with_id(id),
            };
            if mark == Mark::Unpaused {
                ev.with_reason(format!("replayed {replayed}"))
            } else {
                ev
            }
        });
        true
    }
}
