//! Worker façade: ref-counted handles released on clear.

use tracing::debug;

use crate::core::{Async, Registration, TaskOptions};
use crate::error::AsyncError;
use crate::events::{Event, EventKind};
use crate::registry::{ClearContext, ClearFn, OperationId, OperationKind, Outcome};
use crate::worker::{WorkerRef, identity};

impl Async {
    /// Holds `worker` until the returned operation is cleared.
    ///
    /// The worker is terminated when every holder sharing this instance's
    /// [`WorkerTable`](crate::WorkerTable) has released it. Registering the
    /// same worker twice on one instance returns the existing id.
    pub fn worker(&self, worker: WorkerRef, opts: TaskOptions) -> Result<OperationId, AsyncError> {
        let key = identity(&worker);
        let held = self.inner.held_workers.borrow().get(&key).copied();
        if let Some(id) = held
            && self.contains(&OperationKind::Worker, id)
        {
            return Ok(id);
        }

        let periodic = !opts.single.unwrap_or(false);
        let table = self.inner.workers.clone();
        let weak = self.downgrade();

        let reg = Registration::new(OperationKind::Worker, opts, |()| Outcome::Continue)
            .periodic(periodic)
            .wrapper(move |_| {
                table.acquire(&worker);
                let clear: ClearFn = Box::new(move |ctx: &ClearContext| {
                    let Some(inner) = weak.upgrade() else {
                        table.release(&worker);
                        return;
                    };
                    {
                        let mut held = inner.held_workers.borrow_mut();
                        if held.get(&key) == Some(&ctx.id) {
                            held.remove(&key);
                        }
                    }
                    if table.release(&worker) {
                        debug!(id = %ctx.id, "worker terminated");
                        inner.publish(|| {
                            Event::new(EventKind::WorkerTerminated)
                                .with_operation(OperationKind::Worker)
                                .with_id(ctx.id)
                        });
                    }
                });
                Ok(Some(clear))
            });

        let registered = self.inner.register(reg)?;
        if !registered.merged {
            self.inner
                .held_workers
                .borrow_mut()
                .insert(key, registered.id);
        }
        Ok(registered.id)
    }

    controls!(
        OperationKind::Worker,
        "worker",
        clear_worker,
        mute_worker,
        unmute_worker,
        suspend_worker,
        unsuspend_worker
    );
}
