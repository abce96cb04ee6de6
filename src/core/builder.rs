use std::rc::Rc;

use tracing::debug;

use crate::config::AsyncConfig;
use crate::host::Host;
use crate::worker::WorkerTable;

use super::handle::{Async, Inner};

/// Builder for constructing an [`Async`] instance with optional settings.
///
/// # Example
/// ```
/// use asyncvisor::{Async, AsyncConfig, ManualHost, WorkerTable};
///
/// let host = ManualHost::new();
/// let cfg = AsyncConfig { max_replace_depth: 3, ..AsyncConfig::default() };
/// let tasks = Async::builder(host.host())
///     .with_config(cfg)
///     .with_worker_table(WorkerTable::new())
///     .build();
/// assert_eq!(tasks.config().max_replace_depth, 3);
/// ```
#[derive(Debug)]
pub struct AsyncBuilder {
    host: Host,
    cfg: AsyncConfig,
    workers: Option<WorkerTable>,
}

impl AsyncBuilder {
    /// Creates a new builder over the given host primitives.
    pub fn new(host: Host) -> Self {
        Self {
            host,
            cfg: AsyncConfig::default(),
            workers: None,
        }
    }

    /// Replaces the default configuration.
    pub fn with_config(mut self, cfg: AsyncConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Uses `table` for worker reference counts.
    ///
    /// Instances sharing a table jointly decide when a worker is terminated.
    /// Without this call the thread-local [`WorkerTable::shared`] is used.
    pub fn with_worker_table(mut self, table: WorkerTable) -> Self {
        self.workers = Some(table);
        self
    }

    /// Builds and returns the instance.
    ///
    /// This consumes the builder and initializes:
    /// - Event bus for broadcasting
    /// - An empty registry
    pub fn build(self) -> Async {
        let workers = self.workers.unwrap_or_else(WorkerTable::shared);
        debug!(host = ?self.host, cfg = ?self.cfg, "async registry created");
        Async::from_inner(Rc::new(Inner::new(self.host, self.cfg, workers)))
    }
}
