//! # asyncvisor
//!
//! **Asyncvisor** is a single-threaded registry for the lifecycle of async
//! operations: timers, intervals, immediates, idle callbacks, event
//! listeners, workers, promises, requests and callback proxies.
//!
//! It does not run timers or dispatch events itself. It wraps host
//! primitives and owns the bookkeeping around them: labels, groups, join and
//! replace on label collisions, mute and suspend with replay, and
//! synchronous cancellation.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   set_timeout  set_interval  on/once  worker  proxy  promise/request  sleep/wait/..
//!        │            │           │        │      │          │               │
//!        └────────────┴───────────┴────┬───┴──────┴──────────┴───────────────┘
//!                                      ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  Async (one registry per instance, Rc<Inner>)                            │
//! │  - Registration engine  (labels, join/replace, trampolines)              │
//! │  - Cancellation engine  (id / label / group / group pattern)             │
//! │  - Marking engine       (mute, suspend, replay on unsuspend)             │
//! │  - Bus                  (broadcast of registry events)                   │
//! └──────┬────────────────────────────┬────────────────────────────┬─────────┘
//!        ▼                            ▼                            ▼
//!   Registry                      Host traits                 WorkerTable
//!   kind → KindCache              Timers, Immediates,         worker → holders
//!     root + group Buckets        IdleCallbacks, Spawner      (shared across instances)
//!       label → id, id → Link
//! ```
//!
//! ### Lifecycle
//! ```text
//! register ──► Link inserted ──► host fires trampoline(args)
//!                                   ├─ muted one-shot   ─► dropped silently
//!                                   ├─ paused one-shot  ─► queued, replayed on unsuspend
//!                                   ├─ one-shot         ─► removed, payload runs, callers settle
//!                                   └─ periodic         ─► payload runs, link stays
//!
//! clear / label collision ──► on_clear handlers ──► callers rejected (or handed over
//!                              on Join::Replace) ──► host teardown, exactly once
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Registry**      | Register, clear, mute, suspend operations of any kind.        | [`Async`], [`TaskOptions`], [`Address`]    |
//! | **Hosts**         | Inject timer/idle/spawn primitives, or use a fake clock.      | [`Host`], [`ManualHost`], [`Timers`]       |
//! | **Collaborators** | Emitters and ref-counted workers.                             | [`Emitter`], [`EventEmitter`], [`Worker`]  |
//! | **Awaiting**      | Futures over promises, requests, sleeps and events.           | [`Awaitable`], [`Proxy`]                   |
//! | **Events**        | Observe registrations, firings and clears.                    | [`Event`], [`EventKind`]                   |
//! | **Errors**        | Typed errors for configuration, cancellation and payloads.    | [`AsyncError`]                             |
//! | **Configuration** | Replace-chain cap, `wait` polling, bus capacity.              | [`AsyncConfig`]                            |
//!
//! ## Optional features
//! - `tokio-host` (default): exports `TokioHost`, running primitives on a Tokio `LocalSet`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use futures::FutureExt;
//! use asyncvisor::{Async, Join, ManualHost, OperationKind, TaskOptions};
//!
//! let host = ManualHost::new();
//! let tasks = Async::new(host.host());
//!
//! // Two searches under one label: the second replaces the first and
//! // inherits its waiting caller.
//! let first = tasks.sleep(Duration::from_millis(100), TaskOptions::new().label("search"));
//! let second = tasks.sleep(
//!     Duration::from_millis(50),
//!     TaskOptions::new().label("search").join(Join::Replace),
//! );
//! assert_eq!(tasks.len(&OperationKind::Timeout), 1);
//!
//! host.advance(Duration::from_millis(50));
//! assert!(first.now_or_never().unwrap().is_ok());
//! assert!(second.now_or_never().unwrap().is_ok());
//! ```
mod config;
mod core;
mod emitter;
mod error;
mod events;
mod facades;
mod host;
mod registry;
mod worker;

// ---- Public re-exports ----

pub use config::AsyncConfig;
pub use core::{Address, Async, AsyncBuilder, GroupSelector, Mark, TaskOptions, Trampoline};
pub use emitter::{Emitter, EmitterFn, EventEmitter, Listener, Unsubscribe};
pub use error::AsyncError;
pub use events::{Event, EventKind};
pub use facades::{Awaitable, EventNames, Proxy};
pub use host::{
    Callback, Host, IdleCallback, IdleCallbacks, IdleDeadline, Immediates, ManualHost, NativeId,
    Spawner, Timers,
};
pub use registry::{
    ClearContext, ClearHandler, ClearReason, Join, Key, LinkInfo, MergeHandler, OperationId,
    OperationKind, Outcome, Settled, Value,
};
pub use worker::{Worker, WorkerFn, WorkerRef, WorkerTable};

// Optional: Tokio-backed host.
// Enabled by default with `tokio-host`.
#[cfg(feature = "tokio-host")]
pub use host::TokioHost;
