use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use regex::Regex;

use crate::config::AsyncConfig;
use crate::error::AsyncError;
use crate::events::EventKind;
use crate::facades::Awaitable;
use crate::host::{Host, ManualHost};
use crate::registry::{ClearContext, ClearFn, ClearReason, Join, OperationKind, Outcome};
use crate::worker::WorkerTable;

use super::{Address, Async, Mark, Registration, TaskOptions};

const TICK: Duration = Duration::from_millis(10);

fn setup() -> (ManualHost, Async) {
    setup_with(AsyncConfig::default())
}

fn setup_with(cfg: AsyncConfig) -> (ManualHost, Async) {
    let host = ManualHost::new();
    let tasks = Async::builder(host.host())
        .with_config(cfg)
        .with_worker_table(WorkerTable::new())
        .build();
    (host, tasks)
}

fn counter() -> (Rc<Cell<u32>>, impl Fn() + Clone + 'static) {
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();
    (hits, move || h.set(h.get() + 1))
}

#[test]
fn clear_is_idempotent_and_cancels_the_host_timer() {
    let (host, tasks) = setup();
    let (hits, bump) = counter();
    let id = tasks.set_timeout(bump, TICK, TaskOptions::new()).unwrap();
    assert_eq!(host.pending_timers(), 1);

    assert_eq!(tasks.clear_timeout(id), 1);
    assert_eq!(tasks.clear_timeout(id), 0);
    assert_eq!(host.pending_timers(), 0);

    host.advance(TICK * 5);
    assert_eq!(hits.get(), 0);
}

#[test]
fn clear_handlers_run_in_order_before_teardown() {
    let (_host, tasks) = setup();
    let kind = OperationKind::custom("jobs");
    let log = Rc::new(RefCell::new(Vec::new()));

    let (a, b, t) = (log.clone(), log.clone(), log.clone());
    let opts = TaskOptions::new()
        .on_clear(move |_| a.borrow_mut().push("first"))
        .on_clear(move |_| b.borrow_mut().push("second"));
    let reg = Registration::new(kind.clone(), opts, |()| Outcome::Continue).wrapper(move |_| {
        let teardown: ClearFn = Box::new(move |_: &ClearContext| t.borrow_mut().push("teardown"));
        Ok(Some(teardown))
    });
    let id = tasks.inner.register(reg).unwrap().id;

    assert_eq!(tasks.clear(&kind, id), 1);
    assert_eq!(*log.borrow(), vec!["first", "second", "teardown"]);
}

#[test]
fn join_yes_merges_into_the_occupant() {
    let (host, tasks) = setup();
    let (first_hits, first) = counter();
    let (second_hits, second) = counter();
    let merges = Rc::new(Cell::new(0));

    let id = tasks
        .set_timeout(first, TICK, TaskOptions::new().label("x"))
        .unwrap();
    for _ in 0..3 {
        let m = merges.clone();
        let merged = tasks
            .set_timeout(
                second.clone(),
                TICK,
                TaskOptions::new()
                    .label("x")
                    .join(Join::Yes)
                    .on_merge(move |info| {
                        assert_eq!(info.id, id);
                        m.set(m.get() + 1);
                    }),
            )
            .unwrap();
        assert_eq!(merged, id);
    }

    assert_eq!(merges.get(), 3);
    assert_eq!(tasks.len(&OperationKind::Timeout), 1);
    host.advance(TICK);
    assert_eq!((first_hits.get(), second_hits.get()), (1, 0));
}

#[test]
fn join_no_collision_rejects_the_occupants_caller() {
    let (host, tasks) = setup();
    let evicted = tasks.sleep(TICK, TaskOptions::new().label("x"));
    let newcomer = tasks
        .set_timeout(|| {}, TICK, TaskOptions::new().label("x"))
        .unwrap();

    let err = evicted.now_or_never().expect("settled").unwrap_err();
    assert!(err.is_collision());
    let ctx = err.clear_context().expect("context");
    assert_eq!(ctx.replaced_by, Some(newcomer));
    assert_eq!(ctx.reason, ClearReason::Replaced);
    assert_eq!(host.pending_timers(), 1);
}

#[test]
fn join_replace_hands_callers_to_the_newcomer() {
    let (host, tasks) = setup();
    let cleared = Rc::new(Cell::new(0));
    let c = cleared.clone();

    let first = tasks.sleep(
        TICK * 10,
        TaskOptions::new()
            .label("x")
            .on_clear(move |_| c.set(c.get() + 1)),
    );
    let second = tasks.sleep(TICK, TaskOptions::new().label("x").join(Join::Replace));
    assert_ne!(first.id(), second.id());
    assert_eq!(cleared.get(), 1);

    host.advance(TICK);
    assert!(second.now_or_never().expect("settled").is_ok());
    assert!(first.now_or_never().expect("settled").is_ok());
    assert_eq!(host.pending_timers(), 0);
}

#[test]
fn replace_chain_stops_handing_over_at_the_configured_depth() {
    let cfg = AsyncConfig {
        max_replace_depth: 2,
        ..AsyncConfig::default()
    };
    let (host, tasks) = setup_with(cfg);
    let replace = || TaskOptions::new().label("x").join(Join::Replace);

    let a = tasks.sleep(TICK, TaskOptions::new().label("x"));
    let b = tasks.sleep(TICK, replace());
    let c = tasks.sleep(TICK, replace());
    // c sits at depth 2: evicting it rejects every caller parked on it.
    let d = tasks.sleep(TICK, replace());

    host.advance(TICK);
    for rejected in [a, b, c] {
        let err = rejected.now_or_never().expect("settled").unwrap_err();
        assert!(err.is_collision(), "unexpected error: {err}");
    }
    assert!(d.now_or_never().expect("settled").is_ok());
}

#[test]
fn suspended_one_shot_replays_once_with_its_arguments() {
    let (_host, tasks) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    let proxy = tasks
        .proxy(move |n: i32| s.borrow_mut().push(n), TaskOptions::new())
        .unwrap();

    assert_eq!(tasks.suspend_proxy(proxy.id()), 1);
    proxy.call(7);
    proxy.call(8);
    assert!(seen.borrow().is_empty());
    let info = tasks.info(&OperationKind::Proxy, proxy.id()).expect("still registered");
    assert!(info.paused && info.muted);

    assert_eq!(tasks.unsuspend_proxy(proxy.id()), 1);
    assert_eq!(*seen.borrow(), vec![7]);
    assert!(!tasks.contains(&OperationKind::Proxy, proxy.id()));
}

#[test]
fn muted_one_shot_is_dropped_and_its_caller_abandoned() {
    let (host, tasks) = setup();
    let sleeping = tasks.sleep(TICK, TaskOptions::new());
    let id = sleeping.id().unwrap();

    assert_eq!(tasks.mute_timeout(id), 1);
    host.advance(TICK);

    assert!(!tasks.contains(&OperationKind::Timeout, id));
    let err = sleeping.now_or_never().expect("settled").unwrap_err();
    assert!(matches!(err, AsyncError::Abandoned));
}

#[test]
fn muted_periodic_keeps_its_registration() {
    let (host, tasks) = setup();
    let (hits, bump) = counter();
    let id = tasks.set_interval(bump, TICK, TaskOptions::new()).unwrap();

    tasks.mark(&OperationKind::Interval, Mark::Muted, id);
    host.advance(TICK * 3);
    assert_eq!(hits.get(), 0);
    assert!(tasks.contains(&OperationKind::Interval, id));

    tasks.unmute_interval(id);
    host.advance(TICK);
    assert_eq!(hits.get(), 1);
}

#[test]
fn suspended_periodic_drops_firings_instead_of_queueing() {
    let (host, tasks) = setup();
    let (hits, bump) = counter();
    let id = tasks.set_interval(bump, TICK, TaskOptions::new()).unwrap();

    tasks.suspend_interval(id);
    host.advance(TICK * 3);
    tasks.unsuspend_interval(id);
    assert_eq!(hits.get(), 0);

    host.advance(TICK);
    assert_eq!(hits.get(), 1);
}

#[test]
fn group_pattern_reaches_every_matching_group() {
    let (_host, tasks) = setup();
    for group in ["net:search", "net:load", "ui"] {
        tasks
            .set_interval(|| {}, TICK, TaskOptions::new().group(group))
            .unwrap();
    }

    let pattern = Regex::new("^net:").unwrap();
    assert_eq!(tasks.clear_interval(Address::new().group_matching(pattern)), 2);
    assert_eq!(tasks.len(&OperationKind::Interval), 1);
}

#[test]
fn ids_resolve_without_their_group() {
    let (_host, tasks) = setup();
    let id = tasks
        .set_timeout(|| {}, TICK, TaskOptions::new().group("g"))
        .unwrap();
    assert_eq!(tasks.clear_timeout(Address::new().group("other").id(id)), 0);
    assert_eq!(tasks.clear_timeout(id), 1);
}

#[test]
fn label_only_address_reaches_root_and_groups() {
    let (_host, tasks) = setup();
    for group in [None, Some("g1"), Some("g2")] {
        let mut opts = TaskOptions::new().label("x");
        if let Some(group) = group {
            opts = opts.group(group);
        }
        tasks.set_timeout(|| {}, TICK, opts).unwrap();
    }
    tasks
        .set_timeout(|| {}, TICK, TaskOptions::new().label("y"))
        .unwrap();

    assert_eq!(tasks.clear_timeout(Address::new().label("x")), 3);
    assert_eq!(tasks.len(&OperationKind::Timeout), 1);
}

#[test]
fn conflicting_id_and_label_is_a_no_op() {
    let (_host, tasks) = setup();
    tasks
        .set_timeout(|| {}, TICK, TaskOptions::new().label("a"))
        .unwrap();
    let other = tasks.set_timeout(|| {}, TICK, TaskOptions::new()).unwrap();

    assert_eq!(tasks.clear_timeout(Address::new().id(other).label("a")), 0);
    assert_eq!(tasks.len(&OperationKind::Timeout), 2);
}

#[test]
fn wait_resolves_and_unregisters_once_the_predicate_holds() {
    let (host, tasks) = setup();
    let ready = Rc::new(Cell::new(false));
    let r = ready.clone();
    let mut waiting = tasks.wait(move || r.get(), TaskOptions::new());
    let poll = tasks.config().wait_poll;

    host.advance(poll * 2);
    assert!((&mut waiting).now_or_never().is_none());

    ready.set(true);
    host.advance(poll);
    assert!(waiting.now_or_never().expect("settled").is_ok());
    assert_eq!(tasks.len(&OperationKind::Interval), 0);
    assert_eq!(host.pending_timers(), 0);
}

#[test]
fn pending_outcome_settles_on_the_spawner() {
    let (host, tasks) = setup();
    let (continuation, answer) = Awaitable::<u8>::channel();
    let reg = Registration::new(OperationKind::custom("jobs"), TaskOptions::new(), |()| {
        Outcome::pending(async { Ok::<_, anyhow::Error>(5u8) })
    })
    .continuation(continuation);
    let registered = tasks.inner.register(reg).unwrap();

    registered.trampoline.expect("trampoline").call(());
    host.run_until_stalled();
    assert_eq!(answer.now_or_never().expect("settled").unwrap(), 5);
}

#[test]
fn pending_outcome_without_spawner_rejects_callers() {
    let tasks = Async::new(Host::new());
    let (continuation, answer) = Awaitable::<u8>::channel();
    let reg = Registration::new(OperationKind::custom("jobs"), TaskOptions::new(), |()| {
        Outcome::pending(async { Ok::<_, anyhow::Error>(5u8) })
    })
    .continuation(continuation);
    let registered = tasks.inner.register(reg).unwrap();

    registered.trampoline.expect("trampoline").call(());
    let err = answer.now_or_never().expect("settled").unwrap_err();
    assert_eq!(err.as_label(), "async_unavailable");
}

#[test]
fn missing_primitive_is_reported_synchronously() {
    let tasks = Async::new(Host::new());
    let err = tasks
        .set_timeout(|| {}, TICK, TaskOptions::new())
        .unwrap_err();
    assert!(matches!(err, AsyncError::Unavailable { primitive: "timers" }));
}

#[test]
fn events_trace_registration_and_replacement() {
    let (_host, tasks) = setup();
    let mut rx = tasks.subscribe();

    let first = tasks
        .set_timeout(|| {}, TICK, TaskOptions::new().label("x"))
        .unwrap();
    let second = tasks
        .set_timeout(|| {}, TICK, TaskOptions::new().label("x"))
        .unwrap();

    let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(
        kinds.iter().map(|ev| ev.kind).collect::<Vec<_>>(),
        vec![
            EventKind::OperationRegistered,
            EventKind::OperationReplaced,
            EventKind::OperationRegistered,
        ]
    );
    assert_eq!(kinds[1].id, Some(first));
    assert_eq!(kinds[1].replaced_by, Some(second));
}

#[test]
fn handlers_may_reenter_the_registry() {
    let (host, tasks) = setup();
    let (hits, bump) = counter();

    let again = tasks.clone();
    tasks
        .set_timeout(
            move || {
                again.set_timeout(bump, TICK, TaskOptions::new()).unwrap();
            },
            TICK,
            TaskOptions::new().on_clear(|_| {}),
        )
        .unwrap();

    host.advance(TICK * 2);
    assert_eq!(hits.get(), 1);
    assert!(tasks.is_empty(&OperationKind::Timeout));
}

#[test]
fn muted_then_suspended_one_shot_does_not_linger() {
    let (host, tasks) = setup();
    let (hits, bump) = counter();
    let sleeping = tasks.sleep(TICK, TaskOptions::new());
    let id = tasks.set_timeout(bump, TICK, TaskOptions::new()).unwrap();
    let sleep_id = sleeping.id().unwrap();

    for target in [id, sleep_id] {
        tasks.mute_timeout(target);
        tasks.suspend_timeout(target);
    }
    host.advance(TICK * 2);

    assert!(!tasks.contains(&OperationKind::Timeout, id));
    assert!(!tasks.contains(&OperationKind::Timeout, sleep_id));
    assert!(matches!(
        sleeping.now_or_never().expect("settled"),
        Err(AsyncError::Abandoned)
    ));

    assert_eq!(tasks.unsuspend_timeout(id), 0);
    assert_eq!(tasks.unmute_timeout(id), 0);
    host.advance(TICK * 10);
    assert_eq!(hits.get(), 0);
    assert_eq!(tasks.len(&OperationKind::Timeout), 0);
}

#[test]
fn label_collision_keeps_only_the_newcomer() {
    let (host, tasks) = setup();
    let ran = Rc::new(RefCell::new(Vec::new()));
    let contexts = Rc::new(RefCell::new(Vec::new()));

    let (r, c) = (ran.clone(), contexts.clone());
    tasks
        .set_timeout(
            move || r.borrow_mut().push("first"),
            TICK * 10,
            TaskOptions::new()
                .label("x")
                .on_clear(move |ctx| c.borrow_mut().push(ctx.clone())),
        )
        .unwrap();
    let r = ran.clone();
    let second = tasks
        .set_timeout(
            move || r.borrow_mut().push("second"),
            TICK * 5,
            TaskOptions::new().label("x"),
        )
        .unwrap();

    assert_eq!(contexts.borrow().len(), 1);
    let ctx = contexts.borrow()[0].clone();
    assert_eq!(ctx.replaced_by, Some(second));
    assert_eq!(ctx.reason, ClearReason::Replaced);

    host.advance(TICK * 11);
    assert_eq!(*ran.borrow(), vec!["second"]);
    assert_eq!(contexts.borrow().len(), 1);
}

#[test]
fn group_clear_stops_further_ticks() {
    let (host, tasks) = setup();
    let (hits, bump) = counter();
    tasks
        .set_interval(bump.clone(), TICK, TaskOptions::new().group("g"))
        .unwrap();
    tasks
        .set_interval(bump, TICK, TaskOptions::new().group("g"))
        .unwrap();

    host.advance(TICK * 2);
    assert_eq!(hits.get(), 4);

    assert_eq!(tasks.clear_interval(Address::new().group("g")), 2);
    host.advance(TICK * 5);
    assert_eq!(hits.get(), 4);
    assert_eq!(host.pending_timers(), 0);
}

#[test]
fn suspended_timeout_runs_once_on_unsuspend() {
    let (host, tasks) = setup();
    let (hits, bump) = counter();
    let id = tasks.set_timeout(bump, TICK, TaskOptions::new()).unwrap();

    tasks.suspend_timeout(id);
    host.advance(TICK * 3);
    assert_eq!(hits.get(), 0);
    assert!(tasks.contains(&OperationKind::Timeout, id));

    assert_eq!(tasks.unsuspend_timeout(id), 1);
    assert_eq!(hits.get(), 1);
    assert!(!tasks.contains(&OperationKind::Timeout, id));

    host.advance(TICK * 3);
    assert_eq!(hits.get(), 1);
}

#[test]
fn replace_without_callers_runs_clear_handlers_only_at_eviction() {
    let (host, tasks) = setup();
    let cleared = Rc::new(Cell::new(0));

    let c = cleared.clone();
    tasks
        .set_timeout(
            || {},
            TICK,
            TaskOptions::new()
                .label("x")
                .on_clear(move |_| c.set(c.get() + 1)),
        )
        .unwrap();
    let survivor = tasks
        .set_timeout(|| {}, TICK, TaskOptions::new().label("x").join(Join::Replace))
        .unwrap();
    assert_eq!(cleared.get(), 1);

    assert_eq!(tasks.clear_timeout(survivor), 1);
    host.advance(TICK);
    assert_eq!(cleared.get(), 1);
}
