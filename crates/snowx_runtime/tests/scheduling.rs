//! End-to-end scheduling tests for `snowx_runtime`.
//!
//! These tests register callbacks through [`Runtime::register`] and drive
//! them through the scheduler managers, the bus and the distributor.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::sync::Arc;

use parking_lot::Mutex;
use snowx_runtime::prelude::*;
use snowx_system::config::RuntimeLimits;

static MESSAGE: EventKind = EventKind::new("Message", &BASE_EVENT);
static GROUP_MESSAGE: EventKind = EventKind::new("GroupMessage", &MESSAGE);
static HEARTBEAT: EventKind = EventKind::new("Heartbeat", &BASE_EVENT);
static REPLY: EventKind = EventKind::new("Reply", &BASE_EVENT);

fn runtime() -> Runtime {
    Runtime::new(RuntimeLimits::default())
}

/// A handler for a supertype receives subtype events; unrelated handlers do not.
#[tokio::test]
async fn process_callbacks_receive_subtypes_through_the_distributor() {
    let runtime = runtime();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for kind in [&MESSAGE, &HEARTBEAT] {
        let seen = Arc::clone(&seen);
        let callback = Callback::new(kind.name(), move |ctx: Context| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push((kind.name(), ctx.event().map(|event| event.kind().name())));
                Ok::<_, CallbackError>(())
            }
        });
        runtime
            .register(CallbackType::Process, "chat", callback, CallbackOptions::new().subscribe(kind))
            .unwrap();
    }

    runtime.distributor().start();
    assert!(runtime.process_scheduler().start("chat"));

    runtime.bus().publish(Event::custom(&GROUP_MESSAGE, "hello")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    runtime.process_scheduler().stop("chat", false).await;
    runtime.distributor().stop(false).await;

    assert_eq!(*seen.lock(), [("Message", Some("GroupMessage"))]);
}

/// Successful process output is published back onto the bus.
#[tokio::test]
async fn process_output_is_republished() {
    let runtime = runtime();
    let replies = Arc::new(AtomicU32::new(0));

    let responder = Callback::new("responder", |ctx: Context| async move {
        let text = ctx.event().and_then(|event| event.payload::<&str>()).copied();
        Ok::<_, CallbackError>(text.map(|text| Event::custom(&REPLY, text.len())))
    });
    let counter = Arc::clone(&replies);
    let listener = Callback::new("listener", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CallbackError>(())
        }
    });

    runtime
        .register(CallbackType::Process, "bot", responder, CallbackOptions::new().subscribe(&MESSAGE))
        .unwrap();
    runtime
        .register(CallbackType::Process, "log", listener, CallbackOptions::new().subscribe(&REPLY))
        .unwrap();

    runtime.distributor().start();
    runtime.process_scheduler().start("bot");
    runtime.process_scheduler().start("log");

    runtime.bus().publish(Event::custom(&MESSAGE, "ping")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(replies.load(Ordering::SeqCst), 1);

    runtime.process_scheduler().stop_all(false).await;
    runtime.distributor().stop(false).await;
}

/// Three attempts, then a failed result with no payload.
#[tokio::test]
async fn retry_executor_exhausts_its_budget() {
    let runtime = runtime();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let flaky = Callback::new("flaky", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CallbackError::failed("still broken"))
        }
    });

    runtime
        .register(
            CallbackType::Init,
            "flaky",
            flaky,
            CallbackOptions::new().with_executor(RetryExecutor::new(None, 2, Duration::ZERO)),
        )
        .unwrap();

    runtime.init_scheduler().start("flaky");
    let results = runtime.init_scheduler().get_result("flaky").await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(results.len(), 1);
    assert!(!results[0].succeeded());
    assert!(results[0].payload().is_none());
    assert!(!runtime.init_scheduler().is_running("flaky"));
}

fn register_sleeper(runtime: &Runtime, runs: &Arc<AtomicU32>, interval: Duration) {
    let counter = Arc::clone(runs);
    let sleeper = Callback::new("sleeper", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CallbackError>(())
        }
    });
    runtime
        .register(
            CallbackType::Autorun,
            "worker",
            sleeper,
            CallbackOptions::new().with_trigger(Pause(interval)),
        )
        .unwrap();
}

struct Pause(Duration);

#[async_trait::async_trait]
impl Trigger for Pause {
    async fn wait(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// Graceful stop waits for the in-flight run.
#[tokio::test(start_paused = true)]
async fn autorun_graceful_stop_waits_for_in_flight_run() {
    let runtime = runtime();
    let runs = Arc::new(AtomicU32::new(0));
    register_sleeper(&runtime, &runs, Duration::from_millis(10));

    runtime.autorun_scheduler().start("worker");
    // First run: fires at 10ms, holds its lock until 110ms.
    tokio::time::sleep(Duration::from_millis(11)).await;

    let started = tokio::time::Instant::now();
    runtime.autorun_scheduler().stop("worker", false).await;
    assert!(started.elapsed() >= Duration::from_millis(99));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Forced stop cancels the in-flight run right away.
#[tokio::test(start_paused = true)]
async fn autorun_forced_stop_cancels_in_flight_run() {
    let runtime = runtime();
    let runs = Arc::new(AtomicU32::new(0));
    register_sleeper(&runtime, &runs, Duration::from_millis(10));

    runtime.autorun_scheduler().start("worker");
    // First run: fires at 10ms, holds its lock until 110ms.
    tokio::time::sleep(Duration::from_millis(11)).await;

    let started = tokio::time::Instant::now();
    runtime.autorun_scheduler().stop("worker", true).await;
    assert!(started.elapsed() < Duration::from_millis(10));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

/// Starting twice keeps one scheduler; stopping twice is harmless.
#[tokio::test]
async fn scheduler_manager_start_and_stop_are_idempotent() {
    let runtime = runtime();
    let runs = Arc::new(AtomicU32::new(0));
    register_sleeper(&runtime, &runs, Duration::from_secs(3600));

    assert!(runtime.autorun_scheduler().start("worker"));
    assert!(!runtime.autorun_scheduler().start("worker"));
    assert_eq!(runtime.autorun_scheduler().running(), vec!["worker".to_string()]);

    assert!(runtime.autorun_scheduler().stop("worker", false).await.is_some());
    assert!(runtime.autorun_scheduler().stop("worker", false).await.is_none());
}
