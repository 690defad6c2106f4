//! End-to-end lifecycle tests for `snowx_host`.
//!
//! These tests discover plugins from a temporary directory, run the full
//! default pipeline, and drive the framework through control events.

use core::time::Duration;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use snowx_host::prelude::*;
use snowx_runtime::prelude::*;
use snowx_system::api::API;
use snowx_system::config::{RuntimeConfig, RuntimeLimits};
use tokio::sync::mpsc;

static PING: EventKind = EventKind::new("LifecyclePing", &BASE_EVENT);
static PONG: EventKind = EventKind::new("LifecyclePong", &BASE_EVENT);

const TIMEOUT: Duration = Duration::from_secs(2);

// ─────────────────────────────────────────────────────────────────────────────
// Test plugins
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn callback(&self, name: &str, entry: &str) -> Callback {
        let journal = self.clone();
        let entry = entry.to_string();
        Callback::new(name, move |_| {
            let journal = journal.clone();
            let entry = entry.clone();
            async move {
                journal.push(entry);
                Ok::<_, CallbackError>(())
            }
        })
    }
}

struct Greeting;

impl API for Greeting {}

impl Greeting {
    fn greet(&self, name: &str) -> String {
        format!("hello, {name}")
    }
}

struct Greeter {
    journal: Journal,
}

impl Plugin for Greeter {
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        cx.insert_api(Greeting);
        cx.on_init(self.journal.callback("greeter_init", "init greeter"))?;
        cx.on_exit(self.journal.callback("greeter_exit", "exit greeter"))?;
        cx.on_process(
            &PING,
            Callback::new("pong", |ctx: Context| async move {
                let count = ctx
                    .event()
                    .and_then(|event| event.payload::<u32>())
                    .copied()
                    .unwrap_or_default();
                Ok::<_, CallbackError>(Event::custom(&PONG, count + 1))
            }),
        )?;
        Ok(())
    }
}

struct Echo {
    journal: Journal,
}

impl Plugin for Echo {
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let greeting = cx
            .api::<Greeting>("greeter")
            .ok_or_else(|| PluginError::failed("greeter capability missing"))?;
        self.journal.push(greeting.greet(cx.id()));
        cx.on_init(self.journal.callback("echo_init", "init echo"))?;
        Ok(())
    }
}

struct Broken {
    journal: Journal,
}

impl Plugin for Broken {
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        cx.on_init(self.journal.callback("broken_init", "init broken"))?;
        Err(PluginError::failed("boom"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn write_plugin(root: &Path, id: &str, extra: Value) {
    let mut descriptor = json!({
        "PluginID": id,
        "PluginName": id,
        "PluginVersion": "0.1.0",
        "EntryPoint": id,
    });
    if let (Some(descriptor), Value::Object(extra)) = (descriptor.as_object_mut(), extra) {
        descriptor.extend(extra);
    }
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(METADATA_FILENAME), descriptor.to_string()).unwrap();
}

fn plugin_root() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    write_plugin(
        root.path(),
        "greeter",
        json!({ "DependentSnowxVersion": ["0.1"] }),
    );
    write_plugin(
        root.path(),
        "echo",
        json!({ "DependentPlugins": { "greeter": ["0.1", null] } }),
    );
    write_plugin(root.path(), "broken", json!({}));
    write_plugin(
        root.path(),
        "orphan",
        json!({ "DependentPlugins": { "nothing": [] } }),
    );
    write_plugin(
        root.path(),
        "loop_a",
        json!({ "DependentPlugins": { "loop_b": [] } }),
    );
    write_plugin(
        root.path(),
        "loop_b",
        json!({ "DependentPlugins": { "loop_a": [] } }),
    );
    root
}

fn framework(root: &Path, config: RuntimeConfig, journal: &Journal) -> Framework {
    let loader = StaticLoader::new()
        .with_plugin("greeter", {
            let journal = journal.clone();
            move || Greeter {
                journal: journal.clone(),
            }
        })
        .with_plugin("echo", {
            let journal = journal.clone();
            move || Echo {
                journal: journal.clone(),
            }
        })
        .with_plugin("broken", {
            let journal = journal.clone();
            move || Broken {
                journal: journal.clone(),
            }
        });

    let runtime = Arc::new(Runtime::new(RuntimeLimits::default()));
    let stages = default_stages(&runtime, Arc::new(loader), Arc::new(StaticModules::new()));
    let manager = PluginManager::new(stages).with_root(root);
    Framework::new(Arc::new(config), runtime, manager).unwrap()
}

/// Forwards every bus event to a channel through a process callback.
fn observe(runtime: &Runtime) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    let forward = Callback::new("forward", move |ctx: Context| {
        let tx = tx.clone();
        async move {
            if let Some(event) = ctx.event() {
                let _ = tx.send(event.clone());
            }
            Ok::<_, CallbackError>(())
        }
    });
    runtime
        .register(
            CallbackType::Process,
            "observer",
            forward,
            CallbackOptions::new().subscribe(&BASE_EVENT),
        )
        .unwrap();
    assert!(runtime.process_scheduler().start("observer"));
    rx
}

async fn next_matching<F>(rx: &mut mpsc::UnboundedReceiver<Event>, matches: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("observer closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not observed")
}

async fn next_result(rx: &mut mpsc::UnboundedReceiver<Event>) -> FrameworkEvent {
    let event = next_matching(rx, |event| event.is_a(&kinds::SNOWX_RESULT_EVENT)).await;
    event.as_framework().cloned().unwrap()
}

async fn loaded_ids(framework: &Framework) -> Vec<String> {
    framework.plugins().lock().await.loaded_ids()
}

async fn wait_until_unloaded(framework: &Framework, id: &str) {
    tokio::time::timeout(TIMEOUT, async {
        while framework.plugins().lock().await.is_loaded(id) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("plugin still loaded");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_loads_dependencies_first_and_reports_failures() {
    let root = plugin_root();
    let journal = Journal::default();
    let framework = framework(root.path(), RuntimeConfig::new(), &journal);

    let failed = framework.start().await.unwrap();
    let expected: BTreeSet<String> = ["broken", "loop_a", "loop_b", "orphan"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(failed, expected);
    assert_eq!(loaded_ids(&framework).await, ["echo", "greeter"]);
    assert!(framework.state().is_started());

    assert_eq!(
        journal.entries(),
        ["init greeter", "hello, echo", "init echo"]
    );
    assert!(
        !framework
            .runtime()
            .registry()
            .contains(CallbackType::Init, "broken")
    );

    assert!(matches!(
        framework.start().await,
        Err(FrameworkError::AlreadyRunning)
    ));

    framework.stop(false).await;
    assert!(loaded_ids(&framework).await.is_empty());
    assert!(!framework.is_running());
    assert!(journal.entries().contains(&"exit greeter".to_string()));
    assert!(
        framework
            .runtime()
            .capabilities()
            .get::<Greeting>("greeter")
            .is_none()
    );
}

#[tokio::test]
async fn control_events_drive_the_plugin_manager() {
    let root = plugin_root();
    let journal = Journal::default();
    let framework = Arc::new(framework(root.path(), RuntimeConfig::new(), &journal));

    let runner = tokio::spawn({
        let framework = Arc::clone(&framework);
        async move { framework.run().await }
    });
    tokio::time::timeout(TIMEOUT, framework.state().wait_started())
        .await
        .unwrap();
    let mut events = observe(framework.runtime());
    let bus = Arc::clone(framework.runtime().bus());

    bus.publish(Event::custom(&PING, 41_u32)).await;
    let pong = next_matching(&mut events, |event| event.is_a(&PONG)).await;
    assert_eq!(pong.payload::<u32>(), Some(&42));

    bus.publish(FrameworkEvent::UnloadPlugin {
        plugin_id: "greeter".into(),
    })
    .await;
    wait_until_unloaded(&framework, "greeter").await;
    assert!(loaded_ids(&framework).await.is_empty());

    bus.publish(FrameworkEvent::LoadPlugin {
        plugin_id: "echo".into(),
    })
    .await;
    assert_eq!(
        next_result(&mut events).await,
        FrameworkEvent::LoadPluginResult {
            plugin_id: "echo".into(),
            success: true,
        }
    );
    assert_eq!(loaded_ids(&framework).await, ["echo", "greeter"]);

    bus.publish(FrameworkEvent::ReloadPlugin {
        plugin_id: "greeter".into(),
    })
    .await;
    assert_eq!(
        next_result(&mut events).await,
        FrameworkEvent::ReloadPluginResult {
            plugin_id: "greeter".into(),
            success: true,
        }
    );

    bus.publish(FrameworkEvent::LoadPlugin {
        plugin_id: "broken".into(),
    })
    .await;
    assert_eq!(
        next_result(&mut events).await,
        FrameworkEvent::LoadPluginResult {
            plugin_id: "broken".into(),
            success: false,
        }
    );

    bus.publish(FrameworkEvent::Stop { force: false }).await;
    let request = tokio::time::timeout(TIMEOUT, runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(request, StopRequest::default());
    assert!(loaded_ids(&framework).await.is_empty());

    framework
        .runtime()
        .process_scheduler()
        .stop("observer", true)
        .await;
}

#[tokio::test]
async fn restart_request_allows_a_second_run() {
    let root = plugin_root();
    let journal = Journal::default();
    let framework = Arc::new(framework(root.path(), RuntimeConfig::new(), &journal));

    for round in 0..2 {
        let runner = tokio::spawn({
            let framework = Arc::clone(&framework);
            async move { framework.run().await }
        });
        tokio::time::timeout(TIMEOUT, framework.state().wait_started())
            .await
            .unwrap();
        assert_eq!(loaded_ids(&framework).await, ["echo", "greeter"]);

        let restart = round == 0;
        if restart {
            framework.state().request_restart(true);
        } else {
            framework.state().request_stop(true);
        }
        let request = tokio::time::timeout(TIMEOUT, runner)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(request.restart, restart);
        assert!(request.force);
    }

    let inits = journal
        .entries()
        .iter()
        .filter(|entry| *entry == "init greeter")
        .count();
    assert_eq!(inits, 2);
}

#[tokio::test]
async fn unwritable_config_fails_start() {
    let root = plugin_root();
    let config = RuntimeConfig::load(root.path().join("missing").join("config.json")).unwrap();
    let framework = framework(root.path(), config, &Journal::default());

    assert!(matches!(
        framework.start().await,
        Err(FrameworkError::Config(_))
    ));
    assert!(framework.state().is_stopping());
    assert!(!framework.is_running());
    assert!(loaded_ids(&framework).await.is_empty());
}
