//! Framework tests for `snowx_core_plugins`.
//!
//! These tests mount the core plugins through the default pipeline.

use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use snowx_core_plugins::{AutoStopPlugin, TracingConfig, TracingPlugin};
use snowx_host::prelude::*;
use snowx_runtime::runtime::Runtime;
use snowx_system::config::{RuntimeConfig, RuntimeLimits};

fn write_plugin(root: &Path, id: &str) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    let descriptor = json!({
        "PluginID": id,
        "PluginName": id,
        "PluginVersion": "0.1.0",
        "EntryPoint": id,
        "DependentSnowxVersion": ["0.1", null],
    });
    std::fs::write(dir.join(METADATA_FILENAME), descriptor.to_string()).unwrap();
}

fn framework(root: &Path, auto_stop: AutoStopPlugin) -> Framework {
    write_plugin(root, "tracing");
    write_plugin(root, "auto_stop");
    let loader = StaticLoader::new()
        .with_plugin("tracing", || TracingPlugin::new().with_console(false))
        .with_plugin("auto_stop", move || auto_stop);

    let runtime = Arc::new(Runtime::new(RuntimeLimits::default()));
    let stages = default_stages(&runtime, Arc::new(loader), Arc::new(StaticModules::new()));
    let manager = PluginManager::new(stages).with_root(root);
    Framework::new(Arc::new(RuntimeConfig::new()), runtime, manager).unwrap()
}

#[tokio::test]
async fn auto_stop_ends_the_run() {
    let root = tempfile::tempdir().unwrap();
    let framework = framework(root.path(), AutoStopPlugin::new(Duration::from_millis(20)));

    let request = tokio::time::timeout(Duration::from_secs(2), framework.run())
        .await
        .unwrap()
        .unwrap();
    assert!(!request.force);
    assert!(!request.restart);
    assert!(!framework.is_running());
}

#[tokio::test]
async fn tracing_plugin_publishes_its_config() {
    let root = tempfile::tempdir().unwrap();
    let framework = framework(root.path(), AutoStopPlugin::default());

    let failed = framework.start().await.unwrap();
    assert!(failed.is_empty());

    let config = framework
        .runtime()
        .capabilities()
        .get::<TracingConfig>("tracing")
        .unwrap();
    assert!(!config.console);
    assert!(
        framework
            .runtime()
            .registry()
            .owners(snowx_runtime::callback::CallbackType::Autorun)
            .is_empty()
    );

    framework.stop(true).await;
}
