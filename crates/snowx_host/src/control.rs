//! The framework's own process callbacks for control events.
//!
//! | Event | Effect | Reply |
//! |-------|--------|-------|
//! | `Stop` | files a stop request | - |
//! | `Restart` | files a restart request | - |
//! | `Update` | files an update request | - |
//! | `LoadPlugin` | loads the plugin and its dependencies | `LoadPluginResult` |
//! | `UnloadPlugin` | unloads the plugin and its dependents | - |
//! | `ReloadPlugin` | reloads the plugin and its dependents | `ReloadPluginResult` |
//! | `ReloadAll` | unloads, rediscovers and loads everything | `ReloadAllResult` |
//!
//! All handlers share one async gate, so control events are applied one at
//! a time in arrival order. Stop-type handlers only file the request; the
//! actual stop happens in [`Framework::run`](crate::framework::Framework::run).

use std::sync::{Arc, Weak};

use snowx_runtime::callback::{Callback, CallbackError, CallbackOptions, CallbackType, Context};
use snowx_runtime::event::framework::kinds;
use snowx_runtime::event::{Event, EventKind, FrameworkEvent};
use snowx_runtime::runtime::{RegistrationError, Runtime};
use tokio::sync::Mutex;

use crate::framework::{FRAMEWORK_ID, FrameworkState};
use crate::manager::PluginManager;

static CONTROL_KINDS: [&EventKind; 7] = [
    &kinds::STOP,
    &kinds::RESTART,
    &kinds::UPDATE,
    &kinds::LOAD_PLUGIN,
    &kinds::UNLOAD_PLUGIN,
    &kinds::RELOAD_PLUGIN,
    &kinds::RELOAD_ALL,
];

/// Registers one process callback per control event for [`FRAMEWORK_ID`].
///
/// The callbacks hold the manager weakly; once it is dropped they do
/// nothing.
///
/// # Errors
///
/// Returns the first registration error.
pub fn install(
    runtime: &Runtime,
    plugins: &Arc<Mutex<PluginManager>>,
    state: &Arc<FrameworkState>,
) -> Result<(), RegistrationError> {
    let gate = Arc::new(Mutex::new(()));
    for kind in CONTROL_KINDS {
        let callback = processor(kind, &gate, Arc::downgrade(plugins), Arc::clone(state));
        runtime.register(
            CallbackType::Process,
            FRAMEWORK_ID,
            callback,
            CallbackOptions::new().subscribe(kind),
        )?;
    }
    Ok(())
}

fn processor(
    kind: &'static EventKind,
    gate: &Arc<Mutex<()>>,
    plugins: Weak<Mutex<PluginManager>>,
    state: Arc<FrameworkState>,
) -> Callback {
    let gate = Arc::clone(gate);
    Callback::new(format!("{FRAMEWORK_ID}_{}", kind.name()), move |ctx: Context| {
        let gate = Arc::clone(&gate);
        let plugins = plugins.clone();
        let state = Arc::clone(&state);
        async move {
            let Some(event) = ctx.event().and_then(Event::as_framework).cloned() else {
                return Ok::<_, CallbackError>(None);
            };
            let _serial = gate.lock().await;
            tracing::info!(event = ?event, "Received event");

            let Some(plugins) = plugins.upgrade() else {
                tracing::debug!(event = ?event, "plugin manager dropped, event ignored");
                return Ok(None);
            };
            Ok(handle(event, &plugins, &state).await.map(Event::from))
        }
    })
}

/// Applies one control event, returning the reply to publish.
pub async fn handle(
    event: FrameworkEvent,
    plugins: &Mutex<PluginManager>,
    state: &FrameworkState,
) -> Option<FrameworkEvent> {
    match event {
        FrameworkEvent::Stop { force } => {
            state.request_stop(force);
            None
        }
        FrameworkEvent::Restart { force } => {
            state.request_restart(force);
            None
        }
        FrameworkEvent::Update { force, package } => {
            state.request_update(force, package);
            None
        }
        FrameworkEvent::LoadPlugin { plugin_id } => {
            let success = plugins.lock().await.load_single(&plugin_id).await;
            Some(FrameworkEvent::LoadPluginResult { plugin_id, success })
        }
        FrameworkEvent::UnloadPlugin { plugin_id } => {
            plugins.lock().await.unload_single(&plugin_id, false).await;
            None
        }
        FrameworkEvent::ReloadPlugin { plugin_id } => {
            let success = plugins.lock().await.reload_single(&plugin_id).await;
            Some(FrameworkEvent::ReloadPluginResult { plugin_id, success })
        }
        FrameworkEvent::ReloadAll => {
            plugins.lock().await.reload_all().await;
            Some(FrameworkEvent::ReloadAllResult)
        }
        FrameworkEvent::LoadPluginResult { .. }
        | FrameworkEvent::ReloadPluginResult { .. }
        | FrameworkEvent::ReloadAllResult => None,
    }
}
