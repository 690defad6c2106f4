//! Events understood by the framework itself.
//!
//! ```text
//! BaseEvent
//! └── SnowxEvent
//!     ├── SnowxControlEvent   Stop, Restart, Update, LoadPlugin, UnloadPlugin,
//!     │                       ReloadPlugin, ReloadAll
//!     └── SnowxResultEvent    LoadPluginResult, ReloadPluginResult, ReloadAllResult
//! ```

use super::kind::{BASE_EVENT, EventKind};

/// Static kinds of the framework event tree.
pub mod kinds {
    use super::{BASE_EVENT, EventKind};

    /// Parent of every framework event.
    pub static SNOWX_EVENT: EventKind = EventKind::new("SnowxEvent", &BASE_EVENT);
    /// Requests sent to the framework.
    pub static SNOWX_CONTROL_EVENT: EventKind =
        EventKind::new("SnowxControlEvent", &SNOWX_EVENT);
    /// Replies published by the framework.
    pub static SNOWX_RESULT_EVENT: EventKind = EventKind::new("SnowxResultEvent", &SNOWX_EVENT);

    /// See [`FrameworkEvent::Stop`](super::FrameworkEvent::Stop).
    pub static STOP: EventKind = EventKind::new("StopEvent", &SNOWX_CONTROL_EVENT);
    /// See [`FrameworkEvent::Restart`](super::FrameworkEvent::Restart).
    pub static RESTART: EventKind = EventKind::new("RestartEvent", &SNOWX_CONTROL_EVENT);
    /// See [`FrameworkEvent::Update`](super::FrameworkEvent::Update).
    pub static UPDATE: EventKind = EventKind::new("UpdateEvent", &SNOWX_CONTROL_EVENT);
    /// See [`FrameworkEvent::LoadPlugin`](super::FrameworkEvent::LoadPlugin).
    pub static LOAD_PLUGIN: EventKind = EventKind::new("LoadPluginEvent", &SNOWX_CONTROL_EVENT);
    /// See [`FrameworkEvent::UnloadPlugin`](super::FrameworkEvent::UnloadPlugin).
    pub static UNLOAD_PLUGIN: EventKind =
        EventKind::new("UnloadPluginEvent", &SNOWX_CONTROL_EVENT);
    /// See [`FrameworkEvent::ReloadPlugin`](super::FrameworkEvent::ReloadPlugin).
    pub static RELOAD_PLUGIN: EventKind =
        EventKind::new("ReloadPluginEvent", &SNOWX_CONTROL_EVENT);
    /// See [`FrameworkEvent::ReloadAll`](super::FrameworkEvent::ReloadAll).
    pub static RELOAD_ALL: EventKind = EventKind::new("ReloadAllEvent", &SNOWX_CONTROL_EVENT);

    /// See [`FrameworkEvent::LoadPluginResult`](super::FrameworkEvent::LoadPluginResult).
    pub static LOAD_PLUGIN_RESULT: EventKind =
        EventKind::new("LoadPluginResultEvent", &SNOWX_RESULT_EVENT);
    /// See [`FrameworkEvent::ReloadPluginResult`](super::FrameworkEvent::ReloadPluginResult).
    pub static RELOAD_PLUGIN_RESULT: EventKind =
        EventKind::new("ReloadPluginResultEvent", &SNOWX_RESULT_EVENT);
    /// See [`FrameworkEvent::ReloadAllResult`](super::FrameworkEvent::ReloadAllResult).
    pub static RELOAD_ALL_RESULT: EventKind =
        EventKind::new("ReloadAllResultEvent", &SNOWX_RESULT_EVENT);
}

/// Control requests and their replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameworkEvent {
    // ─────────────────────────────────────────────────────────────────────────
    // Control
    // ─────────────────────────────────────────────────────────────────────────
    /// Stop the framework.
    Stop {
        /// Skip graceful draining.
        force: bool,
    },
    /// Stop the framework and start it again.
    Restart {
        /// Skip graceful draining.
        force: bool,
    },
    /// Stop the framework so an external updater can replace it.
    Update {
        /// Skip graceful draining.
        force: bool,
        /// Package to install, `None` for the framework itself.
        package: Option<String>,
    },
    /// Load one plugin and its dependencies.
    LoadPlugin {
        /// Target plugin.
        plugin_id: String,
    },
    /// Unload one plugin and its dependents.
    UnloadPlugin {
        /// Target plugin.
        plugin_id: String,
    },
    /// Unload and load one plugin and its dependents.
    ReloadPlugin {
        /// Target plugin.
        plugin_id: String,
    },
    /// Unload and load every plugin.
    ReloadAll,

    // ─────────────────────────────────────────────────────────────────────────
    // Results
    // ─────────────────────────────────────────────────────────────────────────
    /// Reply to [`LoadPlugin`](Self::LoadPlugin).
    LoadPluginResult {
        /// Target plugin.
        plugin_id: String,
        /// Whether the plugin ended up loaded.
        success: bool,
    },
    /// Reply to [`ReloadPlugin`](Self::ReloadPlugin).
    ReloadPluginResult {
        /// Target plugin.
        plugin_id: String,
        /// Whether every affected plugin loaded again.
        success: bool,
    },
    /// Reply to [`ReloadAll`](Self::ReloadAll).
    ReloadAllResult,
}

impl FrameworkEvent {
    /// Static kind of this event.
    #[must_use]
    pub fn kind(&self) -> &'static EventKind {
        match self {
            Self::Stop { .. } => &kinds::STOP,
            Self::Restart { .. } => &kinds::RESTART,
            Self::Update { .. } => &kinds::UPDATE,
            Self::LoadPlugin { .. } => &kinds::LOAD_PLUGIN,
            Self::UnloadPlugin { .. } => &kinds::UNLOAD_PLUGIN,
            Self::ReloadPlugin { .. } => &kinds::RELOAD_PLUGIN,
            Self::ReloadAll => &kinds::RELOAD_ALL,
            Self::LoadPluginResult { .. } => &kinds::LOAD_PLUGIN_RESULT,
            Self::ReloadPluginResult { .. } => &kinds::RELOAD_PLUGIN_RESULT,
            Self::ReloadAllResult => &kinds::RELOAD_ALL_RESULT,
        }
    }

    /// Returns true for control requests.
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.kind().is_a(&kinds::SNOWX_CONTROL_EVENT)
    }
}
