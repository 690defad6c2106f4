//! Starting and stopping the whole host.
//!
//! A [`Framework`] ties one [`RuntimeConfig`], one [`Runtime`] and one
//! [`PluginManager`] together and drives them through a fixed sequence:
//!
//! | Phase | Steps |
//! |-------|-------|
//! | Start | save config, start distributor, start the `"snowx"` process scheduler, load all plugins |
//! | Run | wait until a stop, restart or update request arrives |
//! | Stop | stop distributor, stop the `"snowx"` process scheduler, unload all plugins |
//!
//! Stop requests normally arrive as control events handled by
//! [`control`](crate::control), but anything holding the
//! [`FrameworkState`] can file one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use snowx_host::framework::Framework;
//! use snowx_host::module::StaticModules;
//! use snowx_host::plugin::StaticLoader;
//! use snowx_system::config::RuntimeConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::load("config.json")?;
//! let framework = Framework::from_config(
//!     config,
//!     Arc::new(StaticLoader::new()),
//!     Arc::new(StaticModules::new()),
//! )?;
//!
//! loop {
//!     let request = framework.run().await?;
//!     if !request.restart {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use snowx_runtime::runtime::{RegistrationError, Runtime};
use snowx_system::config::{ConfigError, RuntimeConfig, RuntimeLimits, keys};
use snowx_system::version::Version;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, watch};

use crate::control;
use crate::manager::PluginManager;
use crate::module::ModuleResolver;
use crate::plugin::PluginLoader;
use crate::stage::default_stages;

/// Owner id of the framework's own callbacks.
pub const FRAMEWORK_ID: &str = "snowx";

/// Human-readable framework name.
pub const FRAMEWORK_NAME: &str = "SnowX Framework";

/// Version plugins check their `SnowXVersion` range against.
pub const FRAMEWORK_VERSION: Version = Version::new(0, 1, 0);

/// Plugin root used when `PLUGIN_DIR` is not configured.
pub const DEFAULT_PLUGIN_DIR: &str = "plugins";

// ─────────────────────────────────────────────────────────────────────────────
// FrameworkState
// ─────────────────────────────────────────────────────────────────────────────

/// Why the framework is stopping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopRequest {
    /// Skip graceful draining.
    pub force: bool,
    /// Start again after stopping.
    pub restart: bool,
    /// Hand over to an updater after stopping.
    pub update: bool,
    /// Package the updater should install, `None` for the framework itself.
    pub update_package: Option<String>,
}

/// Started and stopping signals plus the pending [`StopRequest`].
///
/// The first request after a [`reset`](Self::reset) wins; later ones are
/// ignored until the framework starts again.
#[derive(Debug)]
pub struct FrameworkState {
    started: watch::Sender<bool>,
    stopping: watch::Sender<bool>,
    request: Mutex<StopRequest>,
}

impl Default for FrameworkState {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkState {
    /// Neither started nor stopping.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: watch::Sender::new(false),
            stopping: watch::Sender::new(false),
            request: Mutex::new(StopRequest::default()),
        }
    }

    /// Clears both signals and the pending request.
    pub fn reset(&self) {
        *self.request.lock() = StopRequest::default();
        self.started.send_replace(false);
        self.stopping.send_replace(false);
    }

    /// Marks the framework as started.
    pub fn set_started(&self) {
        self.started.send_replace(true);
    }

    /// Marks the framework as stopping, waking every waiter.
    pub fn set_stopping(&self) {
        self.stopping.send_replace(true);
    }

    /// Returns true from the end of start to the end of stop.
    #[must_use]
    pub fn is_started(&self) -> bool {
        *self.started.borrow()
    }

    /// Returns true once a stop is underway or requested.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        *self.stopping.borrow()
    }

    /// Waits until start has completed.
    pub async fn wait_started(&self) {
        let mut started = self.started.subscribe();
        let _ = started.wait_for(|started| *started).await;
    }

    /// Waits until the framework is stopping.
    pub async fn wait_stopping(&self) {
        let mut stopping = self.stopping.subscribe();
        let _ = stopping.wait_for(|stopping| *stopping).await;
    }

    /// The pending request.
    #[must_use]
    pub fn request(&self) -> StopRequest {
        self.request.lock().clone()
    }

    /// Requests a stop. Returns false if one is already pending.
    pub fn request_stop(&self, force: bool) -> bool {
        self.file(StopRequest {
            force,
            ..StopRequest::default()
        })
    }

    /// Requests a stop followed by a new start.
    pub fn request_restart(&self, force: bool) -> bool {
        self.file(StopRequest {
            force,
            restart: true,
            ..StopRequest::default()
        })
    }

    /// Requests a stop, an update of `package`, then a new start.
    pub fn request_update(&self, force: bool, package: Option<String>) -> bool {
        self.file(StopRequest {
            force,
            restart: true,
            update: true,
            update_package: package,
            ..StopRequest::default()
        })
    }

    fn file(&self, request: StopRequest) -> bool {
        let mut pending = self.request.lock();
        if self.is_stopping() {
            tracing::debug!(pending = ?*pending, ignored = ?request, "stop already requested");
            return false;
        }
        *pending = request;
        self.set_stopping();
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Framework
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that keep the framework from being built or started.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// The configuration could not be written back.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The control processor could not be registered.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// [`Framework::start`] was called while already running.
    #[error("framework is already running")]
    AlreadyRunning,
}

/// The host: configuration, runtime and plugin manager under one lifecycle.
pub struct Framework {
    config: Arc<RuntimeConfig>,
    runtime: Arc<Runtime>,
    plugins: Arc<AsyncMutex<PluginManager>>,
    state: Arc<FrameworkState>,
    running: AtomicBool,
}

impl Framework {
    /// Assembles a framework and registers its control processor.
    ///
    /// # Errors
    ///
    /// Returns an error if the control callbacks cannot be registered.
    pub fn new(
        config: Arc<RuntimeConfig>,
        runtime: Arc<Runtime>,
        manager: PluginManager,
    ) -> Result<Self, FrameworkError> {
        let plugins = Arc::new(AsyncMutex::new(manager));
        let state = Arc::new(FrameworkState::new());
        control::install(&runtime, &plugins, &state)?;
        Ok(Self {
            config,
            runtime,
            plugins,
            state,
            running: AtomicBool::new(false),
        })
    }

    /// Builds the runtime from the configured limits and a manager running
    /// the default stages over the configured plugin directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the control callbacks cannot be registered.
    pub fn from_config(
        config: RuntimeConfig,
        loader: Arc<dyn PluginLoader>,
        modules: Arc<dyn ModuleResolver>,
    ) -> Result<Self, FrameworkError> {
        let runtime = Arc::new(Runtime::new(RuntimeLimits::from_config(&config)));
        let root: String = config.get(keys::PLUGIN_DIR, DEFAULT_PLUGIN_DIR.to_string());
        let manager = PluginManager::new(default_stages(&runtime, loader, modules)).with_root(root);
        Self::new(Arc::new(config), runtime, manager)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs the start steps, returning the plugins that did not load.
    ///
    /// # Errors
    ///
    /// Returns an error if already running or if the configuration cannot
    /// be saved; the state is then marked as stopping.
    pub async fn start(&self) -> Result<BTreeSet<String>, FrameworkError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(FrameworkError::AlreadyRunning);
        }
        self.state.reset();
        tracing::info!(framework = FRAMEWORK_NAME, version = %FRAMEWORK_VERSION, "Framework starting.");

        if let Err(error) = self.config.save() {
            tracing::error!(error = %error, "Framework start failed.");
            self.state.set_stopping();
            self.running.store(false, Ordering::Release);
            return Err(error.into());
        }

        self.runtime.distributor().start();
        self.runtime.process_scheduler().start(FRAMEWORK_ID);
        let failed = self.plugins.lock().await.load_all().await;

        self.state.set_started();
        tracing::info!(failed = failed.len(), "Framework started.");
        Ok(failed)
    }

    /// Runs the stop steps.
    pub async fn stop(&self, force: bool) {
        self.state.set_stopping();
        tracing::info!(force, "Framework stopping.");

        self.runtime.distributor().stop(force).await;
        self.runtime.process_scheduler().stop(FRAMEWORK_ID, force).await;
        self.plugins.lock().await.unload_all(force).await;

        self.state.started.send_replace(false);
        self.running.store(false, Ordering::Release);
        tracing::info!("Framework stopped.");
    }

    /// Starts, waits for a stop request, stops, and returns the request.
    ///
    /// Call again to honor [`StopRequest::restart`].
    ///
    /// # Errors
    ///
    /// Returns the [`start`](Self::start) error.
    pub async fn run(&self) -> Result<StopRequest, FrameworkError> {
        self.start().await?;
        self.state.wait_stopping().await;
        let request = self.state.request();
        self.stop(request.force).await;
        Ok(request)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    /// Event and callback runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// The plugin manager, shared with the control processor.
    #[must_use]
    pub fn plugins(&self) -> &Arc<AsyncMutex<PluginManager>> {
        &self.plugins
    }

    /// Started and stopping signals.
    #[must_use]
    pub fn state(&self) -> &Arc<FrameworkState> {
        &self.state
    }

    /// Returns true between a successful start and the end of stop.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl core::fmt::Debug for Framework {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Framework")
            .field("runtime", &self.runtime)
            .field("state", &self.state)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_request_wins() {
        let state = FrameworkState::new();
        assert!(!state.is_stopping());

        assert!(state.request_restart(true));
        assert!(!state.request_update(false, Some("snowx".into())));
        assert!(state.is_stopping());
        assert_eq!(
            state.request(),
            StopRequest {
                force: true,
                restart: true,
                ..StopRequest::default()
            }
        );

        state.reset();
        assert!(!state.is_stopping());
        assert!(state.request_update(false, Some("snowx".into())));
        let request = state.request();
        assert!(request.update);
        assert!(request.restart);
        assert_eq!(request.update_package.as_deref(), Some("snowx"));
    }

    #[tokio::test]
    async fn wait_stopping_wakes_on_request() {
        let state = Arc::new(FrameworkState::new());
        let waiter = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                state.wait_stopping().await;
                state.request()
            }
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());
        state.request_stop(false);

        let request = waiter.await.unwrap();
        assert!(!request.force);
        assert!(!request.restart);
    }

    #[tokio::test]
    async fn wait_started_returns_when_already_started() {
        let state = FrameworkState::new();
        state.set_started();
        tokio::time::timeout(Duration::from_secs(1), state.wait_started())
            .await
            .unwrap();
        assert!(state.is_started());
    }
}
