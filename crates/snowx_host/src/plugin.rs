//! The plugin extension point.
//!
//! A plugin is the code behind one discovered plugin directory. The host
//! resolves the directory's entry point to a [`Plugin`] through a
//! [`PluginLoader`], then calls [`Plugin::build`] with a [`PluginContext`]
//! bound to that plugin's id. Everything the plugin registers (callbacks and
//! capabilities) is owned by that id and torn down with it.
//!
//! # Example
//!
//! ```
//! use snowx_host::plugin::{Plugin, PluginContext, PluginError, StaticLoader};
//! use snowx_runtime::prelude::*;
//!
//! static GREETING: EventKind = EventKind::new("Greeting", &BASE_EVENT);
//!
//! struct Greeter;
//!
//! impl Plugin for Greeter {
//!     fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
//!         cx.on_init(Callback::new("hello", |ctx: Context| async move {
//!             ctx.publish(Event::custom(&GREETING, "hello")).await;
//!             Ok::<_, CallbackError>(())
//!         }))?;
//!         Ok(())
//!     }
//! }
//!
//! let loader = StaticLoader::new().with_plugin("main", || Greeter);
//! assert!(loader.contains("main"));
//! ```

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use snowx_runtime::callback::{Callback, CallbackId, CallbackOptions, CallbackType};
use snowx_runtime::event::{EventBus, EventKind};
use snowx_runtime::runtime::{RegistrationError, Runtime};
use snowx_system::api::API;
use thiserror::Error;

use crate::discovery::PluginInfo;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by plugin code while building.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A callback registration was refused.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Plugin specific failure.
    #[error("{0}")]
    Failed(String),
}

impl PluginError {
    /// Creates a [`PluginError::Failed`] from any displayable error.
    pub fn failed(error: impl fmt::Display) -> Self {
        Self::Failed(error.to_string())
    }
}

/// Errors raised while resolving and building a plugin.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The loader knows no code for the entry point.
    #[error("no plugin code for <{import_path}>")]
    UnknownEntryPoint {
        /// Dotted location that failed to resolve.
        import_path: String,
    },

    /// The plugin is already mounted.
    #[error("<{0}> is already imported.")]
    AlreadyMounted(String),

    /// [`Plugin::build`] returned an error.
    #[error("failed to build <{plugin}>: {source}")]
    Build {
        /// Plugin id.
        plugin: String,
        /// What the plugin reported.
        #[source]
        source: PluginError,
    },

    /// [`Plugin::build`] panicked.
    #[error("<{0}> panicked while building")]
    Panicked(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Code behind one plugin directory.
///
/// The host drives a plugin through a fixed lifecycle:
///
/// 1. **Build** - `build()` runs when the plugin is mounted, after its
///    dependencies are loaded
/// 2. **Init** - the init callbacks registered in `build()` run once
/// 3. **Running** - process and autorun callbacks are scheduled
/// 4. **Exit** - exit callbacks run once, unless the unload is forced
/// 5. **Cleanup** - `cleanup()` runs when the plugin is unmounted
pub trait Plugin: Send + Sync + 'static {
    /// Registers callbacks and capabilities.
    ///
    /// Keep `build()` lightweight; slow setup belongs in an init callback.
    ///
    /// # Errors
    ///
    /// An error aborts the load and rolls back everything registered so far.
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError>;

    /// Called when the plugin is unmounted, after its callbacks stopped.
    fn cleanup(&self, _cx: &PluginContext<'_>) {}

    /// Returns the plugin's name for debugging and error messages.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginContext
// ─────────────────────────────────────────────────────────────────────────────

/// The host API handed to a plugin, bound to the plugin's own id.
///
/// Every registration made through the context is owned by that id; the
/// plugin never names itself.
pub struct PluginContext<'a> {
    info: &'a PluginInfo,
    runtime: &'a Runtime,
}

impl<'a> PluginContext<'a> {
    /// Binds a context to `info`'s plugin id.
    #[must_use]
    pub fn new(info: &'a PluginInfo, runtime: &'a Runtime) -> Self {
        Self { info, runtime }
    }

    /// Id of the plugin this context belongs to.
    #[must_use]
    pub fn id(&self) -> &str {
        self.info.id()
    }

    /// Discovery information of the plugin.
    #[must_use]
    pub fn info(&self) -> &PluginInfo {
        self.info
    }

    /// The global event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        self.runtime.bus()
    }

    /// Registers a callback of any type.
    ///
    /// # Errors
    ///
    /// See [`Runtime::register`].
    pub fn register(
        &mut self,
        callback_type: CallbackType,
        callback: Callback,
        options: CallbackOptions,
    ) -> Result<CallbackId, RegistrationError> {
        self.runtime
            .register(callback_type, self.info.id(), callback, options)
    }

    /// Registers a callback run once after the plugin is mounted.
    ///
    /// # Errors
    ///
    /// See [`Runtime::register`].
    pub fn on_init(&mut self, callback: Callback) -> Result<CallbackId, RegistrationError> {
        self.register(CallbackType::Init, callback, CallbackOptions::new())
    }

    /// Registers a callback run once before the plugin is unmounted.
    ///
    /// # Errors
    ///
    /// See [`Runtime::register`].
    pub fn on_exit(&mut self, callback: Callback) -> Result<CallbackId, RegistrationError> {
        self.register(CallbackType::Exit, callback, CallbackOptions::new())
    }

    /// Registers a handler for `kind` and all of its subkinds.
    ///
    /// # Errors
    ///
    /// See [`Runtime::register`].
    pub fn on_process(
        &mut self,
        kind: &'static EventKind,
        callback: Callback,
    ) -> Result<CallbackId, RegistrationError> {
        self.register(
            CallbackType::Process,
            callback,
            CallbackOptions::new().subscribe(kind),
        )
    }

    /// Registers a recurring callback paced by the trigger in `options`.
    ///
    /// # Errors
    ///
    /// See [`Runtime::register`].
    pub fn on_autorun(
        &mut self,
        callback: Callback,
        options: CallbackOptions,
    ) -> Result<CallbackId, RegistrationError> {
        self.register(CallbackType::Autorun, callback, options)
    }

    /// Publishes a capability under this plugin's id.
    ///
    /// Returns the previous capability of the same type, if any.
    pub fn insert_api<A: API>(&mut self, api: A) -> Option<Arc<A>> {
        self.runtime.capabilities().insert(self.info.id(), api)
    }

    /// Looks up a capability published by `namespace`.
    #[must_use]
    pub fn api<A: API>(&self, namespace: &str) -> Option<Arc<A>> {
        self.runtime.capabilities().get(namespace)
    }
}

impl fmt::Debug for PluginContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginItem
// ─────────────────────────────────────────────────────────────────────────────

/// A mounted plugin: its discovery info plus its code.
#[derive(Clone)]
pub struct PluginItem {
    info: PluginInfo,
    plugin: Arc<dyn Plugin>,
}

impl PluginItem {
    /// Pairs plugin code with its info.
    #[must_use]
    pub fn new(info: PluginInfo, plugin: Arc<dyn Plugin>) -> Self {
        Self { info, plugin }
    }

    /// Plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.info.id()
    }

    /// Discovery information.
    #[must_use]
    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// Plugin code.
    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }
}

impl fmt::Debug for PluginItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginItem")
            .field("id", &self.id())
            .field("plugin", &self.plugin.name())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loaders
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves a plugin's entry point to its code.
pub trait PluginLoader: Send + Sync + 'static {
    /// Returns fresh plugin code for `info`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnknownEntryPoint`] if nothing backs the entry
    /// point.
    fn load(&self, info: &PluginInfo) -> Result<Arc<dyn Plugin>, LoadError>;
}

type Factory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Loader backed by plugin code compiled into the host.
///
/// Entries are keyed by import path first and entry point second, so two
/// plugins sharing an entry point name can still be told apart.
#[derive(Default, Clone)]
pub struct StaticLoader {
    factories: HashMap<String, Factory>,
}

impl StaticLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under an import path or entry point.
    #[must_use]
    pub fn with_plugin<P, F>(mut self, key: impl Into<String>, factory: F) -> Self
    where
        P: Plugin,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.insert(key, factory);
        self
    }

    /// Registers `factory` under an import path or entry point.
    pub fn insert<P, F>(&mut self, key: impl Into<String>, factory: F)
    where
        P: Plugin,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.factories
            .insert(key.into(), Arc::new(move || Arc::new(factory()) as Arc<dyn Plugin>));
    }

    /// Returns true if `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }
}

impl PluginLoader for StaticLoader {
    fn load(&self, info: &PluginInfo) -> Result<Arc<dyn Plugin>, LoadError> {
        let factory = self
            .factories
            .get(info.import_path())
            .or_else(|| self.factories.get(&info.metadata().entry_point))
            .ok_or_else(|| LoadError::UnknownEntryPoint {
                import_path: info.import_path().to_string(),
            })?;
        Ok(factory())
    }
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.factories.keys().collect();
        keys.sort();
        f.debug_struct("StaticLoader").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use serde_json::json;
    use snowx_runtime::callback::CallbackError;
    use snowx_system::config::RuntimeLimits;

    struct Named(&'static str);

    impl Plugin for Named {
        fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            cx.on_init(Callback::new(self.0, |_| async { Ok::<_, CallbackError>(()) }))?;
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn info(id: &str, entry_point: &str) -> PluginInfo {
        let metadata = Metadata::from_json(&json!({
            "PluginID": id,
            "PluginName": id,
            "PluginVersion": "1.0.0",
            "EntryPoint": entry_point,
        }))
        .unwrap();
        PluginInfo::new(metadata, format!("plugins/{id}"))
    }

    #[test]
    fn import_path_wins_over_entry_point() {
        let loader = StaticLoader::new()
            .with_plugin("main", || Named("by_entry"))
            .with_plugin("plugins.special.main", || Named("by_path"));

        let plain = loader.load(&info("plain", "main")).unwrap();
        assert_eq!(plain.name(), "by_entry");

        let special = loader.load(&info("special", "main")).unwrap();
        assert_eq!(special.name(), "by_path");

        assert!(matches!(
            loader.load(&info("other", "start")),
            Err(LoadError::UnknownEntryPoint { .. })
        ));
    }

    #[test]
    fn context_registers_under_its_own_id() {
        let runtime = Runtime::new(RuntimeLimits::default());
        let info = info("owner_a", "main");
        let mut cx = PluginContext::new(&info, &runtime);

        Named("greet").build(&mut cx).unwrap();
        assert_eq!(runtime.registry().get(CallbackType::Init, "owner_a").len(), 1);

        struct Marker;
        impl API for Marker {}
        assert!(cx.insert_api(Marker).is_none());
        assert!(cx.api::<Marker>("owner_a").is_some());
    }
}
