//! The load/unload pipeline a plugin passes through.
//!
//! [`PluginManager`](crate::manager::PluginManager) runs its stages in order
//! to load one plugin and in reverse to unload it. The built-in pipeline from
//! [`default_stages`] is:
//!
//! | # | Stage | Load | Unload |
//! |---|-------|------|--------|
//! | 0 | [`FrameworkVersionStage`] | framework version in range | - |
//! | 1 | [`DependencyStage`] | dependencies loaded, versions in range | - |
//! | 2 | [`ModuleStage`] | external modules available | - |
//! | 3 | [`MountStage`] | resolve code, `build()` | `cleanup()`, drop registrations |
//! | 4 | [`InitCallbackStage`] | run init callbacks | run exit callbacks unless forced |
//! | 5 | [`SchedulerStage`] | start process and autorun | stop autorun, then process |

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use async_trait::async_trait;
use snowx_runtime::runtime::Runtime;
use snowx_system::version::{Version, VersionError, VersionRange};
use thiserror::Error;

use crate::discovery::PluginInfo;
use crate::framework::FRAMEWORK_VERSION;
use crate::module::ModuleResolver;
use crate::plugin::{LoadError, PluginContext, PluginItem, PluginLoader};

/// What a stage sees of the plugin being loaded or unloaded.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Plugin id.
    pub id: &'a str,
    /// Discovery information of the plugin.
    pub info: &'a PluginInfo,
    /// The mounted plugin, once [`MountStage`] has produced it.
    pub item: Option<&'a PluginItem>,
    /// Every fully loaded plugin.
    pub loaded: &'a BTreeMap<String, PluginItem>,
}

/// Successful result of [`Stage::load`].
#[derive(Debug)]
pub enum StageOutcome {
    /// Move on to the next stage.
    Continue,
    /// The plugin's code is mounted; the manager keeps the item.
    Mounted(PluginItem),
}

/// Why a stage refused to load a plugin.
#[derive(Debug, Error)]
pub enum StageError {
    /// The framework version is outside the plugin's declared range.
    #[error("requires framework version {required}, running {actual}")]
    FrameworkVersion {
        /// Declared range.
        required: VersionRange,
        /// Running framework version.
        actual: Version,
    },

    /// A version check could not be performed.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A dependency is not loaded.
    #[error("dependency <{0}> is not loaded")]
    MissingDependency(String),

    /// A loaded dependency has the wrong version.
    #[error("dependency <{dependency}> {found} is outside {required}")]
    DependencyVersion {
        /// Dependency id.
        dependency: String,
        /// Declared range.
        required: VersionRange,
        /// Loaded version.
        found: Version,
    },

    /// An external module is unavailable.
    #[error("module <{0}> is not available")]
    MissingModule(String),

    /// Mounting failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Some init callbacks failed.
    #[error("{failed} of {total} init callbacks failed")]
    InitCallbacks {
        /// Failed callbacks.
        failed: usize,
        /// All callbacks run.
        total: usize,
    },
}

/// One step of the load/unload pipeline.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Performs this step for `cx.id`.
    ///
    /// # Errors
    ///
    /// An error makes the manager roll back the stages that ran before.
    async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError>;

    /// Undoes this step. Must tolerate a plugin this stage never loaded.
    async fn unload(&self, _cx: StageContext<'_>, _force: bool) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Checks
// ─────────────────────────────────────────────────────────────────────────────

/// Checks the running framework version against `DependentSnowxVersion`.
#[derive(Debug, Clone, Copy)]
pub struct FrameworkVersionStage {
    version: Version,
}

impl FrameworkVersionStage {
    /// Checks against `version`.
    #[must_use]
    pub fn new(version: Version) -> Self {
        Self { version }
    }
}

#[async_trait]
impl Stage for FrameworkVersionStage {
    fn name(&self) -> &'static str {
        "framework_version"
    }

    async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError> {
        let required = cx.info.metadata().framework_range;
        if self.version.auto_check(&required)? {
            Ok(StageOutcome::Continue)
        } else {
            Err(StageError::FrameworkVersion {
                required,
                actual: self.version,
            })
        }
    }
}

/// Checks that every dependency is loaded in an accepted version.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyStage;

#[async_trait]
impl Stage for DependencyStage {
    fn name(&self) -> &'static str {
        "dependencies"
    }

    async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError> {
        for dependency in &cx.info.metadata().dependent_plugins {
            let item = cx
                .loaded
                .get(&dependency.id)
                .ok_or_else(|| StageError::MissingDependency(dependency.id.clone()))?;

            let found = item.info().metadata().version;
            if !found.auto_check(&dependency.range)? {
                return Err(StageError::DependencyVersion {
                    dependency: dependency.id.clone(),
                    required: dependency.range,
                    found,
                });
            }
        }
        Ok(StageOutcome::Continue)
    }
}

/// Checks that every external module is available.
pub struct ModuleStage {
    resolver: Arc<dyn ModuleResolver>,
}

impl ModuleStage {
    /// Checks modules through `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for ModuleStage {
    fn name(&self) -> &'static str {
        "modules"
    }

    async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError> {
        for module in &cx.info.metadata().dependent_modules {
            if !self.resolver.check(module).await {
                return Err(StageError::MissingModule(module.clone()));
            }
        }
        Ok(StageOutcome::Continue)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mount
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves plugin code and lets it register callbacks and capabilities.
pub struct MountStage {
    runtime: Arc<Runtime>,
    loader: Arc<dyn PluginLoader>,
}

impl MountStage {
    /// Mounts code from `loader` into `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<Runtime>, loader: Arc<dyn PluginLoader>) -> Self {
        Self { runtime, loader }
    }

    fn discard(&self, id: &str) {
        self.runtime.unregister_owner(id);
        self.runtime.capabilities().remove_namespace(id);
    }
}

#[async_trait]
impl Stage for MountStage {
    fn name(&self) -> &'static str {
        "mount"
    }

    async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError> {
        if cx.loaded.contains_key(cx.id) {
            return Err(LoadError::AlreadyMounted(cx.id.to_string()).into());
        }

        tracing::info!(plugin = cx.id, "Try to import <{}>...", cx.info.import_path());
        let plugin = self.loader.load(cx.info)?;

        let mut plugin_cx = PluginContext::new(cx.info, &self.runtime);
        let error = match catch_unwind(AssertUnwindSafe(|| plugin.build(&mut plugin_cx))) {
            Ok(Ok(())) => {
                return Ok(StageOutcome::Mounted(PluginItem::new(cx.info.clone(), plugin)));
            }
            Ok(Err(source)) => LoadError::Build {
                plugin: cx.id.to_string(),
                source,
            },
            Err(_) => LoadError::Panicked(cx.id.to_string()),
        };

        self.discard(cx.id);
        Err(error.into())
    }

    async fn unload(&self, cx: StageContext<'_>, _force: bool) {
        if let Some(item) = cx.item {
            let plugin_cx = PluginContext::new(item.info(), &self.runtime);
            if catch_unwind(AssertUnwindSafe(|| item.plugin().cleanup(&plugin_cx))).is_err() {
                tracing::error!(plugin = cx.id, "plugin cleanup panicked");
            }
        }
        self.discard(cx.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Callbacks
// ─────────────────────────────────────────────────────────────────────────────

/// Runs init callbacks on load and exit callbacks on unload.
pub struct InitCallbackStage {
    runtime: Arc<Runtime>,
}

impl InitCallbackStage {
    /// Runs callbacks registered in `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl Stage for InitCallbackStage {
    fn name(&self) -> &'static str {
        "init_callbacks"
    }

    async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError> {
        let scheduler = self.runtime.init_scheduler();
        scheduler.start(cx.id);
        let results = scheduler.get_result(cx.id).await;

        let failed = results.iter().filter(|result| !result.succeeded()).count();
        if failed > 0 {
            return Err(StageError::InitCallbacks {
                failed,
                total: results.len(),
            });
        }
        Ok(StageOutcome::Continue)
    }

    async fn unload(&self, cx: StageContext<'_>, force: bool) {
        if !force {
            let scheduler = self.runtime.exit_scheduler();
            scheduler.start(cx.id);
            scheduler.get_result(cx.id).await;
        }
        self.runtime.unregister_owner(cx.id);
    }
}

/// Starts process and autorun schedulers; stops them on unload.
pub struct SchedulerStage {
    runtime: Arc<Runtime>,
}

impl SchedulerStage {
    /// Schedules callbacks registered in `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl Stage for SchedulerStage {
    fn name(&self) -> &'static str {
        "schedulers"
    }

    async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError> {
        self.runtime.process_scheduler().start(cx.id);
        self.runtime.autorun_scheduler().start(cx.id);
        Ok(StageOutcome::Continue)
    }

    async fn unload(&self, cx: StageContext<'_>, force: bool) {
        self.runtime.autorun_scheduler().stop(cx.id, force).await;
        self.runtime.process_scheduler().stop(cx.id, force).await;
    }
}

/// The built-in pipeline, in load order.
#[must_use]
pub fn default_stages(
    runtime: &Arc<Runtime>,
    loader: Arc<dyn PluginLoader>,
    modules: Arc<dyn ModuleResolver>,
) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(FrameworkVersionStage::new(FRAMEWORK_VERSION)),
        Arc::new(DependencyStage),
        Arc::new(ModuleStage::new(modules)),
        Arc::new(MountStage::new(Arc::clone(runtime), loader)),
        Arc::new(InitCallbackStage::new(Arc::clone(runtime))),
        Arc::new(SchedulerStage::new(Arc::clone(runtime))),
    ]
}
