//! Plugin discovery, dependency ordering and lifecycle for SnowX (Layer 3).
//!
//! `snowx_host` turns plugin directories into running plugins:
//!
//! - [`metadata`] - The `metadata.json` descriptor
//! - [`discovery`] - Scanning the plugin root into [`PluginInfo`](discovery::PluginInfo)s
//! - [`deps`] - Dependency tables and topological ordering
//! - [`plugin`] - The [`Plugin`](plugin::Plugin) extension trait and loaders
//! - [`module`] - External module availability
//! - [`stage`] - The load/unload pipeline
//! - [`manager`] - Loading, unloading and reloading in dependency order
//! - [`framework`] - Start, run and stop of the whole host
//! - [`control`] - The built-in control event processor
//!
//! # Load pipeline
//!
//! | # | Stage | Load | Unload |
//! |---|-------|------|--------|
//! | 0 | [`FrameworkVersionStage`](stage::FrameworkVersionStage) | check `DependentSnowxVersion` | - |
//! | 1 | [`DependencyStage`](stage::DependencyStage) | check loaded dependencies | - |
//! | 2 | [`ModuleStage`](stage::ModuleStage) | check `DependentModules` | - |
//! | 3 | [`MountStage`](stage::MountStage) | build the plugin | cleanup, drop registrations |
//! | 4 | [`InitCallbackStage`](stage::InitCallbackStage) | run init callbacks | run exit callbacks |
//! | 5 | [`SchedulerStage`](stage::SchedulerStage) | start process and autorun | stop them |

pub mod control;
pub mod deps;
pub mod discovery;
pub mod framework;
pub mod manager;
pub mod metadata;
pub mod module;
pub mod plugin;
pub mod stage;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::deps::{DependencyTable, SortedDeps};
    pub use crate::discovery::{PluginInfo, discover};
    pub use crate::framework::{
        FRAMEWORK_ID, FRAMEWORK_NAME, FRAMEWORK_VERSION, Framework, FrameworkError,
        FrameworkState, StopRequest,
    };
    pub use crate::manager::PluginManager;
    pub use crate::metadata::{Dependency, METADATA_FILENAME, Metadata, MetadataError};
    pub use crate::module::{ModuleResolver, StaticModules};
    pub use crate::plugin::{
        LoadError, Plugin, PluginContext, PluginError, PluginItem, PluginLoader, StaticLoader,
    };
    pub use crate::stage::{
        DependencyStage, FrameworkVersionStage, InitCallbackStage, ModuleStage, MountStage,
        SchedulerStage, Stage, StageContext, StageError, StageOutcome, default_stages,
    };
}
