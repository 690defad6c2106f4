//! Core infrastructure plugins for SnowX.
//!
//! This crate provides plugins and triggers most SnowX hosts need:
//!
//! - [`TracingPlugin`] - Logging setup from the runtime configuration
//! - [`AutoStopPlugin`] - Stops the framework after a countdown
//! - [`trigger`] - Interval, controllable, reset and cron triggers for autorun callbacks
//!
//! # Example
//!
//! ```no_run
//! use snowx_core_plugins::{AutoStopPlugin, TracingPlugin};
//! use snowx_host::plugin::StaticLoader;
//! use snowx_system::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load("config.json").unwrap();
//! TracingPlugin::from_config(&config).init();
//!
//! let auto_stop = AutoStopPlugin::from_config(&config);
//! let loader = StaticLoader::new()
//!     .with_plugin("tracing", TracingPlugin::default)
//!     .with_plugin("auto_stop", move || auto_stop);
//! # let _ = loader;
//! ```

mod auto_stop;
mod tracing_plugin;
pub mod trigger;

pub use auto_stop::{AUTO_STOP_COUNTDOWN, AutoStopPlugin};
pub use tracing_plugin::{
    FILELOG_NAME, TracingConfig, TracingFormat, TracingPlugin, level_from_name,
};
pub use trigger::{
    ControllableTrigger, CronTrigger, IntervalTrigger, ResetTrigger, TriggerError,
};
