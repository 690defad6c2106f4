//! # SnowX Internal Library
//!
//! Re-exports the core SnowX crates for convenience.

/// Layer 1: Versions, locks, workers, capabilities and configuration.
pub use snowx_system;

/// Layer 2: Events, callbacks and schedulers.
pub use snowx_runtime;

/// Layer 3: Plugin discovery and lifecycle.
pub use snowx_host;

/// Logging, auto stop and extra triggers.
pub use snowx_core_plugins;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use snowx_core_plugins::{
        AutoStopPlugin, ControllableTrigger, CronTrigger, IntervalTrigger, ResetTrigger,
        TracingFormat, TracingPlugin,
    };
    pub use snowx_host::prelude::*;
    pub use snowx_runtime::prelude::*;
    pub use snowx_system::prelude::*;
}
