//! Foundational primitives for SnowX (Layer 1).
//!
//! `snowx_system` provides the building blocks the runtime and host layers
//! are assembled from:
//!
//! - [`version`] - Semantic versions, wildcard patches and range checks
//! - [`lock`] - Completion locks and the per-symbol lock registry
//! - [`worker`] - Bounded producer/consumer pipeline
//! - [`api`] - Namespaced capability registry shared between plugins
//! - [`config`] - JSON runtime configuration with typed defaults
//!
//! # Architecture
//!
//! - **Layer 1** (`snowx_system`): primitives (this crate)
//! - **Layer 2** (`snowx_runtime`): events, callbacks and schedulers
//! - **Layer 3** (`snowx_host`): plugin discovery and lifecycle
//!
//! # Example
//!
//! ```
//! use snowx_system::prelude::*;
//!
//! let framework = Version::new(0, 1, 0);
//! let range = VersionRange::from_bounds(&[Some("0.1"), None]).unwrap();
//! assert!(framework.auto_check(&range).unwrap());
//!
//! let config = RuntimeConfig::new();
//! assert_eq!(RuntimeLimits::from_config(&config), RuntimeLimits::default());
//! ```

/// Capability registry shared between plugins.
pub mod api;

/// Runtime configuration.
pub mod config;

/// Completion locks.
pub mod lock;

/// Semantic versions and ranges.
pub mod version;

/// Producer/consumer worker.
pub mod worker;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::api::*;
    pub use crate::config::{ConfigError, RuntimeConfig, RuntimeLimits};
    pub use crate::lock::*;
    pub use crate::version::*;
    pub use crate::worker::*;
}
