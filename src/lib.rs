//! A plugin host runtime: dependency-ordered plugin lifecycle over an async
//! event bus and callback schedulers.

pub use snowx_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use snowx_internal::prelude::*;
}
