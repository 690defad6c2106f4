//! Events, callbacks and schedulers for SnowX (Layer 2).
//!
//! - [`event`] - Event kinds, the global bus and the per-owner distributor
//! - [`callback`] - Callbacks, executors, wrappers, triggers and the registry
//! - [`scheduler`] - Single-execution, process and autorun schedulers
//! - [`runtime`] - The service bundle and the registration API
//!
//! # Callback types
//!
//! | Type | Scheduler | Runs |
//! |------|-----------|------|
//! | `Init` | [`SingleExecution`](scheduler::SingleExecution) | once when the owner loads |
//! | `Exit` | [`SingleExecution`](scheduler::SingleExecution) | once when the owner unloads |
//! | `Process` | [`ProcessScheduling`](scheduler::ProcessScheduling) | per subscribed event |
//! | `Autorun` | [`AutorunScheduling`](scheduler::AutorunScheduling) | per trigger firing |

pub mod callback;
pub mod event;
pub mod runtime;
pub mod scheduler;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::callback::{
        Callback, CallbackError, CallbackExecutor, CallbackId, CallbackItem, CallbackOptions,
        CallbackRegistry, CallbackResult, CallbackType, Context, EmptyTrigger, ExecutionError,
        PassThroughExecutor, RetryExecutor, Trigger,
    };
    pub use crate::event::framework::kinds;
    pub use crate::event::{
        BASE_EVENT, Distributor, Event, EventBus, EventKind, EventQueue, FrameworkEvent, Output,
    };
    pub use crate::runtime::{RegistrationError, Runtime, Services};
    pub use crate::scheduler::{
        AutorunScheduling, ExecutionMethod, ProcessScheduling, SchedulerItem, SchedulerManager,
        SingleExecution,
    };
}
