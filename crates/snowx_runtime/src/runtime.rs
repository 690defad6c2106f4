//! The runtime service bundle and the callback registration API.
//!
//! A [`Runtime`] owns the event bus, the distributor, the completion-lock
//! registry, the callback and capability registries, and one
//! [`SchedulerManager`] per callback type. Plugins never reach these through
//! globals; the host passes the runtime (or a [`Context`](crate::callback::Context)
//! built from it) explicitly.
//!
//! # Example
//!
//! ```
//! use snowx_runtime::callback::{Callback, CallbackError, CallbackOptions, CallbackType};
//! use snowx_runtime::runtime::Runtime;
//! use snowx_system::config::RuntimeLimits;
//!
//! # tokio_test::block_on(async {
//! let runtime = Runtime::new(RuntimeLimits::default());
//! let greet = Callback::new("greet", |_| async { Ok::<_, CallbackError>(()) });
//!
//! runtime
//!     .register(CallbackType::Init, "hello", greet, CallbackOptions::new())
//!     .unwrap();
//!
//! assert!(runtime.init_scheduler().start("hello"));
//! let results = runtime.init_scheduler().get_result("hello").await;
//! assert!(results[0].succeeded());
//! # });
//! ```

use std::sync::Arc;

use snowx_system::api::CapabilityRegistry;
use snowx_system::config::RuntimeLimits;
use snowx_system::lock::CompletionLockRegistry;
use thiserror::Error;

use crate::callback::{
    AutorunWrapper, Callback, CallbackId, CallbackItem, CallbackOptions, CallbackRegistry,
    CallbackType, CallbackWrapper, EmptyWrapper, ProcessWrapper,
};
use crate::event::{Distributor, EventBus};
use crate::scheduler::{
    AutorunScheduling, ExecutionMethod, ProcessScheduling, SchedulerManager, SingleExecution,
};

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

/// Shared handles every callback context and scheduler sees.
#[derive(Clone)]
pub struct Services {
    bus: Arc<EventBus>,
    distributor: Arc<Distributor>,
    capabilities: Arc<CapabilityRegistry>,
    locks: Arc<CompletionLockRegistry<CallbackId>>,
    limits: RuntimeLimits,
}

impl Services {
    /// Creates fresh services sized by `limits`.
    #[must_use]
    pub fn new(limits: RuntimeLimits) -> Self {
        let bus = Arc::new(EventBus::new(limits.event_bus));
        let distributor = Arc::new(Distributor::new(
            Arc::clone(&bus),
            limits.distributor_queue,
            limits.distributor_buffer,
        ));
        Self {
            bus,
            distributor,
            capabilities: Arc::new(CapabilityRegistry::new()),
            locks: Arc::new(CompletionLockRegistry::new()),
            limits,
        }
    }

    /// The global event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The event distributor.
    #[must_use]
    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    /// Capabilities published by plugins.
    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    /// Completion locks of autorun callbacks.
    #[must_use]
    pub fn locks(&self) -> &Arc<CompletionLockRegistry<CallbackId>> {
        &self.locks
    }

    /// Queue sizes.
    #[must_use]
    pub fn limits(&self) -> RuntimeLimits {
        self.limits
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RegistrationError
// ─────────────────────────────────────────────────────────────────────────────

/// Errors returned by [`Runtime::register`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The owner id is empty.
    #[error("callback '{callback}' has an empty owner id")]
    EmptyOwner {
        /// Callback name.
        callback: String,
    },

    /// A process callback was registered without an event kind.
    #[error("process callback '{callback}' of '{owner}' does not subscribe to an event kind")]
    MissingSubscription {
        /// Registering owner.
        owner: String,
        /// Callback name.
        callback: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime
// ─────────────────────────────────────────────────────────────────────────────

/// Events, callbacks and schedulers of one host.
pub struct Runtime {
    services: Services,
    registry: Arc<CallbackRegistry>,
    init: SchedulerManager<SingleExecution>,
    exit: SchedulerManager<SingleExecution>,
    process: SchedulerManager<ProcessScheduling>,
    autorun: SchedulerManager<AutorunScheduling>,
}

impl Runtime {
    /// Creates a runtime with queues sized by `limits`.
    #[must_use]
    pub fn new(limits: RuntimeLimits) -> Self {
        let services = Services::new(limits);
        let registry = Arc::new(CallbackRegistry::new());
        Self {
            init: SchedulerManager::new(
                CallbackType::Init,
                ExecutionMethod::Serial,
                Arc::clone(&registry),
                services.clone(),
            ),
            exit: SchedulerManager::new(
                CallbackType::Exit,
                ExecutionMethod::Serial,
                Arc::clone(&registry),
                services.clone(),
            ),
            process: SchedulerManager::new(
                CallbackType::Process,
                (),
                Arc::clone(&registry),
                services.clone(),
            ),
            autorun: SchedulerManager::new(
                CallbackType::Autorun,
                (),
                Arc::clone(&registry),
                services.clone(),
            ),
            services,
            registry,
        }
    }

    /// Shared services.
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// The global event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        self.services.bus()
    }

    /// The event distributor.
    #[must_use]
    pub fn distributor(&self) -> &Arc<Distributor> {
        self.services.distributor()
    }

    /// Capabilities published by plugins.
    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        self.services.capabilities()
    }

    /// Registered callbacks.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Scheduler of init callbacks.
    #[must_use]
    pub fn init_scheduler(&self) -> &SchedulerManager<SingleExecution> {
        &self.init
    }

    /// Scheduler of exit callbacks.
    #[must_use]
    pub fn exit_scheduler(&self) -> &SchedulerManager<SingleExecution> {
        &self.exit
    }

    /// Scheduler of process callbacks.
    #[must_use]
    pub fn process_scheduler(&self) -> &SchedulerManager<ProcessScheduling> {
        &self.process
    }

    /// Scheduler of autorun callbacks.
    #[must_use]
    pub fn autorun_scheduler(&self) -> &SchedulerManager<AutorunScheduling> {
        &self.autorun
    }

    /// Registers `callback` for `owner`.
    ///
    /// Registering the same raw callback twice for one type and owner is a
    /// no-op that returns the same id.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty owner or a process callback without a
    /// subscription.
    pub fn register(
        &self,
        callback_type: CallbackType,
        owner: &str,
        callback: Callback,
        options: CallbackOptions,
    ) -> Result<CallbackId, RegistrationError> {
        if owner.is_empty() {
            return Err(RegistrationError::EmptyOwner {
                callback: callback.name().to_string(),
            });
        }

        let id = callback.id();
        if self.registry.contains_callback(callback_type, owner, id) {
            tracing::debug!(owner, callback = callback.name(), "callback already registered");
            return Ok(id);
        }

        let (executor, subscription, trigger, no_safe_exit) = options.into_parts();
        let wrapper: Arc<dyn CallbackWrapper> = match callback_type {
            CallbackType::Init | CallbackType::Exit => Arc::new(EmptyWrapper),
            CallbackType::Process => {
                let Some(kind) = subscription else {
                    return Err(RegistrationError::MissingSubscription {
                        owner: owner.to_string(),
                        callback: callback.name().to_string(),
                    });
                };
                Arc::new(ProcessWrapper::new(kind))
            }
            CallbackType::Autorun => {
                let locks = self.services.locks();
                let lock = locks.get_lock(&id, false);
                if no_safe_exit {
                    locks.set_nowait(&id);
                }
                Arc::new(AutorunWrapper::new(trigger, lock, no_safe_exit))
            }
        };

        let item = CallbackItem::new(callback_type, owner, callback, executor, wrapper);
        let label = item.label();
        if self.registry.insert(item) {
            tracing::info!(callback = %label, "Successfully registered in <{}>", callback_type);
        }
        Ok(id)
    }

    /// Forgets every callback of `owner`, returning how many were removed.
    ///
    /// Running schedulers keep the callbacks they started with until stopped.
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let removed = self.registry.remove_owner(owner);
        for item in &removed {
            if item.callback_type() == CallbackType::Autorun {
                self.services.locks().remove(&item.id());
            }
        }
        if !removed.is_empty() {
            tracing::debug!(owner, count = removed.len(), "callbacks unregistered");
        }
        removed.len()
    }
}

impl core::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.registry)
            .field("distributor", self.services.distributor())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackError;

    fn noop(name: &str) -> Callback {
        Callback::new(name, |_| async { Ok::<_, CallbackError>(()) })
    }

    #[test]
    fn double_registration_is_a_noop() {
        let runtime = Runtime::new(RuntimeLimits::default());
        let callback = noop("twice");

        let first = runtime
            .register(CallbackType::Init, "a", callback.clone(), CallbackOptions::new())
            .unwrap();
        let second = runtime
            .register(CallbackType::Init, "a", callback, CallbackOptions::new())
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(runtime.registry().get(CallbackType::Init, "a").len(), 1);
    }

    #[test]
    fn process_callbacks_need_a_subscription() {
        let runtime = Runtime::new(RuntimeLimits::default());
        let error = runtime
            .register(CallbackType::Process, "a", noop("p"), CallbackOptions::new())
            .unwrap_err();
        assert!(matches!(error, RegistrationError::MissingSubscription { .. }));

        assert!(matches!(
            runtime.register(CallbackType::Init, "", noop("i"), CallbackOptions::new()),
            Err(RegistrationError::EmptyOwner { .. })
        ));
    }

    #[test]
    fn autorun_with_empty_trigger_is_nowait() {
        let runtime = Runtime::new(RuntimeLimits::default());
        let id = runtime
            .register(CallbackType::Autorun, "a", noop("loop"), CallbackOptions::new())
            .unwrap();
        assert!(runtime.services().locks().is_nowait(&id));

        assert_eq!(runtime.unregister_owner("a"), 1);
        assert!(!runtime.services().locks().is_nowait(&id));
    }

    #[tokio::test]
    async fn scheduler_skips_owner_without_callbacks() {
        let runtime = Runtime::new(RuntimeLimits::default());
        assert!(!runtime.init_scheduler().start("nobody"));
        assert!(runtime.init_scheduler().stop("nobody", false).await.is_none());
        assert!(runtime.init_scheduler().get_result("nobody").await.is_empty());
    }
}
