//! Per-owner schedulers for each callback type.
//!
//! A [`SchedulerManager`] owns at most one running [`SchedulerItem`] per
//! owner. Items are created fresh on every start and discarded on stop.
//!
//! | Item | Callback types | Runs |
//! |------|----------------|------|
//! | [`SingleExecution`] | init, exit | the whole batch once |
//! | [`ProcessScheduling`] | process | matching callbacks per routed event |
//! | [`AutorunScheduling`] | autorun | one looping task per callback |

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::callback::{CallbackItem, CallbackRegistry, CallbackType};
use crate::runtime::Services;

mod autorun;
mod process;
mod single;

pub use autorun::AutorunScheduling;
pub use process::ProcessScheduling;
pub use single::{ExecutionMethod, SingleExecution};

/// One owner's running group of callbacks.
#[async_trait]
pub trait SchedulerItem: Send + Sync + Sized + 'static {
    /// Fixed configuration shared by every item of a manager.
    type Config: Clone + Send + Sync + 'static;
    /// What a stop hands back.
    type Output: Send + Default;

    /// Creates a stopped item for `owner`.
    fn create(
        owner: &str,
        callbacks: Vec<Arc<CallbackItem>>,
        services: Services,
        config: &Self::Config,
    ) -> Self;

    /// Starts running the callbacks.
    fn start(&mut self);

    /// Stops the item, waiting for in-flight work unless `force` is set.
    async fn stop(&mut self, force: bool) -> Self::Output;
}

/// Running scheduler items of one callback type, keyed by owner.
pub struct SchedulerManager<S: SchedulerItem> {
    callback_type: CallbackType,
    config: S::Config,
    registry: Arc<CallbackRegistry>,
    services: Services,
    items: Mutex<HashMap<String, S>>,
}

impl<S: SchedulerItem> SchedulerManager<S> {
    /// Creates a manager for `callback_type`.
    #[must_use]
    pub fn new(
        callback_type: CallbackType,
        config: S::Config,
        registry: Arc<CallbackRegistry>,
        services: Services,
    ) -> Self {
        Self {
            callback_type,
            config,
            registry,
            services,
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Callback type this manager schedules.
    #[must_use]
    pub fn callback_type(&self) -> CallbackType {
        self.callback_type
    }

    /// Starts the scheduler of `owner`.
    ///
    /// Returns false without doing anything if it is already running or the
    /// owner has no callbacks of this type.
    pub fn start(&self, owner: &str) -> bool {
        let mut items = self.items.lock();
        if items.contains_key(owner) {
            tracing::info!("[{}scheduler]:{} is already running.", self.callback_type, owner);
            return false;
        }

        let callbacks = self.registry.get(self.callback_type, owner);
        if callbacks.is_empty() {
            tracing::info!(
                "[{}scheduler]:{} no registered callback found, skip startup.",
                self.callback_type,
                owner
            );
            return false;
        }

        let mut item = S::create(owner, callbacks, self.services.clone(), &self.config);
        item.start();
        items.insert(owner.to_string(), item);
        tracing::info!("[{}scheduler]:{} started successfully.", self.callback_type, owner);
        true
    }

    /// Stops and discards the scheduler of `owner`.
    ///
    /// Returns `None` if it was not running.
    pub async fn stop(&self, owner: &str, force: bool) -> Option<S::Output> {
        let Some(mut item) = self.items.lock().remove(owner) else {
            tracing::info!("[{}scheduler]:{} is not running.", self.callback_type, owner);
            return None;
        };

        let output = item.stop(force).await;
        tracing::info!(force, "[{}scheduler]:{} stopped.", self.callback_type, owner);
        Some(output)
    }

    /// Returns true if `owner`'s scheduler is running.
    #[must_use]
    pub fn is_running(&self, owner: &str) -> bool {
        self.items.lock().contains_key(owner)
    }

    /// Owners with a running scheduler, sorted.
    #[must_use]
    pub fn running(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.items.lock().keys().cloned().collect();
        owners.sort_unstable();
        owners
    }

    /// Stops every running scheduler.
    pub async fn stop_all(&self, force: bool) {
        for owner in self.running() {
            self.stop(&owner, force).await;
        }
    }
}

impl SchedulerManager<SingleExecution> {
    /// Waits for `owner`'s batch to finish and returns its results.
    ///
    /// The scheduler is discarded afterwards. Returns an empty list if it was
    /// not running.
    pub async fn get_result(&self, owner: &str) -> Vec<crate::callback::CallbackResult> {
        let Some(results) = self.stop(owner, false).await else {
            return Vec::new();
        };
        tracing::info!(
            "[{}scheduler]:{} executed successfully.",
            self.callback_type,
            owner
        );
        results
    }
}

impl<S: SchedulerItem> core::fmt::Debug for SchedulerManager<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchedulerManager")
            .field("callback_type", &self.callback_type)
            .field("running", &self.running())
            .finish()
    }
}
