//! Callbacks, their registration record and the context they run in.
//!
//! A [`Callback`] is a named async function from [`Context`] to
//! [`Output`]. Registration pairs it with an owner, a [`CallbackExecutor`]
//! (how one invocation is run) and a [`CallbackWrapper`] (what happens around
//! it), producing a [`CallbackItem`] stored in the [`CallbackRegistry`].
//!
//! # Example
//!
//! ```
//! use snowx_runtime::callback::{Callback, CallbackError};
//! use snowx_runtime::event::Output;
//!
//! let hello = Callback::new("hello", |ctx| async move {
//!     tracing::info!(owner = %ctx.owner(), "hello");
//!     Ok::<_, CallbackError>(Output::None)
//! });
//!
//! // Clones share an identity; registering both is a single registration.
//! assert_eq!(hello.id(), hello.clone().id());
//! ```

use core::any::Any;
use core::fmt;
use core::panic::AssertUnwindSafe;
use core::time::Duration;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use snowx_system::api::{API, CapabilityRegistry};
use thiserror::Error;

use crate::event::{Event, EventBus, EventKind, Output};
use crate::runtime::Services;

pub mod executor;
pub mod registry;
pub mod result;
pub mod trigger;
pub mod wrapper;

pub use executor::{CallbackExecutor, ExecutionError, PassThroughExecutor, RetryExecutor};
pub use registry::CallbackRegistry;
pub use result::CallbackResult;
pub use trigger::{EmptyTrigger, Trigger};
pub use wrapper::{AutorunWrapper, CallbackWrapper, EmptyWrapper, ProcessWrapper};

// ─────────────────────────────────────────────────────────────────────────────
// CallbackType
// ─────────────────────────────────────────────────────────────────────────────

/// The four callback disciplines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallbackType {
    /// Run once, serially, when the owner is loaded.
    Init,
    /// Run once, serially, when the owner is unloaded.
    Exit,
    /// Run for every event of the subscribed kind.
    Process,
    /// Run repeatedly, paced by a trigger.
    Autorun,
}

impl CallbackType {
    /// Every callback type, in lifecycle order.
    pub const ALL: [CallbackType; 4] = [Self::Init, Self::Exit, Self::Process, Self::Autorun];
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Exit => "exit",
            Self::Process => "process",
            Self::Autorun => "autorun",
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CallbackError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single callback invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The callback reported an error.
    #[error("{0}")]
    Failed(String),

    /// The callback panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),

    /// The invocation exceeded the executor's timeout.
    #[error("callback timed out after {0:?}")]
    Timeout(Duration),

    /// The callback asked to be cancelled; never retried.
    #[error("callback cancelled")]
    Cancelled,
}

impl CallbackError {
    /// Creates a [`CallbackError::Failed`] from any displayable error.
    pub fn failed(error: impl fmt::Display) -> Self {
        Self::Failed(error.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Callback
// ─────────────────────────────────────────────────────────────────────────────

type CallbackFn = dyn Fn(Context) -> BoxFuture<'static, Result<Output, CallbackError>> + Send + Sync;

/// Identity of a raw callback function; clones of a [`Callback`] share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(usize);

/// A named async callback function.
#[derive(Clone)]
pub struct Callback {
    name: Arc<str>,
    func: Arc<CallbackFn>,
}

impl Callback {
    /// Wraps an async function.
    ///
    /// The function may return anything convertible into [`Output`]: `()`,
    /// an [`Event`], `Option<Event>` or `Vec<Event>`.
    pub fn new<F, Fut, O>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, CallbackError>> + Send + 'static,
        O: Into<Output>,
    {
        let name: String = name.into();
        Self {
            name: name.into(),
            func: Arc::new(move |ctx| func(ctx).map(|result| result.map(Into::into)).boxed()),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity used for deduplication and lock lookup.
    #[must_use]
    pub fn id(&self) -> CallbackId {
        CallbackId(Arc::as_ptr(&self.func).cast::<()>().addr())
    }

    /// Invokes the function once. Panics are reported as
    /// [`CallbackError::Panicked`].
    pub async fn call(&self, ctx: Context) -> Result<Output, CallbackError> {
        let func = Arc::clone(&self.func);
        AssertUnwindSafe(async move { func(ctx).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CallbackError::Panicked(panic_message(panic.as_ref()))))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("id", &self.id())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a callback can see: its owner, the triggering event (for
/// process callbacks) and the shared services.
#[derive(Clone)]
pub struct Context {
    owner: Arc<str>,
    event: Option<Event>,
    services: Services,
}

impl Context {
    pub(crate) fn new(owner: &str, event: Option<Event>, services: Services) -> Self {
        Self {
            owner: owner.into(),
            event,
            services,
        }
    }

    /// Id of the plugin (or subsystem) that registered the callback.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The event being processed, for process callbacks.
    #[must_use]
    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    /// The global event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        self.services.bus()
    }

    /// Capabilities published by loaded plugins.
    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        self.services.capabilities()
    }

    /// Looks up the capability of type `A` published by `namespace`.
    #[must_use]
    pub fn api<A: API>(&self, namespace: &str) -> Option<Arc<A>> {
        self.services.capabilities().get(namespace)
    }

    /// Publishes an event on the global bus.
    pub async fn publish(&self, event: impl Into<Event>) {
        self.services.bus().publish(event).await;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("owner", &self.owner)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CallbackItem
// ─────────────────────────────────────────────────────────────────────────────

/// A registered callback: the raw function plus its owner, executor and
/// wrapper.
pub struct CallbackItem {
    callback_type: CallbackType,
    owner: String,
    callback: Callback,
    executor: Arc<dyn CallbackExecutor>,
    wrapper: Arc<dyn CallbackWrapper>,
}

impl CallbackItem {
    /// Assembles a registration record.
    #[must_use]
    pub fn new(
        callback_type: CallbackType,
        owner: impl Into<String>,
        callback: Callback,
        executor: Arc<dyn CallbackExecutor>,
        wrapper: Arc<dyn CallbackWrapper>,
    ) -> Self {
        Self {
            callback_type,
            owner: owner.into(),
            callback,
            executor,
            wrapper,
        }
    }

    /// Callback type.
    #[must_use]
    pub fn callback_type(&self) -> CallbackType {
        self.callback_type
    }

    /// Registering owner.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The raw callback.
    #[must_use]
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Identity of the raw callback.
    #[must_use]
    pub fn id(&self) -> CallbackId {
        self.callback.id()
    }

    /// `[owner.name]`, used in every log line about this callback.
    #[must_use]
    pub fn label(&self) -> String {
        format!("[{}.{}]", self.owner, self.callback.name())
    }

    /// Event kind this callback subscribes to, for process callbacks.
    #[must_use]
    pub fn subscription(&self) -> Option<&'static EventKind> {
        self.wrapper.subscription()
    }

    /// Runs the raw callback once through the executor.
    ///
    /// # Errors
    ///
    /// Returns the executor's error once its policy gives up.
    pub async fn execute(&self, ctx: Context) -> Result<Output, ExecutionError> {
        self.executor.execute(self, ctx).await
    }

    /// Runs the callback through its wrapper.
    ///
    /// # Errors
    ///
    /// Returns the wrapper's error (usually the executor's).
    pub async fn invoke(&self, ctx: Context) -> Result<Output, ExecutionError> {
        self.wrapper.invoke(self, ctx).await
    }
}

impl fmt::Debug for CallbackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackItem")
            .field("type", &self.callback_type)
            .field("owner", &self.owner)
            .field("callback", &self.callback)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CallbackOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Per-registration options.
///
/// ```
/// use core::time::Duration;
/// use snowx_runtime::callback::{CallbackOptions, RetryExecutor};
/// use snowx_runtime::event::framework::kinds;
///
/// let options = CallbackOptions::new()
///     .subscribe(&kinds::RELOAD_ALL)
///     .with_executor(RetryExecutor::new(Some(Duration::from_secs(5)), 2, Duration::ZERO));
/// assert!(options.subscription().is_some());
/// ```
#[derive(Clone, Default)]
pub struct CallbackOptions {
    executor: Option<Arc<dyn CallbackExecutor>>,
    subscription: Option<&'static EventKind>,
    trigger: Option<Arc<dyn Trigger>>,
    no_safe_exit: Option<bool>,
}

impl CallbackOptions {
    /// Default options: pass-through executor, no subscription, empty trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the callback through `executor`.
    #[must_use]
    pub fn with_executor(mut self, executor: impl CallbackExecutor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Subscribes a process callback to `kind` and its subtypes.
    #[must_use]
    pub fn subscribe(mut self, kind: &'static EventKind) -> Self {
        self.subscription = Some(kind);
        self
    }

    /// Paces an autorun callback with `trigger`.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Trigger) -> Self {
        self.trigger = Some(Arc::new(trigger));
        self
    }

    /// Declares whether an autorun callback may be cancelled mid-execution
    /// without waiting for it. Defaults to true only for [`EmptyTrigger`].
    #[must_use]
    pub fn with_no_safe_exit(mut self, no_safe_exit: bool) -> Self {
        self.no_safe_exit = Some(no_safe_exit);
        self
    }

    /// Subscribed kind, if any.
    #[must_use]
    pub fn subscription(&self) -> Option<&'static EventKind> {
        self.subscription
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Arc<dyn CallbackExecutor>,
        Option<&'static EventKind>,
        Arc<dyn Trigger>,
        bool,
    ) {
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(PassThroughExecutor));
        let trigger = self.trigger.unwrap_or_else(|| Arc::new(EmptyTrigger));
        let no_safe_exit = self
            .no_safe_exit
            .unwrap_or_else(|| trigger.always_safe_to_cancel());
        (executor, self.subscription, trigger, no_safe_exit)
    }
}

impl fmt::Debug for CallbackOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackOptions")
            .field("subscription", &self.subscription)
            .field("no_safe_exit", &self.no_safe_exit)
            .finish_non_exhaustive()
    }
}
