//! Side effects composed around a callback at registration time.
//!
//! | Wrapper | Used for | Behavior |
//! |---------|----------|----------|
//! | [`EmptyWrapper`] | init, exit | run through the executor |
//! | [`ProcessWrapper`] | process | run, then publish a successful output |
//! | [`AutorunWrapper`] | autorun | loop: trigger, locked run, publish |

use std::sync::Arc;

use async_trait::async_trait;
use snowx_system::lock::CompletionLock;

use super::{CallbackItem, Context, ExecutionError, Trigger};
use crate::event::{EventKind, Output};

/// Adapter applied around every invocation of a callback.
#[async_trait]
pub trait CallbackWrapper: Send + Sync + 'static {
    /// Runs `item` with `ctx`.
    async fn invoke(&self, item: &CallbackItem, ctx: Context) -> Result<Output, ExecutionError>;

    /// Event kind the wrapped callback handles, for process callbacks.
    fn subscription(&self) -> Option<&'static EventKind> {
        None
    }
}

/// Runs the callback and returns its output unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyWrapper;

#[async_trait]
impl CallbackWrapper for EmptyWrapper {
    async fn invoke(&self, item: &CallbackItem, ctx: Context) -> Result<Output, ExecutionError> {
        item.execute(ctx).await
    }
}

/// Handles one event and publishes whatever the callback returns.
#[derive(Debug, Clone, Copy)]
pub struct ProcessWrapper {
    kind: &'static EventKind,
}

impl ProcessWrapper {
    /// Subscribes to `kind` and its subtypes.
    #[must_use]
    pub fn new(kind: &'static EventKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl CallbackWrapper for ProcessWrapper {
    async fn invoke(&self, item: &CallbackItem, ctx: Context) -> Result<Output, ExecutionError> {
        let output = item.execute(ctx.clone()).await?;
        ctx.bus().publish_output(output).await;
        Ok(Output::None)
    }

    fn subscription(&self) -> Option<&'static EventKind> {
        Some(self.kind)
    }
}

/// Runs the callback forever, once per trigger firing.
///
/// Each run holds the callback's completion lock, so a graceful stop can
/// wait for it to finish. Only a returned cancellation ends the loop.
pub struct AutorunWrapper {
    trigger: Arc<dyn Trigger>,
    lock: CompletionLock,
    no_safe_exit: bool,
}

impl AutorunWrapper {
    /// Creates the wrapper. `no_safe_exit` marks runs as safe to abort.
    #[must_use]
    pub fn new(trigger: Arc<dyn Trigger>, lock: CompletionLock, no_safe_exit: bool) -> Self {
        Self {
            trigger,
            lock,
            no_safe_exit,
        }
    }
}

/// Logs if dropped while armed, i.e. when the task is aborted mid-run.
struct InFlight<'a> {
    label: &'a str,
    no_safe_exit: bool,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.no_safe_exit {
            tracing::info!(callback = %self.label, "Exit <Autorun> callback function.");
        } else {
            tracing::warn!(callback = %self.label, "Unsafe exit <Autorun> callback function.");
        }
    }
}

#[async_trait]
impl CallbackWrapper for AutorunWrapper {
    async fn invoke(&self, item: &CallbackItem, ctx: Context) -> Result<Output, ExecutionError> {
        let label = item.label();
        loop {
            self.trigger.wait().await;

            let _guard = self.lock.enter();
            let mut in_flight = InFlight {
                label: &label,
                no_safe_exit: self.no_safe_exit,
                armed: true,
            };
            let result = item.execute(ctx.clone()).await;
            in_flight.armed = false;

            match result {
                Ok(output) => ctx.bus().publish_output(output).await,
                Err(error) if error.is_cancelled() => {
                    tracing::info!(callback = %label, "Exit <Autorun> callback function.");
                    return Err(error);
                }
                Err(_) => {}
            }
        }
    }
}
