//! How a single callback invocation is run.
//!
//! [`PassThroughExecutor`] calls the function once. [`RetryExecutor`] adds
//! an optional timeout per attempt and a fixed number of retries with a fixed
//! pause in between. Cancellation is never retried.

use core::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{CallbackError, CallbackItem, Context};
use crate::event::Output;

/// Failure reported by an executor after its policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Every attempt failed.
    #[error("callback {label} failed after {attempts} attempt(s): {source}")]
    Failed {
        /// Callback label.
        label: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: CallbackError,
    },

    /// The callback was cancelled.
    #[error("callback {label} cancelled")]
    Cancelled {
        /// Callback label.
        label: String,
    },
}

impl ExecutionError {
    /// Returns true for [`ExecutionError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Strategy for running one invocation of a callback.
#[async_trait]
pub trait CallbackExecutor: Send + Sync + 'static {
    /// Runs `item`'s raw callback with `ctx`.
    async fn execute(&self, item: &CallbackItem, ctx: Context) -> Result<Output, ExecutionError>;
}

/// Runs the callback once and logs a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughExecutor;

#[async_trait]
impl CallbackExecutor for PassThroughExecutor {
    async fn execute(&self, item: &CallbackItem, ctx: Context) -> Result<Output, ExecutionError> {
        match item.callback().call(ctx).await {
            Ok(output) => Ok(output),
            Err(CallbackError::Cancelled) => Err(ExecutionError::Cancelled {
                label: item.label(),
            }),
            Err(source) => {
                tracing::error!(callback = %item.label(), error = %source, "Callback function runs abnormally");
                Err(ExecutionError::Failed {
                    label: item.label(),
                    attempts: 1,
                    source,
                })
            }
        }
    }
}

/// Timeout plus bounded fixed-interval retry.
///
/// ```
/// use core::time::Duration;
/// use snowx_runtime::callback::RetryExecutor;
///
/// // At most 3 attempts of at most 5s each, 1s apart.
/// let executor = RetryExecutor::new(Some(Duration::from_secs(5)), 2, Duration::from_secs(1));
/// assert_eq!(executor.attempts(), 3);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    timeout: Option<Duration>,
    retry_num: u32,
    retry_interval: Duration,
}

impl RetryExecutor {
    /// Creates an executor. `None` disables the per-attempt timeout.
    #[must_use]
    pub fn new(timeout: Option<Duration>, retry_num: u32, retry_interval: Duration) -> Self {
        Self {
            timeout,
            retry_num,
            retry_interval,
        }
    }

    /// Total attempts: the first one plus `retry_num` retries.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.retry_num.saturating_add(1)
    }

    async fn attempt(&self, item: &CallbackItem, ctx: Context) -> Result<Output, CallbackError> {
        let call = item.callback().call(ctx);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(CallbackError::Timeout(limit))),
            None => call.await,
        }
    }
}

#[async_trait]
impl CallbackExecutor for RetryExecutor {
    async fn execute(&self, item: &CallbackItem, ctx: Context) -> Result<Output, ExecutionError> {
        let label = item.label();
        let attempts = self.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.attempt(item, ctx.clone()).await {
                Ok(output) => return Ok(output),
                Err(CallbackError::Cancelled) => return Err(ExecutionError::Cancelled { label }),
                Err(error) => error,
            };

            if matches!(error, CallbackError::Timeout(_)) {
                tracing::warn!(callback = %label, "Callback function runs out of time");
            } else {
                tracing::error!(callback = %label, error = %error, "Callback function runs abnormally");
            }

            if attempt >= attempts {
                tracing::error!(
                    callback = %label,
                    "The number of retrials has reached the upper limit: ({}/{})",
                    self.retry_num,
                    self.retry_num
                );
                return Err(ExecutionError::Failed {
                    label,
                    attempts,
                    source: error,
                });
            }

            tokio::time::sleep(self.retry_interval).await;
            tracing::warn!(callback = %label, "Retrying({}/{})...", attempt, self.retry_num);
        }
    }
}
