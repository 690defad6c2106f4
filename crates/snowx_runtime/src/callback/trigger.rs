//! Pacing for autorun callbacks.

use async_trait::async_trait;

/// Something an autorun callback waits on before each run.
#[async_trait]
pub trait Trigger: Send + Sync + 'static {
    /// Resolves when the next run should start.
    async fn wait(&self);

    /// Returns true if callbacks paced by this trigger can always be
    /// cancelled mid-run without waiting for them.
    fn always_safe_to_cancel(&self) -> bool {
        false
    }
}

/// Fires immediately after yielding once.
///
/// Used for long-running autorun callbacks that loop internally, so they
/// default to being cancellable at any point.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTrigger;

#[async_trait]
impl Trigger for EmptyTrigger {
    async fn wait(&self) {
        tokio::task::yield_now().await;
    }

    fn always_safe_to_cancel(&self) -> bool {
        true
    }
}
