//! Triggers for pacing autorun callbacks.
//!
//! | Trigger | Fires |
//! |---------|-------|
//! | [`IntervalTrigger`] | after a fixed delay, every time |
//! | [`ControllableTrigger`] | immediately while enabled, never while disabled |
//! | [`ResetTrigger`] | once per [`enable`](ResetTrigger::enable) |
//! | [`CronTrigger`] | at the next time matching a cron expression |
//!
//! # Example
//!
//! ```
//! use core::time::Duration;
//! use snowx_core_plugins::trigger::IntervalTrigger;
//! use snowx_runtime::callback::CallbackOptions;
//!
//! let options = CallbackOptions::new().with_trigger(IntervalTrigger::new(Duration::from_secs(30)));
//! # let _ = options;
//! ```

use core::str::FromStr;
use core::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use snowx_runtime::callback::Trigger;
use thiserror::Error;
use tokio::sync::{Notify, watch};

/// Errors building a trigger.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression {expression:?}: {source}")]
    Cron {
        /// Expression as given.
        expression: String,
        /// Parser error.
        #[source]
        source: cron::error::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// IntervalTrigger
// ─────────────────────────────────────────────────────────────────────────────

/// Sleeps a fixed period before every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTrigger {
    period: Duration,
}

impl IntervalTrigger {
    /// Fires every `period`.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Delay before each run.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl Trigger for IntervalTrigger {
    async fn wait(&self) {
        tokio::time::sleep(self.period).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControllableTrigger
// ─────────────────────────────────────────────────────────────────────────────

/// A gate that lets runs through while enabled.
///
/// Starts disabled.
#[derive(Debug)]
pub struct ControllableTrigger {
    enabled: watch::Sender<bool>,
}

impl Default for ControllableTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllableTrigger {
    /// Creates a disabled trigger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: watch::Sender::new(false),
        }
    }

    /// Lets runs through until [`disable`](Self::disable).
    pub fn enable(&self) {
        self.enabled.send_replace(true);
    }

    /// Holds runs back until [`enable`](Self::enable).
    pub fn disable(&self) {
        self.enabled.send_replace(false);
    }

    /// Returns true while runs are let through.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }
}

#[async_trait]
impl Trigger for ControllableTrigger {
    async fn wait(&self) {
        let mut enabled = self.enabled.subscribe();
        let _ = enabled.wait_for(|enabled| *enabled).await;
        tokio::task::yield_now().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResetTrigger
// ─────────────────────────────────────────────────────────────────────────────

/// Fires once for each call to [`enable`](Self::enable).
///
/// Enabling while no run is waiting is remembered, so the next wait returns
/// at once. Enabling twice before a wait still fires only once.
///
/// ```
/// use snowx_core_plugins::trigger::ResetTrigger;
/// use snowx_runtime::callback::Trigger;
///
/// let trigger = ResetTrigger::new();
/// trigger.enable();
/// # tokio_test::block_on(async {
/// trigger.wait().await;
/// # });
/// ```
#[derive(Debug, Default)]
pub struct ResetTrigger {
    armed: Notify,
}

impl ResetTrigger {
    /// Creates a disarmed trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the trigger for one run.
    pub fn enable(&self) {
        self.armed.notify_one();
    }
}

#[async_trait]
impl Trigger for ResetTrigger {
    async fn wait(&self) {
        self.armed.notified().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CronTrigger
// ─────────────────────────────────────────────────────────────────────────────

/// Waits for the next UTC time matching a cron expression.
///
/// Five-field expressions (`min hour day month weekday`) fire at second 0;
/// six and seven-field expressions carry their own seconds and year.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
}

impl CronTrigger {
    /// Parses `expression`.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Cron`] if the expression is invalid.
    pub fn new(expression: impl Into<String>) -> Result<Self, TriggerError> {
        let expression = expression.into();
        let normalized = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.clone()
        };
        let schedule = Schedule::from_str(&normalized).map_err(|source| TriggerError::Cron {
            expression: expression.clone(),
            source,
        })?;
        Ok(Self {
            expression,
            schedule,
        })
    }

    /// Expression as given.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Time left until the next matching instant, `None` if there is none.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        let now = Utc::now();
        let next = self.schedule.after(&now).next()?;
        Some((next - now).to_std().unwrap_or_default())
    }
}

#[async_trait]
impl Trigger for CronTrigger {
    async fn wait(&self) {
        match self.next_delay() {
            Some(delay) => tokio::time::sleep(delay).await,
            None => {
                tracing::warn!(expression = %self.expression, "cron expression never fires again");
                core::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn fires(trigger: &dyn Trigger) -> bool {
        tokio::time::timeout(Duration::from_millis(50), trigger.wait())
            .await
            .is_ok()
    }

    #[tokio::test(start_paused = true)]
    async fn interval_sleeps_for_its_period() {
        let trigger = IntervalTrigger::new(Duration::from_secs(10));
        let started = tokio::time::Instant::now();
        trigger.wait().await;
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn controllable_follows_the_gate() {
        let trigger = ControllableTrigger::new();
        assert!(!fires(&trigger).await);

        trigger.enable();
        assert!(fires(&trigger).await);
        assert!(fires(&trigger).await);

        trigger.disable();
        assert!(!trigger.is_enabled());
        assert!(!fires(&trigger).await);
    }

    #[tokio::test]
    async fn controllable_wakes_a_waiting_run() {
        let trigger = Arc::new(ControllableTrigger::new());
        let waiter = tokio::spawn({
            let trigger = Arc::clone(&trigger);
            async move { trigger.wait().await }
        });
        tokio::task::yield_now().await;
        trigger.enable();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn reset_fires_once_per_enable() {
        let trigger = ResetTrigger::new();
        assert!(!fires(&trigger).await);

        trigger.enable();
        trigger.enable();
        assert!(fires(&trigger).await);
        assert!(!fires(&trigger).await);

        trigger.enable();
        assert!(fires(&trigger).await);
    }

    #[test]
    fn cron_accepts_five_and_six_fields() {
        let every_minute = CronTrigger::new("* * * * *").unwrap();
        assert_eq!(every_minute.expression(), "* * * * *");
        let delay = every_minute.next_delay().unwrap();
        assert!(delay <= Duration::from_secs(60));

        let every_second = CronTrigger::new("* * * * * *").unwrap();
        assert!(every_second.next_delay().unwrap() <= Duration::from_secs(1));
    }

    #[test]
    fn cron_rejects_garbage() {
        let error = CronTrigger::new("every tuesday").unwrap_err();
        assert!(error.to_string().contains("every tuesday"));
    }
}
