//! Stopping the framework after a fixed time.

use core::time::Duration;

use snowx_host::plugin::{Plugin, PluginContext, PluginError};
use snowx_runtime::callback::{Callback, CallbackError, CallbackOptions};
use snowx_runtime::event::FrameworkEvent;
use snowx_system::config::RuntimeConfig;

use crate::trigger::IntervalTrigger;

/// Seconds until the stop request; negative disables the plugin.
pub const AUTO_STOP_COUNTDOWN: &str = "AUTO_STOP_COUNTDOWN";

/// Publishes a graceful [`FrameworkEvent::Stop`] once its countdown ends.
///
/// Without a countdown the plugin mounts but registers nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoStopPlugin {
    countdown: Option<Duration>,
}

impl AutoStopPlugin {
    /// Stops the framework `countdown` after the plugin loads.
    #[must_use]
    pub fn new(countdown: Duration) -> Self {
        Self {
            countdown: Some(countdown),
        }
    }

    /// Reads [`AUTO_STOP_COUNTDOWN`] (default `-1`).
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let seconds: f64 = config.get(AUTO_STOP_COUNTDOWN, -1.0);
        Self {
            countdown: Duration::try_from_secs_f64(seconds).ok(),
        }
    }

    /// Configured countdown.
    #[must_use]
    pub fn countdown(&self) -> Option<Duration> {
        self.countdown
    }
}

impl Plugin for AutoStopPlugin {
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let Some(countdown) = self.countdown else {
            return Ok(());
        };

        tracing::info!(plugin = cx.id(), ?countdown, "auto stop armed");
        cx.on_autorun(
            Callback::new("auto_stop", |_| async {
                Ok::<_, CallbackError>(FrameworkEvent::Stop { force: false })
            }),
            CallbackOptions::new().with_trigger(IntervalTrigger::new(countdown)),
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        "AutoStopPlugin"
    }
}
