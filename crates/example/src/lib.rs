//! Example plugins for the SnowX demo host.
//!
//! Two plugins talk over the event bus:
//!
//! ```text
//! ┌──────────┐   TickEvent(n)   ┌─────────────┐
//! │  ticker  │ ───────────────▶ │ tick_logger │
//! └──────────┘                  └─────────────┘
//!      │ TickCounter (capability)      ▲
//!      └───────────────────────────────┘
//! ```
//!
//! `ticker` publishes a numbered tick on every interval and exposes its
//! counter as a capability. `tick_logger` depends on `ticker`, logs every
//! tick it receives, and reads the counter when it shuts down.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

use snowx_core_plugins::trigger::IntervalTrigger;
use snowx_core_plugins::{AutoStopPlugin, TracingPlugin};
use snowx_host::framework::FrameworkState;
use snowx_host::plugin::{Plugin, PluginContext, PluginError, StaticLoader};
use snowx_runtime::callback::{Callback, CallbackError, CallbackOptions, Context};
use snowx_runtime::event::{BASE_EVENT, Event, EventKind};
use snowx_system::api::API;
use snowx_system::config::RuntimeConfig;

/// Seconds between two ticks.
pub const TICK_INTERVAL: &str = "TICK_INTERVAL";

/// Published by `ticker`; the payload is the tick number.
pub static TICK_EVENT: EventKind = EventKind::new("TickEvent", &BASE_EVENT);

// ─────────────────────────────────────────────────────────────────────────────
// ticker
// ─────────────────────────────────────────────────────────────────────────────

/// Number of ticks published so far.
#[derive(Debug, Default)]
pub struct TickCounter {
    count: AtomicU64,
}

impl API for TickCounter {}

impl TickCounter {
    /// Counts one more tick and returns its number, starting at 1.
    pub fn advance(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Ticks published so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Publishes [`TICK_EVENT`] every `period`.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Duration,
}

impl Ticker {
    /// Ticks every `period`.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Plugin for Ticker {
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        cx.insert_api(TickCounter::default());
        let counter = cx
            .api::<TickCounter>(cx.id())
            .ok_or_else(|| PluginError::failed("tick counter not published"))?;

        cx.on_autorun(
            Callback::new("tick", move |_| {
                let counter = Arc::clone(&counter);
                async move { Ok::<_, CallbackError>(Event::custom(&TICK_EVENT, counter.advance())) }
            }),
            CallbackOptions::new().with_trigger(IntervalTrigger::new(self.period)),
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        "Ticker"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// tick_logger
// ─────────────────────────────────────────────────────────────────────────────

/// Logs every [`TICK_EVENT`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TickLogger;

impl Plugin for TickLogger {
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let counter = cx
            .api::<TickCounter>("ticker")
            .ok_or_else(|| PluginError::failed("ticker capability missing"))?;

        cx.on_init(Callback::new("ready", |ctx: Context| async move {
            tracing::info!(plugin = ctx.owner(), "tick logger ready");
            Ok::<_, CallbackError>(())
        }))?;
        cx.on_process(
            &TICK_EVENT,
            Callback::new("log_tick", |ctx: Context| async move {
                if let Some(tick) = ctx.event().and_then(|event| event.payload::<u64>()) {
                    tracing::info!(tick, "tick received");
                }
                Ok::<_, CallbackError>(())
            }),
        )?;
        cx.on_exit(Callback::new("summary", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                tracing::info!(ticks = counter.count(), "tick logger stopping");
                Ok::<_, CallbackError>(())
            }
        }))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "TickLogger"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Entry points of every plugin the demo ships, configured from `config`.
#[must_use]
pub fn loader(config: &RuntimeConfig) -> StaticLoader {
    let logging = TracingPlugin::from_config(config);
    let auto_stop = AutoStopPlugin::from_config(config);
    let seconds: f64 = config.get_checked(TICK_INTERVAL, 1.0, |seconds| *seconds <= 0.0);
    let ticker = Ticker::new(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::from_secs(1)));

    StaticLoader::new()
        .with_plugin("tracing", move || logging.clone())
        .with_plugin("auto_stop", move || auto_stop)
        .with_plugin("ticker", move || ticker)
        .with_plugin("tick_logger", || TickLogger)
}

// ─────────────────────────────────────────────────────────────────────────────
// Host
// ─────────────────────────────────────────────────────────────────────────────

/// Loads the runtime configuration at `path`.
///
/// On failure the default console logging is installed so the error is
/// reported before the host exits.
#[must_use]
pub fn startup_config(path: impl AsRef<Path>) -> Option<RuntimeConfig> {
    let path = path.as_ref();
    match RuntimeConfig::load(path) {
        Ok(config) => Some(config),
        Err(error) => {
            TracingPlugin::default().init();
            tracing::error!(path = %path.display(), error = %error, "configuration could not be loaded");
            None
        }
    }
}

/// What the host does about one Ctrl-C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// A graceful stop was requested.
    Stop,
    /// A stop is already underway; leave without waiting for it.
    Exit,
}

/// Requests a graceful stop, or [`Interrupt::Exit`] if one is pending.
pub fn interrupt(state: &FrameworkState) -> Interrupt {
    if state.request_stop(false) {
        Interrupt::Stop
    } else {
        Interrupt::Exit
    }
}
