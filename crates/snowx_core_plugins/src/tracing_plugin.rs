//! Logging setup driven by the runtime configuration.
//!
//! Provides [`TracingPlugin`], which installs the global `tracing`
//! subscriber, and [`TracingConfig`], the settings it was built from.
//!
//! # Configuration keys
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `LOGGER_LEVEL` | `"WARNING"` | `DEBUG`, `INFO`, `WARNING` or `ERROR` |
//! | `LOG_FORMAT` | `"compact"` | console format: `pretty`, `compact` or `json` |
//! | `ENABLE_CONSOLELOG` | `true` | write to stdout |
//! | `ENABLE_FILELOG` | `false` | write daily rotated JSON files |
//! | `FILELOG_DIR` | `"logs"` | directory of the log files |
//!
//! # Example
//!
//! ```
//! use snowx_core_plugins::{TracingFormat, TracingPlugin};
//! use snowx_system::config::RuntimeConfig;
//! use tracing::Level;
//!
//! let config = RuntimeConfig::from_json(r#"{ "LOGGER_LEVEL": "DEBUG" }"#).unwrap();
//! let plugin = TracingPlugin::from_config(&config).with_format(TracingFormat::Pretty);
//! assert_eq!(plugin.config().level, Level::DEBUG);
//! plugin.init();
//! ```

use std::path::PathBuf;

use snowx_host::plugin::{Plugin, PluginContext, PluginError};
use snowx_system::api::API;
use snowx_system::config::{RuntimeConfig, keys};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// File name prefix of rotated log files.
pub const FILELOG_NAME: &str = "snowx.log";

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Single-line output (default).
    #[default]
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

impl TracingFormat {
    /// Parses a `LOG_FORMAT` value, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Maps a `LOGGER_LEVEL` value to a level; unknown names map to `WARN`.
#[must_use]
pub fn level_from_name(name: &str) -> Level {
    match name.to_ascii_uppercase().as_str() {
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "ERROR" => Level::ERROR,
        _ => Level::WARN,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Logging settings, published as a capability by [`TracingPlugin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Maximum log level.
    pub level: Level,
    /// Console output format.
    pub format: TracingFormat,
    /// Whether logs go to stdout.
    pub console: bool,
    /// Directory of daily JSON log files, if file logging is on.
    pub file_dir: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: TracingFormat::Compact,
            console: true,
            file_dir: None,
        }
    }
}

impl API for TracingConfig {}

impl TracingConfig {
    /// Reads the logging keys, falling back to the defaults.
    #[must_use]
    pub fn from_runtime_config(config: &RuntimeConfig) -> Self {
        let level: String = config.get(keys::LOGGER_LEVEL, "WARNING".to_string());
        let format: String = config.get_checked(keys::LOG_FORMAT, "compact".to_string(), |name| {
            TracingFormat::from_name(name).is_none()
        });
        let console = config.get(keys::ENABLE_CONSOLELOG, true);
        let file = config.get(keys::ENABLE_FILELOG, false);
        let file_dir: String = config.get(keys::FILELOG_DIR, "logs".to_string());

        Self {
            level: level_from_name(&level),
            format: TracingFormat::from_name(&format).unwrap_or_default(),
            console,
            file_dir: file.then(|| PathBuf::from(file_dir)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Installs the global `tracing` subscriber.
///
/// Installation is idempotent: once any global subscriber exists, further
/// calls to [`init`](Self::init) do nothing. Hosts usually call `init`
/// before starting the framework so startup is logged; mounting the plugin
/// afterwards only publishes the [`TracingConfig`] capability.
///
/// # Capabilities Provided
///
/// | Capability | Namespace | Description |
/// |------------|-----------|-------------|
/// | [`TracingConfig`] | the plugin's id | effective logging settings |
///
/// # Environment Filter
///
/// Use `with_env_filter` to set target-specific levels:
///
/// ```
/// use snowx_core_plugins::TracingPlugin;
///
/// TracingPlugin::default()
///     .with_env_filter("snowx_host=debug,snowx_runtime=info")
/// # ;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TracingPlugin {
    config: TracingConfig,
    env_filter: Option<String>,
    span_events: bool,
}

impl TracingPlugin {
    /// Creates a plugin with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin from the runtime configuration keys.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            config: TracingConfig::from_runtime_config(config),
            ..Self::default()
        }
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the console format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Turns console output on or off.
    #[must_use]
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console = enabled;
        self
    }

    /// Writes daily rotated JSON files into `dir`.
    #[must_use]
    pub fn with_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_dir = Some(dir.into());
        self
    }

    /// Sets a custom environment filter string.
    ///
    /// Format: `target=level,target=level,...`
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in console output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Effective settings.
    #[must_use]
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    /// Installs the subscriber. Returns false if one was already installed.
    pub fn init(&self) -> bool {
        let level = self.config.level;
        let env_filter = match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
            }
            None => EnvFilter::new(level.as_str()),
        };

        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        let mut file_error = None;
        let file_layer = self.config.file_dir.as_ref().and_then(|dir| {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(FILELOG_NAME)
                .build(dir);
            match appender {
                Ok(appender) => Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(appender),
                ),
                Err(error) => {
                    file_error = Some(error);
                    None
                }
            }
        });
        let registry = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer);

        let console = self.config.console;
        let installed = match self.config.format {
            TracingFormat::Pretty => registry
                .with(console.then(|| {
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_span_events(span_events)
                }))
                .try_init(),
            TracingFormat::Compact => registry
                .with(console.then(|| {
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_span_events(span_events)
                }))
                .try_init(),
            TracingFormat::Json => registry
                .with(console.then(|| {
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(span_events)
                }))
                .try_init(),
        }
        .is_ok();

        if installed {
            tracing::info!(
                level = %level,
                format = ?self.config.format,
                console,
                file_dir = ?self.config.file_dir,
                "TracingPlugin initialized"
            );
        }
        if let Some(error) = file_error {
            tracing::warn!(error = %error, "file logging disabled");
        }
        installed
    }
}

impl Plugin for TracingPlugin {
    fn build(&self, cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        self.init();
        cx.insert_api(self.config.clone());
        Ok(())
    }

    fn cleanup(&self, cx: &PluginContext<'_>) {
        tracing::info!(plugin = cx.id(), "TracingPlugin shutting down");
    }

    fn name(&self) -> &str {
        "TracingPlugin"
    }
}
