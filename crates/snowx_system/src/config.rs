//! Runtime configuration backed by a single JSON object file.
//!
//! Each key is read once with a typed default. The value in the file wins
//! only if it deserializes into the default's type; otherwise the default is
//! used. Whatever was chosen becomes the *effective* value, is cached, and is
//! what [`RuntimeConfig::save`] writes back.
//!
//! # Example
//!
//! ```
//! use snowx_system::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "EVENT_BUS_MAXSIZE": 64, "LOGGER_LEVEL": 3 }"#).unwrap();
//!
//! assert_eq!(config.get("EVENT_BUS_MAXSIZE", 1024_usize), 64);
//! // Wrong type in the file: the default wins.
//! assert_eq!(config.get("LOGGER_LEVEL", "WARNING".to_string()), "WARNING");
//! ```

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// File name used when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Well-known configuration keys.
pub mod keys {
    /// Capacity of the global event bus.
    pub const EVENT_BUS_MAXSIZE: &str = "EVENT_BUS_MAXSIZE";
    /// Capacity of each owner's distributor queue.
    pub const DISTRIBUTOR_QUEUE_MAXSIZE: &str = "DISTRIBUTOR_QUEUE_MAXSIZE";
    /// Capacity of the distributor's own fan-out buffer.
    pub const DISTRIBUTOR_BUFFER_MAXSIZE: &str = "DISTRIBUTOR_BUFFER_MAXSIZE";
    /// Capacity of each process scheduler's consumer queue.
    pub const PROCESS_EVENT_QUEUE_MAXSIZE: &str = "PROCESS_EVENT_QUEUE_MAXSIZE";
    /// Directory scanned for plugins.
    pub const PLUGIN_DIR: &str = "PLUGIN_DIR";
    /// Maximum log level (`DEBUG`, `INFO`, `WARNING`, `ERROR`).
    pub const LOGGER_LEVEL: &str = "LOGGER_LEVEL";
    /// Log output format (`pretty`, `compact`, `json`).
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    /// Whether logs are written to the console.
    pub const ENABLE_CONSOLELOG: &str = "ENABLE_CONSOLELOG";
    /// Whether logs are written to rolling files.
    pub const ENABLE_FILELOG: &str = "ENABLE_FILELOG";
    /// Directory for rolling log files.
    pub const FILELOG_DIR: &str = "FILELOG_DIR";
}

/// Errors raised while reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The file is valid JSON but not an object.
    #[error("config file {path} must contain a JSON object")]
    NotAnObject {
        /// Path of the configuration file.
        path: PathBuf,
    },

    /// The effective values could not be written back.
    #[error("failed to write config file {path}: {source}")]
    Write {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization of the effective values failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value runtime configuration with typed defaults.
#[derive(Debug, Default)]
pub struct RuntimeConfig {
    path: Option<PathBuf>,
    in_file: Mutex<Map<String, Value>>,
    effective: Mutex<Map<String, Value>>,
}

impl RuntimeConfig {
    /// Creates an in-memory configuration with no backing file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration from `path`.
    ///
    /// A missing file yields an empty configuration that will be created on
    /// [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, is not JSON,
    /// or is not a JSON object.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = if path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            parse_object(&text).map_err(|err| match err {
                ParseFailure::Json(source) => ConfigError::Parse {
                    path: path.clone(),
                    source,
                },
                ParseFailure::NotAnObject => ConfigError::NotAnObject { path: path.clone() },
            })?
        } else {
            Map::new()
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "configuration loaded");
        Ok(Self {
            path: Some(path),
            in_file: Mutex::new(values),
            effective: Mutex::new(Map::new()),
        })
    }

    /// Builds an in-memory configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let values = parse_object(text).map_err(|err| match err {
            ParseFailure::Json(source) => ConfigError::Serialization(source),
            ParseFailure::NotAnObject => ConfigError::NotAnObject {
                path: PathBuf::new(),
            },
        })?;
        Ok(Self {
            path: None,
            in_file: Mutex::new(values),
            effective: Mutex::new(Map::new()),
        })
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the effective value of `key`, reading and caching it on first use.
    pub fn get<T>(&self, key: &str, default: T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        self.get_checked(key, default, |_| false)
    }

    /// Like [`get`](Self::get), but falls back to `default` when `reject`
    /// returns true for the file's value.
    pub fn get_checked<T, F>(&self, key: &str, default: T, reject: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let mut effective = self.effective.lock();
        if let Some(cached) = effective.get(key)
            && let Ok(value) = T::deserialize(cached)
        {
            return value;
        }

        let from_file = self
            .in_file
            .lock()
            .get(key)
            .and_then(|raw| T::deserialize(raw).ok());
        let chosen = match from_file {
            Some(value) if !reject(&value) => value,
            _ => default,
        };

        match serde_json::to_value(&chosen) {
            Ok(value) => {
                effective.insert(key.to_string(), value);
            }
            Err(err) => tracing::warn!(key, error = %err, "config value is not serializable"),
        }
        chosen
    }

    /// Replaces the effective value of an already-read key.
    ///
    /// Returns false (and changes nothing) if the key has not been read yet
    /// or the new value has a different JSON type.
    pub fn update<T: Serialize>(&self, key: &str, value: T) -> bool {
        let Ok(value) = serde_json::to_value(value) else {
            return false;
        };

        let mut effective = self.effective.lock();
        let Some(current) = effective.get_mut(key) else {
            return false;
        };
        if core::mem::discriminant(current) != core::mem::discriminant(&value) {
            return false;
        }

        *current = value.clone();
        self.in_file.lock().insert(key.to_string(), value);
        true
    }

    /// Snapshot of every effective value read so far.
    #[must_use]
    pub fn effective(&self) -> Map<String, Value> {
        self.effective.lock().clone()
    }

    /// Overwrites the backing file with the effective values as pretty JSON.
    ///
    /// Does nothing for in-memory configurations.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let text = serde_json::to_string_pretty(&Value::Object(self.effective()))?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

enum ParseFailure {
    Json(serde_json::Error),
    NotAnObject,
}

fn parse_object(text: &str) -> Result<Map<String, Value>, ParseFailure> {
    match serde_json::from_str::<Value>(text).map_err(ParseFailure::Json)? {
        Value::Object(values) => Ok(values),
        _ => Err(ParseFailure::NotAnObject),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RuntimeLimits
// ─────────────────────────────────────────────────────────────────────────────

/// Queue capacities used by the event pipeline. `0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    /// Capacity of the global event bus.
    pub event_bus: usize,
    /// Capacity of each owner's distributor queue.
    pub distributor_queue: usize,
    /// Capacity of the distributor's fan-out buffer.
    pub distributor_buffer: usize,
    /// Capacity of each process scheduler's consumer queue.
    pub process_event_queue: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            event_bus: 1024,
            distributor_queue: 1024,
            distributor_buffer: 256,
            process_event_queue: 1024,
        }
    }
}

impl RuntimeLimits {
    /// Reads every limit from `config`, using the defaults for missing keys.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let defaults = Self::default();
        Self {
            event_bus: config.get(keys::EVENT_BUS_MAXSIZE, defaults.event_bus),
            distributor_queue: config.get(keys::DISTRIBUTOR_QUEUE_MAXSIZE, defaults.distributor_queue),
            distributor_buffer: config.get(
                keys::DISTRIBUTOR_BUFFER_MAXSIZE,
                defaults.distributor_buffer,
            ),
            process_event_queue: config.get(
                keys::PROCESS_EVENT_QUEUE_MAXSIZE,
                defaults.process_event_queue,
            ),
        }
    }
}
