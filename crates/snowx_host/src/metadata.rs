//! Plugin metadata descriptors.
//!
//! Every plugin directory carries a `metadata.json` object:
//!
//! | Key | Required | Shape |
//! |-----|----------|-------|
//! | `PluginID` | yes | identifier |
//! | `PluginName` | yes | string |
//! | `PluginVersion` | yes | `major.minor.patch`, no wildcard |
//! | `EntryPoint` | yes | identifier |
//! | `Description` | no | string, anything else reads as empty |
//! | `DependentSnowxVersion` | no | list of 0..2 version strings or `null` |
//! | `DependentPlugins` | no | object of id to a list of 0..2 bounds |
//! | `DependentModules` | no | list of module names |
//!
//! An identifier starts with a letter, continues with letters, digits or
//! underscores, and does not end with an underscore.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use snowx_system::version::{Version, VersionError, VersionRange};
use thiserror::Error;

/// File name of the descriptor inside a plugin directory.
pub const METADATA_FILENAME: &str = "metadata.json";

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*[a-zA-Z0-9]$").expect("identifier pattern is valid")
});

/// Returns true if `text` is a valid plugin id or entry point.
#[must_use]
pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER.is_match(text)
}

/// Why a descriptor was rejected.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The descriptor file is missing.
    #[error("Not a file or does not exist.")]
    NotAFile,

    /// The descriptor could not be read.
    #[error("Loading abnormality: {0}")]
    Io(#[from] std::io::Error),

    /// The descriptor is not JSON.
    #[error("Loading abnormality: {0}")]
    Json(#[from] serde_json::Error),

    /// The descriptor is not a JSON object.
    #[error("Unsupported format.")]
    NotAnObject,

    /// A required key is absent.
    #[error("<{0}> not present in metadata.")]
    Missing(&'static str),

    /// A key holds the wrong JSON type.
    #[error("Unsupported <{0}> type.")]
    WrongType(&'static str),

    /// A key does not match its expected format.
    #[error("Unsupported <{0}> format.")]
    BadFormat(&'static str),

    /// `PluginVersion` used a wildcard patch.
    #[error("Wildcards are not allowed in the version.")]
    WildcardVersion,

    /// `DependentSnowxVersion` is not a list of at most two bounds.
    #[error("The format of dependent <SnowX> version is incorrect.")]
    FrameworkRange,

    /// `DependentPlugins` is not an object of bound lists.
    #[error("The format of plugin dependent information is incorrect.")]
    PluginDependencies,

    /// `DependentModules` is not a list.
    #[error("The format of module dependent information is incorrect.")]
    ModuleDependencies,

    /// `DependentModules` holds a non-string entry.
    #[error("Unsupported <ModuleName> types.")]
    ModuleName,

    /// A version bound failed to parse.
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// A plugin this plugin needs loaded first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Id of the required plugin.
    pub id: String,
    /// Accepted versions of it.
    pub range: VersionRange,
}

/// Parsed descriptor of one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Unique plugin id; also its callback owner and capability namespace.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Concrete plugin version.
    pub version: Version,
    /// Name the loader resolves to plugin code.
    pub entry_point: String,
    /// Free text.
    pub description: String,
    /// Framework versions the plugin runs on.
    pub framework_range: VersionRange,
    /// Plugins that must be loaded first.
    pub dependent_plugins: Vec<Dependency>,
    /// External modules that must be available.
    pub dependent_modules: Vec<String>,
}

impl Metadata {
    /// Reads `<dir>/metadata.json`.
    ///
    /// # Errors
    ///
    /// Returns a [`MetadataError`] if the file is missing, unreadable, not
    /// JSON, or not a valid descriptor.
    pub fn from_dir(dir: &Path) -> Result<Self, MetadataError> {
        Self::from_file(&dir.join(METADATA_FILENAME))
    }

    /// Reads a descriptor file.
    ///
    /// # Errors
    ///
    /// See [`Metadata::from_dir`].
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        if !path.is_file() {
            return Err(MetadataError::NotAFile);
        }
        let text = std::fs::read_to_string(path)?;
        let raw: Value = serde_json::from_str(&text)?;
        Self::from_json(&raw)
    }

    /// Validates a parsed descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, checking required keys before
    /// optional ones.
    pub fn from_json(raw: &Value) -> Result<Self, MetadataError> {
        let raw = raw.as_object().ok_or(MetadataError::NotAnObject)?;

        let id = identifier(raw, "PluginID")?;
        let name = string(raw, "PluginName")?.to_string();
        let version = Version::parse(string(raw, "PluginVersion")?)
            .map_err(|_| MetadataError::BadFormat("PluginVersion"))?;
        if version.has_wildcard() {
            return Err(MetadataError::WildcardVersion);
        }
        let entry_point = identifier(raw, "EntryPoint")?;

        let description = raw
            .get("Description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let framework_range = match raw.get("DependentSnowxVersion") {
            None => VersionRange::Any,
            Some(Value::Array(bounds)) if bounds.len() <= 2 => {
                range(bounds).ok_or(MetadataError::FrameworkRange)??
            }
            Some(_) => return Err(MetadataError::FrameworkRange),
        };

        let dependent_plugins = match raw.get("DependentPlugins") {
            None => Vec::new(),
            Some(Value::Object(deps)) => deps
                .iter()
                .map(|(id, bounds)| {
                    let bounds = bounds
                        .as_array()
                        .filter(|bounds| bounds.len() <= 2)
                        .ok_or(MetadataError::PluginDependencies)?;
                    Ok::<_, MetadataError>(Dependency {
                        id: id.clone(),
                        range: range(bounds).ok_or(MetadataError::PluginDependencies)??,
                    })
                })
                .collect::<Result<_, MetadataError>>()?,
            Some(_) => return Err(MetadataError::PluginDependencies),
        };

        let dependent_modules = match raw.get("DependentModules") {
            None => Vec::new(),
            Some(Value::Array(modules)) => modules
                .iter()
                .map(|module| module.as_str().map(str::to_string).ok_or(MetadataError::ModuleName))
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(MetadataError::ModuleDependencies),
        };

        Ok(Self {
            id,
            name,
            version,
            entry_point,
            description,
            framework_range,
            dependent_plugins,
            dependent_modules,
        })
    }
}

fn string<'a>(raw: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, MetadataError> {
    raw.get(key)
        .ok_or(MetadataError::Missing(key))?
        .as_str()
        .ok_or(MetadataError::WrongType(key))
}

fn identifier(raw: &Map<String, Value>, key: &'static str) -> Result<String, MetadataError> {
    let value = string(raw, key)?;
    if !is_identifier(value) {
        return Err(MetadataError::BadFormat(key));
    }
    Ok(value.to_string())
}

/// Bounds are strings or `null`; `None` if any entry is neither.
fn range(bounds: &[Value]) -> Option<Result<VersionRange, MetadataError>> {
    let bounds = bounds
        .iter()
        .map(|bound| match bound {
            Value::Null => Some(None),
            Value::String(text) => Some(Some(text.as_str())),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(VersionRange::from_bounds(&bounds).map_err(MetadataError::from))
}
