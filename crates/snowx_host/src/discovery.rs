//! Finding plugins on disk.
//!
//! Each direct subdirectory of the plugin root holding a valid
//! `metadata.json` becomes one [`PluginInfo`]. Directories whose name starts
//! with `.` or `_` are ignored, and a directory with a bad descriptor is
//! skipped with an error log.

use std::path::{Path, PathBuf};

use crate::metadata::{METADATA_FILENAME, Metadata, MetadataError};

/// A discovered plugin, loaded or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    metadata: Metadata,
    path: PathBuf,
    import_path: String,
}

impl PluginInfo {
    /// Describes the plugin in `path` with the given metadata.
    ///
    /// The import path is `<root name>.<directory name>.<entry point>`.
    #[must_use]
    pub fn new(metadata: Metadata, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let segment = |path: Option<&Path>| {
            path.and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let import_path = format!(
            "{}.{}.{}",
            segment(path.parent()),
            segment(Some(&path)),
            metadata.entry_point
        );
        Self {
            metadata,
            path,
            import_path,
        }
    }

    /// Reads the descriptor inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns the [`MetadataError`] that made the descriptor unusable.
    pub fn from_dir(dir: &Path) -> Result<Self, MetadataError> {
        Ok(Self::new(Metadata::from_dir(dir)?, dir))
    }

    /// Plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Parsed descriptor.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Plugin directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dotted location of the entry point.
    #[must_use]
    pub fn import_path(&self) -> &str {
        &self.import_path
    }
}

/// Scans `root` for plugin directories, sorted by path.
///
/// A missing root yields no plugins. When two directories declare the same
/// id, the first one in path order wins.
pub fn discover(root: &Path) -> Vec<PluginInfo> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(root = %root.display(), error = %error, "plugin directory unavailable");
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| !name.starts_with(['.', '_']))
        })
        .collect();
    dirs.sort();

    let mut infos: Vec<PluginInfo> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        match PluginInfo::from_dir(&dir) {
            Ok(info) => {
                if let Some(first) = infos.iter().find(|known| known.id() == info.id()) {
                    tracing::error!(
                        plugin = info.id(),
                        kept = %first.path().display(),
                        skipped = %dir.display(),
                        "duplicate plugin id"
                    );
                    continue;
                }
                tracing::debug!(plugin = info.id(), path = %dir.display(), "plugin discovered");
                infos.push(info);
            }
            Err(error) => {
                tracing::error!(
                    "Failed to load <{}> from <{}>: {}",
                    METADATA_FILENAME,
                    dir.display(),
                    error
                );
            }
        }
    }
    infos
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_plugin(root: &Path, dir: &str, metadata: &serde_json::Value) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(METADATA_FILENAME), metadata.to_string()).unwrap();
    }

    fn descriptor(id: &str) -> serde_json::Value {
        json!({
            "PluginID": id,
            "PluginName": id,
            "PluginVersion": "0.1.0",
            "EntryPoint": "main",
        })
    }

    #[test]
    fn discovers_valid_plugins_in_path_order() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "zeta", &descriptor("zeta_bot"));
        write_plugin(root.path(), "alpha", &descriptor("alpha_bot"));
        write_plugin(root.path(), "broken", &json!({ "PluginID": "broken" }));
        write_plugin(root.path(), "_hidden", &descriptor("hidden"));
        std::fs::create_dir(root.path().join("empty")).unwrap();
        std::fs::write(root.path().join("loose.json"), "{}").unwrap();

        let infos = discover(root.path());
        let ids: Vec<&str> = infos.iter().map(PluginInfo::id).collect();
        assert_eq!(ids, ["alpha_bot", "zeta_bot"]);

        let root_name = root.path().file_name().unwrap().to_string_lossy();
        assert_eq!(infos[0].import_path(), format!("{root_name}.alpha.main"));
        assert_eq!(infos[0].path(), root.path().join("alpha"));
    }

    #[test]
    fn duplicate_ids_keep_the_first_directory() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "a", &descriptor("same"));
        write_plugin(root.path(), "b", &descriptor("same"));

        let infos = discover(root.path());
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].path(), root.path().join("a"));
    }

    #[test]
    fn missing_root_is_empty() {
        let root = tempfile::tempdir().unwrap();
        assert!(discover(&root.path().join("nope")).is_empty());
    }
}
