//! The plugin lifecycle orchestrator.
//!
//! [`PluginManager`] owns the discovered plugin infos, the loaded plugin
//! items, and an ordered pipeline of [`Stage`]s. Loading runs every stage in
//! order for one plugin at a time, dependencies first; unloading runs the
//! stages in reverse, dependents first.
//!
//! # Failure handling
//!
//! | Situation | Effect |
//! |-----------|--------|
//! | Stage *k* fails | stages *k-1..0* are unloaded for that plugin, nothing is kept |
//! | A plugin fails inside a batch | all of its dependents are marked failed and dropped from the batch |
//! | A plugin sits on a dependency cycle | it is never loaded; the rest of the batch proceeds |
//!
//! Failed dependents are not retried later in the same call.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use core::panic::AssertUnwindSafe;
use futures::FutureExt;

use crate::deps::DependencyTable;
use crate::discovery::{PluginInfo, discover};
use crate::plugin::PluginItem;
use crate::stage::{Stage, StageContext, StageOutcome};

/// Loads, unloads and reloads plugins in dependency order.
pub struct PluginManager {
    stages: Vec<Arc<dyn Stage>>,
    root: Option<PathBuf>,
    infos: BTreeMap<String, PluginInfo>,
    loaded: BTreeMap<String, PluginItem>,
}

impl PluginManager {
    /// Creates a manager running `stages` in order, with no plugins known.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages,
            root: None,
            infos: BTreeMap::new(),
            loaded: BTreeMap::new(),
        }
    }

    /// Discovers plugins under `root`, now and on every refresh.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self.refresh_infos();
        self
    }

    /// Adds plugins that do not live on disk.
    #[must_use]
    pub fn with_infos(mut self, infos: impl IntoIterator<Item = PluginInfo>) -> Self {
        for info in infos {
            self.infos.insert(info.id().to_string(), info);
        }
        self
    }

    /// Appends a stage to the pipeline.
    pub fn push_stage(&mut self, stage: Arc<dyn Stage>) {
        self.stages.push(stage);
    }

    /// The pipeline, in load order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Rediscovers plugins under the root, returning how many are known.
    ///
    /// Without a root the known infos are kept as they are.
    pub fn refresh_infos(&mut self) -> usize {
        if let Some(root) = &self.root {
            self.infos = discover(root)
                .into_iter()
                .map(|info| (info.id().to_string(), info))
                .collect();
            tracing::debug!(root = %root.display(), count = self.infos.len(), "plugin infos refreshed");
        }
        self.infos.len()
    }

    /// Info of `id`, preferring the one the loaded plugin was loaded with.
    #[must_use]
    pub fn info(&self, id: &str) -> Option<&PluginInfo> {
        self.loaded
            .get(id)
            .map(PluginItem::info)
            .or_else(|| self.infos.get(id))
    }

    /// The loaded plugin `id`.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&PluginItem> {
        self.loaded.get(id)
    }

    /// Returns true if `id` is loaded.
    #[must_use]
    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains_key(id)
    }

    /// Ids of loaded plugins, sorted.
    #[must_use]
    pub fn loaded_ids(&self) -> Vec<String> {
        self.loaded.keys().cloned().collect()
    }

    /// Ids of known plugins that are not loaded, sorted.
    #[must_use]
    pub fn unloaded_ids(&self) -> Vec<String> {
        self.infos
            .keys()
            .filter(|id| !self.loaded.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Dependency table of every known plugin.
    #[must_use]
    pub fn info_table(&self) -> DependencyTable {
        DependencyTable::from_infos(self.infos.values())
    }

    /// Dependency table of loaded plugins.
    #[must_use]
    pub fn loaded_table(&self) -> DependencyTable {
        DependencyTable::from_items(self.loaded.values())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────

    /// Loads `id` after everything it depends on.
    ///
    /// Returns true if `id` ends up loaded.
    pub async fn load_single(&mut self, id: &str) -> bool {
        if self.loaded.contains_key(id) {
            return true;
        }
        if !self.infos.contains_key(id) {
            tracing::warn!("Plugin <{}> not found.", id);
            return false;
        }

        let table = self.info_table();
        let sorted = table.ldeps(id);
        if !sorted.cycles.is_empty() {
            for cycle_id in &sorted.cycles {
                tracing::warn!("Due to loop dependence, <{}> will not be loaded.", cycle_id);
            }
            tracing::error!("Failed to load <{}> .", id);
            return false;
        }

        let failed = self.batch_load(sorted.order, &table).await;
        if failed.is_empty() {
            return true;
        }
        for failed_id in &failed {
            tracing::warn!("Plugin <{}> not loaded.", failed_id);
        }
        tracing::error!("Failed to load <{}> .", id);
        false
    }

    /// Loads every known plugin, returning the ids left unloaded.
    pub async fn load_all(&mut self) -> BTreeSet<String> {
        let table = self.info_table();
        let sorted = table.topo_sort();
        for cycle_id in &sorted.cycles {
            tracing::warn!("Due to loop dependence, <{}> will not be loaded.", cycle_id);
        }

        let mut failed = self.batch_load(sorted.order, &table).await;
        for failed_id in &failed {
            tracing::warn!("Plugin <{}> not loaded.", failed_id);
        }
        failed.extend(sorted.cycles);
        failed
    }

    /// Pops ids off `pending`; a failure fails its dependents without
    /// attempting them.
    async fn batch_load(
        &mut self,
        mut pending: Vec<String>,
        table: &DependencyTable,
    ) -> BTreeSet<String> {
        let mut failed = BTreeSet::new();

        while let Some(id) = pending.pop() {
            tracing::info!("Prepare to load <{}> ...", id);
            if self.single_load(&id).await {
                tracing::info!("Successfully loaded <{}> .", id);
                continue;
            }

            tracing::error!("Failed to load <{}> .", id);
            for dependent in table.rdeps(&id).order {
                pending.retain(|queued| *queued != dependent);
                failed.insert(dependent);
            }
            failed.insert(id);
        }
        failed
    }

    /// Runs every stage for `id`, rolling back on the first failure.
    async fn single_load(&mut self, id: &str) -> bool {
        if self.loaded.contains_key(id) {
            return true;
        }
        let Some(info) = self.infos.get(id).cloned() else {
            return false;
        };

        let mut item: Option<PluginItem> = None;
        for (index, stage) in self.stages.iter().enumerate() {
            let cx = StageContext {
                id,
                info: &info,
                item: item.as_ref(),
                loaded: &self.loaded,
            };
            let error = match AssertUnwindSafe(stage.load(cx)).catch_unwind().await {
                Ok(Ok(StageOutcome::Continue)) => continue,
                Ok(Ok(StageOutcome::Mounted(mounted))) => {
                    item = Some(mounted);
                    continue;
                }
                Ok(Err(error)) => error.to_string(),
                Err(_) => "stage panicked".to_string(),
            };

            tracing::error!(plugin = id, stage = stage.name(), error = %error, "load stage failed");
            self.rollback(&info, item.as_ref(), index).await;
            return false;
        }

        let Some(item) = item else {
            tracing::error!(plugin = id, "no stage mounted the plugin");
            self.rollback(&info, None, self.stages.len()).await;
            return false;
        };
        self.loaded.insert(id.to_string(), item);
        true
    }

    /// Unloads the first `upto` stages in reverse.
    async fn rollback(&self, info: &PluginInfo, item: Option<&PluginItem>, upto: usize) {
        for stage in self.stages[..upto].iter().rev() {
            let cx = StageContext {
                id: info.id(),
                info,
                item,
                loaded: &self.loaded,
            };
            unload_stage(stage.as_ref(), cx, false).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Unloading
    // ─────────────────────────────────────────────────────────────────────

    /// Unloads `id` after everything loaded that depends on it.
    pub async fn unload_single(&mut self, id: &str, force: bool) {
        if !self.loaded.contains_key(id) {
            return;
        }
        let order = self.loaded_table().rdeps(id).order;
        self.batch_unload(order, force).await;
    }

    /// Unloads every plugin, dependents first.
    pub async fn unload_all(&mut self, force: bool) {
        let mut order = self.loaded_table().topo_sort().order;
        order.reverse();
        self.batch_unload(order, force).await;
    }

    async fn batch_unload(&mut self, mut pending: Vec<String>, force: bool) {
        while let Some(id) = pending.pop() {
            tracing::info!("Prepare to unload <{}> ...", id);
            self.single_unload(&id, force).await;
            tracing::info!("Successfully unload <{}> .", id);
        }
    }

    async fn single_unload(&mut self, id: &str, force: bool) {
        let Some(item) = self.loaded.get(id).cloned() else {
            return;
        };
        for stage in self.stages.iter().rev() {
            let cx = StageContext {
                id,
                info: item.info(),
                item: Some(&item),
                loaded: &self.loaded,
            };
            unload_stage(stage.as_ref(), cx, force).await;
        }
        self.loaded.remove(id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reloading
    // ─────────────────────────────────────────────────────────────────────

    /// Unloads `id` with its loaded dependents, then loads them again.
    ///
    /// A failed reload leaves the failed plugins unloaded.
    pub async fn reload_single(&mut self, id: &str) -> bool {
        if !self.loaded.contains_key(id) {
            tracing::warn!("Plugin <{}> not loaded.", id);
            return false;
        }

        let mut order = self.loaded_table().rdeps(id).order;
        self.batch_unload(order.clone(), false).await;

        order.reverse();
        let table = self.info_table();
        let failed = self.batch_load(order, &table).await;
        if !failed.is_empty() {
            for failed_id in &failed {
                tracing::warn!("Plugin <{}> not loaded.", failed_id);
            }
            tracing::error!("Failed to reload <{}> .", id);
            return false;
        }

        tracing::info!("Successfully reload <{}> .", id);
        true
    }

    /// Unloads everything, rediscovers, and loads everything again.
    pub async fn reload_all(&mut self) -> BTreeSet<String> {
        self.unload_all(false).await;
        self.refresh_infos();
        self.load_all().await
    }
}

async fn unload_stage(stage: &dyn Stage, cx: StageContext<'_>, force: bool) {
    if AssertUnwindSafe(stage.unload(cx, force))
        .catch_unwind()
        .await
        .is_err()
    {
        tracing::error!(plugin = cx.id, stage = stage.name(), "unload stage panicked");
    }
}

impl core::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let stages: Vec<&str> = self.stages.iter().map(|stage| stage.name()).collect();
        f.debug_struct("PluginManager")
            .field("stages", &stages)
            .field("root", &self.root)
            .field("known", &self.infos.len())
            .field("loaded", &self.loaded_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::plugin::{Plugin, PluginContext, PluginError};
    use crate::stage::StageError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Inert;

    impl Plugin for Inert {
        fn build(&self, _cx: &mut PluginContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    /// Logs every call and fails loads of the ids in `fail`.
    struct Recorder {
        name: &'static str,
        log: Log,
        fail: Vec<&'static str>,
        mounts: bool,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn load(&self, cx: StageContext<'_>) -> Result<StageOutcome, StageError> {
            self.log.lock().push(format!("load {} {}", self.name, cx.id));
            if self.fail.iter().any(|id| *id == cx.id) {
                return Err(StageError::MissingModule("forced".into()));
            }
            if self.mounts {
                return Ok(StageOutcome::Mounted(PluginItem::new(
                    cx.info.clone(),
                    Arc::new(Inert),
                )));
            }
            Ok(StageOutcome::Continue)
        }

        async fn unload(&self, cx: StageContext<'_>, _force: bool) {
            self.log.lock().push(format!("unload {} {}", self.name, cx.id));
        }
    }

    fn info(id: &str, deps: &[&str]) -> PluginInfo {
        let deps: serde_json::Map<String, serde_json::Value> =
            deps.iter().map(|dep| (dep.to_string(), json!([]))).collect();
        let metadata = Metadata::from_json(&json!({
            "PluginID": id,
            "PluginName": id,
            "PluginVersion": "1.0.0",
            "EntryPoint": "main",
            "DependentPlugins": deps,
        }))
        .unwrap();
        PluginInfo::new(metadata, format!("plugins/{id}"))
    }

    /// Stages `s0 s1 s2 mount`; `s2` fails for `fail_at_s2`.
    fn manager(plugins: &[(&str, &[&str])], fail_at_s2: &[&'static str]) -> (PluginManager, Log) {
        let log: Log = Arc::default();
        let stage = |name, fail: &[&'static str], mounts| -> Arc<dyn Stage> {
            Arc::new(Recorder {
                name,
                log: Arc::clone(&log),
                fail: fail.to_vec(),
                mounts,
            })
        };
        let stages = vec![
            stage("s0", &[], false),
            stage("s1", &[], false),
            stage("s2", fail_at_s2, false),
            stage("mount", &[], true),
        ];
        let infos = plugins.iter().map(|(id, deps)| info(id, deps));
        (PluginManager::new(stages).with_infos(infos), log)
    }

    fn entries(log: &Log, id: &str) -> Vec<String> {
        log.lock()
            .iter()
            .filter(|line| line.ends_with(&format!(" {id}")))
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn failed_stage_rolls_back_earlier_stages_once() {
        let (mut manager, log) = manager(&[("app", &["store"]), ("store", &[])], &["store"]);

        assert!(!manager.load_single("app").await);
        assert!(manager.loaded_ids().is_empty());
        assert_eq!(
            entries(&log, "store"),
            ["load s0 store", "load s1 store", "load s2 store", "unload s1 store", "unload s0 store"]
        );
        assert!(entries(&log, "app").is_empty());
    }

    #[tokio::test]
    async fn unload_single_takes_dependents_down_first() {
        let (mut manager, log) = manager(&[("app", &["store"]), ("store", &[])], &[]);
        assert!(manager.load_single("app").await);
        assert_eq!(manager.loaded_ids(), ["app", "store"]);
        log.lock().clear();

        manager.unload_single("store", false).await;
        assert!(manager.loaded_ids().is_empty());

        let log = log.lock();
        let first_store = log.iter().position(|line| line.ends_with(" store")).unwrap();
        let last_app = log.iter().rposition(|line| line.ends_with(" app")).unwrap();
        assert!(last_app < first_store);
        assert_eq!(log[..4], ["unload mount app", "unload s2 app", "unload s1 app", "unload s0 app"]);
    }

    #[tokio::test]
    async fn batch_failure_cascades_to_dependents_only() {
        let (mut manager, log) = manager(
            &[
                ("base", &[]),
                ("broken", &["base"]),
                ("child", &["broken"]),
                ("grandchild", &["child"]),
                ("sibling", &["base"]),
            ],
            &["broken"],
        );

        let failed = manager.load_all().await;
        assert_eq!(
            failed.into_iter().collect::<Vec<_>>(),
            ["broken", "child", "grandchild"]
        );
        assert_eq!(manager.loaded_ids(), ["base", "sibling"]);
        assert!(entries(&log, "child").is_empty());
        assert!(entries(&log, "grandchild").is_empty());
    }

    #[tokio::test]
    async fn cycles_are_skipped_without_stopping_the_rest() {
        let (mut manager, log) = manager(&[("app", &["bot"]), ("bot", &["app"]), ("core", &[])], &[]);

        let failed = manager.load_all().await;
        assert_eq!(failed.into_iter().collect::<Vec<_>>(), ["app", "bot"]);
        assert_eq!(manager.loaded_ids(), ["core"]);
        assert!(entries(&log, "app").is_empty());

        assert!(!manager.load_single("app").await);
        assert!(entries(&log, "app").is_empty());
    }

    #[tokio::test]
    async fn unknown_plugin_fails_to_load() {
        let (mut manager, _) = manager(&[("app", &[])], &[]);
        assert!(!manager.load_single("ghost").await);
        assert!(!manager.reload_single("app").await);
    }

    #[tokio::test]
    async fn reload_single_cycles_dependents() {
        let (mut manager, log) = manager(
            &[("app", &["store"]), ("store", &[]), ("other", &[])],
            &[],
        );
        manager.load_all().await;
        log.lock().clear();

        assert!(manager.reload_single("store").await);
        assert_eq!(manager.loaded_ids(), ["app", "other", "store"]);
        assert!(entries(&log, "other").is_empty());

        let lines = log.lock();
        let order: Vec<&str> = lines
            .iter()
            .filter(|line| line.starts_with("unload mount") || line.starts_with("load mount"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            order,
            ["unload mount app", "unload mount store", "load mount store", "load mount app"]
        );
    }

    #[tokio::test]
    async fn unload_all_reverses_dependency_order() {
        let (mut manager, log) = manager(
            &[("app", &["bot"]), ("bot", &["core"]), ("core", &[])],
            &[],
        );
        manager.load_all().await;
        assert_eq!(manager.unloaded_ids(), Vec::<String>::new());
        log.lock().clear();

        manager.unload_all(true).await;
        let mounts: Vec<String> = log
            .lock()
            .iter()
            .filter(|line| line.starts_with("unload mount"))
            .cloned()
            .collect();
        assert_eq!(mounts, ["unload mount app", "unload mount bot", "unload mount core"]);
        assert_eq!(manager.unloaded_ids(), ["app", "bot", "core"]);
    }

    #[tokio::test]
    async fn info_prefers_loaded_copy() {
        let (mut manager, _) = manager(&[("app", &[])], &[]);
        assert!(manager.info("app").is_some());
        assert!(manager.item("app").is_none());

        manager.load_single("app").await;
        assert_eq!(manager.item("app").map(PluginItem::id), Some("app"));
        assert!(manager.info("missing").is_none());
    }
}
