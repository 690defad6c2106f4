//! Dependency tables and their topological order.
//!
//! A [`DependencyTable`] maps each plugin id to the ids it depends on. It is
//! rebuilt from the discovered [`PluginInfo`]s or the loaded [`PluginItem`]s
//! whenever it is needed and never cached across mutations.
//!
//! Orders are returned as *stacks*: popping from the end of
//! [`SortedDeps::order`] yields every dependency before its dependents.
//!
//! # Example
//!
//! ```
//! use snowx_host::deps::DependencyTable;
//!
//! let table: DependencyTable = [
//!     ("bot", vec!["db"]),
//!     ("db", vec![]),
//! ]
//! .into_iter()
//! .collect();
//!
//! let mut sorted = table.topo_sort();
//! assert_eq!(sorted.order.pop().as_deref(), Some("db"));
//! assert_eq!(sorted.order.pop().as_deref(), Some("bot"));
//! assert!(sorted.cycles.is_empty());
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hashbrown::HashMap;

use crate::discovery::PluginInfo;
use crate::plugin::PluginItem;

/// Result of a topological sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedDeps {
    /// Orderable ids. Pop from the end to get dependencies first.
    pub order: Vec<String>,
    /// Ids that can never be ordered: members of a cycle, ids depending on
    /// an id outside the table, and everything depending on those.
    pub cycles: Vec<String>,
}

/// Plugin id to the ids it depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl DependencyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table of every discovered plugin.
    pub fn from_infos<'a>(infos: impl IntoIterator<Item = &'a PluginInfo>) -> Self {
        infos
            .into_iter()
            .map(|info| {
                let metadata = info.metadata();
                let deps = metadata
                    .dependent_plugins
                    .iter()
                    .map(|dep| dep.id.clone())
                    .collect();
                (metadata.id.clone(), deps)
            })
            .collect()
    }

    /// Builds the table of loaded plugins only.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a PluginItem>) -> Self {
        Self::from_infos(items.into_iter().map(PluginItem::info))
    }

    /// Adds or replaces the dependencies of `id`.
    pub fn insert(&mut self, id: impl Into<String>, deps: Vec<String>) {
        self.entries.insert(id.into(), deps);
    }

    /// Dependencies of `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    /// Returns true if `id` has an entry.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorts the whole table with Kahn's algorithm.
    ///
    /// Ids whose dependency count never drops to zero are reported in
    /// [`SortedDeps::cycles`] and left out of the order.
    #[must_use]
    pub fn topo_sort(&self) -> SortedDeps {
        let mut in_degree: BTreeMap<&str, usize> = self
            .entries
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, deps) in &self.entries {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut sorted = Vec::with_capacity(self.entries.len());
        while let Some(id) = ready.pop_front() {
            in_degree.remove(id);
            sorted.push(id.to_string());

            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }

        sorted.reverse();
        SortedDeps {
            order: sorted,
            cycles: in_degree.into_keys().map(str::to_string).collect(),
        }
    }

    /// `id` and everything it transitively depends on, as a load stack.
    #[must_use]
    pub fn ldeps(&self, id: &str) -> SortedDeps {
        let members = closure(id, |current| {
            self.entries.get(current).into_iter().flatten().cloned().collect()
        });
        self.restricted(&members).topo_sort()
    }

    /// `id` and everything that transitively depends on it, as an unload
    /// stack: popping from the end yields dependents first.
    #[must_use]
    pub fn rdeps(&self, id: &str) -> SortedDeps {
        let members = closure(id, |current| {
            self.entries
                .iter()
                .filter(|(_, deps)| deps.iter().any(|dep| dep == current))
                .map(|(dependent, _)| dependent.clone())
                .collect()
        });
        let mut sorted = self.restricted(&members).topo_sort();
        sorted.order.reverse();
        sorted
    }

    /// Entries of `members`, with dependency lists cut down to `members`.
    fn restricted(&self, members: &BTreeSet<String>) -> Self {
        self.entries
            .iter()
            .filter(|(id, _)| members.contains(*id))
            .map(|(id, deps)| {
                let deps = deps
                    .iter()
                    .filter(|dep| members.contains(*dep))
                    .cloned()
                    .collect();
                (id.clone(), deps)
            })
            .collect()
    }
}

/// Depth-first transitive closure from `start` along `next`.
fn closure(start: &str, next: impl Fn(&str) -> Vec<String>) -> BTreeSet<String> {
    let mut members = BTreeSet::from([start.to_string()]);
    let mut stack = vec![start.to_string()];

    while let Some(current) = stack.pop() {
        for neighbour in next(&current) {
            if members.insert(neighbour.clone()) {
                stack.push(neighbour);
            }
        }
    }
    members
}

impl<K, D> FromIterator<(K, Vec<D>)> for DependencyTable
where
    K: Into<String>,
    D: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Vec<D>)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(id, deps)| (id.into(), deps.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table(entries: &[(&str, &[&str])]) -> DependencyTable {
        entries
            .iter()
            .map(|(id, deps)| (*id, deps.to_vec()))
            .collect()
    }

    /// Pops the whole stack, returning ids in the order they would load.
    fn popped(mut order: Vec<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(id) = order.pop() {
            out.push(id);
        }
        out
    }

    #[test]
    fn diamond_pops_leaves_first() {
        let table = table(&[
            ("app", &["left", "right"]),
            ("left", &["core"]),
            ("right", &["core"]),
            ("core", &[]),
        ]);
        let sorted = table.topo_sort();
        assert!(sorted.cycles.is_empty());

        let loads = popped(sorted.order);
        assert_eq!(loads.first().map(String::as_str), Some("core"));
        assert_eq!(loads.last().map(String::as_str), Some("app"));
    }

    #[test]
    fn cycle_and_its_dependents_are_excluded() {
        let table = table(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &[]),
        ]);
        let sorted = table.topo_sort();
        assert_eq!(sorted.order, ["d"]);
        assert_eq!(sorted.cycles, ["a", "b", "c"]);
    }

    #[test]
    fn unknown_dependency_blocks_the_dependent() {
        let sorted = table(&[("a", &["ghost"]), ("b", &[])]).topo_sort();
        assert_eq!(sorted.order, ["b"]);
        assert_eq!(sorted.cycles, ["a"]);
    }

    #[test]
    fn ldeps_collects_forward_closure_only() {
        let table = table(&[
            ("app", &["db"]),
            ("db", &["log"]),
            ("log", &[]),
            ("other", &["log"]),
        ]);
        assert_eq!(popped(table.ldeps("app").order), ["log", "db", "app"]);
        assert_eq!(popped(table.ldeps("log").order), ["log"]);
    }

    #[test]
    fn rdeps_pops_dependents_first() {
        let table = table(&[
            ("app", &["db"]),
            ("db", &["log"]),
            ("log", &[]),
            ("other", &[]),
        ]);
        assert_eq!(popped(table.rdeps("log").order), ["app", "db", "log"]);
        assert_eq!(popped(table.rdeps("app").order), ["app"]);
    }

    #[test]
    fn missing_id_yields_empty_closure() {
        let sorted = table(&[("a", &[])]).ldeps("missing");
        assert!(sorted.order.is_empty());
        assert!(sorted.cycles.is_empty());
    }

    /// Acyclic tables: every edge points from a higher index to a lower one.
    fn arb_acyclic() -> impl Strategy<Value = DependencyTable> {
        (1_usize..12).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n)
                .prop_map(move |edges| {
                    edges
                        .into_iter()
                        .enumerate()
                        .map(|(i, picks)| {
                            let mut deps: Vec<String> = if i == 0 {
                                Vec::new()
                            } else {
                                picks.iter().map(|pick| format!("p{}", pick.index(i))).collect()
                            };
                            deps.sort();
                            deps.dedup();
                            (format!("p{i}"), deps)
                        })
                        .collect()
                })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Popping never yields an id before all of its dependencies.
        #[test]
        fn prop_pop_order_respects_dependencies(table in arb_acyclic()) {
            let sorted = table.topo_sort();
            prop_assert!(sorted.cycles.is_empty());
            prop_assert_eq!(sorted.order.len(), table.len());

            let mut seen = BTreeSet::new();
            for id in popped(sorted.order) {
                for dep in table.get(&id).unwrap_or_default() {
                    prop_assert!(seen.contains(dep), "{} popped before {}", id, dep);
                }
                seen.insert(id);
            }
        }

        /// Every id that reaches a dependency ring is reported and never ordered.
        #[test]
        fn prop_cycle_members_are_excluded(
            table in arb_acyclic(),
            hooks in proptest::collection::vec(any::<bool>(), 12),
        ) {
            let mut cyclic = table.clone();
            cyclic.insert("ring_a", vec!["ring_b".to_string()]);
            cyclic.insert("ring_b", vec!["ring_a".to_string()]);

            let mut blocked = BTreeSet::from(["ring_a".to_string(), "ring_b".to_string()]);
            for (i, hooked) in hooks.iter().enumerate().take(table.len()) {
                let id = format!("p{i}");
                let mut deps = table.get(&id).unwrap_or_default().to_vec();
                if *hooked {
                    deps.push("ring_a".to_string());
                }
                if deps.iter().any(|dep| blocked.contains(dep)) {
                    blocked.insert(id.clone());
                }
                cyclic.insert(id, deps);
            }

            let sorted = cyclic.topo_sort();
            for id in &blocked {
                prop_assert!(!sorted.order.contains(id), "{} should not be ordered", id);
            }
            let cycles: BTreeSet<String> = sorted.cycles.into_iter().collect();
            prop_assert_eq!(cycles, blocked);
        }
    }
}
