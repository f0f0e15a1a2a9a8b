//! Module-level dead code elimination over a [ModuleGraph].
use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use module_graph::{ModuleGraph, ModuleId};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShakeResult {
    pub live: BTreeSet<ModuleId>,
    pub removed: BTreeSet<ModuleId>,
}

impl ShakeResult {
    pub fn is_removed(&self, id: &str) -> bool {
        self.removed.contains(id)
    }
}

/// Names a module exposes, including those it takes on through bare
/// `export * from` re-exports. `default` is never re-exported by a star.
fn effective_exports(graph: &ModuleGraph) -> BTreeMap<ModuleId, BTreeSet<String>> {
    let mut exports: BTreeMap<ModuleId, BTreeSet<String>> = graph
        .modules()
        .map(|m| (m.id.clone(), m.exports.clone()))
        .collect();
    // one round per link of the longest re-export chain
    for _ in 0..=graph.len() {
        let mut changed = false;
        for module in graph.modules() {
            let inherited: BTreeSet<String> = module
                .star_reexports
                .iter()
                .filter_map(|target| exports.get(target))
                .flatten()
                .filter(|name| name.as_str() != "default")
                .cloned()
                .collect();
            let own = exports.entry(module.id.clone()).or_default();
            for name in inherited {
                changed |= own.insert(name);
            }
        }
        if !changed {
            break;
        }
    }
    exports
}

/// Marks used exports starting from the entries, following static and
/// dynamic imports, then writes `used_exports` back into the graph.
///
/// A module is removed iff it is not an entry, is not the target of an
/// `import()` in a reached module, none of its exports are used, and it is
/// free of side effects.
pub fn shake(graph: &mut ModuleGraph) -> Result<ShakeResult> {
    let exports = effective_exports(graph);
    let mut used: BTreeMap<ModuleId, BTreeSet<String>> = BTreeMap::new();
    let mut visited: BTreeSet<ModuleId> = BTreeSet::new();
    // entries and lazily loaded modules reached from them
    let mut pinned: BTreeSet<ModuleId> = BTreeSet::new();

    let mut frontier: Vec<ModuleId> = graph
        .modules()
        .filter(|m| m.is_entry)
        .map(|m| m.id.clone())
        .collect();
    pinned.extend(frontier.iter().cloned());

    // Traverse the graph until we exhaust the frontier
    const MAX_ITERATIONS: usize = 1_000_000;
    let mut exhausted = false;
    for _ in 0..MAX_ITERATIONS {
        let mut next_frontier = Vec::new();
        for id in frontier.iter() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(module) = graph.get(id) else {
                continue;
            };
            used.entry(id.clone())
                .or_default()
                .extend(exports.get(id).into_iter().flatten().cloned());
            for dep in module.dynamic_dependencies.iter() {
                if graph.contains(dep) {
                    pinned.insert(dep.clone());
                }
            }
            for dep in module.all_dependencies() {
                if !visited.contains(dep) && graph.contains(dep) {
                    next_frontier.push(dep.clone());
                }
            }
        }
        next_frontier.sort();
        next_frontier.dedup();
        frontier = next_frontier;
        if frontier.is_empty() {
            exhausted = true;
            break;
        }
    }
    if !exhausted {
        return Err(anyhow::anyhow!(
            "tree shaking exceeded MAX_ITERATIONS ({})",
            MAX_ITERATIONS
        ));
    }

    let mut result = ShakeResult::default();
    let ids: Vec<ModuleId> = graph.modules().map(|m| m.id.clone()).collect();
    for id in ids {
        let used_exports = used.remove(&id).unwrap_or_default();
        let removable = !pinned.contains(&id)
            && graph
                .get(&id)
                .is_some_and(|m| !m.side_effects && used_exports.is_empty());
        graph.set_used_exports(&id, used_exports);
        if removable {
            result.removed.insert(id);
        } else {
            result.live.insert(id);
        }
    }

    debug!(
        "tree shaking kept {} modules and removed {}",
        result.live.len(),
        result.removed.len()
    );
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use module_graph::{ModuleInfo, ModuleType};
    use pretty_assertions::assert_eq;

    fn module(id: &str, deps: &[&str], exports: &[&str], side_effects: bool) -> ModuleInfo {
        let mut info = ModuleInfo::new(id, ModuleType::Ts);
        info.dependencies = deps.iter().map(|d| d.to_string()).collect();
        info.exports = exports.iter().map(|e| e.to_string()).collect();
        info.side_effects = side_effects;
        info
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_entries_are_never_removed() {
        let mut graph = ModuleGraph::new();
        let mut entry = module("/index.ts", &[], &[], false);
        entry.is_entry = true;
        graph.add_module(entry);
        let result = shake(&mut graph).unwrap();
        assert_eq!(result.live, set(&["/index.ts"]));
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_transitive_liveness() {
        let mut graph = ModuleGraph::new();
        let mut entry = module("/index.ts", &["/a.ts"], &["main"], true);
        entry.is_entry = true;
        graph.add_module(entry);
        graph.add_module(module("/a.ts", &["/b.ts"], &["a"], false));
        graph.add_module(module("/b.ts", &[], &["b1", "b2"], false));
        graph.add_module(module("/unused.ts", &[], &["u"], false));
        graph.add_module(module("/polyfill.ts", &[], &[], true));

        let result = shake(&mut graph).unwrap();
        assert_eq!(result.removed, set(&["/unused.ts"]));
        // unreferenced but side-effectful modules stay
        assert!(result.live.contains("/polyfill.ts"));
        assert_eq!(graph.get("/b.ts").unwrap().used_exports, set(&["b1", "b2"]));
        assert_eq!(graph.get("/index.ts").unwrap().used_exports, set(&["main"]));
        assert!(graph.get("/unused.ts").unwrap().used_exports.is_empty());
    }

    #[test]
    fn test_dynamic_targets_are_live() {
        let mut graph = ModuleGraph::new();
        let mut entry = module("/index.ts", &[], &[], true);
        entry.is_entry = true;
        entry.dynamic_dependencies = set(&["/lazy.ts"]);
        graph.add_module(entry);
        graph.add_module(module("/lazy.ts", &["/helper.ts"], &["default"], false));
        graph.add_module(module("/helper.ts", &[], &["help"], false));

        let result = shake(&mut graph).unwrap();
        assert!(result.removed.is_empty());
        assert_eq!(graph.get("/helper.ts").unwrap().used_exports, set(&["help"]));
    }

    #[test]
    fn test_lazy_import_from_dead_code_is_removed() {
        let mut graph = ModuleGraph::new();
        let mut entry = module("/index.ts", &[], &[], true);
        entry.is_entry = true;
        graph.add_module(entry);
        let mut dead = module("/dead.ts", &[], &["unused"], false);
        dead.dynamic_dependencies = set(&["/lazy.ts"]);
        graph.add_module(dead);
        graph.add_module(module("/lazy.ts", &[], &["default"], false));

        let result = shake(&mut graph).unwrap();
        assert_eq!(result.removed, set(&["/dead.ts", "/lazy.ts"]));
    }

    #[test]
    fn test_lazy_target_without_exports_stays() {
        let mut graph = ModuleGraph::new();
        let mut entry = module("/index.ts", &[], &[], true);
        entry.is_entry = true;
        entry.dynamic_dependencies = set(&["/lazy.ts"]);
        graph.add_module(entry);
        graph.add_module(module("/lazy.ts", &[], &[], false));

        let result = shake(&mut graph).unwrap();
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_star_reexport_takes_on_target_exports() {
        let mut graph = ModuleGraph::new();
        let mut entry = module("/index.ts", &["/lib/index.js"], &[], true);
        entry.is_entry = true;
        graph.add_module(entry);
        let mut barrel = module("/lib/index.js", &["/lib/a.js"], &[], false);
        barrel.star_reexports = set(&["/lib/a.js"]);
        graph.add_module(barrel);
        let mut nested = module("/lib/a.js", &["/lib/b.js"], &["default", "foo"], false);
        nested.star_reexports = set(&["/lib/b.js"]);
        graph.add_module(nested);
        graph.add_module(module("/lib/b.js", &[], &["bar"], false));

        let result = shake(&mut graph).unwrap();
        assert!(result.removed.is_empty());
        assert_eq!(
            graph.get("/lib/index.js").unwrap().used_exports,
            set(&["bar", "foo"])
        );
        assert_eq!(
            graph.get("/lib/a.js").unwrap().used_exports,
            set(&["bar", "default", "foo"])
        );
    }

    #[test]
    fn test_pure_module_without_exports_is_removed() {
        let mut graph = ModuleGraph::new();
        let mut entry = module("/index.ts", &["/types.ts"], &[], true);
        entry.is_entry = true;
        graph.add_module(entry);
        graph.add_module(module("/types.ts", &[], &[], false));
        let result = shake(&mut graph).unwrap();
        assert_eq!(result.removed, set(&["/types.ts"]));
        assert!(result.is_removed("/types.ts"));
    }
}
