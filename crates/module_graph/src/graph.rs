use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::module_info::{ModuleId, ModuleInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: ModuleId,
    pub to: ModuleId,
    pub kind: EdgeKind,
}

/// Generic node/edge document describing the whole graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExport {
    pub nodes: Vec<ModuleInfo>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStatistics {
    pub module_count: usize,
    pub entry_count: usize,
    pub external_count: usize,
    // static + dynamic
    pub edge_count: usize,
    pub circular_count: usize,
    pub max_depth: usize,
    pub total_size: u64,
}

/// Dependency graph over discovered modules.
///
/// The reverse-dependency map is kept as the exact transpose of every
/// module's static and dynamic dependencies.
#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
    modules: BTreeMap<ModuleId, ModuleInfo>,
    reverse_dependencies: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a module, then flags any cycle reachable
    /// from it.
    pub fn add_module(&mut self, info: ModuleInfo) {
        let id = info.id.clone();
        if let Some(previous) = self.modules.remove(&id) {
            self.retract_edges(&previous);
        }
        for dep in info.all_dependencies() {
            self.reverse_dependencies
                .entry(dep.clone())
                .or_default()
                .insert(id.clone());
        }
        self.modules.insert(id.clone(), info);
        self.detect_cycles(&id);
    }

    fn retract_edges(&mut self, previous: &ModuleInfo) {
        for dep in previous.all_dependencies() {
            if let Some(dependents) = self.reverse_dependencies.get_mut(dep) {
                dependents.remove(&previous.id);
                if dependents.is_empty() {
                    self.reverse_dependencies.remove(dep);
                }
            }
        }
    }

    // Depth-first walk over static edges rooted at `start`. When a
    // dependency is already on the walk's path, the path suffix starting at
    // that dependency is a cycle.
    fn detect_cycles(&mut self, start: &str) {
        let mut in_cycle: BTreeSet<ModuleId> = BTreeSet::new();
        {
            let Some(start_info) = self.modules.get(start) else {
                return;
            };
            let mut visited: BTreeSet<&str> = BTreeSet::new();
            let mut path: Vec<&str> = vec![start];
            let mut on_path: BTreeMap<&str, usize> = BTreeMap::new();
            let mut stack = vec![start_info.dependencies.iter()];
            visited.insert(start);
            on_path.insert(start, 0);

            loop {
                let next = match stack.last_mut() {
                    Some(deps) => deps.next(),
                    None => break,
                };
                match next {
                    Some(dep) => {
                        let dep = dep.as_str();
                        if let Some(&cycle_start) = on_path.get(dep) {
                            in_cycle.extend(path[cycle_start..].iter().map(|s| s.to_string()));
                            continue;
                        }
                        if !visited.insert(dep) {
                            continue;
                        }
                        let Some(dep_info) = self.modules.get(dep) else {
                            continue;
                        };
                        on_path.insert(dep, path.len());
                        path.push(dep);
                        stack.push(dep_info.dependencies.iter());
                    }
                    None => {
                        stack.pop();
                        if let Some(finished) = path.pop() {
                            on_path.remove(finished);
                        }
                    }
                }
            }
        }

        if !in_cycle.is_empty() {
            debug!("circular dependency involving {:?}", in_cycle);
        }
        for id in in_cycle {
            if let Some(module) = self.modules.get_mut(&id) {
                module.circular = true;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModuleInfo> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All modules, ordered by id
    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.values()
    }

    /// Entry module ids, ordered
    pub fn entries(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules
            .values()
            .filter(|m| m.is_entry)
            .map(|m| &m.id)
    }

    /// Modules that import `id` statically or dynamically
    pub fn dependents(&self, id: &str) -> Option<&BTreeSet<ModuleId>> {
        self.reverse_dependencies.get(id)
    }

    pub fn set_used_exports(&mut self, id: &str, used_exports: BTreeSet<String>) {
        if let Some(module) = self.modules.get_mut(id) {
            module.used_exports = used_exports;
        }
    }

    /// Closure over forward (static and dynamic) edges, including `id`,
    /// in DFS discovery order.
    pub fn transitive_dependencies(&self, id: &str) -> Vec<ModuleId> {
        self.dfs_closure(id, |current| {
            self.modules
                .get(current)
                .map(|m| {
                    m.all_dependencies()
                        .filter(|dep| self.modules.contains_key(dep.as_str()))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Closure over reverse edges, including `id`, in DFS discovery order.
    pub fn transitive_dependents(&self, id: &str) -> Vec<ModuleId> {
        self.dfs_closure(id, |current| {
            self.reverse_dependencies
                .get(current)
                .map(|dependents| dependents.iter().collect())
                .unwrap_or_default()
        })
    }

    fn dfs_closure<'a>(
        &'a self,
        start: &str,
        neighbors: impl Fn(&str) -> Vec<&'a ModuleId>,
    ) -> Vec<ModuleId> {
        let Some((start, _)) = self.modules.get_key_value(start) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&str> = vec![start.as_str()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            out.push(current.to_string());
            let mut next = neighbors(current);
            next.retain(|n| !visited.contains(n.as_str()));
            // reversed so the smallest id is visited first
            stack.extend(next.into_iter().rev().map(|n| n.as_str()));
        }
        out
    }

    /// Assigns each module its shortest edge distance from any entry.
    /// Modules unreachable from every entry get None.
    pub fn calculate_depths(&mut self) {
        let mut depths: BTreeMap<ModuleId, usize> = BTreeMap::new();
        let mut frontier: Vec<ModuleId> = self.entries().cloned().collect();
        for entry in frontier.iter() {
            depths.insert(entry.clone(), 0);
        }

        let mut depth = 0;
        while !frontier.is_empty() {
            depth += 1;
            let mut next_frontier = Vec::new();
            for id in frontier.iter() {
                let Some(module) = self.modules.get(id) else {
                    continue;
                };
                for dep in module.all_dependencies() {
                    if self.modules.contains_key(dep) && !depths.contains_key(dep) {
                        depths.insert(dep.clone(), depth);
                        next_frontier.push(dep.clone());
                    }
                }
            }
            frontier = next_frontier;
        }

        for module in self.modules.values_mut() {
            module.depth = depths.get(&module.id).copied();
        }
    }

    /// Non-entry, non-external targets of at least one dynamic import.
    pub fn code_split_candidates(&self) -> BTreeSet<ModuleId> {
        self.modules
            .values()
            .flat_map(|m| m.dynamic_dependencies.iter())
            .filter(|id| {
                self.modules
                    .get(id.as_str())
                    .is_some_and(|m| !m.is_entry && !m.is_external)
            })
            .cloned()
            .collect()
    }

    /// Groups of circular modules that form a cycle together, each group
    /// and the list of groups ordered.
    pub fn circular_groups(&self) -> Vec<Vec<ModuleId>> {
        let circular: BTreeSet<&str> = self
            .modules
            .values()
            .filter(|m| m.circular)
            .map(|m| m.id.as_str())
            .collect();

        let reachable = |start: &str, forward: bool| -> BTreeSet<String> {
            let mut seen = BTreeSet::new();
            let mut stack = vec![start.to_string()];
            while let Some(current) = stack.pop() {
                let next: Vec<&ModuleId> = if forward {
                    self.modules
                        .get(&current)
                        .map(|m| m.dependencies.iter().collect())
                        .unwrap_or_default()
                } else {
                    self.reverse_dependencies
                        .get(&current)
                        .map(|d| {
                            d.iter()
                                .filter(|from| {
                                    self.modules
                                        .get(from.as_str())
                                        .is_some_and(|m| m.dependencies.contains(&current))
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                };
                for n in next {
                    if circular.contains(n.as_str()) && seen.insert(n.clone()) {
                        stack.push(n.clone());
                    }
                }
            }
            seen
        };

        let mut grouped: BTreeSet<&str> = BTreeSet::new();
        let mut groups = Vec::new();
        for &id in circular.iter() {
            if grouped.contains(id) {
                continue;
            }
            let forward = reachable(id, true);
            let backward = reachable(id, false);
            let mut group: BTreeSet<String> = forward.intersection(&backward).cloned().collect();
            group.insert(id.to_string());
            for member in group.iter() {
                if let Some(m) = circular.get(member.as_str()) {
                    grouped.insert(*m);
                }
            }
            groups.push(group.into_iter().collect());
        }
        groups
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut stats = GraphStatistics::default();
        for module in self.modules.values() {
            stats.module_count += 1;
            stats.edge_count += module.dependencies.len() + module.dynamic_dependencies.len();
            stats.total_size += module.size;
            if module.is_entry {
                stats.entry_count += 1;
            }
            if module.is_external {
                stats.external_count += 1;
            }
            if module.circular {
                stats.circular_count += 1;
            }
            if let Some(depth) = module.depth {
                stats.max_depth = stats.max_depth.max(depth);
            }
        }
        stats
    }

    pub fn export(&self) -> GraphExport {
        let mut edges = Vec::new();
        for module in self.modules.values() {
            edges.extend(module.dependencies.iter().map(|to| GraphEdge {
                from: module.id.clone(),
                to: to.clone(),
                kind: EdgeKind::Static,
            }));
            edges.extend(module.dynamic_dependencies.iter().map(|to| GraphEdge {
                from: module.id.clone(),
                to: to.clone(),
                kind: EdgeKind::Dynamic,
            }));
        }
        GraphExport {
            nodes: self.modules.values().cloned().collect(),
            edges,
        }
    }

    pub fn clear(&mut self) {
        self.modules.clear();
        self.reverse_dependencies.clear();
    }

    #[cfg(test)]
    pub(crate) fn reverse_dependencies(&self) -> &BTreeMap<ModuleId, BTreeSet<ModuleId>> {
        &self.reverse_dependencies
    }
}
