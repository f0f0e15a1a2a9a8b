use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ahashmap::AHashMap;
use indexmap::IndexSet;
use itertools::Itertools;
use module_graph::{ModuleGraph, ModuleId};
use path_utils::is_in_dependency_dir;
use tracing::debug;
use tree_shaker::ShakeResult;
use xxhash_rust::xxh3::Xxh3;

use crate::chunk::{Chunk, ChunkId, ChunkKind, SplitResult};
use crate::config::SplitConfig;

/// Assigns the live modules of a shaken graph to chunks.
///
/// `entries` maps entry names to entry module ids. Stages run in a fixed
/// order: entry chunks, async chunks, common extraction, vendor extraction,
/// size splitting, cache groups.
pub fn split(
    graph: &ModuleGraph,
    shake: &ShakeResult,
    entries: &BTreeMap<String, ModuleId>,
    config: &SplitConfig,
) -> SplitResult {
    let mut splitter = Splitter {
        graph,
        shake,
        config,
        entry_modules: entries.values().cloned().collect(),
        entry_chunk_of: BTreeMap::new(),
        chunks: Vec::new(),
    };
    splitter.create_entry_chunks(entries);
    splitter.create_async_chunks();
    splitter.extract_common();
    if config.extract_vendors {
        splitter.extract_vendors();
    }
    if let Some(max_size) = config.max_size {
        splitter.split_oversized(max_size);
    }
    splitter.apply_cache_groups();
    splitter.finish()
}

struct Splitter<'a> {
    graph: &'a ModuleGraph,
    shake: &'a ShakeResult,
    config: &'a SplitConfig,
    entry_modules: BTreeSet<ModuleId>,
    entry_chunk_of: BTreeMap<ModuleId, ChunkId>,
    // indexed by ChunkId until finish() renumbers them
    chunks: Vec<Chunk>,
}

impl<'a> Splitter<'a> {
    fn new_chunk(&mut self, kind: ChunkKind, name: Option<String>) -> ChunkId {
        let id = self.chunks.len();
        self.chunks.push(Chunk::new(id, kind, name));
        id
    }

    fn link(&mut self, parent: ChunkId, child: ChunkId) {
        if parent == child {
            return;
        }
        self.chunks[parent].children.insert(child);
        self.chunks[child].parents.insert(parent);
    }

    fn module_size(&self, id: &str) -> u64 {
        self.graph.get(id).map_or(0, |m| m.size)
    }

    fn recompute_sizes(&mut self) {
        let graph = self.graph;
        for chunk in self.chunks.iter_mut() {
            chunk.size = chunk
                .modules
                .iter()
                .map(|m| graph.get(m).map_or(0, |info| info.size))
                .sum();
        }
    }

    // removed and external modules never land in chunks
    fn is_placeable(&self, id: &str) -> bool {
        self.graph.get(id).is_some_and(|m| !m.is_external) && !self.shake.is_removed(id)
    }

    /// Static closure of `start` in DFS discovery order. Other entry modules
    /// are not entered; they are returned separately. Removed modules are
    /// walked through but not collected.
    fn static_closure(&self, start: &str) -> (Vec<ModuleId>, BTreeSet<ModuleId>) {
        let mut modules = Vec::new();
        let mut reached_entries = BTreeSet::new();
        let mut visited: BTreeSet<ModuleId> = BTreeSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if current != start && self.entry_modules.contains(&current) {
                reached_entries.insert(current);
                continue;
            }
            let Some(module) = self.graph.get(&current) else {
                continue;
            };
            if module.is_external {
                continue;
            }
            for dep in module.dependencies.iter().rev() {
                if !visited.contains(dep) {
                    stack.push(dep.clone());
                }
            }
            if !self.shake.is_removed(&current) {
                modules.push(current);
            }
        }
        (modules, reached_entries)
    }

    fn module_chunk_map(&self) -> AHashMap<ModuleId, BTreeSet<ChunkId>> {
        let mut out: AHashMap<ModuleId, BTreeSet<ChunkId>> = AHashMap::default();
        for chunk in self.chunks.iter() {
            for module in chunk.modules.iter() {
                out.entry(module.clone()).or_default().insert(chunk.id);
            }
        }
        out
    }

    fn create_entry_chunks(&mut self, entries: &BTreeMap<String, ModuleId>) {
        let mut pending_links: Vec<(ChunkId, ModuleId)> = Vec::new();
        for (name, entry_id) in entries.iter() {
            if !self.is_placeable(entry_id) || self.entry_chunk_of.contains_key(entry_id) {
                continue;
            }
            let (modules, reached_entries) = self.static_closure(entry_id);
            let chunk = self.new_chunk(ChunkKind::Entry, Some(name.clone()));
            self.chunks[chunk].modules.extend(modules);
            self.entry_chunk_of.insert(entry_id.clone(), chunk);
            pending_links.extend(reached_entries.into_iter().map(|reached| (chunk, reached)));
        }
        for (parent, reached) in pending_links {
            if let Some(&child) = self.entry_chunk_of.get(&reached) {
                self.link(parent, child);
            }
        }
        self.recompute_sizes();
    }

    fn create_async_chunks(&mut self) {
        let graph = self.graph;
        let mut async_chunks: Vec<(ModuleId, ChunkId)> = Vec::new();
        for candidate in graph.code_split_candidates() {
            if !self.is_placeable(&candidate) {
                continue;
            }
            let (modules, reached_entries) = self.static_closure(&candidate);
            let name = Path::new(&candidate)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
            let chunk = self.new_chunk(ChunkKind::Async, name);
            self.chunks[chunk].modules.extend(modules);
            for reached in reached_entries {
                if let Some(&child) = self.entry_chunk_of.get(&reached) {
                    self.link(chunk, child);
                }
            }
            async_chunks.push((candidate, chunk));
        }

        // linked only once every async chunk exists, so importers inside
        // other async chunks are found
        let containing = self.module_chunk_map();
        for (candidate, chunk) in async_chunks {
            let importers = graph
                .dependents(&candidate)
                .into_iter()
                .flatten()
                .filter(|importer| {
                    graph
                        .get(importer.as_str())
                        .is_some_and(|m| m.dynamic_dependencies.contains(&candidate))
                });
            for importer in importers {
                for &parent in containing.get(importer).into_iter().flatten() {
                    self.link(parent, chunk);
                }
            }
        }
        self.recompute_sizes();
    }

    /// Moves (or copies, when `duplicate`) `modules` into a new chunk that
    /// becomes a child of every chunk it took modules from.
    fn extract_into_new_chunk(
        &mut self,
        kind: ChunkKind,
        name: String,
        modules: IndexSet<ModuleId>,
        duplicate: bool,
    ) -> ChunkId {
        let target = self.new_chunk(kind, Some(name));
        let mut sources = BTreeSet::new();
        for chunk in self.chunks.iter_mut() {
            if chunk.id == target {
                continue;
            }
            if duplicate {
                if chunk.modules.iter().any(|m| modules.contains(m)) {
                    sources.insert(chunk.id);
                }
            } else {
                let before = chunk.modules.len();
                chunk.modules.retain(|m| !modules.contains(m));
                if chunk.modules.len() != before {
                    sources.insert(chunk.id);
                }
            }
        }
        self.chunks[target].modules = modules;
        for source in sources {
            self.link(source, target);
        }
        self.recompute_sizes();
        target
    }

    fn extract_common(&mut self) {
        let counts = self.module_chunk_map();
        let shared: IndexSet<ModuleId> = self
            .chunks
            .iter()
            .flat_map(|c| c.modules.iter())
            .filter(|m| !self.entry_modules.contains(*m))
            .filter(|m| counts.get(*m).map_or(0, |c| c.len()) >= self.config.min_chunks)
            .cloned()
            .collect();
        if shared.is_empty() {
            return;
        }
        let total: u64 = shared.iter().map(|m| self.module_size(m)).sum();
        if total < self.config.min_size {
            debug!(
                "skipping common chunk: {} bytes is below min_size {}",
                total, self.config.min_size
            );
            return;
        }
        let name = self.config.common_chunk_name.clone();
        self.extract_into_new_chunk(ChunkKind::Common, name, shared, false);
    }

    fn extract_vendors(&mut self) {
        let dependency_dir = &self.config.dependency_dir;
        let vendored: IndexSet<ModuleId> = self
            .chunks
            .iter()
            .flat_map(|c| c.modules.iter())
            .filter(|m| !self.entry_modules.contains(*m))
            .filter(|m| is_in_dependency_dir(Path::new(m.as_str()), dependency_dir))
            .cloned()
            .collect();
        if vendored.is_empty() {
            return;
        }
        let name = self.config.vendor_chunk_name.clone();
        self.extract_into_new_chunk(ChunkKind::Vendor, name, vendored, false);
    }

    /// Greedy, order-preserving split. Later parts become children of the
    /// first part, which keeps the original chunk's identity.
    fn split_oversized(&mut self, max_size: u64) {
        let original_count = self.chunks.len();
        for id in 0..original_count {
            if self.chunks[id].size <= max_size || self.chunks[id].modules.len() < 2 {
                continue;
            }
            let mut parts: Vec<IndexSet<ModuleId>> = Vec::new();
            let mut current: IndexSet<ModuleId> = IndexSet::new();
            let mut current_size = 0;
            for module in self.chunks[id].modules.iter() {
                let size = self.module_size(module);
                if !current.is_empty() && current_size + size > max_size {
                    parts.push(std::mem::take(&mut current));
                    current_size = 0;
                }
                current_size += size;
                current.insert(module.clone());
            }
            if !current.is_empty() {
                parts.push(current);
            }
            if parts.len() < 2 {
                continue;
            }

            let base_name = self.chunks[id].display_name();
            let mut parts = parts.into_iter();
            if let Some(first) = parts.next() {
                self.chunks[id].modules = first;
            }
            for (n, part) in parts.enumerate() {
                let child = self.new_chunk(ChunkKind::Split, Some(format!("{}-{}", base_name, n + 1)));
                self.chunks[child].modules = part;
                self.link(id, child);
            }
        }
        self.recompute_sizes();
    }

    fn apply_cache_groups(&mut self) {
        let config = self.config;
        let graph = self.graph;
        // sort is stable, so equal priorities keep declaration order
        for group in config
            .cache_groups
            .iter()
            .sorted_by(|a, b| b.priority.cmp(&a.priority))
        {
            // a higher priority group keeps the modules it claimed
            let claimed: BTreeSet<&ModuleId> = self
                .chunks
                .iter()
                .filter(|c| c.kind == ChunkKind::CacheGroup)
                .flat_map(|c| c.modules.iter())
                .collect();
            let matched: IndexSet<ModuleId> = self
                .chunks
                .iter()
                .filter(|c| c.kind != ChunkKind::CacheGroup)
                .flat_map(|c| c.modules.iter())
                .filter(|m| !claimed.contains(m) && !self.entry_modules.contains(*m))
                .filter(|m| graph.get(m.as_str()).is_some_and(|info| group.test.matches(info)))
                .cloned()
                .collect();
            if matched.is_empty() {
                continue;
            }
            debug!("cache group {} takes {} modules", group.name, matched.len());
            self.extract_into_new_chunk(
                ChunkKind::CacheGroup,
                group.name.clone(),
                matched,
                group.reuse_existing_chunk,
            );
        }
    }

    /// Drops empty non-entry chunks, renumbers the rest, and computes hashes.
    fn finish(mut self) -> SplitResult {
        self.recompute_sizes();
        let mut renumbered: BTreeMap<ChunkId, ChunkId> = BTreeMap::new();
        for chunk in self.chunks.iter() {
            if chunk.is_entry || !chunk.modules.is_empty() {
                renumbered.insert(chunk.id, renumbered.len());
            }
        }

        let graph = self.graph;
        let chunks: Vec<Chunk> = self
            .chunks
            .into_iter()
            .filter_map(|mut chunk| {
                let new_id = *renumbered.get(&chunk.id)?;
                chunk.id = new_id;
                chunk.parents = chunk
                    .parents
                    .iter()
                    .filter_map(|p| renumbered.get(p).copied())
                    .collect();
                chunk.children = chunk
                    .children
                    .iter()
                    .filter_map(|c| renumbered.get(c).copied())
                    .collect();
                chunk.hash = chunk_hash(graph, &chunk.modules);
                Some(chunk)
            })
            .collect();

        let mut module_chunks: BTreeMap<ModuleId, BTreeSet<ChunkId>> = BTreeMap::new();
        for chunk in chunks.iter() {
            for module in chunk.modules.iter() {
                module_chunks
                    .entry(module.clone())
                    .or_default()
                    .insert(chunk.id);
            }
        }

        SplitResult {
            chunks,
            module_chunks,
        }
    }
}

/// xxh3-64 over the ordered module ids and their content hashes
fn chunk_hash(graph: &ModuleGraph, modules: &IndexSet<ModuleId>) -> String {
    let mut hasher = Xxh3::new();
    for module in modules.iter() {
        hasher.update(module.as_bytes());
        hasher.update(&[0]);
        if let Some(info) = graph.get(module) {
            hasher.update(info.content_hash.as_bytes());
        }
        hasher.update(&[0]);
    }
    format!("{:016x}", hasher.digest())
}
