use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahashmap::AHashMap;
use anyhow::Context;
use import_resolver::{ModuleKind, ResolveResult, ResolverSession};
use logger::{debug_logf, Logger};
use module_graph::{ModuleGraph, ModuleId, ModuleInfo, ModuleType};
use parking_lot::RwLock;
use path_slash::PathBufExt;
use rayon::prelude::*;
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use crate::analyzer::{SourceAnalysis, SourceAnalyzer};
use crate::error::BuildError;

/// Analysis of one file version, keyed by module id in the cache
#[derive(Debug, Clone)]
pub(crate) struct CachedAnalysis {
    pub content_hash: String,
    pub analysis: Arc<SourceAnalysis>,
}

pub(crate) type AnalysisCache = RwLock<AHashMap<ModuleId, CachedAnalysis>>;

/// Per-module facts known from resolution rather than from the file itself
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModuleMeta {
    pub side_effects: bool,
    pub module_kind: Option<ModuleKind>,
    pub is_entry: bool,
}

impl ModuleMeta {
    pub fn from_resolution(result: &ResolveResult, is_entry: bool) -> Self {
        ModuleMeta {
            side_effects: result.side_effects,
            module_kind: result.module_kind,
            is_entry,
        }
    }
}

struct LoadedModule {
    info: ModuleInfo,
    source: Arc<str>,
    unresolved: Vec<String>,
    // (specifier, resolution) for every resolved import, static first
    resolved: Vec<(String, ResolveResult)>,
    fresh_analysis: Option<CachedAnalysis>,
}

enum Processed {
    Loaded(Box<LoadedModule>),
    Failed { id: ModuleId, error: BuildError },
}

pub(crate) struct Discovery {
    pub graph: ModuleGraph,
    pub sources: BTreeMap<ModuleId, Arc<str>>,
    pub errors: Vec<BuildError>,
    pub staged_analyses: AHashMap<ModuleId, CachedAnalysis>,
}

pub(crate) struct Discoverer<'a> {
    pub session: &'a ResolverSession<'a>,
    pub analyzers: &'a [Arc<dyn SourceAnalyzer>],
    pub analysis_cache: &'a AnalysisCache,
    pub pool: &'a rayon::ThreadPool,
}

impl<'a> Discoverer<'a> {
    /// Discovers every module reachable from `entries`, one wave at a time.
    ///
    /// Workers read, hash, analyze and resolve the files of a wave in
    /// parallel. Their results are added to the graph in module id order,
    /// so the graph does not depend on thread scheduling.
    pub fn run(
        &self,
        logger: impl Logger,
        entries: BTreeMap<ModuleId, ModuleMeta>,
    ) -> Discovery {
        let mut discovery = Discovery {
            graph: ModuleGraph::new(),
            sources: BTreeMap::new(),
            errors: Vec::new(),
            staged_analyses: AHashMap::default(),
        };
        let mut seen: BTreeSet<ModuleId> = entries.keys().cloned().collect();
        let mut meta = entries;
        // module => (importer, specifier) pairs, for reporting failed modules
        let mut importers: BTreeMap<ModuleId, BTreeSet<(ModuleId, String)>> = BTreeMap::new();
        let mut failed: Vec<ModuleId> = Vec::new();

        let mut frontier: Vec<ModuleId> = seen.iter().cloned().collect();
        let mut wave = 0;
        while !frontier.is_empty() {
            wave += 1;
            debug_logf!(logger, "discovery wave {}: {} modules", wave, frontier.len());

            let wave_meta = &meta;
            let processed: Vec<Processed> = self.pool.install(|| {
                frontier
                    .par_iter()
                    .map(|id| match wave_meta.get(id) {
                        Some(module_meta) => self.load_module(id, *module_meta),
                        None => Processed::Failed {
                            id: id.clone(),
                            error: BuildError::Internal {
                                stage: "discovery".to_string(),
                                message: format!("no resolution recorded for {}", id),
                            },
                        },
                    })
                    .collect()
            });

            let mut next_frontier: BTreeSet<ModuleId> = BTreeSet::new();
            for result in processed {
                let loaded = match result {
                    Processed::Loaded(loaded) => *loaded,
                    Processed::Failed { id, error } => {
                        discovery.errors.push(error);
                        failed.push(id);
                        continue;
                    }
                };
                let id = loaded.info.id.clone();
                for specifier in loaded.unresolved {
                    discovery.errors.push(BuildError::UnresolvedImport {
                        importer: id.clone(),
                        specifier,
                    });
                }
                for (specifier, resolution) in loaded.resolved {
                    importers
                        .entry(resolution.path.clone())
                        .or_default()
                        .insert((id.clone(), specifier));
                    if !seen.insert(resolution.path.clone()) {
                        continue;
                    }
                    if resolution.external {
                        discovery
                            .graph
                            .add_module(ModuleInfo::external(resolution.path.clone()));
                    } else {
                        meta.insert(
                            resolution.path.clone(),
                            ModuleMeta::from_resolution(&resolution, false),
                        );
                        next_frontier.insert(resolution.path);
                    }
                }
                if let Some(fresh) = loaded.fresh_analysis {
                    discovery.staged_analyses.insert(id.clone(), fresh);
                }
                discovery.sources.insert(id, loaded.source);
                discovery.graph.add_module(loaded.info);
            }
            frontier = next_frontier.into_iter().collect();
        }

        // importers of a module that failed to load get an unresolved import
        // each, and lose the dangling edge
        for id in failed {
            let Some(edges) = importers.get(&id) else {
                continue;
            };
            for (importer, specifier) in edges.iter() {
                discovery.errors.push(BuildError::UnresolvedImport {
                    importer: importer.clone(),
                    specifier: specifier.clone(),
                });
                if let Some(mut info) = discovery.graph.get(importer).cloned() {
                    info.dependencies.remove(&id);
                    info.dynamic_dependencies.remove(&id);
                    info.imports.remove(&id);
                    info.star_reexports.remove(&id);
                    discovery.graph.add_module(info);
                }
            }
        }

        discovery
    }

    fn analyzer_for(&self, path: &Path) -> Option<&Arc<dyn SourceAnalyzer>> {
        self.analyzers.iter().find(|a| a.handles(path))
    }

    fn load_module(&self, id: &str, meta: ModuleMeta) -> Processed {
        let path = PathBuf::from_slash(id);
        let bytes = match std::fs::read(&path).with_context(|| format!("reading {}", id)) {
            Ok(bytes) => bytes,
            Err(err) => {
                return Processed::Failed {
                    id: id.to_string(),
                    error: BuildError::ReadFailed {
                        module: id.to_string(),
                        message: format!("{:#}", err),
                    },
                }
            }
        };
        let content_hash = format!("{:016x}", xxh3_64(&bytes));
        let source: Arc<str> = String::from_utf8_lossy(&bytes).into();

        let cached = self
            .analysis_cache
            .read()
            .get(id)
            .filter(|c| c.content_hash == content_hash)
            .map(|c| c.analysis.clone());
        let (analysis, fresh_analysis) = match cached {
            Some(analysis) => {
                trace!("reusing analysis of {}", id);
                (analysis, None)
            }
            None => {
                let analysis = match self.analyzer_for(&path) {
                    Some(analyzer) => match analyzer.analyze(&path, &source) {
                        Ok(analysis) => analysis,
                        Err(err) => {
                            return Processed::Failed {
                                id: id.to_string(),
                                error: BuildError::AnalysisFailed {
                                    module: id.to_string(),
                                    message: format!("{:#}", err),
                                },
                            }
                        }
                    },
                    None => SourceAnalysis::asset(),
                };
                let analysis = Arc::new(analysis);
                let fresh = CachedAnalysis {
                    content_hash: content_hash.clone(),
                    analysis: analysis.clone(),
                };
                (analysis, Some(fresh))
            }
        };

        let mut info = ModuleInfo::new(id, ModuleType::from_path(&path));
        info.size = bytes.len() as u64;
        info.content_hash = content_hash;
        info.is_entry = meta.is_entry;
        info.side_effects = meta.side_effects;
        info.module_kind = meta.module_kind;
        info.exports = analysis.exports.clone();

        let mut unresolved = Vec::new();
        let mut resolved = Vec::new();
        for import in analysis.static_imports.iter() {
            match self.session.resolve(&import.specifier, &path) {
                Some(result) => {
                    info.dependencies.insert(result.path.clone());
                    info.imports
                        .entry(result.path.clone())
                        .or_default()
                        .extend(import.names.iter().cloned());
                    if analysis.star_reexports.contains(&import.specifier) {
                        info.star_reexports.insert(result.path.clone());
                    }
                    resolved.push((import.specifier.clone(), result));
                }
                None => unresolved.push(import.specifier.clone()),
            }
        }
        for specifier in analysis.dynamic_imports.iter() {
            match self.session.resolve(specifier, &path) {
                Some(result) => {
                    info.dynamic_dependencies.insert(result.path.clone());
                    resolved.push((specifier.clone(), result));
                }
                None => unresolved.push(specifier.clone()),
            }
        }
        debug!(
            "analyzed {}: {} dependencies, {} unresolved",
            id,
            resolved.len(),
            unresolved.len()
        );

        Processed::Loaded(Box::new(LoadedModule {
            info,
            source,
            unresolved,
            resolved,
            fresh_analysis,
        }))
    }
}
