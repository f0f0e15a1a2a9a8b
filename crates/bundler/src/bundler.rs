use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use code_splitter::{Chunk, ChunkId, SplitResult};
use import_resolver::Resolver;
use logger::{debug_logf, Logger};
use module_graph::{GraphExport, GraphStatistics, ModuleGraph, ModuleId};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tree_shaker::ShakeResult;

use crate::analyzer::{default_analyzers, SourceAnalyzer};
use crate::config::{BundlerConfig, BundlerJSONConfig};
use crate::discovery::{AnalysisCache, Discoverer, ModuleMeta};
use crate::emit::{chunk_file_name, emit_chunk, ChunkEmission, OutputWriter};
use crate::error::{BuildError, BuildWarning};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub graph: GraphStatistics,
    pub removed_modules: usize,
    pub chunk_count: usize,
    // bytes of emitted code, source map comments included
    pub output_size: u64,
}

/// Everything a build produced. Identical inputs give identical results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub success: bool,
    pub errors: Vec<BuildError>,
    pub warnings: Vec<BuildWarning>,
    pub chunks: Vec<Chunk>,
    pub module_chunks: BTreeMap<ModuleId, BTreeSet<ChunkId>>,
    pub outputs: Vec<ChunkEmission>,
    pub graph: GraphExport,
    pub stats: BuildStats,
}

impl BuildResult {
    pub fn output(&self, chunk_name: &str) -> Option<&ChunkEmission> {
        self.outputs.iter().find(|o| o.name == chunk_name)
    }
}

/// Names entries after their file stems, e.g. `src/admin.ts` => `admin`.
/// Repeated stems get a numeric suffix.
pub fn entries_from_specifiers<S: AsRef<str>>(specifiers: &[S]) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for specifier in specifiers {
        let specifier = specifier.as_ref();
        let stem = Path::new(specifier)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string());
        let mut name = stem.clone();
        let mut suffix = 2;
        while entries.contains_key(&name) {
            name = format!("{}-{}", stem, suffix);
            suffix += 1;
        }
        entries.insert(name, specifier.to_string());
    }
    entries
}

// entries are paths relative to the project root
fn entry_specifier(specifier: &str) -> String {
    if specifier.starts_with('.') || Path::new(specifier).is_absolute() {
        specifier.to_string()
    } else {
        format!("./{}", specifier)
    }
}

/// Runs builds for one project.
///
/// Resolutions and source analyses are cached across builds. A build only
/// adds to those caches when it succeeds.
pub struct Bundler {
    config: BundlerConfig,
    resolver: Resolver,
    analyzers: Vec<Arc<dyn SourceAnalyzer>>,
    analysis_cache: AnalysisCache,
    pool: rayon::ThreadPool,
}

impl Bundler {
    pub fn new(config: BundlerConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .thread_name(|i| format!("bundler-discovery-{}", i))
            .build()
            .context("failed to start the discovery thread pool")?;
        Ok(Bundler {
            resolver: Resolver::new(config.resolve.clone()),
            config,
            analyzers: default_analyzers(),
            analysis_cache: AnalysisCache::default(),
            pool,
        })
    }

    pub fn from_json_config(config: BundlerJSONConfig) -> Result<Self> {
        let config = BundlerConfig::try_from(config).context("invalid bundler configuration")?;
        Self::new(config)
    }

    /// Registers an analyzer that takes precedence over the built-in ones.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SourceAnalyzer>) -> Self {
        self.analyzers.insert(0, analyzer);
        self
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn cached_analysis_count(&self) -> usize {
        self.analysis_cache.read().len()
    }

    /// Drops every cached resolution, manifest and analysis.
    pub fn clear_cache(&self) {
        self.resolver.clear_cache();
        self.analysis_cache.write().clear();
    }

    /// Builds `entries` (entry name => path relative to the root).
    pub fn build(&self, logger: impl Logger, entries: &BTreeMap<String, String>) -> BuildResult {
        self.build_inner(logger, entries, None)
    }

    /// Like [Bundler::build], then hands every emitted chunk to `writer`
    /// if the build succeeded.
    pub fn build_with_writer(
        &self,
        logger: impl Logger,
        entries: &BTreeMap<String, String>,
        writer: &dyn OutputWriter,
    ) -> BuildResult {
        self.build_inner(logger, entries, Some(writer))
    }

    fn build_inner(
        &self,
        logger: impl Logger,
        entries: &BTreeMap<String, String>,
        writer: Option<&dyn OutputWriter>,
    ) -> BuildResult {
        let _tracing = if cfg!(debug_assertions) {
            Some(tracing::span!(Level::DEBUG, "build", entries = entries.len()).entered())
        } else {
            None
        };
        let start = Instant::now();
        let session = self.resolver.session();
        let mut errors: Vec<BuildError> = Vec::new();

        let mut entry_modules: BTreeMap<String, ModuleId> = BTreeMap::new();
        let mut entry_meta: BTreeMap<ModuleId, ModuleMeta> = BTreeMap::new();
        for (name, specifier) in entries.iter() {
            match session.resolve_from_dir(&entry_specifier(specifier), &self.config.root) {
                Some(resolved) if !resolved.external => {
                    entry_meta.insert(
                        resolved.path.clone(),
                        ModuleMeta::from_resolution(&resolved, true),
                    );
                    entry_modules.insert(name.clone(), resolved.path);
                }
                _ => {
                    let error = BuildError::UnresolvedEntry {
                        name: name.clone(),
                        specifier: specifier.clone(),
                    };
                    logger.error(&error);
                    errors.push(error);
                }
            }
        }

        let discovery = Discoverer {
            session: &session,
            analyzers: &self.analyzers,
            analysis_cache: &self.analysis_cache,
            pool: &self.pool,
        }
        .run(&logger, entry_meta);
        for error in discovery.errors.iter() {
            logger.error(error);
        }
        errors.extend(discovery.errors);
        let mut graph: ModuleGraph = discovery.graph;
        entry_modules.retain(|_, id| graph.contains(id));
        debug_logf!(
            logger,
            "discovered {} modules in {:.2?}",
            graph.len(),
            start.elapsed()
        );

        graph.calculate_depths();
        let shaken = match tree_shaker::shake(&mut graph) {
            Ok(shaken) => shaken,
            Err(err) => {
                errors.push(BuildError::Internal {
                    stage: "tree shaking".to_string(),
                    message: format!("{:#}", err),
                });
                ShakeResult::default()
            }
        };
        let split: SplitResult =
            code_splitter::split(&graph, &shaken, &entry_modules, &self.config.split);

        let mut warnings: Vec<BuildWarning> = graph
            .circular_groups()
            .into_iter()
            .map(|modules| BuildWarning::CircularDependency { modules })
            .collect();
        if let Some(max_size) = self.config.split.max_size {
            warnings.extend(split.oversized_chunks(max_size).map(|chunk| {
                BuildWarning::OversizedChunk {
                    chunk: chunk.display_name(),
                    size: chunk.size,
                    max_size,
                }
            }));
        }
        for warning in warnings.iter() {
            logger.warn(warning);
        }

        let mut outputs = Vec::with_capacity(split.chunks.len());
        for chunk in split.chunks.iter() {
            match emit_chunk(
                chunk,
                &discovery.sources,
                &self.config.root,
                self.config.source_map,
            ) {
                Ok(emission) => outputs.push(emission),
                Err(err) => errors.push(BuildError::EmitFailed {
                    file: chunk_file_name(chunk),
                    message: err.to_string(),
                }),
            }
        }
        if let Some(writer) = writer {
            if errors.is_empty() {
                for emission in outputs.iter() {
                    if let Err(err) = writer.write(&self.config.output_dir, emission) {
                        let error = BuildError::EmitFailed {
                            file: emission.file_name.clone(),
                            message: format!("{:#}", err),
                        };
                        logger.error(&error);
                        errors.push(error);
                    }
                }
            } else {
                logger.warn("build failed, skipping output");
            }
        }

        let success = errors.is_empty();
        if success {
            session.commit();
            let mut cache = self.analysis_cache.write();
            for (id, analysis) in discovery.staged_analyses {
                cache.insert(id, analysis);
            }
        } else {
            session.discard();
        }

        let stats = BuildStats {
            graph: graph.statistics(),
            removed_modules: shaken.removed.len(),
            chunk_count: split.chunks.len(),
            output_size: outputs.iter().map(|o| o.code.len() as u64).sum(),
        };
        logger.log(format!(
            "built {} modules into {} chunks in {:.2?}{}",
            stats.graph.module_count,
            stats.chunk_count,
            start.elapsed(),
            if success { "" } else { " with errors" }
        ));

        BuildResult {
            success,
            errors,
            warnings,
            chunks: split.chunks,
            module_chunks: split.module_chunks,
            outputs,
            graph: graph.export(),
            stats,
        }
    }
}
