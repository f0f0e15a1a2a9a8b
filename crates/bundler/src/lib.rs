//! The build pipeline: resolve entries, discover the module graph, shake,
//! split into chunks, and emit code with source maps.

mod analyzer;
mod bundler;
mod config;
mod discovery;
mod emit;
mod error;

#[cfg(test)]
mod test;

use std::collections::BTreeMap;

pub use analyzer::{
    default_analyzers, CssAnalyzer, EcmaScriptAnalyzer, JsonAnalyzer, SourceAnalysis,
    SourceAnalyzer, StaticImport,
};
pub use bundler::{entries_from_specifiers, BuildResult, BuildStats, Bundler};
pub use config::{config_schema, BundlerConfig, BundlerJSONConfig, ConfigError, SourceMapMode};
pub use emit::{ChunkEmission, OutputWriter};
pub use error::{BuildError, BuildWarning};

/// Builds `entries` with a one-off [Bundler].
pub fn bundle(
    logger: impl logger::Logger,
    config: BundlerJSONConfig,
    entries: &BTreeMap<String, String>,
) -> anyhow::Result<BuildResult> {
    let bundler = Bundler::from_json_config(config)?;
    Ok(bundler.build(&logger, entries))
}
