use std::path::{Path, PathBuf};

use code_splitter::{SplitConfig, SplitConfigError, SplitJSONConfig};
use import_resolver::{ResolverConfig, ResolverJSONConfig};
use path_clean::PathClean;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where the source map of an emitted chunk goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    /// Embedded in the chunk as a base64 data URL comment
    Inline,
    /// Written next to the chunk as `<file>.map` and referenced by a comment
    #[default]
    External,
    /// Written next to the chunk without a reference comment
    Hidden,
    /// No source map
    None,
}

/// A JSON serializable proxy for the BundlerConfig struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct BundlerJSONConfig {
    // Project root. Entries and relative config paths resolve against it.
    pub root: String,
    pub resolve: ResolverJSONConfig,
    pub split: SplitJSONConfig,
    pub source_map: SourceMapMode,
    // Worker threads used for module discovery. Defaults to one per core.
    pub concurrency: Option<usize>,
    pub output_dir: String,
}

impl Default for BundlerJSONConfig {
    fn default() -> Self {
        BundlerJSONConfig {
            root: ".".to_string(),
            resolve: ResolverJSONConfig::default(),
            split: SplitJSONConfig::default(),
            source_map: SourceMapMode::default(),
            concurrency: None,
            output_dir: "dist".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine the working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),
    #[error("invalid resolve configuration: {0:#}")]
    Resolve(anyhow::Error),
    #[error("invalid split configuration: {0}")]
    Split(#[from] SplitConfigError),
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
}

/// Configuration for a [crate::Bundler]
#[derive(Debug, Clone)]
pub struct BundlerConfig {
    // absolute and cleaned
    pub root: PathBuf,
    pub resolve: ResolverConfig,
    pub split: SplitConfig,
    pub source_map: SourceMapMode,
    // 0 lets rayon pick
    pub concurrency: usize,
    pub output_dir: PathBuf,
}

impl BundlerConfig {
    /// Default configuration for a project rooted at `root`
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf().clean();
        BundlerConfig {
            output_dir: root.join("dist"),
            root,
            resolve: ResolverConfig::default(),
            split: SplitConfig::default(),
            source_map: SourceMapMode::default(),
            concurrency: 0,
        }
    }
}

impl TryFrom<BundlerJSONConfig> for BundlerConfig {
    type Error = ConfigError;

    fn try_from(value: BundlerJSONConfig) -> Result<Self, Self::Error> {
        let root = PathBuf::from(&value.root);
        let root = if root.is_absolute() {
            root.clean()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::WorkingDirectory)?
                .join(root)
                .clean()
        };
        if value.concurrency == Some(0) {
            return Err(ConfigError::InvalidConcurrency);
        }

        let resolve =
            ResolverConfig::from_json_config(value.resolve, &root).map_err(ConfigError::Resolve)?;
        let split = SplitConfig::try_from(value.split)?;

        Ok(BundlerConfig {
            output_dir: root.join(&value.output_dir).clean(),
            root,
            resolve,
            split,
            source_map: value.source_map,
            concurrency: value.concurrency.unwrap_or(0),
        })
    }
}

/// JSON schema of [BundlerJSONConfig]
pub fn config_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(BundlerJSONConfig)
}
