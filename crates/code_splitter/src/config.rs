use std::fmt;
use std::sync::Arc;

use module_graph::ModuleInfo;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMON_CHUNK_NAME: &str = "common";
pub const DEFAULT_VENDOR_CHUNK_NAME: &str = "vendors";

/// A JSON serializable proxy for the SplitConfig struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitJSONConfig {
    // Minimum total size of modules moved into the common chunk
    pub min_size: u64,
    // Chunks above this size are split
    pub max_size: Option<u64>,
    // Minimum number of chunks a module must appear in to become common
    pub min_chunks: usize,
    pub common_chunk_name: String,
    pub vendor_chunk_name: String,
    pub extract_vendors: bool,
    pub dependency_dir: String,
    pub cache_groups: Vec<CacheGroupJSONConfig>,
}

impl Default for SplitJSONConfig {
    fn default() -> Self {
        SplitJSONConfig {
            min_size: 0,
            max_size: None,
            min_chunks: 2,
            common_chunk_name: DEFAULT_COMMON_CHUNK_NAME.to_string(),
            vendor_chunk_name: DEFAULT_VENDOR_CHUNK_NAME.to_string(),
            extract_vendors: true,
            dependency_dir: "node_modules".to_string(),
            cache_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheGroupJSONConfig {
    pub name: String,
    // glob over the module's slash path
    pub test: Option<String>,
    pub test_regex: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub reuse_existing_chunk: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SplitConfigError {
    #[error("cache group `{group}` has an invalid glob: {source}")]
    InvalidGlob {
        group: String,
        source: glob::PatternError,
    },
    #[error("cache group `{group}` has an invalid regex: {source}")]
    InvalidRegex { group: String, source: regex::Error },
    #[error("cache group `{0}` must set exactly one of `test` or `testRegex`")]
    AmbiguousTest(String),
    #[error("minChunks must be at least 1")]
    InvalidMinChunks,
    #[error("maxSize must be greater than 0")]
    InvalidMaxSize,
}

pub type ModulePredicate = Arc<dyn Fn(&ModuleInfo) -> bool + Send + Sync>;

/// How a cache group selects modules
#[derive(Clone)]
pub enum CacheGroupTest {
    Glob(glob::Pattern),
    Regex(regex::Regex),
    Predicate(ModulePredicate),
}

impl fmt::Debug for CacheGroupTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheGroupTest::Glob(p) => write!(f, "Glob({})", p.as_str()),
            CacheGroupTest::Regex(r) => write!(f, "Regex({})", r.as_str()),
            CacheGroupTest::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

impl CacheGroupTest {
    pub fn matches(&self, module: &ModuleInfo) -> bool {
        match self {
            CacheGroupTest::Glob(pattern) => pattern.matches(&module.id),
            CacheGroupTest::Regex(regex) => regex.is_match(&module.id),
            CacheGroupTest::Predicate(predicate) => predicate(module),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheGroup {
    pub name: String,
    pub test: CacheGroupTest,
    pub priority: i32,
    // true duplicates matched modules instead of moving them
    pub reuse_existing_chunk: bool,
}

/// Configuration for the code splitter
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub min_size: u64,
    pub max_size: Option<u64>,
    pub min_chunks: usize,
    pub common_chunk_name: String,
    pub vendor_chunk_name: String,
    pub extract_vendors: bool,
    pub dependency_dir: String,
    pub cache_groups: Vec<CacheGroup>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        let defaults = SplitJSONConfig::default();
        SplitConfig {
            min_size: defaults.min_size,
            max_size: defaults.max_size,
            min_chunks: defaults.min_chunks,
            common_chunk_name: defaults.common_chunk_name,
            vendor_chunk_name: defaults.vendor_chunk_name,
            extract_vendors: defaults.extract_vendors,
            dependency_dir: defaults.dependency_dir,
            cache_groups: Vec::new(),
        }
    }
}

impl TryFrom<CacheGroupJSONConfig> for CacheGroup {
    type Error = SplitConfigError;

    fn try_from(value: CacheGroupJSONConfig) -> Result<Self, Self::Error> {
        let test = match (value.test, value.test_regex) {
            (Some(glob), None) => CacheGroupTest::Glob(glob::Pattern::new(&glob).map_err(
                |source| SplitConfigError::InvalidGlob {
                    group: value.name.clone(),
                    source,
                },
            )?),
            (None, Some(regex)) => CacheGroupTest::Regex(regex::Regex::new(&regex).map_err(
                |source| SplitConfigError::InvalidRegex {
                    group: value.name.clone(),
                    source,
                },
            )?),
            _ => return Err(SplitConfigError::AmbiguousTest(value.name)),
        };
        Ok(CacheGroup {
            name: value.name,
            test,
            priority: value.priority,
            reuse_existing_chunk: value.reuse_existing_chunk,
        })
    }
}

impl TryFrom<SplitJSONConfig> for SplitConfig {
    type Error = SplitConfigError;

    fn try_from(value: SplitJSONConfig) -> Result<Self, Self::Error> {
        if value.min_chunks == 0 {
            return Err(SplitConfigError::InvalidMinChunks);
        }
        if value.max_size == Some(0) {
            return Err(SplitConfigError::InvalidMaxSize);
        }
        let cache_groups = value
            .cache_groups
            .into_iter()
            .map(CacheGroup::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SplitConfig {
            min_size: value.min_size,
            max_size: value.max_size,
            min_chunks: value.min_chunks,
            common_chunk_name: value.common_chunk_name,
            vendor_chunk_name: value.vendor_chunk_name,
            extract_vendors: value.extract_vendors,
            dependency_dir: value.dependency_dir,
            cache_groups,
        })
    }
}
