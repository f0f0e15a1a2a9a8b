use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tsconfig_paths::PathMappings;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mjs", ".js", ".jsx", ".cjs", ".json"];
pub const DEFAULT_CONDITION_NAMES: &[&str] = &["import", "module", "browser", "default"];
pub const DEFAULT_MAIN_FIELDS: &[&str] = &["module", "main"];
pub const DEFAULT_DEPENDENCY_DIR: &str = "node_modules";

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// A JSON serializable proxy for the ResolverConfig struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverJSONConfig {
    // Specifier rewrites, tried in declaration order
    pub alias: IndexMap<String, String>,
    // tsconfig-style path mappings, relative to base_url
    pub paths: BTreeMap<String, Vec<String>>,
    pub base_url: Option<String>,
    // tsconfig.json to load paths/baseUrl from
    pub tsconfig: Option<String>,
    pub extensions: Vec<String>,
    pub condition_names: Vec<String>,
    pub main_fields: Vec<String>,
    pub dependency_dir: String,
    // Extra specifiers treated as runtime-reserved
    pub builtins: Vec<String>,
}

impl Default for ResolverJSONConfig {
    fn default() -> Self {
        ResolverJSONConfig {
            alias: IndexMap::new(),
            paths: BTreeMap::new(),
            base_url: None,
            tsconfig: None,
            extensions: to_strings(DEFAULT_EXTENSIONS),
            condition_names: to_strings(DEFAULT_CONDITION_NAMES),
            main_fields: to_strings(DEFAULT_MAIN_FIELDS),
            dependency_dir: DEFAULT_DEPENDENCY_DIR.to_string(),
            builtins: Vec::new(),
        }
    }
}

/// Configuration for the import resolver
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub alias: Vec<(String, String)>,
    pub path_mappings: Option<PathMappings>,
    // always dot-prefixed, e.g. ".ts"
    pub extensions: Vec<String>,
    pub condition_names: Vec<String>,
    pub main_fields: Vec<String>,
    pub dependency_dir: String,
    pub builtins: BTreeSet<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            alias: Vec::new(),
            path_mappings: None,
            extensions: to_strings(DEFAULT_EXTENSIONS),
            condition_names: to_strings(DEFAULT_CONDITION_NAMES),
            main_fields: to_strings(DEFAULT_MAIN_FIELDS),
            dependency_dir: DEFAULT_DEPENDENCY_DIR.to_string(),
            builtins: BTreeSet::new(),
        }
    }
}

impl ResolverConfig {
    /// Processes the JSON config. Relative `baseUrl` and `tsconfig` paths
    /// are resolved against `root`.
    ///
    /// Explicit `paths` take precedence over those loaded from `tsconfig`.
    pub fn from_json_config(value: ResolverJSONConfig, root: &Path) -> Result<Self> {
        let path_mappings = if !value.paths.is_empty() {
            let base_url = root.join(value.base_url.as_deref().unwrap_or("."));
            Some(
                PathMappings::new(base_url, value.paths)
                    .context("invalid resolve.paths configuration")?,
            )
        } else if let Some(tsconfig) = &value.tsconfig {
            let tsconfig_path = root.join(tsconfig);
            PathMappings::from_tsconfig(&tsconfig_path)
                .with_context(|| format!("failed to load {}", tsconfig_path.display()))?
        } else {
            None
        };

        let extensions = value
            .extensions
            .into_iter()
            .map(|ext| {
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();

        Ok(ResolverConfig {
            alias: value.alias.into_iter().collect(),
            path_mappings,
            extensions,
            condition_names: value.condition_names,
            main_fields: value.main_fields,
            dependency_dir: value.dependency_dir,
            builtins: value.builtins.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_from_empty_json() {
        let json: ResolverJSONConfig = serde_json::from_str("{}").unwrap();
        let config = ResolverConfig::from_json_config(json, Path::new("/repo")).unwrap();
        assert_eq!(config, ResolverConfig::default());
    }

    #[test]
    fn test_alias_order_and_extension_normalization() {
        let json: ResolverJSONConfig = serde_json::from_str(
            r#"{
                "alias": { "zeta": "./z", "alpha": "./a" },
                "extensions": ["ts", ".js"],
                "paths": { "@/*": ["src/*"] },
                "baseUrl": "."
            }"#,
        )
        .unwrap();
        let config = ResolverConfig::from_json_config(json, Path::new("/repo")).unwrap();
        assert_eq!(
            config.alias,
            vec![
                ("zeta".to_string(), "./z".to_string()),
                ("alpha".to_string(), "./a".to_string())
            ]
        );
        assert_eq!(config.extensions, vec![".ts".to_string(), ".js".to_string()]);
        assert_eq!(
            config.path_mappings.unwrap().candidates("@/util"),
            vec![PathBuf::from("/repo/src/util")]
        );
    }

    #[test]
    fn test_missing_tsconfig_is_an_error() {
        let json = ResolverJSONConfig {
            tsconfig: Some("does-not-exist/tsconfig.json".to_string()),
            ..Default::default()
        };
        assert!(ResolverConfig::from_json_config(json, Path::new("/repo")).is_err());
    }
}
