/// Implements the "exports" map for a package.json file.
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use path_clean::PathClean;
use path_slash::PathBufExt;

use packagejson::{exported_path::ExportedPath, PackageJsonExport, PackageJsonExports};

// Struct that performs the "export" field remapping from package.json
//
// This holds derived data from the "exports" field in a package.json file, and
// is computed with PackageExportRewriteData::try_from(&PackageJsonExports)
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PackageExportRewriteData {
    // Literal subpaths, e.g. "./feature" => <target>
    static_exports: Vec<(String, PackageJsonExport)>,

    // Deprecated node 14.x directory subpaths, e.g. "./utils/" => <target>
    // Sorted longest-first so the most specific directory wins
    directory_exports: Vec<(String, PackageJsonExport)>,

    // Single-star subpath patterns, e.g. "./features/*.js" => <target>
    // Sorted by longest prefix first
    star_exports: Vec<(String, PackageJsonExport)>,
}

fn clean_path(p: &str) -> String {
    if p == "." {
        return p.to_string();
    }
    let trailing_slash = p.ends_with('/');
    let mut cleaned = String::from("./");
    cleaned.push_str(&PathBuf::from_slash(p.trim_start_matches("./")).clean().to_slash_lossy());
    if trailing_slash && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

fn match_star_pattern<'a>(
    // The exports key containing a single "*"
    star_pattern: &str,
    // The import specifier to match. Must already be cleaned!
    relative_import_specifier: &'a str,
) -> Option<&'a str> {
    let (prefix, star_suffix) = star_pattern.split_once('*')?;

    if let Some(remainder) = relative_import_specifier.strip_prefix(prefix) {
        // the pattern ends with the first star, so we don't need to do a suffix match.
        if star_suffix.is_empty() {
            return Some(remainder);
        } else if let Some(star_match) = remainder.strip_suffix(star_suffix) {
            return Some(star_match);
        }
    }

    None
}

/// The result of evaluating an exports target against a condition list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedExport {
    /// the rewritten path. Private if the subpath is explicitly not exported.
    pub rewritten_export: ExportedPath,
    /// the innermost condition that selected the target, if any
    pub export_condition: Option<String>,
}

/// Evaluates a (possibly nested) export target against the requested
/// conditions. Requested conditions are tried in order; "default" is always
/// tried last. A nested object that matches nothing falls through to the
/// next requested condition.
pub fn resolve_export_target<S: AsRef<str>>(
    target: &PackageJsonExport,
    requested_conditions: &[S],
) -> Option<MatchedExport> {
    match target {
        PackageJsonExport::Single(path) => Some(MatchedExport {
            rewritten_export: path.clone(),
            export_condition: None,
        }),
        PackageJsonExport::Conditional(conditions) => {
            let requested = requested_conditions
                .iter()
                .map(|c| c.as_ref())
                .filter(|c| *c != "default")
                .chain(std::iter::once("default"));
            for condition in requested {
                let Some(nested) = conditions.get(condition) else {
                    continue;
                };
                if let Some(mut matched) = resolve_export_target(nested, requested_conditions) {
                    matched.export_condition.get_or_insert_with(|| condition.to_string());
                    return Some(matched);
                }
            }
            None
        }
        PackageJsonExport::Fallbacks(targets) => {
            let mut private = None;
            for candidate in targets {
                match resolve_export_target(candidate, requested_conditions) {
                    Some(
                        matched @ MatchedExport {
                            rewritten_export: ExportedPath::Exported(_),
                            ..
                        },
                    ) => return Some(matched),
                    Some(matched) => {
                        private.get_or_insert(matched);
                    }
                    None => {}
                }
            }
            private
        }
    }
}

impl PackageExportRewriteData {
    // Rewrites a package-relative import (e.g. "./feature") to a
    // package-relative file path using only the "exports" field.
    pub fn rewrite_relative_export<S: AsRef<str>>(
        &self,
        relative_import: &str,
        requested_conditions: &[S],
    ) -> Option<MatchedExport> {
        let clean_relative_import = clean_path(relative_import);

        // literal matches take precedence over any pattern
        if let Some((_, target)) = self
            .static_exports
            .iter()
            .find(|(key, _)| *key == clean_relative_import)
        {
            return resolve_export_target(target, requested_conditions);
        }

        for (star_pattern, target) in self.star_exports.iter() {
            let Some(star_match) = match_star_pattern(star_pattern, &clean_relative_import) else {
                continue;
            };
            let matched = resolve_export_target(target, requested_conditions)?;
            return Some(MatchedExport {
                rewritten_export: matched
                    .rewritten_export
                    .map_export(|v| v.replace('*', star_match)),
                export_condition: matched.export_condition,
            });
        }

        for (directory_pattern, target) in self.directory_exports.iter() {
            let Some(remainder) = clean_relative_import.strip_prefix(directory_pattern.as_str())
            else {
                continue;
            };
            let matched = resolve_export_target(target, requested_conditions)?;
            return Some(MatchedExport {
                rewritten_export: matched.rewritten_export.map_export(|v| {
                    let mut out = String::with_capacity(v.len() + remainder.len());
                    out.push_str(v);
                    out.push_str(remainder);
                    out
                }),
                export_condition: matched.export_condition,
            });
        }

        None
    }
}

impl TryFrom<&PackageJsonExports> for PackageExportRewriteData {
    type Error = anyhow::Error;

    fn try_from(exports_map: &PackageJsonExports) -> Result<Self> {
        let mut resolution_data = PackageExportRewriteData::default();
        for (export_path, exported) in exports_map.iter() {
            if !export_path.starts_with("./") && export_path != "." {
                return Err(anyhow!(
                    "package.json exports fields must either be '.' or start with './'"
                ));
            }

            let export_path_star_ct = export_path.chars().filter(|c| *c == '*').count();
            if export_path_star_ct == 1 {
                resolution_data
                    .star_exports
                    .push((clean_path(export_path), exported.clone()));
            } else if export_path_star_ct > 1 {
                return Err(anyhow!(
                    "Invalid star pattern '{}' in package.json exports field: \
                            Star patterns may contain at most a single star match.",
                    export_path
                ));
            } else if export_path.ends_with('/') {
                resolution_data
                    .directory_exports
                    .push((clean_path(export_path), exported.clone()));
            } else {
                resolution_data
                    .static_exports
                    .push((clean_path(export_path), exported.clone()));
            }
        }

        // most specific patterns first
        resolution_data.star_exports.sort_by(|(a, _), (b, _)| {
            let a_prefix = a.split_once('*').map_or(a.len(), |(p, _)| p.len());
            let b_prefix = b.split_once('*').map_or(b.len(), |(p, _)| p.len());
            b_prefix.cmp(&a_prefix).then(b.len().cmp(&a.len())).then(a.cmp(b))
        });
        resolution_data
            .directory_exports
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then(a.cmp(b)));

        Ok(resolution_data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEFAULT_CONDITIONS: &[&str] = &["import", "module", "default"];

    fn rewrite_data(exports: &str) -> PackageExportRewriteData {
        let value: serde_json::Value = serde_json::from_str(exports).unwrap();
        let exports = PackageJsonExports::try_from(&value).unwrap();
        PackageExportRewriteData::try_from(&exports).unwrap()
    }

    fn rewrite(data: &PackageExportRewriteData, import: &str, conditions: &[&str]) -> Option<String> {
        data.rewrite_relative_export(import, conditions)
            .map(|m| match m.rewritten_export {
                ExportedPath::Exported(p) => p,
                ExportedPath::Private => "<private>".to_string(),
            })
    }

    #[test]
    fn test_unconditional_literal_export() {
        let data = rewrite_data(r#"{ ".": "./index.ts" }"#);
        assert_eq!(rewrite(&data, ".", DEFAULT_CONDITIONS), Some("./index.ts".to_string()));
        assert_eq!(rewrite(&data, "./foo", DEFAULT_CONDITIONS), None);
    }

    #[test]
    fn test_first_requested_condition_wins() {
        let data = rewrite_data(
            r#"{
                ".": {
                    "require": "./index.cjs",
                    "import": "./index.mjs",
                    "default": "./index.js"
                }
            }"#,
        );
        assert_eq!(rewrite(&data, ".", &["require", "import"]), Some("./index.cjs".to_string()));
        assert_eq!(rewrite(&data, ".", &["import", "require"]), Some("./index.mjs".to_string()));
        assert_eq!(rewrite(&data, ".", &["browser"]), Some("./index.js".to_string()));
    }

    #[test]
    fn test_nested_conditions_fall_through() {
        let data = rewrite_data(
            r#"{
                ".": {
                    "node": { "import": "./node.mjs" },
                    "default": "./browser.js"
                }
            }"#,
        );
        // "node" matches, but nothing inside it does, so "default" is used
        assert_eq!(rewrite(&data, ".", &["node", "require"]), Some("./browser.js".to_string()));
        let matched = data.rewrite_relative_export(".", &["node", "import"]).unwrap();
        assert_eq!(matched.rewritten_export, ExportedPath::Exported("./node.mjs".to_string()));
        assert_eq!(matched.export_condition.as_deref(), Some("import"));
    }

    #[test]
    fn test_null_target_is_private() {
        let data = rewrite_data(
            r#"{
                "./*": "./src/*.js",
                "./internal/*": null
            }"#,
        );
        assert_eq!(rewrite(&data, "./feature", DEFAULT_CONDITIONS), Some("./src/feature.js".to_string()));
        assert_eq!(rewrite(&data, "./internal/secret", DEFAULT_CONDITIONS), Some("<private>".to_string()));
    }

    #[test]
    fn test_star_pattern_with_suffix() {
        let data = rewrite_data(
            r#"{
                "./*dex": {
                    "import": "./_*dex.ts",
                    "default": "./dex_*.ts"
                }
            }"#,
        );
        assert_eq!(rewrite(&data, "./index", &["import"]), Some("./_index.ts".to_string()));
        assert_eq!(rewrite(&data, "./index", &["require"]), Some("./dex_in.ts".to_string()));
        assert_eq!(rewrite(&data, "./other", &["import"]), None);
    }

    #[test]
    fn test_directory_export() {
        let data = rewrite_data(
            r#"{
                "./foo/": {
                    "import": "./src/foo_esm/",
                    "default": "./src/foo_cjs/"
                }
            }"#,
        );
        assert_eq!(rewrite(&data, "./foo/bar.js", &["import"]), Some("./src/foo_esm/bar.js".to_string()));
        assert_eq!(rewrite(&data, "./foo/bar.js", &[] as &[&str]), Some("./src/foo_cjs/bar.js".to_string()));
    }

    #[test]
    fn test_array_fallbacks() {
        let data = rewrite_data(r#"{ ".": [{ "worker": "./worker.js" }, "./index.js"] }"#);
        assert_eq!(rewrite(&data, ".", &["import"]), Some("./index.js".to_string()));
        assert_eq!(rewrite(&data, ".", &["worker"]), Some("./worker.js".to_string()));
    }

    #[test]
    fn test_multi_star_is_rejected() {
        let value: serde_json::Value = serde_json::from_str(r#"{ "./*/*": "./a/*/*" }"#).unwrap();
        let exports = PackageJsonExports::try_from(&value).unwrap();
        assert!(PackageExportRewriteData::try_from(&exports).is_err());
    }
}
