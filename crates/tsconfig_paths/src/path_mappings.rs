use std::path::{Path, PathBuf};

use path_clean::PathClean;
use tracing::trace;

use crate::{error::OpenTsConfigError, tsconfig_paths_json::TsconfigPathsJson};

/// Left-hand side of a `paths` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Wildcard {
        prefix: String,
        suffix: String,
    },
    /// No wildcard.
    Exact(String),
}

impl Pattern {
    pub fn parse(from: &str) -> Result<Self, OpenTsConfigError> {
        match from.split_once('*') {
            Some((prefix, suffix)) => {
                if suffix.contains('*') {
                    return Err(OpenTsConfigError::InvalidPaths {
                        pattern: from.to_string(),
                        reason: "patterns may contain at most one wildcard".to_string(),
                    });
                }
                Ok(Pattern::Wildcard {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            None => Ok(Pattern::Exact(from.to_string())),
        }
    }

    /// Returns the text captured by the wildcard, or "" for an exact match.
    pub fn match_specifier<'a>(&self, specifier: &'a str) -> Option<&'a str> {
        match self {
            Pattern::Exact(exact) => (exact == specifier).then_some(""),
            Pattern::Wildcard { prefix, suffix } => {
                if specifier.len() < prefix.len() + suffix.len() {
                    return None;
                }
                specifier.strip_prefix(prefix.as_str())?.strip_suffix(suffix.as_str())
            }
        }
    }

    fn prefix_len(&self) -> usize {
        match self {
            Pattern::Exact(exact) => exact.len(),
            Pattern::Wildcard { prefix, .. } => prefix.len(),
        }
    }
}

/// Processed `baseUrl` + `paths` mappings.
///
/// Exact patterns come before wildcard patterns, and wildcard patterns are
/// ordered by longest prefix first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathMappings {
    base_url: PathBuf,
    paths: Vec<(Pattern, Vec<String>)>,
}

impl PathMappings {
    pub fn new(
        base_url: impl Into<PathBuf>,
        paths: impl IntoIterator<Item = (String, Vec<String>)>,
    ) -> Result<Self, OpenTsConfigError> {
        let mut parsed = paths
            .into_iter()
            .map(|(from, to)| {
                if to.is_empty() {
                    return Err(OpenTsConfigError::InvalidPaths {
                        pattern: from,
                        reason: "value should not be an empty array".to_string(),
                    });
                }
                Ok((Pattern::parse(&from)?, to))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // stable, so declaration order breaks ties
        parsed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Pattern::Exact(_), Pattern::Wildcard { .. }) => std::cmp::Ordering::Less,
            (Pattern::Wildcard { .. }, Pattern::Exact(_)) => std::cmp::Ordering::Greater,
            (Pattern::Exact(_), Pattern::Exact(_)) => std::cmp::Ordering::Equal,
            _ => b.prefix_len().cmp(&a.prefix_len()),
        });

        Ok(PathMappings {
            base_url: base_url.into().clean(),
            paths: parsed,
        })
    }

    /// Loads the path mappings of a tsconfig.json file.
    ///
    /// Returns Ok(None) when the file declares no `paths`. A missing
    /// `baseUrl` resolves targets relative to the tsconfig's directory.
    pub fn from_tsconfig(tsconfig_path: &Path) -> Result<Option<Self>, OpenTsConfigError> {
        let tsconfig = TsconfigPathsJson::from_path(tsconfig_path)?;
        let options = tsconfig.compiler_options;
        if options.paths.is_empty() {
            return Ok(None);
        }
        let config_dir = tsconfig_path.parent().unwrap_or_else(|| Path::new("."));
        let base_url = match options.base_url {
            Some(url) => config_dir.join(url),
            None => config_dir.to_path_buf(),
        };
        PathMappings::new(base_url, options.paths).map(Some)
    }

    pub fn base_url(&self) -> &Path {
        &self.base_url
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &(Pattern, Vec<String>)> {
        self.paths.iter()
    }

    /// Candidate file paths for a specifier, in priority order.
    ///
    /// Callers try each candidate with file resolution and take the first
    /// that exists.
    pub fn candidates(&self, specifier: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for (pattern, targets) in self.paths.iter() {
            let Some(captured) = pattern.match_specifier(specifier) else {
                continue;
            };
            trace!("path mapping {:?} matched {}", pattern, specifier);
            for target in targets {
                let substituted = match pattern {
                    Pattern::Wildcard { .. } => target.replacen('*', captured, 1),
                    Pattern::Exact(_) => target.clone(),
                };
                out.push(self.base_url.join(substituted).clean());
            }
        }
        out
    }
}
