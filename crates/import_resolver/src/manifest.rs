use std::path::{Path, PathBuf};

use anyhow::Result;
use packagejson::{PackageJson, SideEffects};
use packagejson_exports::PackageExportRewriteData;
use path_utils::relative_slash_path;
use tracing::debug;

use crate::resolver::ModuleKind;

/// A parsed package.json along with the data derived from it for resolution.
#[derive(Debug)]
pub struct PackageManifest {
    dir: PathBuf,
    json: PackageJson,
    exports: Option<PackageExportRewriteData>,
    side_effect_globs: Option<Vec<glob::Pattern>>,
}

impl PackageManifest {
    /// Reads `<dir>/package.json`.
    ///
    /// Returns None both when the file is absent and when it is malformed;
    /// malformed manifests are treated as if they did not exist.
    pub fn read_from_dir(dir: &Path) -> Option<Self> {
        let manifest_path = dir.join("package.json");
        if !manifest_path.is_file() {
            return None;
        }
        match Self::from_json(dir, PackageJson::read(&manifest_path)) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                debug!("ignoring malformed manifest {}: {:#}", manifest_path.display(), e);
                None
            }
        }
    }

    fn from_json(dir: &Path, json: Result<PackageJson>) -> Result<Self> {
        let json = json?;
        let exports = json
            .exports
            .as_ref()
            .map(PackageExportRewriteData::try_from)
            .transpose()?;
        let side_effect_globs = match &json.side_effects {
            Some(SideEffects::Patterns(patterns)) => Some(
                patterns
                    .iter()
                    .map(|p| {
                        let p = p.trim_start_matches("./");
                        // bare file patterns match at any depth
                        if p.contains('/') {
                            glob::Pattern::new(p)
                        } else {
                            glob::Pattern::new(&format!("**/{}", p))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => None,
        };

        Ok(PackageManifest {
            dir: dir.to_path_buf(),
            json,
            exports,
            side_effect_globs,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn json(&self) -> &PackageJson {
        &self.json
    }

    pub fn exports(&self) -> Option<&PackageExportRewriteData> {
        self.exports.as_ref()
    }

    /// Whether a file owned by this package may have side effects.
    pub fn has_side_effects(&self, file: &Path) -> bool {
        match &self.json.side_effects {
            None | Some(SideEffects::Bool(true)) => true,
            Some(SideEffects::Bool(false)) => false,
            Some(SideEffects::Patterns(_)) => {
                let Some(relative) = relative_slash_path(file, &self.dir) else {
                    return true;
                };
                self.side_effect_globs
                    .iter()
                    .flatten()
                    .any(|glob| glob.matches(&relative))
            }
        }
    }

    pub fn module_kind(&self) -> Option<ModuleKind> {
        match self.json.module_type.as_deref() {
            Some("module") => Some(ModuleKind::Module),
            Some("commonjs") => Some(ModuleKind::CommonJs),
            _ => None,
        }
    }
}
