use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use packagejson::exported_path::ExportedPath;
use path_clean::PathClean;
use path_utils::{extension_of, to_slash_string};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn, Level};

use crate::builtins::{has_protocol, is_core_module};
use crate::config::ResolverConfig;
use crate::manifest::PackageManifest;
use crate::pkgname::{package_name, split_package_import};

/// Maximum number of alias rewrites applied to a single specifier.
pub const MAX_ALIAS_DEPTH: usize = 32;

/// Module format of a resolved file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleKind {
    Module,
    CommonJs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResult {
    /// Absolute slash-separated file path, or the raw specifier if external
    pub path: String,
    pub external: bool,
    pub side_effects: bool,
    pub module_kind: Option<ModuleKind>,
}

impl ResolveResult {
    pub fn external(specifier: &str) -> Self {
        ResolveResult {
            path: specifier.to_string(),
            external: true,
            side_effects: true,
            module_kind: None,
        }
    }
}

type ResolutionKey = (String, String);

#[derive(Debug, Default)]
struct ResolverCaches {
    // (specifier, importer) => resolution, None meaning not found
    resolutions: DashMap<ResolutionKey, Option<ResolveResult>>,
    // directory => manifest, None meaning no (valid) package.json
    manifests: DashMap<PathBuf, Option<Arc<PackageManifest>>>,
}

impl ResolverCaches {
    fn clear(&self) {
        self.resolutions.clear();
        self.manifests.clear();
    }

    fn merge_into(self, other: &ResolverCaches) {
        for (key, value) in self.resolutions.into_iter() {
            other.resolutions.entry(key).or_insert(value);
        }
        for (key, value) in self.manifests.into_iter() {
            other.manifests.entry(key).or_insert(value);
        }
    }
}

/// Resolves import specifiers to files on disk.
///
/// Safe to share between threads. Results are cached until
/// [Resolver::clear_cache] is called.
#[derive(Debug)]
pub struct Resolver {
    config: ResolverConfig,
    caches: ResolverCaches,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Resolver {
            config,
            caches: ResolverCaches::default(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves `specifier` as written in the file `importer`.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Option<ResolveResult> {
        self.context(None).resolve(specifier, importer)
    }

    /// Resolves `specifier` relative to a directory, e.g. for entry points.
    pub fn resolve_from_dir(&self, specifier: &str, dir: &Path) -> Option<ResolveResult> {
        self.context(None).resolve_from_dir(specifier, dir)
    }

    /// Starts a session whose new cache entries are staged until
    /// [ResolverSession::commit].
    pub fn session(&self) -> ResolverSession<'_> {
        ResolverSession {
            resolver: self,
            staged: ResolverCaches::default(),
        }
    }

    pub fn clear_cache(&self) {
        self.caches.clear();
    }

    pub fn cached_resolution_count(&self) -> usize {
        self.caches.resolutions.len()
    }

    fn context<'a>(&'a self, staged: Option<&'a ResolverCaches>) -> ResolveContext<'a> {
        ResolveContext {
            config: &self.config,
            committed: &self.caches,
            staged,
        }
    }
}

/// Resolution scoped to a single build.
pub struct ResolverSession<'a> {
    resolver: &'a Resolver,
    staged: ResolverCaches,
}

impl<'a> ResolverSession<'a> {
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Option<ResolveResult> {
        self.resolver
            .context(Some(&self.staged))
            .resolve(specifier, importer)
    }

    pub fn resolve_from_dir(&self, specifier: &str, dir: &Path) -> Option<ResolveResult> {
        self.resolver
            .context(Some(&self.staged))
            .resolve_from_dir(specifier, dir)
    }

    pub fn staged_resolution_count(&self) -> usize {
        self.staged.resolutions.len()
    }

    /// Merges staged entries into the resolver's long-lived caches.
    pub fn commit(self) {
        self.staged.merge_into(&self.resolver.caches);
    }

    /// Drops staged entries. Equivalent to dropping the session.
    pub fn discard(self) {}
}

struct ResolveContext<'a> {
    config: &'a ResolverConfig,
    committed: &'a ResolverCaches,
    // new entries go here when present, otherwise straight to `committed`
    staged: Option<&'a ResolverCaches>,
}

impl<'a> ResolveContext<'a> {
    fn target_caches(&self) -> &'a ResolverCaches {
        self.staged.unwrap_or(self.committed)
    }

    fn resolve(&self, specifier: &str, importer: &Path) -> Option<ResolveResult> {
        let base_dir = importer.parent().unwrap_or(importer);
        self.resolve_cached((specifier.to_string(), to_slash_string(importer)), specifier, base_dir)
    }

    fn resolve_from_dir(&self, specifier: &str, dir: &Path) -> Option<ResolveResult> {
        let mut key_path = to_slash_string(dir);
        key_path.push('/');
        self.resolve_cached((specifier.to_string(), key_path), specifier, dir)
    }

    fn resolve_cached(
        &self,
        key: ResolutionKey,
        specifier: &str,
        base_dir: &Path,
    ) -> Option<ResolveResult> {
        if let Some(hit) = self.committed.resolutions.get(&key) {
            return hit.value().clone();
        }
        let target = self.target_caches();
        if let Some(hit) = target.resolutions.get(&key) {
            return hit.value().clone();
        }

        let _tracing = if cfg!(debug_assertions) {
            Some(
                tracing::span!(
                    Level::DEBUG,
                    "resolve",
                    specifier = tracing::field::display(specifier),
                    base_dir = tracing::field::display(base_dir.display())
                )
                .entered(),
            )
        } else {
            None
        };

        let resolved = self.resolve_uncached(specifier, base_dir, 0);
        debug!("resolved {} from {} to {:?}", specifier, base_dir.display(), resolved);
        // another thread may have raced us; keep whichever landed first
        target
            .resolutions
            .entry(key)
            .or_insert(resolved)
            .value()
            .clone()
    }

    fn resolve_uncached(
        &self,
        specifier: &str,
        base_dir: &Path,
        alias_depth: usize,
    ) -> Option<ResolveResult> {
        // 1. runtime builtins and protocol specifiers
        if self.is_builtin(specifier) {
            trace!("{} is a builtin", specifier);
            return Some(ResolveResult::external(specifier));
        }

        // 2. aliases
        if let Some(rewritten) = self.apply_alias(specifier) {
            if alias_depth >= MAX_ALIAS_DEPTH {
                warn!(
                    "alias chain for {} exceeded {} rewrites, treating it as unresolved",
                    specifier, MAX_ALIAS_DEPTH
                );
                return None;
            }
            trace!("alias {} -> {}", specifier, rewritten);
            return self.resolve_uncached(&rewritten, base_dir, alias_depth + 1);
        }

        let is_path_like = specifier.starts_with('.')
            || specifier.starts_with('/')
            || Path::new(specifier).is_absolute();

        // 3. path mappings
        if !is_path_like {
            if let Some(mappings) = &self.config.path_mappings {
                for candidate in mappings.candidates(specifier) {
                    if let Some(file) = self.resolve_file(&candidate) {
                        return Some(self.file_result(&file));
                    }
                }
            }
        }

        // 4. relative and absolute paths
        if is_path_like {
            let joined = base_dir.join(specifier).clean();
            return self.resolve_file(&joined).map(|f| self.file_result(&f));
        }

        // 5. packages
        let (package, subpath) = split_package_import(specifier)?;
        for dir in base_dir.ancestors() {
            let package_dir = dir.join(&self.config.dependency_dir).join(package);
            if !package_dir.is_dir() {
                continue;
            }
            trace!("probing package dir {}", package_dir.display());
            match self.resolve_in_package(&package_dir, subpath) {
                PackageResolution::Found(file) => return Some(self.file_result(&file)),
                PackageResolution::Private => {
                    debug!("{} is not exported by {}", specifier, package_dir.display());
                    return None;
                }
                PackageResolution::NotFound => continue,
            }
        }

        None
    }

    fn is_builtin(&self, specifier: &str) -> bool {
        if is_core_module(specifier) || has_protocol(specifier) {
            return true;
        }
        self.config.builtins.contains(specifier)
            || package_name(specifier).is_some_and(|name| self.config.builtins.contains(name))
    }

    fn apply_alias(&self, specifier: &str) -> Option<String> {
        for (from, to) in self.config.alias.iter() {
            if specifier == from {
                return Some(to.clone());
            }
            if let Some(rest) = specifier.strip_prefix(from.as_str()) {
                if rest.starts_with('/') {
                    let mut rewritten = String::with_capacity(to.len() + rest.len());
                    rewritten.push_str(to);
                    rewritten.push_str(rest);
                    return Some(rewritten);
                }
            }
        }
        None
    }

    fn resolve_in_package(&self, package_dir: &Path, subpath: Option<&str>) -> PackageResolution {
        let manifest = self.manifest(package_dir);

        if let Some(exports) = manifest.as_ref().and_then(|m| m.exports()) {
            let relative_import = match subpath {
                Some(subpath) => format!("./{}", subpath),
                None => ".".to_string(),
            };
            if let Some(matched) =
                exports.rewrite_relative_export(&relative_import, &self.config.condition_names)
            {
                return match matched.rewritten_export {
                    ExportedPath::Private => PackageResolution::Private,
                    ExportedPath::Exported(target) => {
                        match self.resolve_file(&package_dir.join(target).clean()) {
                            Some(file) => PackageResolution::Found(file),
                            None => PackageResolution::NotFound,
                        }
                    }
                };
            }
        }

        let found = match subpath {
            None => self
                .resolve_main_fields(package_dir, manifest.as_deref())
                .or_else(|| self.resolve_index(package_dir)),
            Some(subpath) => self.resolve_file(&package_dir.join(subpath).clean()),
        };
        match found {
            Some(file) => PackageResolution::Found(file),
            None => PackageResolution::NotFound,
        }
    }

    /// exact file, then file + each extension, then the directory's index,
    /// then the directory's manifest
    fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        self.resolve_as_file(path).or_else(|| {
            if path.is_dir() {
                self.resolve_index(path).or_else(|| {
                    let manifest = self.manifest(path);
                    self.resolve_main_fields(path, manifest.as_deref())
                })
            } else {
                None
            }
        })
    }

    fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if cfg!(debug_assertions) {
            trace!("resolve_as_file({})", path.display());
        }
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        let file_name = path.file_name()?.to_string_lossy();
        for ext in self.config.extensions.iter() {
            let candidate = path.with_file_name(format!("{}{}", file_name, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.config
            .extensions
            .iter()
            .map(|ext| dir.join(format!("index{}", ext)))
            .find(|candidate| candidate.is_file())
    }

    fn resolve_main_fields(&self, dir: &Path, manifest: Option<&PackageManifest>) -> Option<PathBuf> {
        let manifest = manifest?;
        for field in self.config.main_fields.iter() {
            let Some(main) = manifest.json().main_field(field) else {
                continue;
            };
            let target = dir.join(main).clean();
            if target == dir {
                continue;
            }
            if let Some(file) = self
                .resolve_as_file(&target)
                .or_else(|| self.resolve_index(&target))
            {
                return Some(file);
            }
        }
        None
    }

    fn manifest(&self, dir: &Path) -> Option<Arc<PackageManifest>> {
        if let Some(hit) = self.committed.manifests.get(dir) {
            return hit.value().clone();
        }
        let target = self.target_caches();
        if let Some(hit) = target.manifests.get(dir) {
            return hit.value().clone();
        }
        let loaded = PackageManifest::read_from_dir(dir).map(Arc::new);
        target
            .manifests
            .entry(dir.to_path_buf())
            .or_insert(loaded)
            .value()
            .clone()
    }

    fn nearest_manifest(&self, file: &Path) -> Option<Arc<PackageManifest>> {
        file.parent()?.ancestors().find_map(|dir| self.manifest(dir))
    }

    fn file_result(&self, file: &Path) -> ResolveResult {
        let manifest = self.nearest_manifest(file);
        let module_kind = match extension_of(file).as_deref() {
            Some("mjs") | Some("mts") => Some(ModuleKind::Module),
            Some("cjs") | Some("cts") => Some(ModuleKind::CommonJs),
            _ => manifest.as_ref().and_then(|m| m.module_kind()),
        };
        ResolveResult {
            path: to_slash_string(file),
            external: false,
            side_effects: manifest.map_or(true, |m| m.has_side_effects(file)),
            module_kind,
        }
    }
}

enum PackageResolution {
    Found(PathBuf),
    // the package explicitly hides this subpath
    Private,
    NotFound,
}
