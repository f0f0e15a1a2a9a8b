//! Resolves import specifiers to files the way Node-style bundlers do:
//! runtime builtins, aliases, tsconfig path mappings, relative paths, and
//! packages (including the package.json "exports" field).

mod builtins;
mod config;
mod manifest;
mod pkgname;
mod resolver;

#[cfg(test)]
mod test;

pub use builtins::NODE_BUILTINS;
pub use config::{
    ResolverConfig, ResolverJSONConfig, DEFAULT_CONDITION_NAMES, DEFAULT_DEPENDENCY_DIR,
    DEFAULT_EXTENSIONS, DEFAULT_MAIN_FIELDS,
};
pub use manifest::PackageManifest;
pub use pkgname::{package_name, split_package_import};
pub use resolver::{ModuleKind, ResolveResult, Resolver, ResolverSession, MAX_ALIAS_DEPTH};
