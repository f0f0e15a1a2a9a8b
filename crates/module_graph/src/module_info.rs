use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use import_resolver::ModuleKind;
use path_utils::extension_of;
use serde::{Deserialize, Serialize};

/// Absolute slash path of a file, or the raw specifier of an external module.
pub type ModuleId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleType {
    Js,
    Jsx,
    Ts,
    Tsx,
    Json,
    Css,
    Asset,
    External,
}

impl ModuleType {
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path).as_deref() {
            Some("js" | "mjs" | "cjs") => ModuleType::Js,
            Some("jsx") => ModuleType::Jsx,
            Some("ts" | "mts" | "cts") => ModuleType::Ts,
            Some("tsx") => ModuleType::Tsx,
            Some("json") => ModuleType::Json,
            Some("css") => ModuleType::Css,
            _ => ModuleType::Asset,
        }
    }
}

/// A node in the module graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub module_type: ModuleType,
    // static imports
    pub dependencies: BTreeSet<ModuleId>,
    // lazily loaded with import()
    pub dynamic_dependencies: BTreeSet<ModuleId>,
    pub exports: BTreeSet<String>,
    // targets of bare `export * from`
    #[serde(default)]
    pub star_reexports: BTreeSet<ModuleId>,
    // source module => names imported from it
    pub imports: BTreeMap<ModuleId, BTreeSet<String>>,
    pub size: u64,
    pub content_hash: String,
    pub is_entry: bool,
    pub is_external: bool,
    pub side_effects: bool,
    pub module_kind: Option<ModuleKind>,

    // derived by the graph
    pub circular: bool,
    pub depth: Option<usize>,
    // derived by tree shaking
    pub used_exports: BTreeSet<String>,
}

impl ModuleInfo {
    pub fn new(id: impl Into<ModuleId>, module_type: ModuleType) -> Self {
        ModuleInfo {
            id: id.into(),
            module_type,
            dependencies: BTreeSet::new(),
            dynamic_dependencies: BTreeSet::new(),
            exports: BTreeSet::new(),
            star_reexports: BTreeSet::new(),
            imports: BTreeMap::new(),
            size: 0,
            content_hash: String::new(),
            is_entry: false,
            is_external: false,
            side_effects: true,
            module_kind: None,
            circular: false,
            depth: None,
            used_exports: BTreeSet::new(),
        }
    }

    pub fn external(specifier: impl Into<ModuleId>) -> Self {
        ModuleInfo {
            is_external: true,
            ..ModuleInfo::new(specifier, ModuleType::External)
        }
    }

    /// Static and dynamic dependencies, static first.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &ModuleId> {
        self.dependencies
            .iter()
            .chain(self.dynamic_dependencies.iter())
    }
}
