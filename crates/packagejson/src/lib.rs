//! The subset of package.json the resolver and bundler read.
use std::{collections::BTreeMap, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

pub mod exported_path;

use exported_path::ExportedPath;

/// A target in the "exports" field, before any condition has been chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageJsonExport {
    /// `"./dist/index.js"` or `null`
    Single(ExportedPath),
    /// `{ "import": ..., "default": ... }`. Values may nest further.
    Conditional(BTreeMap<String, PackageJsonExport>),
    /// `["./a.js", "./b.js"]`, tried in order
    Fallbacks(Vec<PackageJsonExport>),
}

/// The "exports" field, normalised to a map of subpath => target.
///
/// A bare string or a top-level condition object is treated as the export
/// for the "." subpath.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageJsonExports {
    subpaths: BTreeMap<String, PackageJsonExport>,
}

impl PackageJsonExports {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PackageJsonExport)> {
        self.subpaths.iter()
    }

    pub fn get(&self, subpath: &str) -> Option<&PackageJsonExport> {
        self.subpaths.get(subpath)
    }

    pub fn len(&self) -> usize {
        self.subpaths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }
}

impl TryFrom<&Value> for PackageJsonExport {
    type Error = anyhow::Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(PackageJsonExport::Single(ExportedPath::Private)),
            Value::String(target) => Ok(PackageJsonExport::Single(ExportedPath::Exported(
                target.clone(),
            ))),
            Value::Array(items) => items
                .iter()
                .map(PackageJsonExport::try_from)
                .collect::<Result<Vec<_>>>()
                .map(PackageJsonExport::Fallbacks),
            Value::Object(conditions) => {
                let mut out = BTreeMap::new();
                for (condition, target) in conditions {
                    if condition.starts_with('.') {
                        return Err(anyhow!(
                            "subpath key '{condition}' is not allowed inside a condition object"
                        ));
                    }
                    out.insert(condition.clone(), PackageJsonExport::try_from(target)?);
                }
                Ok(PackageJsonExport::Conditional(out))
            }
            other => Err(anyhow!("unexpected export target: {other}")),
        }
    }
}

impl TryFrom<&Value> for PackageJsonExports {
    type Error = anyhow::Error;

    fn try_from(value: &Value) -> Result<Self> {
        let mut subpaths = BTreeMap::new();
        match value {
            Value::Object(map) if is_subpath_map(map)? => {
                for (subpath, target) in map {
                    subpaths.insert(subpath.clone(), PackageJsonExport::try_from(target)?);
                }
            }
            other => {
                subpaths.insert(".".to_string(), PackageJsonExport::try_from(other)?);
            }
        }
        Ok(Self { subpaths })
    }
}

// An exports object must either be all subpaths ("." / "./x") or all conditions.
fn is_subpath_map(map: &Map<String, Value>) -> Result<bool> {
    let subpath_keys = map.keys().filter(|k| k.starts_with('.')).count();
    if subpath_keys == 0 {
        Ok(false)
    } else if subpath_keys == map.len() {
        Ok(true)
    } else {
        Err(anyhow!(
            "\"exports\" object mixes subpath keys and condition keys"
        ))
    }
}

/// The "sideEffects" field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SideEffects {
    Bool(bool),
    Patterns(Vec<String>),
}

/// Subset of package.json used during resolution and graph construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageJson {
    pub name: Option<String>,
    /// The "type" field ("module" or "commonjs")
    pub module_type: Option<String>,
    pub exports: Option<PackageJsonExports>,
    pub side_effects: Option<SideEffects>,
    // all top-level string fields, so configurable main fields can be looked up by name
    string_fields: BTreeMap<String, String>,
}

impl PackageJson {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading package manifest {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents)?;
        Self::try_from(&value)
    }

    /// Looks up a string-valued top-level field such as "main" or "module".
    pub fn main_field(&self, field: &str) -> Option<&str> {
        self.string_fields.get(field).map(String::as_str)
    }
}

impl TryFrom<&Value> for PackageJson {
    type Error = anyhow::Error;

    fn try_from(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| anyhow!("package.json root must be an object"))?;

        let string_fields = map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect::<BTreeMap<_, _>>();

        let exports = map
            .get("exports")
            .map(PackageJsonExports::try_from)
            .transpose()
            .context("invalid \"exports\" field")?;

        let side_effects = map
            .get("sideEffects")
            .map(|v| serde_json::from_value::<SideEffects>(v.clone()))
            .transpose()
            .context("invalid \"sideEffects\" field")?;

        Ok(PackageJson {
            name: string_fields.get("name").cloned(),
            module_type: string_fields.get("type").cloned(),
            exports,
            side_effects,
            string_fields,
        })
    }
}
