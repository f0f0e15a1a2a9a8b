use module_graph::ModuleId;
use serde::{Deserialize, Serialize};

/// A problem that makes a build unsuccessful. Builds keep going after
/// these so every problem is reported at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BuildError {
    #[error("entry `{name}` ({specifier}) could not be resolved")]
    UnresolvedEntry { name: String, specifier: String },
    #[error("could not resolve `{specifier}` imported by {importer}")]
    UnresolvedImport { importer: ModuleId, specifier: String },
    #[error("failed to read {module}: {message}")]
    ReadFailed { module: ModuleId, message: String },
    #[error("failed to analyze {module}: {message}")]
    AnalysisFailed { module: ModuleId, message: String },
    #[error("{stage} failed: {message}")]
    Internal { stage: String, message: String },
    #[error("failed to emit {file}: {message}")]
    EmitFailed { file: String, message: String },
}

/// A problem that is reported but does not fail the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BuildWarning {
    CircularDependency {
        modules: Vec<ModuleId>,
    },
    OversizedChunk {
        chunk: String,
        size: u64,
        #[serde(rename = "maxSize")]
        max_size: u64,
    },
}

impl std::fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildWarning::CircularDependency { modules } => {
                write!(f, "circular dependency: {}", modules.join(" -> "))
            }
            BuildWarning::OversizedChunk {
                chunk,
                size,
                max_size,
            } => write!(
                f,
                "chunk `{}` is {} bytes, above the {} byte limit",
                chunk, size, max_size
            ),
        }
    }
}
