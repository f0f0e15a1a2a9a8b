mod error;
mod path_mappings;
mod tsconfig_paths_json;

pub use error::OpenTsConfigError;
pub use path_mappings::{PathMappings, Pattern};
pub use tsconfig_paths_json::{TsconfigPathsCompilerOptions, TsconfigPathsJson};
