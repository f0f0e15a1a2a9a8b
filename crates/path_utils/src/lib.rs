use path_slash::PathExt;
use std::path::{Component, Path};

/// Converts a path to a forward-slash string, lossily replacing any
/// non-utf8 segments.
pub fn to_slash_string<P: AsRef<Path>>(p: P) -> String {
    p.as_ref().to_slash_lossy().into_owned()
}

/// Returns the slash-separated path of `path` relative to `base`, or None if
/// no relative path can be computed (e.g. mixing absolute and relative paths).
pub fn relative_slash_path<P: AsRef<Path>, B: AsRef<Path>>(path: P, base: B) -> Option<String> {
    pathdiff::diff_paths(path.as_ref(), base.as_ref()).map(to_slash_string)
}

/// Checks if any directory component of `path` equals `marker`
/// (e.g. `node_modules`).
pub fn is_in_dependency_dir<P: AsRef<Path>>(path: P, marker: &str) -> bool {
    path.as_ref().components().any(|c| match c {
        Component::Normal(segment) => segment == marker,
        _ => false,
    })
}

/// Lowercased extension of `path` without the leading dot.
pub fn extension_of<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
