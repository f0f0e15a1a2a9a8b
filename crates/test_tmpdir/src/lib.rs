//! Temporary on-disk project trees for resolver and build tests.
extern crate path_slash;

use path_slash::PathBufExt;
use std::{
    fs::File,
    io::{Error, Write},
    path::{Path, PathBuf},
};

pub struct TmpDir {
    // held so the directory is removed when the TmpDir drops
    #[allow(dead_code)]
    tmp_root: tempfile::TempDir,
    canonical_root: PathBuf,
}

/// Creates a [TmpDir] populated with `"relative/path" => "content"` pairs.
#[macro_export]
macro_rules! test_tmpdir(
    { $($key:expr => $value:expr),+ $(,)? } => {
        {
            use $crate::TmpDir;
            let files: Vec<(&str, &str)> = vec![$(($key, $value)),+];
            TmpDir::new_with_content(&files)
        }
    };
);

impl Default for TmpDir {
    fn default() -> Self {
        Self::new()
    }
}

impl TmpDir {
    pub fn new() -> TmpDir {
        let root = tempfile::tempdir().unwrap();
        let canonical_root = std::fs::canonicalize(&root).unwrap();
        TmpDir {
            tmp_root: root,
            canonical_root,
        }
    }

    pub fn new_with_content(content: &[(&str, &str)]) -> TmpDir {
        let out = Self::new();
        for (path, text) in content {
            out.write_file(path, text).unwrap();
        }
        out
    }

    /// Writes `content` to the slash-separated `path` under the root,
    /// creating parent directories as needed.
    pub fn write_file(&self, path: &str, content: &str) -> Result<PathBuf, Error> {
        let target = self.root_join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&target)?;
        file.write_all(content.as_bytes())?;
        Ok(target)
    }

    pub fn root(&self) -> &Path {
        &self.canonical_root
    }

    pub fn root_join<S: AsRef<str>>(&self, other: S) -> PathBuf {
        self.canonical_root.join(PathBuf::from_slash(other))
    }

    /// Replaces the temporary root in `path` with `<root>` so assertions do
    /// not depend on where the directory was created.
    pub fn normalize(&self, path: impl AsRef<str>) -> String {
        let root = self.canonical_root.to_slash_lossy();
        PathBuf::from(path.as_ref())
            .to_slash_lossy()
            .replace(root.as_ref(), "<root>")
    }
}
