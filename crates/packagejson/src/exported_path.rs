/// Target of a single `exports` entry once conditions have been applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExportedPath {
    /// Package-relative path (e.g. `./dist/index.js`)
    Exported(String),
    /// Explicitly excluded with a `null` target
    Private,
}

impl ExportedPath {
    pub fn as_ref(&self) -> ExportedPathRef<'_> {
        match self {
            ExportedPath::Exported(path) => ExportedPathRef::Exported(path),
            ExportedPath::Private => ExportedPathRef::Private,
        }
    }

    pub fn map_export(&self, f: impl FnOnce(&str) -> String) -> ExportedPath {
        match self {
            ExportedPath::Exported(path) => ExportedPath::Exported(f(path)),
            ExportedPath::Private => ExportedPath::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportedPathRef<'a> {
    Exported(&'a str),
    Private,
}

impl<'a> ExportedPathRef<'a> {
    pub fn to_owned(self) -> ExportedPath {
        match self {
            ExportedPathRef::Exported(path) => ExportedPath::Exported(path.to_string()),
            ExportedPathRef::Private => ExportedPath::Private,
        }
    }
}
