// Extracts the package name from a package import specifier
pub fn package_name(import_specifier: &str) -> Option<&str> {
    if import_specifier.is_empty() || import_specifier.starts_with('.') {
        return None;
    }
    let idx = import_specifier
        .find('/')
        .unwrap_or(import_specifier.len());
    if import_specifier.starts_with('@') {
        // scoped packages need a second segment
        let rest = &import_specifier[idx..];
        if rest.len() <= 1 {
            return None;
        }
        let scoped_end = rest[1..]
            .find('/')
            .map(|idx2| idx + 1 + idx2)
            .unwrap_or(import_specifier.len());
        Some(&import_specifier[..scoped_end])
    } else {
        Some(&import_specifier[..idx])
    }
}

// Splits a package import into the package name and the
// package-relative subpath, which is None for a bare package import.
pub fn split_package_import(import_specifier: &str) -> Option<(&str, Option<&str>)> {
    let pkg = package_name(import_specifier)?;
    let rest = import_specifier[pkg.len()..].trim_start_matches('/');
    if rest.is_empty() {
        Some((pkg, None))
    } else {
        Some((pkg, Some(rest)))
    }
}
