//! Import/export scanning for the file types the bundler understands.
//!
//! Analyzers only extract dependency information. They never transform
//! source text.
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use path_utils::extension_of;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A statically imported specifier and the names taken from it.
///
/// `*` stands for a namespace import or star re-export. Side-effect-only
/// imports have no names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticImport {
    pub specifier: String,
    pub names: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAnalysis {
    // in source order, one entry per specifier
    pub static_imports: Vec<StaticImport>,
    pub dynamic_imports: Vec<String>,
    pub exports: BTreeSet<String>,
    // specifiers of bare `export * from`, whose names become ours
    #[serde(default)]
    pub star_reexports: Vec<String>,
}

impl SourceAnalysis {
    /// Analysis of a file no analyzer handles: a leaf exporting `default`.
    pub fn asset() -> Self {
        SourceAnalysis {
            exports: BTreeSet::from(["default".to_string()]),
            ..Default::default()
        }
    }
}

pub trait SourceAnalyzer: Send + Sync {
    fn handles(&self, path: &Path) -> bool;
    fn analyze(&self, path: &Path, source: &str) -> Result<SourceAnalysis>;
}

/// The built-in analyzers, in lookup order.
pub fn default_analyzers() -> Vec<Arc<dyn SourceAnalyzer>> {
    vec![
        Arc::new(EcmaScriptAnalyzer),
        Arc::new(JsonAnalyzer),
        Arc::new(CssAnalyzer),
    ]
}

lazy_static! {
    static ref IMPORT_FROM: Regex =
        Regex::new(r#"\bimport\s+(type\s+)?([\w$*{}\s,]+?)\s*from\s*['"]([^'"\n]+)['"]"#)
            .unwrap();
    static ref IMPORT_BARE: Regex = Regex::new(r#"\bimport\s*['"]([^'"\n]+)['"]"#).unwrap();
    static ref EXPORT_FROM: Regex = Regex::new(
        r#"\bexport\s+(type\s+)?(\*(?:\s*as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"]"#
    )
    .unwrap();
    static ref EXPORT_LIST: Regex = Regex::new(r#"\bexport\s*(type\s+)?\{([^}]*)\}"#).unwrap();
    static ref EXPORT_DEFAULT: Regex = Regex::new(r#"\bexport\s+default\b"#).unwrap();
    static ref EXPORT_DECL: Regex = Regex::new(
        r#"\bexport\s+(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\s*\*?\s*|(?:class|const|let|var|enum|interface|type|namespace)\s+)([\w$]+)"#
    )
    .unwrap();
    static ref DYNAMIC_IMPORT: Regex =
        Regex::new(r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap();
    static ref REQUIRE: Regex =
        Regex::new(r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap();
    static ref CJS_NAMED_EXPORT: Regex =
        Regex::new(r#"\bexports\.([\w$]+)\s*=(?:[^=]|$)"#).unwrap();
    static ref CJS_DEFAULT_EXPORT: Regex =
        Regex::new(r#"\bmodule\.exports\s*=(?:[^=]|$)"#).unwrap();
    static ref CSS_IMPORT: Regex =
        Regex::new(r#"@import\s+(?:url\(\s*)?['"]?([^'"\s)]+)['"]?\s*\)?"#).unwrap();
}

/// Blanks out comments, keeping newlines and string literals intact.
///
/// In script mode (`line_comments`) a `/` that cannot end an expression
/// opens a regex literal, which is copied through like a string.
fn strip_comments(source: &str, line_comments: bool) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut quote: Option<char> = None;
    // last character outside comments and whitespace
    let mut last: Option<char> = None;
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
                last = Some(c);
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if line_comments && chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            '/' if line_comments && starts_regex(last) => {
                out.push(c);
                copy_regex_literal(&mut chars, &mut out);
                last = Some('/');
            }
            _ => {
                out.push(c);
                if !c.is_whitespace() {
                    last = Some(c);
                }
            }
        }
    }
    out
}

// a `/` after these (or at the start) is a regex, not a division
fn starts_regex(last: Option<char>) -> bool {
    match last {
        None => true,
        Some(c) => "(,=:[!&|?{};+-*%>~^".contains(c),
    }
}

fn copy_regex_literal(chars: &mut std::iter::Peekable<std::str::Chars>, out: &mut String) {
    let mut in_class = false;
    while let Some(c) = chars.next() {
        if c == '\n' {
            // unterminated, give up on the line
            out.push(c);
            return;
        }
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return,
            _ => {}
        }
    }
}

fn clause_items(list: &str) -> impl Iterator<Item = &str> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty() && !item.starts_with("type "))
}

/// `a as b` => (a, b), `a` => (a, a)
fn split_alias(item: &str) -> (&str, &str) {
    let mut tokens = item.split_whitespace();
    let local = tokens.next().unwrap_or(item);
    match (tokens.next(), tokens.next()) {
        (Some("as"), Some(alias)) => (local, alias),
        _ => (local, local),
    }
}

/// Names imported by an import clause such as `React, { useState as s }`.
fn import_clause_names(clause: &str) -> BTreeSet<String> {
    let clause = clause.trim();
    let (head, named) = match clause.split_once('{') {
        Some((head, rest)) => (head, rest.split('}').next().unwrap_or("")),
        None => (clause, ""),
    };
    let mut names = BTreeSet::new();
    for item in head.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        if item.starts_with('*') {
            names.insert("*".to_string());
        } else {
            names.insert("default".to_string());
        }
    }
    for item in clause_items(named) {
        names.insert(split_alias(item).0.to_string());
    }
    names
}

#[derive(Default)]
struct ImportCollector {
    // offset of first occurrence => (specifier, names)
    found: Vec<(usize, String, BTreeSet<String>)>,
}

impl ImportCollector {
    fn add(&mut self, offset: usize, specifier: &str, names: BTreeSet<String>) {
        self.found.push((offset, specifier.to_string(), names));
    }

    fn finish(mut self) -> Vec<StaticImport> {
        self.found.sort_by_key(|(offset, _, _)| *offset);
        let mut merged: IndexMap<String, BTreeSet<String>> = IndexMap::new();
        for (_, specifier, names) in self.found {
            merged.entry(specifier).or_default().extend(names);
        }
        merged
            .into_iter()
            .map(|(specifier, names)| StaticImport { specifier, names })
            .collect()
    }
}

/// Scans JavaScript and TypeScript modules (ESM and CommonJS) for imports
/// and exports. Type-only imports are ignored.
///
/// This is a lexical scan, not a parse. Regex literals are recognised by
/// the character before the opening `/`, so one following a keyword such
/// as `return /'/` is read as a division and its quote opens a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcmaScriptAnalyzer;

impl SourceAnalyzer for EcmaScriptAnalyzer {
    fn handles(&self, path: &Path) -> bool {
        matches!(
            extension_of(path).as_deref(),
            Some("js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts")
        )
    }

    fn analyze(&self, _path: &Path, source: &str) -> Result<SourceAnalysis> {
        let code = strip_comments(source, true);
        let mut imports = ImportCollector::default();
        let mut exports = BTreeSet::new();
        let mut star_reexports: Vec<String> = Vec::new();

        for caps in IMPORT_FROM.captures_iter(&code) {
            if caps.get(1).is_some() {
                continue;
            }
            let offset = caps.get(0).map_or(0, |m| m.start());
            imports.add(offset, &caps[3], import_clause_names(&caps[2]));
        }
        for caps in IMPORT_BARE.captures_iter(&code) {
            imports.add(caps.get(0).map_or(0, |m| m.start()), &caps[1], BTreeSet::new());
        }
        for caps in REQUIRE.captures_iter(&code) {
            imports.add(
                caps.get(0).map_or(0, |m| m.start()),
                &caps[1],
                BTreeSet::from(["*".to_string()]),
            );
        }
        for caps in EXPORT_FROM.captures_iter(&code) {
            if caps.get(1).is_some() {
                continue;
            }
            let offset = caps.get(0).map_or(0, |m| m.start());
            let clause = caps[2].trim();
            if let Some(star) = clause.strip_prefix('*') {
                match star.trim().strip_prefix("as") {
                    Some(namespace) => {
                        exports.insert(namespace.trim().to_string());
                    }
                    None if !star_reexports.iter().any(|s| s == &caps[3]) => {
                        star_reexports.push(caps[3].to_string());
                    }
                    None => {}
                }
                imports.add(offset, &caps[3], BTreeSet::from(["*".to_string()]));
            } else {
                let inner = clause.trim_start_matches('{').trim_end_matches('}');
                let mut names = BTreeSet::new();
                for item in clause_items(inner) {
                    let (imported, exported) = split_alias(item);
                    names.insert(imported.to_string());
                    exports.insert(exported.to_string());
                }
                imports.add(offset, &caps[3], names);
            }
        }

        for caps in EXPORT_LIST.captures_iter(&code) {
            let Some(whole) = caps.get(0) else { continue };
            // re-exports were handled above
            if code[whole.end()..].trim_start().starts_with("from") || caps.get(1).is_some() {
                continue;
            }
            for item in clause_items(&caps[2]) {
                exports.insert(split_alias(item).1.to_string());
            }
        }
        if EXPORT_DEFAULT.is_match(&code) || CJS_DEFAULT_EXPORT.is_match(&code) {
            exports.insert("default".to_string());
        }
        for caps in EXPORT_DECL.captures_iter(&code) {
            exports.insert(caps[1].to_string());
        }
        for caps in CJS_NAMED_EXPORT.captures_iter(&code) {
            exports.insert(caps[1].to_string());
        }

        let mut dynamic_imports: Vec<String> = Vec::new();
        for caps in DYNAMIC_IMPORT.captures_iter(&code) {
            let specifier = caps[1].to_string();
            if !dynamic_imports.contains(&specifier) {
                dynamic_imports.push(specifier);
            }
        }

        Ok(SourceAnalysis {
            static_imports: imports.finish(),
            dynamic_imports,
            exports,
            star_reexports,
        })
    }
}

/// JSON modules export their parsed value as `default`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAnalyzer;

impl SourceAnalyzer for JsonAnalyzer {
    fn handles(&self, path: &Path) -> bool {
        extension_of(path).as_deref() == Some("json")
    }

    fn analyze(&self, path: &Path, source: &str) -> Result<SourceAnalysis> {
        serde_json::from_str::<serde_json::Value>(source)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;
        Ok(SourceAnalysis::asset())
    }
}

/// Follows `@import` rules in stylesheets.
///
/// Bare `@import "x.css"` targets are relative to the stylesheet, and a
/// leading `~` marks a package import.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssAnalyzer;

fn css_specifier(raw: &str) -> String {
    if let Some(package) = raw.strip_prefix('~') {
        package.to_string()
    } else if raw.starts_with('.') || raw.starts_with('/') || raw.contains(':') {
        raw.to_string()
    } else {
        format!("./{}", raw)
    }
}

impl SourceAnalyzer for CssAnalyzer {
    fn handles(&self, path: &Path) -> bool {
        extension_of(path).as_deref() == Some("css")
    }

    fn analyze(&self, _path: &Path, source: &str) -> Result<SourceAnalysis> {
        let code = strip_comments(source, false);
        let mut imports = ImportCollector::default();
        for caps in CSS_IMPORT.captures_iter(&code) {
            imports.add(
                caps.get(0).map_or(0, |m| m.start()),
                &css_specifier(&caps[1]),
                BTreeSet::new(),
            );
        }
        Ok(SourceAnalysis {
            static_imports: imports.finish(),
            ..Default::default()
        })
    }
}
