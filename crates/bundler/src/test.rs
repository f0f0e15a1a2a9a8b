use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use logger::VecLogger;
use pretty_assertions::assert_eq;
use sourcemap_codec::{SourceMap, SourceMapConsumer};
use test_tmpdir::{test_tmpdir, TmpDir};

use crate::{
    BuildError, BuildResult, BuildWarning, Bundler, BundlerConfig, ChunkEmission, OutputWriter,
    SourceAnalysis, SourceAnalyzer, SourceMapMode,
};

fn entries(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(name, path)| (name.to_string(), path.to_string()))
        .collect()
}

fn test_config(tmp: &TmpDir) -> BundlerConfig {
    BundlerConfig {
        concurrency: 2,
        ..BundlerConfig::for_root(tmp.root())
    }
}

fn build(config: BundlerConfig, entry_items: &[(&str, &str)]) -> BuildResult {
    let logger = VecLogger::new();
    Bundler::new(config)
        .unwrap()
        .build(&logger, &entries(entry_items))
}

fn chunk_names(result: &BuildResult) -> Vec<String> {
    result.chunks.iter().map(|c| c.display_name()).collect()
}

fn chunk_modules(tmp: &TmpDir, result: &BuildResult, name: &str) -> Vec<String> {
    result
        .chunks
        .iter()
        .find(|c| c.display_name() == name)
        .map(|c| c.modules.iter().map(|m| tmp.normalize(m)).collect())
        .unwrap_or_default()
}

#[test]
fn test_single_entry_build() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "import { greet } from './greet';\nimport './styles.css';\nconsole.log(greet('x'));\n",
        "src/greet.ts" => "export function greet(name: string) {\n  return 'hi ' + name;\n}\n",
        "src/styles.css" => "body { margin: 0; }\n"
    );
    let result = build(test_config(&tmp), &[("main", "src/main.ts")]);

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(chunk_names(&result), vec!["main".to_string()]);
    assert_eq!(
        chunk_modules(&tmp, &result, "main"),
        vec![
            "<root>/src/main.ts".to_string(),
            "<root>/src/greet.ts".to_string(),
            "<root>/src/styles.css".to_string(),
        ]
    );

    let output = result.output("main").unwrap();
    assert!(output.file_name.starts_with("main."));
    assert!(output.file_name.ends_with(".js"));
    assert_eq!(
        output.code,
        format!(
            "{}{}{}//# sourceMappingURL={}.map\n",
            "import { greet } from './greet';\nimport './styles.css';\nconsole.log(greet('x'));\n",
            "export function greet(name: string) {\n  return 'hi ' + name;\n}\n",
            "body { margin: 0; }\n",
            output.file_name
        )
    );

    let map = output.map.as_ref().unwrap();
    assert_eq!(
        map.sources,
        vec![
            "src/main.ts".to_string(),
            "src/greet.ts".to_string(),
            "src/styles.css".to_string(),
        ]
    );
    let consumer = SourceMapConsumer::new(map).unwrap();
    let mapping = consumer.original_position_for(5, 2).unwrap();
    assert_eq!(mapping.source, "src/greet.ts");
    assert_eq!(mapping.original.line, 2);

    let greet = result
        .graph
        .nodes
        .iter()
        .find(|n| n.id.ends_with("greet.ts"))
        .unwrap();
    assert_eq!(greet.depth, Some(1));
    assert!(greet.used_exports.contains("greet"));
    assert_eq!(result.stats.graph.module_count, 3);
    assert_eq!(result.stats.chunk_count, 1);
    assert_eq!(result.stats.output_size, output.code.len() as u64);
}

#[test]
fn test_shared_module_moves_to_common_chunk() {
    let tmp = test_tmpdir!(
        "src/a.ts" => "import { shared } from './shared';\nexport const a = shared;\n",
        "src/b.ts" => "import { shared } from './shared';\nexport const b = shared;\n",
        "src/shared.ts" => "export const shared = 1;\n"
    );
    let result = build(test_config(&tmp), &[("a", "src/a.ts"), ("b", "src/b.ts")]);

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(
        chunk_names(&result),
        vec!["a".to_string(), "b".to_string(), "common".to_string()]
    );
    assert_eq!(
        chunk_modules(&tmp, &result, "common"),
        vec!["<root>/src/shared.ts".to_string()]
    );
    assert_eq!(
        chunk_modules(&tmp, &result, "a"),
        vec!["<root>/src/a.ts".to_string()]
    );
    let common = result.chunks[2].id;
    assert!(result.chunks[0].children.contains(&common));
    assert!(result.chunks[1].children.contains(&common));
}

#[test]
fn test_dynamic_import_creates_async_chunk() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "const page = () => import('./page');\n",
        "src/page.ts" => "import { util } from './util';\nexport default util;\n",
        "src/util.ts" => "export const util = 1;\n"
    );
    let result = build(test_config(&tmp), &[("main", "src/main.ts")]);

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(chunk_names(&result), vec!["main".to_string(), "page".to_string()]);
    assert_eq!(
        chunk_modules(&tmp, &result, "page"),
        vec!["<root>/src/page.ts".to_string(), "<root>/src/util.ts".to_string()]
    );
    assert!(result.chunks[1].is_async);
    assert!(result.chunks[0].children.contains(&result.chunks[1].id));
}

#[test]
fn test_pure_package_module_without_exports_is_removed() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "import 'lib/setup';\nimport { lib } from 'lib';\nconsole.log(lib);\n",
        "node_modules/lib/package.json" => r#"{ "name": "lib", "sideEffects": false }"#,
        "node_modules/lib/index.js" => "export const lib = 1;\n",
        "node_modules/lib/setup.js" => "globalThis.configured = true;\n"
    );
    let result = build(test_config(&tmp), &[("main", "src/main.ts")]);

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.stats.removed_modules, 1);
    assert!(!result
        .module_chunks
        .keys()
        .any(|m| m.ends_with("lib/setup.js")));
    assert_eq!(
        chunk_names(&result),
        vec!["main".to_string(), "vendors".to_string()]
    );
    assert_eq!(
        chunk_modules(&tmp, &result, "vendors"),
        vec!["<root>/node_modules/lib/index.js".to_string()]
    );
    let index = result
        .graph
        .nodes
        .iter()
        .find(|n| n.id.ends_with("lib/index.js"))
        .unwrap();
    assert!(!index.side_effects);
}

#[test]
fn test_star_reexport_barrel_keeps_its_targets() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "import { foo } from 'lib';\nimport 'lib/side';\nconsole.log(foo);\n",
        "node_modules/lib/package.json" => r#"{ "name": "lib", "sideEffects": false }"#,
        "node_modules/lib/index.js" => "export * from './a';\n",
        "node_modules/lib/a.js" => "export const foo = 1;\n",
        "node_modules/lib/side.js" => "import './b';\n",
        "node_modules/lib/b.js" => "export const bar = 2;\n"
    );
    let result = build(test_config(&tmp), &[("main", "src/main.ts")]);

    assert!(result.success, "{:?}", result.errors);
    // only the module with no names of its own goes away
    assert_eq!(result.stats.removed_modules, 1);
    let placed: Vec<String> = result.module_chunks.keys().map(|m| tmp.normalize(m)).collect();
    assert_eq!(
        placed,
        vec![
            "<root>/node_modules/lib/a.js".to_string(),
            "<root>/node_modules/lib/b.js".to_string(),
            "<root>/node_modules/lib/index.js".to_string(),
            "<root>/src/main.ts".to_string(),
        ]
    );
    let vendors = result.output("vendors").unwrap();
    assert!(vendors.code.contains("export const foo = 1;"));
    assert!(vendors.code.contains("export const bar = 2;"));
}

#[test]
fn test_builtins_become_external_modules() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "import fs from 'fs';\nimport { join } from 'node:path';\n"
    );
    let result = build(test_config(&tmp), &[("main", "src/main.ts")]);

    assert!(result.success, "{:?}", result.errors);
    let externals: Vec<&str> = result
        .graph
        .nodes
        .iter()
        .filter(|n| n.is_external)
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(externals, vec!["fs", "node:path"]);
    assert_eq!(
        chunk_modules(&tmp, &result, "main"),
        vec!["<root>/src/main.ts".to_string()]
    );
    assert_eq!(result.stats.graph.external_count, 2);
}

#[test]
fn test_unresolved_import_fails_build_and_keeps_caches_clean() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "import { x } from './missing';\nconsole.log(x);\n"
    );
    let bundler = Bundler::new(test_config(&tmp)).unwrap();
    let logger = VecLogger::new();
    let result = bundler.build(&logger, &entries(&[("main", "src/main.ts")]));

    assert!(!result.success);
    assert_eq!(
        result.errors,
        vec![BuildError::UnresolvedImport {
            importer: tmp
                .root_join("src/main.ts")
                .to_string_lossy()
                .replace('\\', "/"),
            specifier: "./missing".to_string(),
        }]
    );
    // the failed build still produces chunks
    assert_eq!(chunk_names(&result), vec!["main".to_string()]);
    assert_eq!(bundler.resolver().cached_resolution_count(), 0);
    assert_eq!(bundler.cached_analysis_count(), 0);

    tmp.write_file("src/missing.ts", "export const x = 1;\n")
        .unwrap();
    let result = bundler.build(&logger, &entries(&[("main", "src/main.ts")]));
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(bundler.cached_analysis_count(), 2);
    assert!(bundler.resolver().cached_resolution_count() > 0);

    bundler.clear_cache();
    assert_eq!(bundler.cached_analysis_count(), 0);
    assert_eq!(bundler.resolver().cached_resolution_count(), 0);
}

#[test]
fn test_failed_analysis_reports_importers() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "import data from './data.json';\nconsole.log(data);\n",
        "src/data.json" => "{ nope"
    );
    let result = build(test_config(&tmp), &[("main", "src/main.ts")]);

    assert!(!result.success);
    assert_eq!(result.errors.len(), 2);
    assert!(matches!(
        &result.errors[0],
        BuildError::AnalysisFailed { module, .. } if module.ends_with("src/data.json")
    ));
    assert!(matches!(
        &result.errors[1],
        BuildError::UnresolvedImport { specifier, .. } if specifier == "./data.json"
    ));
    let main = result
        .graph
        .nodes
        .iter()
        .find(|n| n.id.ends_with("src/main.ts"))
        .unwrap();
    assert!(main.dependencies.is_empty());
}

#[test]
fn test_unresolved_entry() {
    let tmp = test_tmpdir!("src/main.ts" => "");
    let result = build(
        test_config(&tmp),
        &[("main", "src/main.ts"), ("other", "src/other.ts")],
    );
    assert!(!result.success);
    assert_eq!(
        result.errors,
        vec![BuildError::UnresolvedEntry {
            name: "other".to_string(),
            specifier: "src/other.ts".to_string(),
        }]
    );
    assert_eq!(chunk_names(&result), vec!["main".to_string()]);
}

#[test]
fn test_circular_and_oversized_warnings() {
    let tmp = test_tmpdir!(
        "src/a.ts" => "import { b } from './b';\nexport const a = () => b;\n",
        "src/b.ts" => "import { a } from './a';\nexport const b = () => a;\n"
    );
    let mut config = test_config(&tmp);
    config.split.max_size = Some(10);
    let logger = VecLogger::new();
    let result = Bundler::new(config)
        .unwrap()
        .build(&logger, &entries(&[("a", "src/a.ts")]));

    assert!(result.success, "{:?}", result.errors);
    let circular: Vec<Vec<String>> = result
        .warnings
        .iter()
        .filter_map(|w| match w {
            BuildWarning::CircularDependency { modules } => {
                Some(modules.iter().map(|m| tmp.normalize(m)).collect())
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        circular,
        vec![vec!["<root>/src/a.ts".to_string(), "<root>/src/b.ts".to_string()]]
    );
    // each module alone is above the limit, so splitting cannot help
    let oversized: Vec<&str> = result
        .warnings
        .iter()
        .filter_map(|w| match w {
            BuildWarning::OversizedChunk { chunk, .. } => Some(chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(oversized, vec!["a", "a-1"]);

    let warnings = logger.get_warnings().unwrap();
    assert!(warnings[0].starts_with("circular dependency: "));
    assert_eq!(warnings.len(), 3);
}

#[test]
fn test_source_map_modes() {
    let tmp = test_tmpdir!("src/main.ts" => "console.log(1);\n");
    let build_with = |mode| {
        let config = BundlerConfig {
            source_map: mode,
            ..test_config(&tmp)
        };
        build(config, &[("main", "src/main.ts")])
    };

    let inline = build_with(SourceMapMode::Inline);
    let output = inline.output("main").unwrap();
    let url = output
        .code
        .lines()
        .last()
        .and_then(|l| l.strip_prefix("//# sourceMappingURL="))
        .unwrap();
    assert!(url.starts_with("data:application/json;charset=utf-8;base64,"));
    let map = SourceMap::from_data_url(url).unwrap();
    assert_eq!(map.sources, vec!["src/main.ts".to_string()]);
    assert_eq!(
        map.sources_content,
        vec![Some("console.log(1);\n".to_string())]
    );

    let hidden = build_with(SourceMapMode::Hidden);
    let output = hidden.output("main").unwrap();
    assert_eq!(output.code, "console.log(1);\n");
    assert!(output.map.is_some());

    let none = build_with(SourceMapMode::None);
    let output = none.output("main").unwrap();
    assert_eq!(output.code, "console.log(1);\n");
    assert_eq!(output.map, None);
    assert_eq!(output.map_file_name, None);
}

#[test]
fn test_identical_inputs_give_identical_results() {
    let tmp = test_tmpdir!(
        "src/a.ts" => "import { shared } from './shared';\nimport('./lazy');\nexport const a = shared;\n",
        "src/b.ts" => "import { shared } from './shared';\nimport { v } from 'vendor-lib';\nexport const b = shared + v;\n",
        "src/shared.ts" => "export const shared = 1;\n",
        "src/lazy.ts" => "import { shared } from './shared';\nexport default shared;\n",
        "node_modules/vendor-lib/package.json" => r#"{ "name": "vendor-lib", "main": "main.js" }"#,
        "node_modules/vendor-lib/main.js" => "export const v = 2;\n"
    );
    let entry_items = [("a", "src/a.ts"), ("b", "src/b.ts")];

    let first = serde_json::to_string(&build(test_config(&tmp), &entry_items)).unwrap();
    let second = serde_json::to_string(&build(
        BundlerConfig {
            concurrency: 4,
            ..test_config(&tmp)
        },
        &entry_items,
    ))
    .unwrap();
    assert_eq!(first, second);

    // warm caches give the same result as cold ones
    let bundler = Bundler::new(test_config(&tmp)).unwrap();
    let logger = VecLogger::new();
    let cold = bundler.build(&logger, &entries(&entry_items));
    let warm = bundler.build(&logger, &entries(&entry_items));
    assert!(cold.success, "{:?}", cold.errors);
    assert_eq!(cold, warm);
    assert_eq!(serde_json::to_string(&warm).unwrap(), first);
}

#[derive(Default)]
struct MemoryWriter {
    written: Mutex<Vec<(PathBuf, String)>>,
}

impl OutputWriter for MemoryWriter {
    fn write(&self, output_dir: &Path, emission: &ChunkEmission) -> anyhow::Result<()> {
        self.written
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push((output_dir.to_path_buf(), emission.file_name.clone()));
        Ok(())
    }
}

#[test]
fn test_output_writer_receives_chunks_of_successful_builds() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "console.log(1);\n",
        "src/broken.ts" => "import './nope';\n"
    );
    let bundler = Bundler::new(test_config(&tmp)).unwrap();
    let logger = VecLogger::new();

    let writer = MemoryWriter::default();
    let result = bundler.build_with_writer(&logger, &entries(&[("main", "src/main.ts")]), &writer);
    assert!(result.success);
    let written = writer.written.into_inner().unwrap();
    assert_eq!(
        written,
        vec![(
            tmp.root_join("dist"),
            result.output("main").unwrap().file_name.clone()
        )]
    );

    let writer = MemoryWriter::default();
    let result =
        bundler.build_with_writer(&logger, &entries(&[("broken", "src/broken.ts")]), &writer);
    assert!(!result.success);
    assert!(writer.written.into_inner().unwrap().is_empty());
}

struct MarkdownAnalyzer;

impl SourceAnalyzer for MarkdownAnalyzer {
    fn handles(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "md")
    }

    fn analyze(&self, _path: &Path, source: &str) -> anyhow::Result<SourceAnalysis> {
        let mut analysis = SourceAnalysis::asset();
        if source.starts_with("---") {
            analysis.exports.insert("frontmatter".to_string());
        }
        Ok(analysis)
    }
}

#[test]
fn test_custom_analyzer() {
    let tmp = test_tmpdir!(
        "src/main.ts" => "import doc from './readme.md';\nimport logo from './logo.svg';\n",
        "src/readme.md" => "---\ntitle: hi\n---\n# Hi\n",
        "src/logo.svg" => "<svg></svg>\n"
    );
    let mut config = test_config(&tmp);
    config
        .resolve
        .extensions
        .extend([".md".to_string(), ".svg".to_string()]);
    let logger = VecLogger::new();
    let result = Bundler::new(config)
        .unwrap()
        .with_analyzer(Arc::new(MarkdownAnalyzer))
        .build(&logger, &entries(&[("main", "src/main.ts")]));

    assert!(result.success, "{:?}", result.errors);
    let exports_of = |suffix: &str| {
        result
            .graph
            .nodes
            .iter()
            .find(|n| n.id.ends_with(suffix))
            .map(|n| n.exports.iter().cloned().collect::<Vec<_>>())
    };
    assert_eq!(
        exports_of("readme.md"),
        Some(vec!["default".to_string(), "frontmatter".to_string()])
    );
    assert_eq!(exports_of("logo.svg"), Some(vec!["default".to_string()]));
}
