use std::path::Path;

use pretty_assertions::assert_eq;
use test_tmpdir::{test_tmpdir, TmpDir};
use tracing_test::traced_test;

use crate::{ModuleKind, ResolveResult, Resolver, ResolverConfig};

fn resolve_normalized(
    tmp: &TmpDir,
    resolver: &Resolver,
    specifier: &str,
    importer: &str,
) -> Option<String> {
    resolver
        .resolve(specifier, &tmp.root_join(importer))
        .map(|r| if r.external { r.path } else { tmp.normalize(&r.path) })
}

#[test]
fn test_relative_import_with_extension_probe() {
    let tmp = test_tmpdir!(
        "p/src/index.js" => "import './a'",
        "p/src/a.ts" => "export const a = 1;",
        "p/src/a.js" => "module.exports = 1;"
    );
    let resolver = Resolver::new(ResolverConfig {
        extensions: vec![".ts".to_string(), ".js".to_string()],
        ..Default::default()
    });
    let result = resolver
        .resolve("./a", &tmp.root_join("p/src/index.js"))
        .unwrap();
    assert_eq!(tmp.normalize(&result.path), "<root>/p/src/a.ts");
    assert!(!result.external);
    assert!(result.side_effects);
}

#[test]
fn test_directory_index_and_exact_file() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "src/widgets/index.tsx" => "",
        "src/data.json" => "{}"
    );
    let resolver = Resolver::new(ResolverConfig::default());
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "./widgets", "src/index.ts"),
        Some("<root>/src/widgets/index.tsx".to_string())
    );
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "./data.json", "src/index.ts"),
        Some("<root>/src/data.json".to_string())
    );
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "./missing", "src/index.ts"),
        None
    );
}

#[test]
fn test_directory_index_wins_over_manifest_main() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "src/widgets/index.js" => "",
        "src/widgets/main.js" => "",
        "src/widgets/package.json" => r#"{ "main": "./main.js" }"#,
        "src/panels/main.js" => "",
        "src/panels/package.json" => r#"{ "main": "./main.js" }"#
    );
    let resolver = Resolver::new(ResolverConfig::default());
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "./widgets", "src/index.ts"),
        Some("<root>/src/widgets/index.js".to_string())
    );
    // no index, so the manifest is consulted
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "./panels", "src/index.ts"),
        Some("<root>/src/panels/main.js".to_string())
    );
}

#[test]
fn test_builtins_are_external() {
    let tmp = test_tmpdir!("src/index.ts" => "");
    let resolver = Resolver::new(ResolverConfig {
        builtins: ["electron".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let importer = tmp.root_join("src/index.ts");
    for specifier in ["fs", "fs/promises", "node:path", "https://cdn.example.com/lib.js", "electron"] {
        assert_eq!(
            resolver.resolve(specifier, &importer),
            Some(ResolveResult::external(specifier)),
            "{} should be external",
            specifier
        );
    }
}

#[test]
fn test_alias_prefix_rewrite() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "src/components/button.tsx" => ""
    );
    let components_dir = tmp.root_join("src/components").to_string_lossy().to_string();
    let resolver = Resolver::new(ResolverConfig {
        alias: vec![("@components".to_string(), components_dir)],
        ..Default::default()
    });
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "@components/button", "src/index.ts"),
        Some("<root>/src/components/button.tsx".to_string())
    );
    // prefix matches must stop at a path boundary
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "@componentsx/button", "src/index.ts"),
        None
    );
}

#[test]
#[traced_test]
fn test_alias_cycle_is_not_found() {
    let tmp = test_tmpdir!("src/index.ts" => "");
    let resolver = Resolver::new(ResolverConfig {
        alias: vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ],
        ..Default::default()
    });
    assert_eq!(resolver.resolve("a", &tmp.root_join("src/index.ts")), None);
    assert!(logs_contain("alias chain for"));
}

#[test]
fn test_path_mappings() {
    let tmp = test_tmpdir!(
        "tsconfig.json" => r#"{
            "compilerOptions": {
                "baseUrl": ".",
                "paths": {
                    "@app/*": ["src/app/*", "src/generated/*"]
                }
            }
        }"#,
        "src/index.ts" => "",
        "src/generated/schema.ts" => ""
    );
    let json = crate::ResolverJSONConfig {
        tsconfig: Some("tsconfig.json".to_string()),
        ..Default::default()
    };
    let resolver = Resolver::new(ResolverConfig::from_json_config(json, tmp.root()).unwrap());
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "@app/schema", "src/index.ts"),
        Some("<root>/src/generated/schema.ts".to_string())
    );
}

#[test]
fn test_package_exports_conditions() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "node_modules/lib/package.json" => r#"{
            "name": "lib",
            "main": "./dist/lib.cjs",
            "exports": {
                ".": {
                    "require": "./dist/lib.cjs",
                    "import": "./dist/lib.mjs"
                },
                "./features/*": "./dist/features/*.js",
                "./internal/*": null
            }
        }"#,
        "node_modules/lib/dist/lib.cjs" => "",
        "node_modules/lib/dist/lib.mjs" => "",
        "node_modules/lib/dist/features/search.js" => "",
        "node_modules/lib/dist/internal/secret.js" => ""
    );
    let resolver = Resolver::new(ResolverConfig::default());
    let resolved = resolver.resolve("lib", &tmp.root_join("src/index.ts")).unwrap();
    assert_eq!(tmp.normalize(&resolved.path), "<root>/node_modules/lib/dist/lib.mjs");
    assert_eq!(resolved.module_kind, Some(ModuleKind::Module));

    assert_eq!(
        resolve_normalized(&tmp, &resolver, "lib/features/search", "src/index.ts"),
        Some("<root>/node_modules/lib/dist/features/search.js".to_string())
    );
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "lib/internal/secret", "src/index.ts"),
        None
    );

    let require_resolver = Resolver::new(ResolverConfig {
        condition_names: vec!["require".to_string()],
        ..Default::default()
    });
    assert_eq!(
        resolve_normalized(&tmp, &require_resolver, "lib", "src/index.ts"),
        Some("<root>/node_modules/lib/dist/lib.cjs".to_string())
    );
}

#[test]
fn test_package_main_fields_and_walk_upward() {
    let tmp = test_tmpdir!(
        "packages/app/src/deep/index.ts" => "",
        "node_modules/@scope/ui/package.json" => r#"{ "main": "./cjs/index.js", "module": "./esm/index.js" }"#,
        "node_modules/@scope/ui/cjs/index.js" => "",
        "node_modules/@scope/ui/esm/index.js" => "",
        "node_modules/@scope/ui/esm/button.js" => "",
        "node_modules/plain/index.js" => ""
    );
    let resolver = Resolver::new(ResolverConfig::default());
    let importer = "packages/app/src/deep/index.ts";
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "@scope/ui", importer),
        Some("<root>/node_modules/@scope/ui/esm/index.js".to_string())
    );
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "@scope/ui/esm/button", importer),
        Some("<root>/node_modules/@scope/ui/esm/button.js".to_string())
    );
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "plain", importer),
        Some("<root>/node_modules/plain/index.js".to_string())
    );
    assert_eq!(resolve_normalized(&tmp, &resolver, "absent", importer), None);
}

#[test]
fn test_custom_dependency_dir() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "web_modules/dep/index.js" => "",
        "node_modules/dep/index.js" => ""
    );
    let resolver = Resolver::new(ResolverConfig {
        dependency_dir: "web_modules".to_string(),
        ..Default::default()
    });
    assert_eq!(
        resolve_normalized(&tmp, &resolver, "dep", "src/index.ts"),
        Some("<root>/web_modules/dep/index.js".to_string())
    );
}

#[test]
fn test_malformed_manifest_is_ignored() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "node_modules/broken/package.json" => "{ not json",
        "node_modules/broken/index.js" => ""
    );
    let resolver = Resolver::new(ResolverConfig::default());
    let resolved = resolver.resolve("broken", &tmp.root_join("src/index.ts")).unwrap();
    assert_eq!(tmp.normalize(&resolved.path), "<root>/node_modules/broken/index.js");
    assert!(resolved.side_effects);
}

#[test]
fn test_side_effects_from_manifest() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "node_modules/pure/package.json" => r#"{ "sideEffects": false, "type": "commonjs" }"#,
        "node_modules/pure/index.js" => ""
    );
    let resolver = Resolver::new(ResolverConfig::default());
    let resolved = resolver.resolve("pure", &tmp.root_join("src/index.ts")).unwrap();
    assert!(!resolved.side_effects);
    assert_eq!(resolved.module_kind, Some(ModuleKind::CommonJs));
}

#[test]
fn test_session_stages_until_commit() {
    let tmp = test_tmpdir!(
        "src/index.ts" => "",
        "src/a.ts" => ""
    );
    let resolver = Resolver::new(ResolverConfig::default());
    let importer = tmp.root_join("src/index.ts");

    let session = resolver.session();
    assert!(session.resolve("./a", &importer).is_some());
    assert_eq!(session.staged_resolution_count(), 1);
    session.discard();
    assert_eq!(resolver.cached_resolution_count(), 0);

    let session = resolver.session();
    assert!(session.resolve("./a", &importer).is_some());
    session.commit();
    assert_eq!(resolver.cached_resolution_count(), 1);

    resolver.clear_cache();
    assert_eq!(resolver.cached_resolution_count(), 0);
}

#[test]
fn test_not_found_is_cached() {
    let tmp = test_tmpdir!("src/index.ts" => "");
    let resolver = Resolver::new(ResolverConfig::default());
    let importer = tmp.root_join("src/index.ts");
    assert_eq!(resolver.resolve("./late", &importer), None);

    // the negative result stays cached until the cache is cleared
    tmp.write_file("src/late.ts", "").unwrap();
    assert_eq!(resolver.resolve("./late", &importer), None);
    resolver.clear_cache();
    assert!(resolver.resolve("./late", &importer).is_some());
}

#[test]
fn test_resolve_from_dir() {
    let tmp = test_tmpdir!("src/main.ts" => "");
    let resolver = Resolver::new(ResolverConfig::default());
    let resolved = resolver
        .resolve_from_dir("./src/main", Path::new(tmp.root()))
        .unwrap();
    assert_eq!(tmp.normalize(&resolved.path), "<root>/src/main.ts");
}
