//! On-the-fly rewriting of a source file into browser-loadable ESM.
//!
//! The pipeline runs in fixed order:
//!
//! 1. Specifier normalization over top-level statements ([`specifier`])
//! 2. TypeScript type stripping (TypeScript sources only)
//! 3. Identifier usage counting, then dead-import pruning ([`usage`])
//! 4. CommonJS wrapping when the module exports nothing
//!
//! Each call is independent: no state survives it and nothing is cached.

pub mod parse;
pub mod specifier;
pub mod usage;

use std::path::Path;

use swc_common::{Globals, Mark, GLOBALS};
use swc_ecma_ast::{Module, ModuleItem, Program};
use swc_ecma_transforms_base::{fixer::fixer, resolver};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::FoldWith;

use crate::error::TransformError;
use parse::{parse_module, SourceKind};
use usage::IdentifierUsage;

/// Result of one transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    /// Rewritten module source.
    pub code: String,
    /// Whether the source had any value export of its own. When false the
    /// code has been wrapped so `module.exports` surfaces as the default export.
    pub has_exported: bool,
}

/// Rewrite `source`, requested as `public_path`, into ESM with resolved
/// specifiers.
///
/// # Errors
///
/// Returns [`TransformError::Parse`] when the source does not parse. Unresolved
/// specifiers are never errors.
pub fn transform(
    root: &Path,
    public_path: &str,
    source: &str,
) -> Result<TransformOutput, TransformError> {
    let kind = SourceKind::from_path(public_path);
    let (unit, module) = parse_module(public_path, source, kind)?;

    let (module, has_exported) = GLOBALS.set(&Globals::default(), || {
        let mut module = module;
        let (body, has_exported) = specifier::normalize(root, std::mem::take(&mut module.body));
        module.body = body;

        if kind.is_typescript() {
            module = strip_types(module);
        }

        let usage = IdentifierUsage::collect(&module);
        usage.prune_imports(&mut module);

        let module = module.fold_with(&mut fixer(Some(unit.comments())));
        (module, has_exported)
    });

    let code = unit.emit(&module)?;
    tracing::trace!(path = public_path, has_exported, "transformed module");

    let code = if has_exported {
        code
    } else {
        wrap_commonjs(&code)
    };

    Ok(TransformOutput { code, has_exported })
}

fn strip_types(module: Module) -> Module {
    let unresolved_mark = Mark::new();
    let top_level_mark = Mark::new();

    let program = Program::Module(module)
        .fold_with(&mut resolver(unresolved_mark, top_level_mark, true))
        .fold_with(&mut strip(unresolved_mark, top_level_mark));

    match program {
        Program::Module(module) => module,
        Program::Script(script) => Module {
            span: script.span,
            body: script.body.into_iter().map(ModuleItem::Stmt).collect(),
            shebang: script.shebang,
        },
    }
}

/// Expose `module.exports` / `exports.default` as the ESM default export.
fn wrap_commonjs(code: &str) -> String {
    format!(
        "var exports = {{}};\nvar module = {{exports}};\n{code}\nexport default exports.default || module.exports;\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn project() -> TempDir {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main":"index.js"}"#).unwrap();
        fs::write(pkg.join("index.js"), "export default 1;").unwrap();
        dir
    }

    fn run(dir: &TempDir, path: &str, source: &str) -> TransformOutput {
        transform(dir.path(), path, source).unwrap()
    }

    #[test]
    fn test_alias_import() {
        let dir = project();
        let out = run(&dir, "/src/main.js", "import x from '@/a/b';\nexport default x;\n");
        assert!(out.code.contains("from \"/src/a/b\""), "{}", out.code);
        assert!(out.has_exported);
    }

    #[test]
    fn test_bare_import_resolved() {
        let dir = project();
        let out = run(&dir, "/src/main.js", "import p from 'pkg';\nexport const v = p;\n");
        assert!(out.code.contains("from \"/node_modules/pkg/index.js\""), "{}", out.code);
    }

    #[test]
    fn test_unresolved_import_becomes_stub() {
        let dir = project();
        let out = run(
            &dir,
            "/src/main.js",
            "import { a, b } from 'unresolved-pkg';\nexport const sum = a + b;\n",
        );
        assert!(!out.code.contains("import"), "{}", out.code);
        assert!(out.code.contains("var a = {};"), "{}", out.code);
        assert!(out.code.contains("var b = {};"), "{}", out.code);
    }

    #[test]
    fn test_unresolved_default_and_namespace_stubs() {
        let dir = project();
        let out = run(
            &dir,
            "/src/main.js",
            "import React from 'react';\nimport * as fs from 'fs';\nexport default [React, fs];\n",
        );
        assert!(out.code.contains("var React = {};"), "{}", out.code);
        assert!(out.code.contains("var fs = {};"), "{}", out.code);
    }

    #[test]
    fn test_unresolved_side_effect_import_dropped() {
        let dir = project();
        let out = run(&dir, "/src/main.js", "import 'polyfill';\nexport default 1;\n");
        assert!(!out.code.contains("polyfill"), "{}", out.code);
    }

    #[test]
    fn test_relative_and_stylesheet_untouched() {
        let dir = project();
        let out = run(
            &dir,
            "/src/main.js",
            "import \"./app.css\";\nimport m from \"./m.js\";\nexport default m;\n",
        );
        assert!(out.code.contains("import \"./app.css\";"), "{}", out.code);
        assert!(out.code.contains("from \"./m.js\""), "{}", out.code);
    }

    #[test]
    fn test_prunes_unreferenced_named_import() {
        let dir = project();
        let out = run(
            &dir,
            "/src/main.js",
            "import { a, b } from \"./m\";\nexport default a;\n",
        );
        assert!(out.code.contains("import { a } from \"./m\";"), "{}", out.code);
    }

    #[test]
    fn test_removes_fully_unused_import() {
        let dir = project();
        let out = run(&dir, "/src/main.js", "import { a } from './m';\nexport default 1;\n");
        assert!(!out.code.contains("./m"), "{}", out.code);
    }

    #[test]
    fn test_require_destructuring() {
        let dir = project();
        let out = run(
            &dir,
            "/src/main.js",
            "const { a, b } = require('./m');\nexport default a + b;\n",
        );
        assert!(out.code.contains("import __a_b from \"./m\";"), "{}", out.code);
        assert!(out.code.contains("= __a_b;"), "{}", out.code);
    }

    #[test]
    fn test_require_identifier_resolved() {
        let dir = project();
        let out = run(&dir, "/src/main.js", "let p = require('pkg');\nexport default p;\n");
        assert!(
            out.code.contains("import __p from \"/node_modules/pkg/index.js\";"),
            "{}",
            out.code
        );
        assert!(out.code.contains("let p = __p;"), "{}", out.code);
    }

    #[test]
    fn test_require_unresolved_becomes_empty_object() {
        let dir = project();
        let out = run(&dir, "/src/main.js", "const x = require('nope');\nexport default x;\n");
        assert!(out.code.contains("const x = {};"), "{}", out.code);
        assert!(!out.code.contains("require"), "{}", out.code);
    }

    #[test]
    fn test_nested_require_untouched() {
        let dir = project();
        let out = run(
            &dir,
            "/src/main.js",
            "export function load() {\n    const m = require('pkg');\n    return m;\n}\n",
        );
        assert!(out.code.contains("require(\"pkg\")") || out.code.contains("require('pkg')"));
        assert!(!out.code.contains("import"), "{}", out.code);
    }

    #[test]
    fn test_require_duplicate_aliases_are_unique() {
        let dir = project();
        let out = run(
            &dir,
            "/src/main.js",
            "var x = require('./a');\nvar x = require('./b');\nexport default x;\n",
        );
        assert!(out.code.contains("import __x from \"./a\";"), "{}", out.code);
        assert!(out.code.contains("import __x_1 from \"./b\";"), "{}", out.code);
    }

    #[test]
    fn test_export_from_rewritten() {
        let dir = project();
        let out = run(
            &dir,
            "/src/index.js",
            "export { default as p } from 'pkg';\nexport * from '@/util';\nexport * from 'missing';\n",
        );
        assert!(out.code.contains("from \"/node_modules/pkg/index.js\""), "{}", out.code);
        assert!(out.code.contains("from \"/src/util\""), "{}", out.code);
        assert!(out.code.contains("missing"), "{}", out.code);
        assert!(out.has_exported);
    }

    #[test]
    fn test_commonjs_wrapped() {
        let dir = project();
        let out = run(&dir, "/src/legacy.js", "module.exports = { x: 1 };\n");
        assert!(!out.has_exported);
        assert!(out.code.starts_with("var exports = {};\nvar module = {exports};\n"));
        assert!(out
            .code
            .ends_with("\nexport default exports.default || module.exports;\n"));
        assert!(out.code.contains("module.exports = {"), "{}", out.code);

        let compact: String = out.code.split_whitespace().collect();
        assert_eq!(
            compact,
            "varexports={};varmodule={exports};module.exports={x:1};\
             exportdefaultexports.default||module.exports;"
        );
    }

    #[test]
    fn test_reexport_does_not_keep_import_alive() {
        let dir = project();
        let out = run(
            &dir,
            "/src/index.js",
            "import a from \"./a\";\nexport { a as default } from \"./b\";\n",
        );
        assert!(!out.code.contains("./a"), "{}", out.code);
        assert!(out.code.contains("from \"./b\""), "{}", out.code);
        assert!(out.has_exported);
    }

    #[test]
    fn test_typescript_types_stripped() {
        let dir = project();
        let out = run(
            &dir,
            "/src/app.ts",
            "import type { Opts } from './types';\nimport { make } from \"./make\";\ninterface Local { n: number }\nexport const v: Local = make({} as Opts);\n",
        );
        assert!(!out.code.contains("interface"), "{}", out.code);
        assert!(!out.code.contains("./types"), "{}", out.code);
        assert!(out.code.contains("import { make } from \"./make\";"), "{}", out.code);
        assert!(out.has_exported);
    }

    #[test]
    fn test_type_only_exports_do_not_count() {
        let dir = project();
        let out = run(
            &dir,
            "/src/types.ts",
            "export interface A { x: number }\nexport type B = string;\n",
        );
        assert!(!out.has_exported);
        assert!(out.code.starts_with("var exports = {};"));
    }

    #[test]
    fn test_export_default_function_counts() {
        let dir = project();
        let out = run(&dir, "/src/f.js", "export default function f() {}\n");
        assert!(out.has_exported);
        assert!(!out.code.contains("module.exports"));
    }

    #[test]
    fn test_deterministic() {
        let dir = project();
        let source = "import p from 'pkg';\nimport { q } from 'gone';\nconst { a } = require('./a');\nconsole.log(p, q, a);\n";
        let first = run(&dir, "/src/main.js", source);
        let second = run(&dir, "/src/main.js", source);
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_error() {
        let dir = project();
        let err = transform(dir.path(), "/src/bad.js", "const s = 'unterminated;\n").unwrap_err();
        match err {
            TransformError::Parse { path, line, .. } => {
                assert_eq!(path, "/src/bad.js");
                assert_eq!(line, 1);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
