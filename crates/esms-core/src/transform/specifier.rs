//! Top-level specifier normalization.
//!
//! Rewrites the import, export-from and `require` surface of a module's
//! top-level statements into URLs the browser can load:
//!
//! - `@/<rest>` becomes `/src/<rest>`
//! - bare specifiers are resolved against `node_modules`
//! - unresolved bare imports become empty-object stubs
//! - `<kind> <pattern> = require('x')` becomes a default import plus a local alias
//!
//! Relative and absolute specifiers (stylesheets included) are left alone.
//! Nested statements are never visited.

use std::collections::HashSet;
use std::path::Path;

use swc_common::{SyntaxContext, DUMMY_SP};
use swc_ecma_ast::{
    Callee, Decl, DefaultDecl, Expr, Ident, ImportDecl, ImportDefaultSpecifier, ImportSpecifier,
    Lit, ModuleDecl, ModuleItem, ObjectLit, ObjectPatProp, Pat, Stmt, Str, VarDecl, VarDeclKind,
    VarDeclarator,
};

use crate::resolver::{resolve, Resolution};

/// What to do with one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Relative, absolute or URL specifier; emitted unchanged.
    Keep,
    /// Replace the literal with this URL path.
    Replace(String),
    /// Bare specifier with no file behind it.
    Unresolved,
}

/// Decide how a specifier is rewritten. Depends only on the specifier text
/// and the filesystem under `root`.
#[must_use]
pub fn classify(root: &Path, specifier: &str) -> Rewrite {
    if let Some(rest) = specifier.strip_prefix("@/") {
        return Rewrite::Replace(format!("/src/{rest}"));
    }

    if specifier.starts_with('.') || specifier.starts_with('/') || is_url(specifier) {
        return Rewrite::Keep;
    }

    match resolve(root, specifier) {
        Resolution::Resolved(path) => Rewrite::Replace(path),
        Resolution::Unresolved(reason) => {
            tracing::debug!(specifier, %reason, "unresolved bare specifier");
            Rewrite::Unresolved
        }
    }
}

fn is_url(specifier: &str) -> bool {
    specifier.contains("://") || specifier.starts_with("data:")
}

/// Rewrite every top-level item of `body`.
///
/// Returns the new body and whether the module has any value export.
pub fn normalize(root: &Path, body: Vec<ModuleItem>) -> (Vec<ModuleItem>, bool) {
    let mut normalizer = Normalizer {
        root,
        out: Vec::with_capacity(body.len()),
        aliases: HashSet::new(),
        has_exported: false,
    };

    for item in body {
        normalizer.item(item);
    }

    (normalizer.out, normalizer.has_exported)
}

struct Normalizer<'a> {
    root: &'a Path,
    out: Vec<ModuleItem>,
    aliases: HashSet<String>,
    has_exported: bool,
}

impl Normalizer<'_> {
    fn item(&mut self, item: ModuleItem) {
        match item {
            ModuleItem::ModuleDecl(ModuleDecl::Import(mut import)) => {
                match self.import(&mut import) {
                    Some(stubs) => self.out.extend(stubs),
                    None => self
                        .out
                        .push(ModuleItem::ModuleDecl(ModuleDecl::Import(import))),
                }
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(mut export)) => {
                if !export.type_only {
                    self.has_exported = true;
                    if let Some(src) = export.src.as_deref_mut() {
                        self.rewrite_export_source(src);
                    }
                }
                self.out
                    .push(ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(export)));
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportAll(mut export)) => {
                if !export.type_only {
                    self.has_exported = true;
                    self.rewrite_export_source(&mut export.src);
                }
                self.out
                    .push(ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export)));
            }
            ModuleItem::ModuleDecl(decl) => {
                if exports_value(&decl) {
                    self.has_exported = true;
                }
                self.out.push(ModuleItem::ModuleDecl(decl));
            }
            ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) => self.var(var),
            stmt @ ModuleItem::Stmt(_) => self.out.push(stmt),
        }
    }

    /// Returns replacement items when the import cannot be kept.
    fn import(&mut self, import: &mut ImportDecl) -> Option<Vec<ModuleItem>> {
        if import.type_only {
            return None;
        }

        match classify(self.root, &import.src.value) {
            Rewrite::Keep => None,
            Rewrite::Replace(path) => {
                set_source(&mut import.src, path);
                None
            }
            Rewrite::Unresolved => {
                if import.specifiers.is_empty() {
                    tracing::warn!(
                        specifier = %import.src.value,
                        "dropping side-effect import of unresolved module"
                    );
                    return Some(Vec::new());
                }

                let stubs = import
                    .specifiers
                    .iter()
                    .filter_map(|specifier| match specifier {
                        ImportSpecifier::Named(named) if named.is_type_only => None,
                        ImportSpecifier::Named(named) => Some(&named.local),
                        ImportSpecifier::Default(default) => Some(&default.local),
                        ImportSpecifier::Namespace(namespace) => Some(&namespace.local),
                    })
                    .map(|local| {
                        var_item(VarDeclKind::Var, Pat::Ident(local.clone().into()), empty_object())
                    })
                    .collect();
                Some(stubs)
            }
        }
    }

    fn rewrite_export_source(&self, src: &mut Str) {
        match classify(self.root, &src.value) {
            Rewrite::Replace(path) => set_source(src, path),
            Rewrite::Keep | Rewrite::Unresolved => {}
        }
    }

    fn var(&mut self, mut var: Box<VarDecl>) {
        let specifier = match var.decls.as_slice() {
            [decl] if !var.declare => decl
                .init
                .as_deref()
                .and_then(require_source)
                .map(|src| src.value.to_string()),
            _ => None,
        };

        let Some(specifier) = specifier else {
            self.out.push(ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))));
            return;
        };

        let source = match classify(self.root, &specifier) {
            Rewrite::Keep => specifier,
            Rewrite::Replace(path) => path,
            Rewrite::Unresolved => {
                if let [decl] = var.decls.as_mut_slice() {
                    decl.init = Some(Box::new(empty_object()));
                }
                self.out.push(ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))));
                return;
            }
        };

        if let [decl] = var.decls.as_mut_slice() {
            let alias = self.alias_for(&decl.name);
            self.out.push(default_import(&alias, source));
            decl.init = Some(Box::new(Expr::Ident(Ident::new_no_ctxt(
                alias.into(),
                DUMMY_SP,
            ))));
        }
        self.out.push(ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))));
    }

    /// `__` followed by the bound names, made unique within the module.
    fn alias_for(&mut self, pat: &Pat) -> String {
        let mut names = Vec::new();
        binding_names(pat, &mut names);

        let joined = if names.is_empty() {
            "require".to_string()
        } else {
            names.join("_")
        };
        let base: String = format!("__{joined}")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
            .collect();

        let mut alias = base.clone();
        let mut n = 1;
        while !self.aliases.insert(alias.clone()) {
            alias = format!("{base}_{n}");
            n += 1;
        }
        alias
    }
}

/// The string literal passed to a top-level `require(...)` call.
fn require_source(expr: &Expr) -> Option<&Str> {
    let Expr::Call(call) = expr else {
        return None;
    };
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    match &**callee {
        Expr::Ident(ident) if &*ident.sym == "require" => {}
        _ => return None,
    }

    let first = call.args.first()?;
    if first.spread.is_some() {
        return None;
    }
    match &*first.expr {
        Expr::Lit(Lit::Str(src)) => Some(src),
        _ => None,
    }
}

fn binding_names(pat: &Pat, out: &mut Vec<String>) {
    match pat {
        Pat::Ident(binding) => out.push(binding.id.sym.to_string()),
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => binding_names(&kv.value, out),
                    ObjectPatProp::Assign(assign) => out.push(assign.key.sym.to_string()),
                    ObjectPatProp::Rest(rest) => binding_names(&rest.arg, out),
                }
            }
        }
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                binding_names(elem, out);
            }
        }
        Pat::Rest(rest) => binding_names(&rest.arg, out),
        Pat::Assign(assign) => binding_names(&assign.left, out),
        _ => {}
    }
}

/// Whether a module declaration exports something that exists at runtime.
fn exports_value(decl: &ModuleDecl) -> bool {
    match decl {
        ModuleDecl::ExportDecl(export) => match &export.decl {
            Decl::TsInterface(_) | Decl::TsTypeAlias(_) => false,
            Decl::Class(class) => !class.declare,
            Decl::Fn(func) => !func.declare,
            Decl::Var(var) => !var.declare,
            Decl::TsEnum(ts_enum) => !ts_enum.declare,
            Decl::TsModule(ts_module) => !ts_module.declare,
            _ => true,
        },
        ModuleDecl::ExportDefaultDecl(export) => {
            !matches!(export.decl, DefaultDecl::TsInterfaceDecl(_))
        }
        ModuleDecl::ExportDefaultExpr(_) | ModuleDecl::TsExportAssignment(_) => true,
        ModuleDecl::ExportNamed(export) => !export.type_only,
        ModuleDecl::ExportAll(export) => !export.type_only,
        _ => false,
    }
}

fn set_source(src: &mut Str, path: String) {
    src.value = path.into();
    src.raw = None;
}

fn empty_object() -> Expr {
    Expr::Object(ObjectLit {
        span: DUMMY_SP,
        props: Vec::new(),
    })
}

fn var_item(kind: VarDeclKind, name: Pat, init: Expr) -> ModuleItem {
    ModuleItem::Stmt(Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name,
            init: Some(Box::new(init)),
            definite: false,
        }],
    }))))
}

fn default_import(alias: &str, source: String) -> ModuleItem {
    ModuleItem::ModuleDecl(ModuleDecl::Import(ImportDecl {
        span: DUMMY_SP,
        specifiers: vec![ImportSpecifier::Default(ImportDefaultSpecifier {
            span: DUMMY_SP,
            local: Ident::new_no_ctxt(alias.into(), DUMMY_SP),
        })],
        src: Box::new(Str {
            span: DUMMY_SP,
            value: source.into(),
            raw: None,
        }),
        type_only: false,
        with: None,
        phase: Default::default(),
    }))
}
