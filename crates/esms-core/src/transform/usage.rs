//! Identifier usage counting and dead-import pruning.
//!
//! Counting walks the whole tree once and finishes before any import is
//! touched, so pruning always sees final counts.

use std::collections::HashMap;

use swc_ecma_ast::{
    Ident, ImportDecl, ImportSpecifier, Module, ModuleDecl, ModuleItem, NamedExport,
};
use swc_ecma_visit::{Visit, VisitWith};

/// Reference count per identifier name for one module.
#[derive(Debug, Default)]
pub struct IdentifierUsage {
    counts: HashMap<String, usize>,
}

impl IdentifierUsage {
    /// Count every identifier in `module` outside import declarations.
    #[must_use]
    pub fn collect(module: &Module) -> Self {
        let mut usage = Self::default();
        module.visit_with(&mut usage);
        usage
    }

    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Drop import bindings that are never referenced.
    ///
    /// An import that bound names and binds none afterwards is removed.
    /// Side-effect imports are left alone.
    pub fn prune_imports(&self, module: &mut Module) {
        module.body.retain_mut(|item| {
            let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = item else {
                return true;
            };
            if import.specifiers.is_empty() {
                return true;
            }

            import
                .specifiers
                .retain(|specifier| self.count(&local_name(specifier).sym) > 0);

            if import.specifiers.is_empty() {
                tracing::trace!(specifier = %import.src.value, "removing unused import");
                false
            } else {
                true
            }
        });
    }
}

fn local_name(specifier: &ImportSpecifier) -> &Ident {
    match specifier {
        ImportSpecifier::Named(named) => &named.local,
        ImportSpecifier::Default(default) => &default.local,
        ImportSpecifier::Namespace(namespace) => &namespace.local,
    }
}

impl Visit for IdentifierUsage {
    // The bound names themselves are not references.
    fn visit_import_decl(&mut self, _: &ImportDecl) {}

    // `export { a } from './m'` names the other module's binding, not a local one.
    fn visit_named_export(&mut self, export: &NamedExport) {
        if export.src.is_none() {
            export.visit_children_with(self);
        }
    }

    fn visit_ident(&mut self, ident: &Ident) {
        *self.counts.entry(ident.sym.to_string()).or_default() += 1;
    }
}
