//! Bare-specifier resolution against `<root>/node_modules`.
//!
//! Supports:
//! - Subpath specifiers (`pkg/sub/file`) with `.ts`, `.js`, `.json` probing
//! - Bare package names via `package.json` (`module` > `main` > `index.js`)
//! - Package directories named by a subpath (`@scope/pkg`)
//!
//! Relative and absolute specifiers never reach this module. Results are
//! computed from the filesystem on every call and never cached.

use serde::Deserialize;
use std::path::Path;

/// Extensions probed for subpath specifiers, in order.
pub const SUBPATH_EXTENSIONS: &[&str] = &[".ts", ".js", ".json"];

/// Entry used when a manifest names neither `module` nor `main`.
pub const DEFAULT_ENTRY: &str = "index.js";

/// Reason codes for unresolved specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReasonCode {
    /// Neither the subpath nor any probed extension exists.
    NotFound,
    /// `node_modules/<pkg>/package.json` is absent.
    PackageJsonNotFound,
    /// The manifest exists but is not valid JSON.
    PackageJsonInvalid,
    /// The manifest entry points at a file that does not exist.
    EntryNotFound,
}

impl std::fmt::Display for ResolveReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "NOT_FOUND",
            Self::PackageJsonNotFound => "PACKAGE_JSON_NOT_FOUND",
            Self::PackageJsonInvalid => "PACKAGE_JSON_INVALID",
            Self::EntryNotFound => "ENTRY_NOT_FOUND",
        };
        write!(f, "{s}")
    }
}

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Absolute URL path the server can serve, e.g. `/node_modules/pkg/index.js`.
    Resolved(String),
    /// The specifier does not map to a file on disk.
    Unresolved(ResolveReasonCode),
}

impl Resolution {
    /// The resolved URL path, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Resolved(url) => Some(url),
            Self::Unresolved(_) => None,
        }
    }

    #[must_use]
    pub fn into_url(self) -> Option<String> {
        match self {
            Self::Resolved(url) => Some(url),
            Self::Unresolved(_) => None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// The two manifest fields the resolver consults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageDescriptor {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
}

impl PackageDescriptor {
    /// Entry file relative to the package directory.
    ///
    /// Empty fields count as absent and a leading `./` is dropped so the
    /// resulting URL has no `.` segments.
    #[must_use]
    pub fn entry(&self) -> &str {
        fn pick(field: &Option<String>) -> Option<&str> {
            field
                .as_deref()
                .map(|s| s.trim_start_matches("./"))
                .filter(|s| !s.is_empty())
        }

        pick(&self.module)
            .or_else(|| pick(&self.main))
            .unwrap_or(DEFAULT_ENTRY)
    }
}

/// Resolve a bare or subpath specifier against `root/node_modules`.
#[must_use]
pub fn resolve(root: &Path, specifier: &str) -> Resolution {
    let node_modules = root.join("node_modules");
    let specifier = specifier.trim_end_matches('/');

    if specifier.contains('/') {
        let candidate = node_modules.join(specifier);
        if candidate.is_file() {
            return Resolution::Resolved(format!("/node_modules/{specifier}"));
        }

        for ext in SUBPATH_EXTENSIONS {
            let with_ext = node_modules.join(format!("{specifier}{ext}"));
            if with_ext.is_file() {
                return Resolution::Resolved(format!("/node_modules/{specifier}{ext}"));
            }
        }

        // A subpath can still name a package directory (`@scope/pkg`).
        if !node_modules.join(specifier).join("package.json").is_file() {
            tracing::trace!(specifier, "subpath not found in node_modules");
            return Resolution::Unresolved(ResolveReasonCode::NotFound);
        }
    }

    resolve_package(&node_modules, specifier)
}

/// Resolve a package directory through its manifest.
fn resolve_package(node_modules: &Path, name: &str) -> Resolution {
    let pkg_dir = node_modules.join(name);
    let manifest = pkg_dir.join("package.json");

    let Ok(content) = std::fs::read_to_string(&manifest) else {
        return Resolution::Unresolved(ResolveReasonCode::PackageJsonNotFound);
    };

    let descriptor: PackageDescriptor = match serde_json::from_str(&content) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(
                manifest = %manifest.display(),
                error = %e,
                "invalid package.json"
            );
            return Resolution::Unresolved(ResolveReasonCode::PackageJsonInvalid);
        }
    };

    let entry = descriptor.entry();
    if pkg_dir.join(entry).is_file() {
        Resolution::Resolved(format!("/node_modules/{name}/{entry}"))
    } else {
        tracing::debug!(package = name, entry, "package entry not found");
        Resolution::Unresolved(ResolveReasonCode::EntryNotFound)
    }
}
