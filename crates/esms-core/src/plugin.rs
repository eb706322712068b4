//! Transform plugins applied to served modules.
//!
//! ## Example
//!
//! ```ignore
//! use esms_core::plugin::PatternPlugin;
//!
//! let banner = PatternPlugin::new("banner", r"^/src/.*\.js$", |_root, _path, code| {
//!     Some(format!("/* dev build */\n{code}"))
//! })?;
//! ```

#![allow(clippy::type_complexity)]

use regex_lite::Regex;
use std::path::Path;

use crate::error::Error;

/// A hook that rewrites a module body after the built-in transform.
pub trait Plugin: Send + Sync {
    /// Plugin name for logs.
    fn name(&self) -> &str;

    /// Whether this plugin applies to `public_path`.
    fn test(&self, public_path: &str) -> bool;

    /// Return `Some(code)` to replace the body, or `None` to pass it through.
    fn transform(&self, root: &Path, public_path: &str, code: &str) -> Option<String>;
}

/// A plugin built from a path pattern and a closure.
pub struct PatternPlugin {
    name: String,
    pattern: Regex,
    transform: Box<dyn Fn(&Path, &str, &str) -> Option<String> + Send + Sync>,
}

impl PatternPlugin {
    /// Build a plugin that runs `transform` on every public path matching `pattern`.
    pub fn new<F>(name: impl Into<String>, pattern: &str, transform: F) -> Result<Self, Error>
    where
        F: Fn(&Path, &str, &str) -> Option<String> + Send + Sync + 'static,
    {
        let name = name.into();
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::other(format!("invalid pattern for plugin {name}: {e}")))?;

        Ok(Self {
            name,
            pattern,
            transform: Box::new(transform),
        })
    }
}

impl std::fmt::Debug for PatternPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternPlugin")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

impl Plugin for PatternPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, public_path: &str) -> bool {
        self.pattern.is_match(public_path)
    }

    fn transform(&self, root: &Path, public_path: &str, code: &str) -> Option<String> {
        (self.transform)(root, public_path, code)
    }
}

/// Run every matching plugin over `code` in order.
pub fn apply_plugins(
    plugins: &[Box<dyn Plugin>],
    root: &Path,
    public_path: &str,
    code: String,
) -> String {
    plugins
        .iter()
        .filter(|plugin| plugin.test(public_path))
        .fold(code, |code, plugin| {
            match plugin.transform(root, public_path, &code) {
                Some(next) => {
                    tracing::debug!(plugin = plugin.name(), path = public_path, "plugin transformed module");
                    next
                }
                None => code,
            }
        })
}
