//! Request path → served module.
//!
//! Maps one GET path onto the project root and decides what the HTTP layer
//! answers:
//!
//! ```text
//! GET /src/app          → probe .ts/.js → transform → 200 application/javascript
//! GET /node_modules/pkg → manifest lookup → transform → 200 (long-lived cache)
//! GET /data.json        → 200 application/json, or `export default` for <script>
//! GET /index.html       → fall through to static files
//! ```
//!
//! Nothing is cached between requests.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::config::EsmsOptions;
use crate::error::Error;
use crate::plugin::{apply_plugins, Plugin};
use crate::resolver::{resolve, Resolution};
use crate::transform::transform;

/// Extensions probed when a request path has no file behind it.
pub const PROBE_EXTENSIONS: &[&str] = &[".ts", ".js"];

/// Extensions handled here; everything else is left to static serving.
pub const MODULE_EXTENSIONS: &[&str] = &["css", "js", "ts", "json"];

/// Cache policy for files under `/node_modules/`.
pub const CACHE_NODE_MODULES: &str = "max-age=100000";

/// Cache policy for project sources.
pub const CACHE_NONE: &str = "no-cache, no-store, must-revalidate, max-age=0";

pub const CONTENT_TYPE_JS: &str = "application/javascript; charset=UTF-8";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";
pub const CONTENT_TYPE_CSS: &str = "text/css; charset=UTF-8";

/// The parts of an HTTP request that affect the answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRequest {
    /// URL path, without query string.
    pub path: String,
    /// `If-Modified-Since` header value.
    pub if_modified_since: Option<String>,
    /// `Sec-Fetch-Dest` header value.
    pub sec_fetch_dest: Option<String>,
}

impl ModuleRequest {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_if_modified_since(mut self, value: impl Into<String>) -> Self {
        self.if_modified_since = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_sec_fetch_dest(mut self, value: impl Into<String>) -> Self {
        self.sec_fetch_dest = Some(value.into());
        self
    }

    fn wants_script(&self) -> bool {
        self.sec_fetch_dest
            .as_deref()
            .is_some_and(|dest| dest.eq_ignore_ascii_case("script"))
    }
}

/// A module body ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedModule {
    pub body: String,
    pub content_type: &'static str,
    pub cache_control: &'static str,
    /// File modification time as an HTTP date.
    pub last_modified: Option<String>,
    /// Public path of the file actually served, after probing.
    pub public_path: String,
}

/// What to answer for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    Module(ServedModule),
    NotModified,
    NotFound,
    /// Not a module; serve it as a static file.
    Fallthrough,
}

/// Serves the modules of one project root.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct ModuleServer {
    root: PathBuf,
    options: EsmsOptions,
    plugins: Vec<Box<dyn Plugin>>,
}

impl std::fmt::Debug for ModuleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        f.debug_struct("ModuleServer")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("plugins", &plugins)
            .finish()
    }
}

impl ModuleServer {
    /// Create a server for `root`, which must be an existing directory.
    pub fn new(root: impl Into<PathBuf>, options: EsmsOptions) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::RootNotFound { root });
        }

        Ok(Self {
            root,
            options,
            plugins: Vec::new(),
        })
    }

    /// Register a transform plugin. Plugins run in registration order.
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn options(&self) -> &EsmsOptions {
        &self.options
    }

    /// Answer one request.
    ///
    /// Performs blocking filesystem reads and parsing; async callers should
    /// run it on a blocking thread.
    ///
    /// # Errors
    ///
    /// [`Error::Transform`] when a module does not parse, [`Error::Io`] when
    /// the file cannot be read.
    pub fn load(&self, request: &ModuleRequest) -> Result<ServeOutcome, Error> {
        let path = request.path.as_str();
        if path.split('/').any(|segment| segment == "..") {
            tracing::warn!(path, "rejecting path outside the project root");
            return Ok(ServeOutcome::NotFound);
        }

        let Some((file, public_path)) = self.locate(path) else {
            tracing::warn!("[{path}] not found");
            return Ok(ServeOutcome::NotFound);
        };

        let ext = Path::new(&public_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !file.is_file() || !MODULE_EXTENSIONS.contains(&ext.as_str()) {
            return Ok(ServeOutcome::Fallthrough);
        }

        let modified = std::fs::metadata(&file)?
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);

        if let (Some(modified), Some(since)) = (
            modified,
            request.if_modified_since.as_deref().and_then(parse_http_date),
        ) {
            if modified.timestamp() <= since.timestamp() {
                return Ok(ServeOutcome::NotModified);
            }
        }

        let source = std::fs::read_to_string(&file)?;
        let (body, content_type) = match ext.as_str() {
            "js" | "ts" => {
                let output = transform(&self.root, &public_path, &source)?;
                (output.code, CONTENT_TYPE_JS)
            }
            "json" if request.wants_script() => {
                (format!("export default {};\n", source.trim()), CONTENT_TYPE_JS)
            }
            "json" => (source, CONTENT_TYPE_JSON),
            _ => (source, CONTENT_TYPE_CSS),
        };

        let body = apply_plugins(&self.plugins, &self.root, &public_path, body);

        let cache_control = if public_path.starts_with("/node_modules/") {
            CACHE_NODE_MODULES
        } else {
            CACHE_NONE
        };

        tracing::debug!(path, public_path = %public_path, content_type, "serving module");

        Ok(ServeOutcome::Module(ServedModule {
            body,
            content_type,
            cache_control,
            last_modified: modified.map(format_http_date),
            public_path,
        }))
    }

    /// Find the file behind `path`: exact, then probed, then through the
    /// package resolver for `/node_modules/` paths.
    fn locate(&self, path: &str) -> Option<(PathBuf, String)> {
        let rel = path.trim_start_matches('/');
        let exact = self.root.join(rel);
        if exact.is_file() {
            return Some((exact, path.to_string()));
        }

        for ext in PROBE_EXTENSIONS {
            let candidate = self.root.join(format!("{rel}{ext}"));
            if candidate.is_file() {
                return Some((candidate, format!("{path}{ext}")));
            }
        }

        if let Some(specifier) = path.strip_prefix("/node_modules/") {
            if let Resolution::Resolved(url) = resolve(&self.root, specifier) {
                let file = self.root.join(url.trim_start_matches('/'));
                return Some((file, url));
            }
        }

        // Directories exist but are not modules.
        exact.exists().then(|| (exact, path.to_string()))
    }
}

/// Parse an HTTP date (`Tue, 15 Nov 1994 08:12:31 GMT`).
#[must_use]
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Format a timestamp as an HTTP date.
#[must_use]
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
