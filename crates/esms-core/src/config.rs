//! Server options and config file loading.
//!
//! Looks for `esms.config.json`, `esms.config.ts` or `esms.config.js` in the
//! project root. JSON files are deserialized directly; script files are
//! parsed and the object literal they export is read as JSON:
//!
//! ```js
//! export default {
//!   port: 8080,
//!   host: '0.0.0.0',
//!   index: 'app.html',
//! };
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use swc_ecma_ast::{
    AssignOp, AssignTarget, Expr, Lit, MemberProp, ModuleDecl, ModuleItem, Prop, PropName,
    PropOrSpread, SimpleAssignTarget, Stmt, UnaryOp,
};

use crate::error::Error;
use crate::transform::parse::{parse_module, SourceKind};

/// Config file names in priority order.
pub const CONFIG_FILES: &[&str] = &["esms.config.json", "esms.config.ts", "esms.config.js"];

/// Options for serving a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsmsOptions {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind.
    pub host: String,
    /// Page `/` redirects to.
    pub index: String,
}

impl Default for EsmsOptions {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "127.0.0.1".to_string(),
            index: "index.html".to_string(),
        }
    }
}

impl EsmsOptions {
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// `host:port`, as passed to a listener.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options set by a config file. Absent keys leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub index: Option<String>,
}

impl ConfigFile {
    /// Layer this file's values over `options`.
    #[must_use]
    pub fn apply(&self, mut options: EsmsOptions) -> EsmsOptions {
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(host) = &self.host {
            options.host.clone_from(host);
        }
        if let Some(index) = &self.index {
            options.index.clone_from(index);
        }
        options
    }
}

/// Find a config file in `root`.
#[must_use]
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

/// Load the project config.
///
/// `explicit` (relative to `root` unless absolute) bypasses discovery and must
/// exist. Returns `None` when no config file is found.
pub fn load_config(
    root: &Path,
    explicit: Option<&Path>,
) -> Result<Option<(PathBuf, ConfigFile)>, Error> {
    let path = match explicit {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => root.join(p),
        None => match find_config_file(root) {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    let source = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;

    let config = parse_config(&path, &source)?;
    tracing::debug!(path = %path.display(), ?config, "loaded config");
    Ok(Some((path, config)))
}

/// Parse config text; the format follows the file extension.
pub fn parse_config(path: &Path, source: &str) -> Result<ConfigFile, Error> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let value = if is_json {
        serde_json::from_str(source).map_err(|e| config_error(path, e))?
    } else {
        script_config_value(path, source)?
    };

    serde_json::from_value(value).map_err(|e| config_error(path, e))
}

fn config_error(path: &Path, message: impl ToString) -> Error {
    Error::ConfigParse {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// The object exported by a TS/JS config, converted to JSON.
fn script_config_value(path: &Path, source: &str) -> Result<Value, Error> {
    let name = path.display().to_string();
    let (_, module) = parse_module(&name, source, SourceKind::from_path(&name))
        .map_err(|e| config_error(path, e))?;

    let exported = module
        .body
        .iter()
        .rev()
        .find_map(exported_expr)
        .ok_or_else(|| {
            config_error(path, "no `export default { ... }` or `module.exports = { ... }` found")
        })?;

    match unwrap_config_expr(exported) {
        expr @ Expr::Object(_) => Ok(literal_to_json(expr, "").unwrap_or(Value::Null)),
        _ => Err(config_error(path, "exported config is not an object literal")),
    }
}

/// `export default <expr>` or `module.exports = <expr>`.
fn exported_expr(item: &ModuleItem) -> Option<&Expr> {
    match item {
        ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(export)) => Some(&*export.expr),
        ModuleItem::Stmt(Stmt::Expr(stmt)) => {
            let Expr::Assign(assign) = &*stmt.expr else {
                return None;
            };
            if assign.op != AssignOp::Assign {
                return None;
            }
            let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left else {
                return None;
            };
            let is_module_exports = matches!(&*member.obj, Expr::Ident(obj) if &*obj.sym == "module")
                && matches!(&member.prop, MemberProp::Ident(prop) if &*prop.sym == "exports");
            is_module_exports.then_some(&*assign.right)
        }
        _ => None,
    }
}

/// Look through a `defineConfig(...)` wrapper around the exported object.
fn unwrap_config_expr(expr: &Expr) -> &Expr {
    match strip_wrappers(expr) {
        Expr::Call(call) => match call.args.first() {
            Some(arg) if arg.spread.is_none() => strip_wrappers(&arg.expr),
            _ => expr,
        },
        other => other,
    }
}

/// Look through parentheses and type assertions.
fn strip_wrappers(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => strip_wrappers(&paren.expr),
        Expr::TsAs(ts_as) => strip_wrappers(&ts_as.expr),
        Expr::TsSatisfies(satisfies) => strip_wrappers(&satisfies.expr),
        Expr::TsConstAssertion(assertion) => strip_wrappers(&assertion.expr),
        _ => expr,
    }
}

/// Convert a literal expression to JSON. Non-literal values are skipped.
fn literal_to_json(expr: &Expr, key: &str) -> Option<Value> {
    match strip_wrappers(expr) {
        Expr::Lit(Lit::Str(s)) => Some(Value::String(s.value.to_string())),
        Expr::Lit(Lit::Bool(b)) => Some(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),
        Expr::Lit(Lit::Num(n)) => Some(number_to_json(n.value)),
        Expr::Unary(unary) if unary.op == UnaryOp::Minus => match &*unary.arg {
            Expr::Lit(Lit::Num(n)) => Some(number_to_json(-n.value)),
            _ => skip(key),
        },
        Expr::Tpl(tpl) if tpl.exprs.is_empty() => tpl
            .quasis
            .first()
            .and_then(|q| q.cooked.as_ref())
            .map(|cooked| Value::String(cooked.to_string())),
        Expr::Array(array) => Some(Value::Array(
            array
                .elems
                .iter()
                .flatten()
                .filter(|elem| elem.spread.is_none())
                .filter_map(|elem| literal_to_json(&elem.expr, key))
                .collect(),
        )),
        Expr::Object(object) => {
            let mut map = Map::new();
            for prop in &object.props {
                let PropOrSpread::Prop(prop) = prop else {
                    warn_skipped(key);
                    continue;
                };
                let Prop::KeyValue(kv) = &**prop else {
                    warn_skipped(key);
                    continue;
                };
                let Some(name) = prop_name(&kv.key) else {
                    warn_skipped(key);
                    continue;
                };
                let path = if key.is_empty() {
                    name.clone()
                } else {
                    format!("{key}.{name}")
                };
                if let Some(value) = literal_to_json(&kv.value, &path) {
                    map.insert(name, value);
                }
            }
            Some(Value::Object(map))
        }
        _ => skip(key),
    }
}

fn prop_name(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(ident) => Some(ident.sym.to_string()),
        PropName::Str(s) => Some(s.value.to_string()),
        PropName::Num(n) => Some(n.value.to_string()),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < (1_u64 << 53) as f64 {
        #[allow(clippy::cast_possible_truncation)]
        let int = n as i64;
        Value::from(int)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn skip(key: &str) -> Option<Value> {
    warn_skipped(key);
    None
}

fn warn_skipped(key: &str) {
    tracing::warn!(key, "skipping non-literal config value");
}
