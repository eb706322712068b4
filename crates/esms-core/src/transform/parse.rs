//! SWC front end: syntax selection, parsing and printing.

use std::path::Path;

use swc_common::{comments::SingleThreadedComments, sync::Lrc, FileName, SourceMap, Spanned};
use swc_ecma_ast::{EsVersion, Module};
use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};

use crate::error::TransformError;

/// Source dialect, picked from the public path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
}

impl SourceKind {
    /// `.ts/.mts/.cts` are TypeScript, `.tsx` is TSX, `.jsx` is JSX; anything
    /// else parses as JavaScript.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("ts" | "mts" | "cts") => Self::TypeScript,
            Some("tsx") => Self::Tsx,
            Some("jsx") => Self::Jsx,
            _ => Self::JavaScript,
        }
    }

    #[must_use]
    pub fn is_typescript(self) -> bool {
        matches!(self, Self::TypeScript | Self::Tsx)
    }

    fn syntax(self) -> Syntax {
        match self {
            Self::TypeScript | Self::Tsx => Syntax::Typescript(TsSyntax {
                tsx: self == Self::Tsx,
                decorators: true,
                ..Default::default()
            }),
            Self::JavaScript | Self::Jsx => Syntax::Es(EsSyntax {
                jsx: self == Self::Jsx,
                decorators: true,
                ..Default::default()
            }),
        }
    }
}

/// The source map and comments a parsed module needs to be printed again.
pub struct SourceUnit {
    path: String,
    cm: Lrc<SourceMap>,
    comments: SingleThreadedComments,
}

impl SourceUnit {
    #[must_use]
    pub fn comments(&self) -> &SingleThreadedComments {
        &self.comments
    }

    /// Print `module` back to JavaScript.
    pub fn emit(&self, module: &Module) -> Result<String, TransformError> {
        let mut buf = Vec::new();

        {
            let writer = JsWriter::new(self.cm.clone(), "\n", &mut buf, None);
            let mut emitter = Emitter {
                cfg: swc_ecma_codegen::Config::default().with_target(EsVersion::EsNext),
                cm: self.cm.clone(),
                comments: Some(&self.comments),
                wr: writer,
            };

            emitter.emit_module(module).map_err(|e| TransformError::Emit {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        }

        String::from_utf8(buf).map_err(|e| TransformError::Emit {
            path: self.path.clone(),
            message: format!("invalid UTF-8 output: {e}"),
        })
    }
}

/// Parse `source` as an ES module.
///
/// Recoverable errors the parser collects along the way are fatal too; the
/// first one is reported.
pub fn parse_module(
    path: &str,
    source: &str,
    kind: SourceKind,
) -> Result<(SourceUnit, Module), TransformError> {
    let cm: Lrc<SourceMap> = Lrc::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(path.to_string())),
        source.to_string(),
    );
    let comments = SingleThreadedComments::default();

    let lexer = Lexer::new(
        kind.syntax(),
        EsVersion::EsNext,
        StringInput::from(&*fm),
        Some(&comments),
    );
    let mut parser = Parser::new_from(lexer);

    let parse_error = |e: &swc_ecma_parser::error::Error| {
        // Spans from the parser are never before the file start, but a dummy
        // span would be.
        let loc = cm.lookup_char_pos(e.span().lo.max(fm.start_pos));
        TransformError::Parse {
            path: path.to_string(),
            line: loc.line,
            column: loc.col_display + 1,
            message: e.kind().msg().into_owned(),
        }
    };

    let module = parser.parse_module().map_err(|e| parse_error(&e))?;
    if let Some(e) = parser.take_errors().first() {
        return Err(parse_error(e));
    }

    let unit = SourceUnit {
        path: path.to_string(),
        cm: cm.clone(),
        comments,
    };
    Ok((unit, module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_path() {
        assert_eq!(SourceKind::from_path("/src/app.ts"), SourceKind::TypeScript);
        assert_eq!(SourceKind::from_path("/src/app.MTS"), SourceKind::TypeScript);
        assert_eq!(SourceKind::from_path("/src/view.tsx"), SourceKind::Tsx);
        assert_eq!(SourceKind::from_path("/src/view.jsx"), SourceKind::Jsx);
        assert_eq!(SourceKind::from_path("/src/app.js"), SourceKind::JavaScript);
        assert_eq!(SourceKind::from_path("/src/noext"), SourceKind::JavaScript);
        assert!(SourceKind::Tsx.is_typescript());
        assert!(!SourceKind::Jsx.is_typescript());
    }

    #[test]
    fn test_parse_and_emit() {
        let (unit, module) =
            parse_module("/a.js", "const answer = 42;\n", SourceKind::JavaScript).unwrap();
        let code = unit.emit(&module).unwrap();
        assert!(code.contains("const answer = 42;"));
    }

    #[test]
    fn test_parse_typescript_syntax() {
        let source = "interface A { x: number }\nconst a: A = { x: 1 };\n";
        assert!(parse_module("/a.ts", source, SourceKind::TypeScript).is_ok());
        assert!(parse_module("/a.js", source, SourceKind::JavaScript).is_err());
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse_module("/src/bad.js", "const a = 1;\nconst s = 'oops;\n", SourceKind::JavaScript)
            .err()
            .unwrap();
        match err {
            TransformError::Parse { path, line, .. } => {
                assert_eq!(path, "/src/bad.js");
                assert_eq!(line, 2);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
