use std::path::PathBuf;
use thiserror::Error;

/// Core error type for esms operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project root not found: {}", root.display())]
    RootNotFound { root: PathBuf },

    #[error("Failed to read config at {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Failure of a single transform call.
///
/// Resolution problems never show up here; they are absorbed by the
/// stub-or-drop policy inside the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The source text is not syntactically valid.
    #[error("Failed to parse {path}:{line}:{column}: {message}")]
    Parse {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// The rewritten module could not be printed.
    #[error("Failed to emit {path}: {message}")]
    Emit { path: String, message: String },
}

impl TransformError {
    /// Error code, stable across releases.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "TRANSFORM_PARSE_ERROR",
            Self::Emit { .. } => "TRANSFORM_EMIT_ERROR",
        }
    }
}
