use thiserror::Error;

/// Errors surfaced by the JSON engine.
///
/// There is no "path not found" variant: a path that does not resolve is
/// an expected outcome and travels as `None`, never as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JsonError {
    /// The path string does not satisfy the path grammar.
    #[error("invalid json path {path:?}: {reason}")]
    PathSyntax { path: String, reason: String },

    /// A flat column cannot answer the request (unknown key without a
    /// remainder, non-key leading token, inconsistent variable paths).
    #[error("flat json schema error: {0}")]
    Schema(String),

    /// The JSON text itself is malformed.
    #[error("malformed json: {0}")]
    DataQuality(String),

    /// Arguments handed in by the host do not line up.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type JsonResult<T> = Result<T, JsonError>;

impl JsonError {
    pub(crate) fn syntax(path: &str, reason: impl Into<String>) -> Self {
        JsonError::PathSyntax {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
