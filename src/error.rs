use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Revision error: {0}")]
    Revision(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Kind of a single-line failure while reading an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineErrorKind {
    /// Line is not valid JSON
    Parse,
    /// Line is JSON but does not describe a valid record
    Schema,
}

/// A malformed line. Always recoverable: the line is skipped and counted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LineError {
    /// 1-based line number in the source file
    pub line: usize,
    pub kind: LineErrorKind,
    pub message: String,
}

impl LineError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            kind: LineErrorKind::Parse,
            message: message.into(),
        }
    }

    pub fn schema(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            kind: LineErrorKind::Schema,
            message: message.into(),
        }
    }
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LineErrorKind::Parse => "parse",
            LineErrorKind::Schema => "schema",
        };
        write!(f, "line {}: {} error: {}", self.line, kind, self.message)
    }
}

impl From<LineError> for TrackerError {
    fn from(err: LineError) -> Self {
        match err.kind {
            LineErrorKind::Parse => TrackerError::Parse(err.to_string()),
            LineErrorKind::Schema => TrackerError::Schema(err.to_string()),
        }
    }
}
