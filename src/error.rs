//! Error types for docwatch.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Crate error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Cannot read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Invalid analysis input: {0}")]
    Input(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Documentation generation failed: {0}")]
    Generation(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub fn read(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Error::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Store failures end the current pass; everything else is per-file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

/// Malformed source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// 1-based line, when the failure can be pinned to one.
    pub line: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }

    pub fn at(message: impl Into<String>, line: usize) -> Self {
        Self::new(message, Some(line))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {})", self.message, line),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}
