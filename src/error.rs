use std::io;

use thiserror::Error;

/// Errors raised while training the vocabularies or classifying titles.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// n-gram width below one; a configuration mistake, never user input
    #[error("assertion failed: n > 0 (got n = {0})")]
    InvalidNgramSize(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A dataset line that could not be parsed. Readers skip these.
    #[error("malformed line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A worker or the result consumer died before shutdown completed.
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

impl ClassifierError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        ClassifierError::MalformedLine {
            line,
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ClassifierError::InvalidConfig(msg.into())
    }

    /// Whether a reader may skip the offending record and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClassifierError::MalformedLine { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
