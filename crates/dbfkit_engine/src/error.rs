//! Error types for engine operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Status code reported for a lock conflict.
///
/// Lock conflicts are the one positive code: they are a retryable condition,
/// not a failure of the engine itself.
pub const LOCKED_CODE: i32 = 50;

/// Errors reported by a table engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A table or index file could not be opened.
    #[error("cannot open {path}: {reason}")]
    Open {
        /// File that failed to open.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// A table or index file could not be created.
    #[error("cannot create {path}: {reason}")]
    Create {
        /// File that failed to be created.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// A file lock could not be acquired within the retry budget.
    #[error("lock conflict on {path} after {attempts} attempt(s)")]
    Locked {
        /// Locked file.
        path: PathBuf,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A write would introduce a duplicate key into a unique tag.
    #[error("unique key violation on tag {tag}")]
    Unique {
        /// Name of the unique tag.
        tag: String,
    },

    /// A record position or record value was rejected.
    #[error("record entry error: {message}")]
    Entry {
        /// Description of the rejected entry.
        message: String,
    },

    /// An expression failed to compile or evaluate.
    #[error("expression error: {message}")]
    Expression {
        /// Description of the failure.
        message: String,
    },

    /// A tag name could not be resolved.
    #[error("tag not found: {name}")]
    TagNotFound {
        /// Name that was looked up.
        name: String,
    },

    /// A handle does not refer to an open object of this engine.
    #[error("invalid {kind} handle {id}")]
    InvalidHandle {
        /// Kind of handle (table, index, expression).
        kind: &'static str,
        /// Raw handle value.
        id: u32,
    },

    /// A write was attempted on a table opened read-only.
    #[error("table {alias} is open read-only")]
    ReadOnly {
        /// Alias of the table.
        alias: String,
    },

    /// A file does not have the expected layout.
    #[error("invalid file format: {message}")]
    Format {
        /// Description of the format issue.
        message: String,
    },

    /// An index file could not be encoded or decoded.
    #[error("index error: {message}")]
    Index {
        /// Description of the index issue.
        message: String,
    },
}

impl EngineError {
    /// Creates an entry error.
    pub fn entry(message: impl Into<String>) -> Self {
        Self::Entry {
            message: message.into(),
        }
    }

    /// Creates an expression error.
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression {
            message: message.into(),
        }
    }

    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Creates an index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Returns the numeric status code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(_) => -10,
            Self::Create { .. } => -20,
            Self::Open { .. } => -60,
            Self::Format { .. } => -80,
            Self::ReadOnly { .. } => -90,
            Self::InvalidHandle { .. } => -100,
            Self::Entry { .. } => -300,
            Self::Index { .. } => -310,
            Self::TagNotFound { .. } => -330,
            Self::Unique { .. } => -340,
            Self::Expression { .. } => -400,
            Self::Locked { .. } => LOCKED_CODE,
        }
    }

    /// Returns true if retrying later might succeed.
    #[must_use]
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            EngineError::Io(io::Error::new(io::ErrorKind::Other, "x")),
            EngineError::Create {
                path: PathBuf::from("a"),
                reason: "x".into(),
            },
            EngineError::Open {
                path: PathBuf::from("a"),
                reason: "x".into(),
            },
            EngineError::format("x"),
            EngineError::ReadOnly { alias: "A".into() },
            EngineError::entry("x"),
            EngineError::index("x"),
            EngineError::TagNotFound { name: "T".into() },
            EngineError::Unique { tag: "T".into() },
            EngineError::expression("x"),
            EngineError::Locked {
                path: PathBuf::from("a"),
                attempts: 3,
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(EngineError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn lock_conflict_is_positive() {
        let err = EngineError::Locked {
            path: PathBuf::from("t.dbf"),
            attempts: 2,
        };
        assert!(err.is_lock_conflict());
        assert_eq!(err.code(), LOCKED_CODE);
        assert!(err.to_string().contains("2 attempt"));
    }
}
