//! Error types for the storage layer.
//!
//! All fallible helpers return [`DbError`], which wraps the underlying I/O
//! and serialization errors with the path that was being touched. The
//! public store contracts (`save`, `load`, `delete`) log these and degrade
//! to a boolean or `None` instead of propagating.

use std::path::PathBuf;

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document envelope did not match what the caller expected.
    #[error("Unexpected document format in {}: {reason}", path.display())]
    Format {
        /// The file that was read.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

impl DbError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
