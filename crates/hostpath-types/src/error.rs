//! Error types shared across the workspace.

use std::path::{Path, PathBuf};

/// Errors returned by the allocator, the reclaimer and their callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied input cannot produce a usable host path.
    ///
    /// The admission webhook must reject the Pod when it sees this.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The reclaimer cannot start: missing base directory, unavailable OS
    /// facility, or insufficient privilege.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Removing a single directory failed. Non-fatal for a sweep.
    #[error("failed to delete {}: {source}", path.display())]
    DeletionFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A filesystem call failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// An internal / unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wrap a failed removal of `path`.
    pub fn deletion(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::DeletionFailure {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error must abort the process rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Precondition(_) | Error::Config(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, Error>;
