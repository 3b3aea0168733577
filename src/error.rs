use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error kinds.
///
/// Errors raised by asynchronous operations are surfaced once through
/// [`StoreEvent::Error`](crate::event::StoreEvent::Error) and never abort the
/// store; synchronous mutations return them directly.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A directory enumeration failed; the directory reverts to unloaded.
    #[error("could not load directory {path}: {source}")]
    LoadDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The root could not be set (probe or mount failure).
    #[error("could not set root to {path}: {reason}")]
    SetRoot { path: PathBuf, reason: String },

    /// A rename failed before any filesystem change happened.
    #[error("could not rename {path}: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Creating a new file failed.
    #[error("could not create a file under {parent}: {source}")]
    NewFile {
        parent: PathBuf,
        source: std::io::Error,
    },

    /// Creating a new directory failed.
    #[error("could not create a directory under {parent}: {source}")]
    NewDirectory {
        parent: PathBuf,
        source: std::io::Error,
    },

    /// Deleting a single batch item failed; the batch continues.
    #[error("could not delete {path}: {source}")]
    Delete {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Opening a directory in an external program failed. The store never
    /// raises this itself; consumers route it through the same error event.
    #[error("could not open directory {path}: {reason}")]
    OpenDirectory { path: PathBuf, reason: String },

    /// The entry exists on disk but the active filters hide it. The
    /// filesystem change that produced it is not rolled back.
    #[error("{path} exists but is hidden by the active filters")]
    FilteredOut { path: PathBuf },

    /// The request referenced a stale node id or an unusable target.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}
