//! Filesystem collaborator consumed by the store.
//!
//! Every filesystem touch goes through the [`FileSystem`] trait so the store
//! can be driven against an in-memory filesystem in tests (mount probing,
//! trash support). Long-running operations are async and cancellable; the
//! quick metadata calls are synchronous.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod local;
#[cfg(test)]
pub(crate) mod mock;
pub mod watcher;

/// Kind of a filesystem entry as reported by enumeration or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Neither a regular file, a directory, nor a symlink to one
    /// (socket, fifo, device). Skipped by the loader.
    Special,
}

/// Metadata for one filesystem entry. Symlinks are classified by their
/// target; a broken symlink reports as a file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub kind: EntryKind,
    /// Hidden attribute of the entry (dotfile on Unix).
    pub hidden: bool,
    /// Whether the content looks like text. Only meaningful for files.
    pub text: bool,
}

/// Result of probing a single location.
#[derive(Debug)]
pub enum Probe {
    Found(FileInfo),
    /// The location sits on a volume that is not mounted yet.
    NotMounted,
    NotFound,
    Error(io::Error),
}

/// Cooperative cancellation flag shared between the store and one of its
/// in-flight operations. Cancelling is idempotent; a cancelled operation's
/// completion is dropped by the store without touching the node tree.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Whether `other` is a clone of this token. Completion messages are
    /// matched against the token currently held by the node, not by value.
    pub(crate) fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Change reported by a directory watch.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// The watched directory.
    pub dir: PathBuf,
    /// The direct child that changed.
    pub path: PathBuf,
    pub kind: WatchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Created,
    Deleted,
}

/// Keep-alive handle for a directory watch; dropping it stops the watch.
pub trait WatchGuard: Send + fmt::Debug {}

/// Pull-based directory enumeration, consumed in fixed-size batches so a
/// huge directory never stalls the owning thread.
#[async_trait]
pub trait DirStream: Send {
    /// Return up to `max` further entries; an empty vector ends the
    /// enumeration.
    async fn next_batch(&mut self, max: usize) -> io::Result<Vec<FileInfo>>;
}

/// Error from a trash request.
#[derive(Debug, Error)]
pub enum TrashError {
    /// Trash does not exist for this location (e.g. a foreign mount);
    /// callers may fall back to permanent deletion.
    #[error("trash is not supported for this location")]
    Unsupported,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The filesystem surface the store consumes.
#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Probe a single location.
    fn query_info(&self, path: &Path) -> Probe;

    /// Start enumerating the entries of `dir`.
    async fn enumerate(&self, dir: &Path) -> io::Result<Box<dyn DirStream>>;

    /// Create an empty file; fails if the path already exists.
    fn create_file(&self, path: &Path) -> io::Result<()>;

    /// Create a directory; fails if the path already exists.
    fn make_directory(&self, path: &Path) -> io::Result<()>;

    /// Rename/move an entry.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Move an entry to the trash.
    async fn trash(&self, path: &Path, cancel: &CancelToken) -> Result<(), TrashError>;

    /// Permanently delete an entry; directories are removed recursively.
    async fn delete(&self, path: &Path, cancel: &CancelToken) -> io::Result<()>;

    /// Mount the volume containing `path`. Only called after a probe
    /// reported [`Probe::NotMounted`].
    async fn mount(&self, path: &Path, cancel: &CancelToken) -> io::Result<()>;

    /// Watch `dir` (non-recursive) for created/deleted direct children.
    fn watch(
        &self,
        dir: &Path,
        tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> io::Result<Box<dyn WatchGuard>>;
}
