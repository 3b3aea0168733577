use std::io;
use std::path::PathBuf;

use crate::error::StoreError;
use crate::fs::{CancelToken, FileInfo};
use crate::store::arena::{NodeId, NodeKind};
use crate::store::path::TreePath;

/// Renderable snapshot of one node, carried by row events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    /// Absolute location of the entry. Dummy placeholders carry their
    /// parent directory's location.
    pub location: PathBuf,
    /// Display name derived from the location.
    pub name: String,
    pub kind: NodeKind,
    /// Hidden attribute of the underlying entry (not the filter state).
    pub hidden: bool,
    /// Whether this row is the "(Empty)" placeholder.
    pub dummy: bool,
}

/// Change notifications consumed by the display layer.
///
/// Internal state is always mutated before the corresponding event is sent,
/// so paths are valid against the post-mutation tree; `RowDeleted` carries
/// the path the row occupied immediately before it was unlinked. Paths are
/// only stable until the next event.
#[derive(Debug)]
pub enum StoreEvent {
    RowInserted { path: TreePath, node: NodeSummary },
    RowDeleted { path: TreePath },
    RowChanged { path: TreePath, node: NodeSummary },
    /// Existing rows of `parent` were permuted in place;
    /// `new_order[new_pos] = old_pos` over visible row positions.
    RowsReordered {
        parent: TreePath,
        new_order: Vec<usize>,
    },
    /// A directory enumeration (or mount) started; busy-cursor feedback.
    BeginLoading { path: TreePath },
    EndLoading { path: TreePath },
    RootChanged { location: PathBuf },
    VirtualRootChanged { location: PathBuf },
    /// An entry was renamed; cross-cutting consumers (open documents)
    /// re-target from the old to the new location.
    Renamed {
        old_location: PathBuf,
        new_location: PathBuf,
    },
    /// A directory's cached subtree left the cache; consumers tracking
    /// per-location UI state should forget this location.
    Unloaded { location: PathBuf },
    /// Trash is unsupported for the current delete item. The caller decides
    /// with [`confirm_trash_fallback`](crate::store::FileBrowserStore::confirm_trash_fallback)
    /// whether the rest of the batch is deleted permanently.
    TrashFallbackNeeded {
        batch: u64,
        location: PathBuf,
        remaining: usize,
    },
    /// Non-fatal error, surfaced to the user.
    Error(StoreError),
}

/// Outcome of one asynchronous delete/trash item.
#[derive(Debug)]
pub(crate) enum DeleteOutcome {
    Deleted,
    TrashUnsupported,
    Failed(io::Error),
    Cancelled,
}

/// Completion messages posted by spawned tasks and folded back into the
/// store on its own thread. Every handler re-validates the token before
/// touching the arena; the targeted node may already be gone.
#[derive(Debug)]
pub(crate) enum StoreMessage {
    LoadBatch {
        dir: NodeId,
        token: CancelToken,
        entries: Vec<FileInfo>,
    },
    LoadDone {
        dir: NodeId,
        token: CancelToken,
    },
    LoadFailed {
        dir: NodeId,
        token: CancelToken,
        error: io::Error,
    },
    MountDone {
        token: CancelToken,
        result: io::Result<()>,
    },
    DeleteDone {
        batch: u64,
        token: CancelToken,
        outcome: DeleteOutcome,
    },
}
