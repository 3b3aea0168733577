//! Create, rename, and delete/trash operations that keep the cache
//! consistent with the filesystem.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::event::{DeleteOutcome, StoreEvent, StoreMessage};
use crate::fs::{CancelToken, EntryKind, FileInfo, Probe, TrashError};

use super::arena::NodeId;
use super::FileBrowserStore;

const NEW_FILE_BASE: &str = "Untitled File";
const NEW_DIR_BASE: &str = "Untitled Folder";
/// Upper bound on uniqueness probing; far beyond anything a user hits.
const UNIQUE_NAME_LIMIT: u32 = 1000;

/// One in-flight delete/trash batch, processed one item at a time.
#[derive(Debug)]
pub(crate) struct DeleteBatch {
    items: Vec<PathBuf>,
    index: usize,
    /// Remaining items are deleted permanently: set from the start for
    /// plain deletes, or after the trash fallback was accepted.
    permanent: bool,
    /// Parked waiting for the trash-fallback decision.
    awaiting_fallback: bool,
    token: CancelToken,
}

impl DeleteBatch {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl FileBrowserStore {
    fn unique_child_location(&self, parent: &Path, base: &str) -> PathBuf {
        let mut candidate = parent.join(base);
        for i in 1..=UNIQUE_NAME_LIMIT {
            if matches!(self.fs.query_info(&candidate), Probe::NotFound) {
                return candidate;
            }
            candidate = parent.join(format!("{}({})", base, i));
        }
        candidate
    }

    fn dir_target(&self, id: NodeId) -> Result<PathBuf> {
        let node = self
            .arena
            .get(id)
            .ok_or_else(|| StoreError::InvalidTarget("stale node id".into()))?;
        if !node.is_dir() || node.dummy {
            return Err(StoreError::InvalidTarget(format!(
                "{} is not a directory",
                node.location.display()
            )));
        }
        Ok(node.location.clone())
    }

    /// Create an empty, uniquely named file under `parent` and insert its
    /// node. When the active filters hide the new entry, creation still
    /// succeeded; a `FilteredOut` warning event tells the caller.
    pub fn new_file(&mut self, parent: NodeId) -> Result<NodeId> {
        let parent_loc = self.dir_target(parent)?;
        let location = self.unique_child_location(&parent_loc, NEW_FILE_BASE);
        self.fs
            .create_file(&location)
            .map_err(|source| StoreError::NewFile {
                parent: parent_loc,
                source,
            })?;
        debug!(path = %location.display(), "created file");
        Ok(self.insert_created(parent, location, EntryKind::File))
    }

    /// Create a uniquely named directory under `parent`; same filter
    /// warning contract as [`new_file`](Self::new_file).
    pub fn new_directory(&mut self, parent: NodeId) -> Result<NodeId> {
        let parent_loc = self.dir_target(parent)?;
        let location = self.unique_child_location(&parent_loc, NEW_DIR_BASE);
        self.fs
            .make_directory(&location)
            .map_err(|source| StoreError::NewDirectory {
                parent: parent_loc,
                source,
            })?;
        debug!(path = %location.display(), "created directory");
        Ok(self.insert_created(parent, location, EntryKind::Directory))
    }

    fn insert_created(
        &mut self,
        parent: NodeId,
        location: PathBuf,
        fallback_kind: EntryKind,
    ) -> NodeId {
        let info = match self.fs.query_info(&location) {
            Probe::Found(info) => info,
            _ => FileInfo {
                name: location
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                kind: fallback_kind,
                hidden: false,
                text: false,
            },
        };
        let id = self.adopt_entry(parent, location.clone(), &info);
        self.link_child(parent, id);
        self.refresh_dummy(parent, true);
        let filtered = self.arena.get(id).map(|n| n.filtered).unwrap_or(false);
        if filtered {
            self.emit(StoreEvent::Error(StoreError::FilteredOut { path: location }));
        }
        id
    }

    /// Rename `id` in place. Cached descendants are re-rooted by prefix
    /// substitution (no reload), siblings re-sorted, and `Renamed`
    /// emitted for cross-cutting consumers. When the new name is hidden by
    /// the filters the filesystem rename is not rolled back; the distinct
    /// `FilteredOut` error reports it.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<()> {
        if new_name.is_empty()
            || new_name.contains(std::path::MAIN_SEPARATOR)
            || new_name == "."
            || new_name == ".."
        {
            return Err(StoreError::InvalidTarget(format!(
                "invalid name {:?}",
                new_name
            )));
        }
        let (old_location, parent) = {
            let node = self
                .arena
                .get(id)
                .ok_or_else(|| StoreError::InvalidTarget("stale node id".into()))?;
            if node.dummy {
                return Err(StoreError::InvalidTarget(
                    "cannot rename a placeholder".into(),
                ));
            }
            (node.location.clone(), node.parent)
        };
        let Some(parent) = parent else {
            return Err(StoreError::InvalidTarget("cannot rename the root".into()));
        };
        let parent_loc = old_location
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::InvalidTarget("cannot rename the root".into()))?;
        let new_location = parent_loc.join(new_name);
        if new_location == old_location {
            return Ok(());
        }
        if !matches!(self.fs.query_info(&new_location), Probe::NotFound) {
            return Err(StoreError::Rename {
                path: new_location,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "target name already exists"),
            });
        }
        self.fs
            .rename(&old_location, &new_location)
            .map_err(|source| StoreError::Rename {
                path: old_location.clone(),
                source,
            })?;
        debug!(from = %old_location.display(), to = %new_location.display(), "renamed");

        let was_visible = self.path_of(id).is_some();
        self.rebase_subtree(id, &new_location);
        let (hidden, text) = match self.fs.query_info(&new_location) {
            Probe::Found(info) => (info.hidden, info.text),
            _ => (new_name.starts_with('.'), false),
        };
        if let Some(node) = self.arena.get_mut(id) {
            node.name = new_name.to_string();
            node.hidden = hidden;
            node.text = text;
        }
        let fresh_filtered = match self.arena.get(id) {
            Some(node) => self.filter.excludes(node),
            None => false,
        };
        let row_before = self.path_of(id);
        if let Some(node) = self.arena.get_mut(id) {
            node.filtered = fresh_filtered;
        }

        if fresh_filtered {
            if let Some(path) = row_before {
                self.emit(StoreEvent::RowDeleted { path });
            }
            self.resort_children(parent);
            self.refresh_dummy(parent, true);
            self.emit(StoreEvent::Renamed {
                old_location,
                new_location: new_location.clone(),
            });
            return Err(StoreError::FilteredOut { path: new_location });
        }
        if was_visible {
            self.resort_children(parent);
            if let Some(path) = self.path_of(id) {
                if let Some(node) = self.arena.get(id).map(|n| n.summary()) {
                    self.emit(StoreEvent::RowChanged { path, node });
                }
            }
        } else {
            // Hidden before the rename; it may have become visible now.
            self.resort_children(parent);
            self.emit_row_inserted(id);
            let fill_dir = self.path_of(id).is_some()
                && self.arena.get(id).map(|n| n.is_dir()).unwrap_or(false);
            if fill_dir {
                self.model_fill(id);
            }
            self.refresh_dummy(parent, true);
        }
        self.emit(StoreEvent::Renamed {
            old_location,
            new_location,
        });
        Ok(())
    }

    /// Re-root a subtree after a rename: every cached descendant swaps the
    /// old location prefix for the new one.
    fn rebase_subtree(&mut self, id: NodeId, new_location: &Path) {
        let old_location = match self.arena.get(id) {
            Some(node) => node.location.clone(),
            None => return,
        };
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.arena.get_mut(current) else {
                continue;
            };
            let rebased = node
                .location
                .strip_prefix(&old_location)
                .map(|rel| {
                    if rel.as_os_str().is_empty() {
                        new_location.to_path_buf()
                    } else {
                        new_location.join(rel)
                    }
                })
                .ok();
            if let Some(location) = rebased {
                node.location = location;
            }
            stack.extend(node.children.iter().copied());
        }
    }

    /// Delete the given nodes, trash-first when `use_trash`. Paths nested
    /// under another selected path are dropped from the batch; items are
    /// then processed one at a time asynchronously, removing each node
    /// from the cache as its filesystem delete succeeds. Returns the batch
    /// id used by [`confirm_trash_fallback`](Self::confirm_trash_fallback)
    /// and [`cancel_delete`](Self::cancel_delete).
    pub fn delete(&mut self, ids: &[NodeId], use_trash: bool) -> Result<u64> {
        let mut paths: Vec<PathBuf> = ids
            .iter()
            .filter_map(|&id| self.arena.get(id))
            .filter(|n| !n.dummy)
            .map(|n| n.location.clone())
            .collect();
        if paths.is_empty() {
            return Err(StoreError::InvalidTarget("nothing to delete".into()));
        }
        paths.sort();
        paths.dedup();
        let mut items: Vec<PathBuf> = Vec::new();
        for path in paths {
            let covered = items
                .iter()
                .any(|kept| path.starts_with(kept) && path != *kept);
            if !covered {
                items.push(path);
            }
        }
        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        debug!(batch = batch_id, items = items.len(), use_trash, "starting delete batch");
        self.deletes.insert(
            batch_id,
            DeleteBatch {
                items,
                index: 0,
                permanent: !use_trash,
                awaiting_fallback: false,
                token: CancelToken::new(),
            },
        );
        self.spawn_delete_step(batch_id);
        Ok(batch_id)
    }

    fn spawn_delete_step(&mut self, batch_id: u64) {
        let (path, token, permanent) = {
            let Some(batch) = self.deletes.get(&batch_id) else {
                return;
            };
            match batch.items.get(batch.index) {
                Some(path) => (path.clone(), batch.token.clone(), batch.permanent),
                None => {
                    debug!(batch = batch_id, "delete batch finished");
                    self.deletes.remove(&batch_id);
                    return;
                }
            }
        };
        let fs = Arc::clone(&self.fs);
        let tx = self.msg_tx.clone();
        self.start_op();
        tokio::spawn(async move {
            if token.is_cancelled() {
                let _ = tx.send(StoreMessage::DeleteDone {
                    batch: batch_id,
                    token,
                    outcome: DeleteOutcome::Cancelled,
                });
                return;
            }
            let outcome = if permanent {
                match fs.delete(&path, &token).await {
                    Ok(()) => DeleteOutcome::Deleted,
                    Err(e) => DeleteOutcome::Failed(e),
                }
            } else {
                match fs.trash(&path, &token).await {
                    Ok(()) => DeleteOutcome::Deleted,
                    Err(TrashError::Unsupported) => DeleteOutcome::TrashUnsupported,
                    Err(TrashError::Io(e)) => DeleteOutcome::Failed(e),
                }
            };
            let _ = tx.send(StoreMessage::DeleteDone {
                batch: batch_id,
                token,
                outcome,
            });
        });
    }

    pub(crate) fn handle_delete_done(
        &mut self,
        batch_id: u64,
        token: CancelToken,
        outcome: DeleteOutcome,
    ) {
        let valid = self
            .deletes
            .get(&batch_id)
            .map(|b| b.token.same_as(&token) && !token.is_cancelled())
            .unwrap_or(false);
        if !valid {
            return;
        }
        match outcome {
            DeleteOutcome::Deleted => {
                let path = {
                    let Some(batch) = self.deletes.get_mut(&batch_id) else {
                        return;
                    };
                    let Some(path) = batch.items.get(batch.index).cloned() else {
                        return;
                    };
                    batch.index += 1;
                    path
                };
                if let Some(node) = self.find(&path) {
                    self.remove_subtree(node);
                }
                self.spawn_delete_step(batch_id);
            }
            DeleteOutcome::TrashUnsupported => {
                let (location, remaining) = {
                    let Some(batch) = self.deletes.get_mut(&batch_id) else {
                        return;
                    };
                    batch.awaiting_fallback = true;
                    let Some(location) = batch.items.get(batch.index).cloned() else {
                        return;
                    };
                    (location, batch.items.len() - batch.index)
                };
                debug!(batch = batch_id, "trash unsupported, asking about fallback");
                self.emit(StoreEvent::TrashFallbackNeeded {
                    batch: batch_id,
                    location,
                    remaining,
                });
            }
            DeleteOutcome::Failed(source) => {
                let path = {
                    let Some(batch) = self.deletes.get_mut(&batch_id) else {
                        return;
                    };
                    let Some(path) = batch.items.get(batch.index).cloned() else {
                        return;
                    };
                    batch.index += 1;
                    path
                };
                warn!(batch = batch_id, path = %path.display(), error = %source, "delete failed");
                self.emit(StoreEvent::Error(StoreError::Delete { path, source }));
                self.spawn_delete_step(batch_id);
            }
            DeleteOutcome::Cancelled => {
                self.deletes.remove(&batch_id);
            }
        }
    }

    /// Answer a `TrashFallbackNeeded` event. Accepting switches the whole
    /// batch to permanent deletion from the current item onward; declining
    /// cancels it, leaving the remaining entries and the cache untouched.
    pub fn confirm_trash_fallback(&mut self, batch_id: u64, permanent: bool) {
        let Some(batch) = self.deletes.get_mut(&batch_id) else {
            return;
        };
        if !batch.awaiting_fallback {
            return;
        }
        batch.awaiting_fallback = false;
        if permanent {
            batch.permanent = true;
            debug!(batch = batch_id, "trash fallback accepted");
            self.spawn_delete_step(batch_id);
        } else {
            debug!(batch = batch_id, "trash fallback declined, batch cancelled");
            batch.cancel();
            self.deletes.remove(&batch_id);
        }
    }

    /// Cancel an in-flight delete batch. Idempotent; completions already
    /// in flight for it are ignored.
    pub fn cancel_delete(&mut self, batch_id: u64) {
        if let Some(batch) = self.deletes.remove(&batch_id) {
            batch.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::fs::local::LocalFs;
    use crate::fs::mock::MockFs;
    use std::fs as std_fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn drain(rx: &mut UnboundedReceiver<StoreEvent>) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(store: &FileBrowserStore, id: NodeId) -> Vec<String> {
        store
            .visible_children(id)
            .iter()
            .filter_map(|&c| store.summary(c))
            .map(|s| s.name)
            .collect()
    }

    async fn local_store(
        tmp: &TempDir,
    ) -> (FileBrowserStore, UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut store =
            FileBrowserStore::new(Arc::new(LocalFs::new()), StoreSettings::default(), tx);
        store.set_root_and_virtual_root(tmp.path(), tmp.path());
        store.settle().await;
        (store, rx)
    }

    fn mock_store(fs: Arc<MockFs>) -> (FileBrowserStore, UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FileBrowserStore::new(fs, StoreSettings::default(), tx), rx)
    }

    #[tokio::test]
    async fn new_file_probes_unique_names() {
        let tmp = TempDir::new().unwrap();
        let (mut store, _rx) = local_store(&tmp).await;
        let vr = store.virtual_root().unwrap();

        let first = store.new_file(vr).unwrap();
        let second = store.new_file(vr).unwrap();
        assert_eq!(store.summary(first).unwrap().name, "Untitled File");
        assert_eq!(store.summary(second).unwrap().name, "Untitled File(1)");
        assert!(tmp.path().join("Untitled File").exists());
        assert!(tmp.path().join("Untitled File(1)").exists());
    }

    #[tokio::test]
    async fn new_directory_gets_placeholder_child() {
        let tmp = TempDir::new().unwrap();
        let (mut store, _rx) = local_store(&tmp).await;
        let vr = store.virtual_root().unwrap();

        let dir = store.new_directory(vr).unwrap();
        let summary = store.summary(dir).unwrap();
        assert_eq!(summary.name, "Untitled Folder");
        assert!(tmp.path().join("Untitled Folder").is_dir());
        let children = store.visible_children(dir);
        assert_eq!(children.len(), 1);
        assert!(store.summary(children[0]).unwrap().dummy);
    }

    #[tokio::test]
    async fn new_file_hidden_by_filters_warns_but_succeeds() {
        let tmp = TempDir::new().unwrap();
        let (mut store, mut rx) = local_store(&tmp).await;
        store.set_pattern(Some("*.rs"));
        let vr = store.virtual_root().unwrap();
        drain(&mut rx);

        let id = store.new_file(vr).unwrap();
        assert!(tmp.path().join("Untitled File").exists());
        assert!(!store.is_visible(id));
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, StoreEvent::Error(StoreError::FilteredOut { .. }))));
    }

    #[tokio::test]
    async fn new_file_on_a_file_node_is_rejected() {
        let tmp = TempDir::new().unwrap();
        std_fs::write(tmp.path().join("a.txt"), "x").unwrap();
        let (mut store, _rx) = local_store(&tmp).await;
        let file = store.find(&tmp.path().join("a.txt")).unwrap();
        assert!(matches!(
            store.new_file(file),
            Err(StoreError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn rename_reroots_cached_descendants_without_reload() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        std_fs::create_dir(&sub).unwrap();
        std_fs::write(sub.join("notes.txt"), "n").unwrap();
        let (mut store, mut rx) = local_store(&tmp).await;
        let sub_id = store.find(&sub).unwrap();
        store.load_directory(sub_id);
        store.settle().await;
        assert!(store.find(&sub.join("notes.txt")).is_some());
        drain(&mut rx);

        store.rename(sub_id, "subdir").unwrap();

        let new_sub = tmp.path().join("subdir");
        assert!(new_sub.is_dir());
        assert!(new_sub.join("notes.txt").exists());
        // Cached child re-rooted in place; still loaded, nothing re-read.
        assert!(store.is_loaded(sub_id));
        let cached = store.find(&new_sub.join("notes.txt")).unwrap();
        assert_eq!(
            store.location_of(cached).unwrap(),
            new_sub.join("notes.txt")
        );
        assert!(store.find(&sub.join("notes.txt")).is_none());
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            StoreEvent::Renamed { old_location, new_location }
                if old_location == &sub && new_location == &new_sub
        )));
    }

    #[tokio::test]
    async fn rename_resorts_and_reports_permutation() {
        let tmp = TempDir::new().unwrap();
        std_fs::write(tmp.path().join("a.txt"), "").unwrap();
        std_fs::write(tmp.path().join("m.txt"), "").unwrap();
        let (mut store, mut rx) = local_store(&tmp).await;
        let vr = store.virtual_root().unwrap();
        let a = store.find(&tmp.path().join("a.txt")).unwrap();
        drain(&mut rx);

        store.rename(a, "z.txt").unwrap();
        assert_eq!(names(&store, vr), ["m.txt", "z.txt"]);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            StoreEvent::RowsReordered { new_order, .. } if new_order == &vec![1, 0]
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, StoreEvent::RowChanged { .. })));
    }

    #[tokio::test]
    async fn rename_to_existing_name_fails_cleanly() {
        let tmp = TempDir::new().unwrap();
        std_fs::write(tmp.path().join("a.txt"), "").unwrap();
        std_fs::write(tmp.path().join("b.txt"), "").unwrap();
        let (mut store, _rx) = local_store(&tmp).await;
        let a = store.find(&tmp.path().join("a.txt")).unwrap();

        assert!(matches!(
            store.rename(a, "b.txt"),
            Err(StoreError::Rename { .. })
        ));
        // Nothing moved.
        assert!(tmp.path().join("a.txt").exists());
        assert_eq!(
            store.location_of(a).unwrap(),
            tmp.path().join("a.txt")
        );
    }

    #[tokio::test]
    async fn rename_into_hidden_keeps_fs_change_and_reports_filtered() {
        let tmp = TempDir::new().unwrap();
        std_fs::write(tmp.path().join("a.txt"), "").unwrap();
        std_fs::write(tmp.path().join("b.txt"), "").unwrap();
        let (mut store, mut rx) = local_store(&tmp).await;
        let a = store.find(&tmp.path().join("a.txt")).unwrap();
        drain(&mut rx);

        let result = store.rename(a, ".a.txt");
        assert!(matches!(result, Err(StoreError::FilteredOut { .. })));
        // The rename happened anyway and the row disappeared.
        assert!(tmp.path().join(".a.txt").exists());
        assert!(!tmp.path().join("a.txt").exists());
        assert!(!store.is_visible(a));
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, StoreEvent::RowDeleted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, StoreEvent::Renamed { .. })));
    }

    #[tokio::test]
    async fn rename_dummy_or_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        std_fs::create_dir(&sub).unwrap();
        let (mut store, _rx) = local_store(&tmp).await;
        let root = store.root().unwrap();
        assert!(matches!(
            store.rename(root, "other"),
            Err(StoreError::InvalidTarget(_))
        ));
        let sub_id = store.find(&sub).unwrap();
        let dummy = store.visible_children(sub_id)[0];
        assert!(matches!(
            store.rename(dummy, "other"),
            Err(StoreError::InvalidTarget(_))
        ));
        assert!(matches!(
            store.rename(sub_id, "a/b"),
            Err(StoreError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn delete_prunes_descendants_of_selected_ancestors() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        fs.add_dir("/r/d");
        fs.add_file("/r/d/x.txt");
        fs.add_file("/r/other.txt");
        let (mut store, _rx) = mock_store(fs.clone());
        store.set_root_and_virtual_root(Path::new("/r"), Path::new("/r"));
        store.settle().await;
        let d = store.find(Path::new("/r/d")).unwrap();
        store.load_directory(d);
        store.settle().await;
        let x = store.find(Path::new("/r/d/x.txt")).unwrap();

        store.delete(&[d, x], true).unwrap();
        store.settle().await;

        // Exactly one trash operation: the descendant was pruned.
        assert_eq!(fs.trashed(), vec![PathBuf::from("/r/d")]);
        assert!(store.find(Path::new("/r/d")).is_none());
        assert!(store.find(Path::new("/r/other.txt")).is_some());
    }

    #[tokio::test]
    async fn declined_trash_fallback_cancels_whole_batch() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        fs.add_file("/r/a.txt");
        fs.add_file("/r/b.txt");
        fs.add_file("/r/c.txt");
        fs.set_trash_supported(false);
        let (mut store, mut rx) = mock_store(fs.clone());
        store.set_root_and_virtual_root(Path::new("/r"), Path::new("/r"));
        store.settle().await;
        let vr = store.virtual_root().unwrap();
        let targets = store.visible_children(vr);
        drain(&mut rx);

        let batch = store.delete(&targets, true).unwrap();
        store.settle().await;
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            StoreEvent::TrashFallbackNeeded { remaining: 3, .. }
        )));

        store.confirm_trash_fallback(batch, false);
        store.settle().await;

        // Zero files deleted, cache unchanged.
        assert_eq!(fs.entry_count(), 4);
        assert_eq!(names(&store, vr), ["a.txt", "b.txt", "c.txt"]);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn accepted_trash_fallback_deletes_permanently() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        fs.add_file("/r/a.txt");
        fs.add_file("/r/b.txt");
        fs.set_trash_supported(false);
        let (mut store, mut rx) = mock_store(fs.clone());
        store.set_root_and_virtual_root(Path::new("/r"), Path::new("/r"));
        store.settle().await;
        let vr = store.virtual_root().unwrap();
        let targets = store.visible_children(vr);

        let batch = store.delete(&targets, true).unwrap();
        store.settle().await;
        store.confirm_trash_fallback(batch, true);
        store.settle().await;

        assert!(fs.trashed().is_empty());
        assert!(!fs.exists(Path::new("/r/a.txt")));
        assert!(!fs.exists(Path::new("/r/b.txt")));
        let children = store.visible_children(vr);
        assert_eq!(children.len(), 1);
        assert!(store.summary(children[0]).unwrap().dummy);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, StoreEvent::Error(_))));
    }

    #[tokio::test]
    async fn failed_item_surfaces_error_and_batch_continues() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        fs.add_file("/r/a.txt");
        fs.add_file("/r/b.txt");
        fs.fail_delete("/r/a.txt");
        let (mut store, mut rx) = mock_store(fs.clone());
        store.set_root_and_virtual_root(Path::new("/r"), Path::new("/r"));
        store.settle().await;
        let vr = store.virtual_root().unwrap();
        let targets = store.visible_children(vr);
        drain(&mut rx);

        store.delete(&targets, false).unwrap();
        store.settle().await;

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, StoreEvent::Error(StoreError::Delete { .. }))));
        // The failed item stays, the other one went.
        assert!(fs.exists(Path::new("/r/a.txt")));
        assert!(!fs.exists(Path::new("/r/b.txt")));
        assert_eq!(names(&store, vr), ["a.txt"]);
    }

    #[tokio::test]
    async fn cancelled_batch_stops_without_further_callbacks() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        for i in 0..5 {
            fs.add_file(format!("/r/f{}.txt", i));
        }
        let (mut store, mut rx) = mock_store(fs);
        store.set_root_and_virtual_root(Path::new("/r"), Path::new("/r"));
        store.settle().await;
        let vr = store.virtual_root().unwrap();
        let targets = store.visible_children(vr);
        drain(&mut rx);

        let batch = store.delete(&targets, false).unwrap();
        store.cancel_delete(batch);
        store.settle().await;

        // The batch is gone and nothing was folded into the cache.
        assert!(!store.has_pending_operations());
        assert_eq!(store.visible_children(vr).len(), 5);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, StoreEvent::RowDeleted { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, StoreEvent::TrashFallbackNeeded { .. })));
    }

    #[tokio::test]
    async fn deleting_nothing_is_an_error() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        let (mut store, _rx) = mock_store(fs);
        store.set_root_and_virtual_root(Path::new("/r"), Path::new("/r"));
        store.settle().await;
        assert!(matches!(
            store.delete(&[], false),
            Err(StoreError::InvalidTarget(_))
        ));
    }
}
