//! Batched, cancellable directory enumeration.
//!
//! `begin_load` spawns a task that pulls fixed-size batches from the
//! filesystem and posts them back as messages; the store folds each batch
//! in as one sorted merge. Every continuation re-validates the node and
//! its cancellation token first, so a load superseded, cancelled, or
//! orphaned by a root change never touches the tree.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::event::{StoreEvent, StoreMessage};
use crate::fs::{CancelToken, EntryKind, FileInfo};

use super::arena::{LoadState, NodeId};
use super::FileBrowserStore;

impl FileBrowserStore {
    /// Start (or restart) enumerating a directory; the usual trigger is
    /// the view expanding a row.
    pub fn load_directory(&mut self, id: NodeId) {
        self.begin_load(id);
    }

    /// Drop a directory's children from the cache and mark it unloaded,
    /// cancelling an in-flight enumeration. The usual trigger is the view
    /// collapsing a row and shedding memory.
    pub fn unload_directory(&mut self, id: NodeId) {
        let Some(node) = self.arena.get(id) else { return };
        if !node.is_dir() {
            return;
        }
        let real: Vec<NodeId> = node
            .children
            .iter()
            .copied()
            .filter(|&c| self.arena.get(c).map(|n| !n.dummy).unwrap_or(false))
            .collect();
        for child in real {
            self.remove_subtree(child);
        }
        self.unload_in_place(id);
        self.refresh_dummy(id, true);
    }

    pub(crate) fn begin_load(&mut self, id: NodeId) {
        let Some(node) = self.arena.get(id) else { return };
        if !node.is_dir() {
            return;
        }
        let location = node.location.clone();
        // Idempotent supersede: a previous in-flight load is cancelled
        // before the new one starts.
        if let LoadState::Loading { token, .. } = &node.load {
            token.cancel();
        }
        let snapshot: HashSet<PathBuf> = node
            .children
            .iter()
            .filter_map(|&c| self.arena.get(c))
            .filter(|n| !n.dummy)
            .map(|n| n.location.clone())
            .collect();
        let token = CancelToken::new();
        if let Some(node) = self.arena.get_mut(id) {
            node.load = LoadState::Loading {
                token: token.clone(),
                snapshot,
            };
        }
        if let Some(path) = self.path_of(id) {
            self.emit(StoreEvent::BeginLoading { path });
        }
        debug!(dir = %location.display(), "loading directory");
        let fs = Arc::clone(&self.fs);
        let tx = self.msg_tx.clone();
        let batch_size = self.loader.batch_size.max(1);
        self.start_op();
        tokio::spawn(async move {
            let mut stream = match fs.enumerate(&location).await {
                Ok(stream) => stream,
                Err(error) => {
                    let _ = tx.send(StoreMessage::LoadFailed { dir: id, token, error });
                    return;
                }
            };
            loop {
                if token.is_cancelled() {
                    let _ = tx.send(StoreMessage::LoadDone { dir: id, token });
                    return;
                }
                match stream.next_batch(batch_size).await {
                    Ok(batch) if batch.is_empty() => {
                        let _ = tx.send(StoreMessage::LoadDone { dir: id, token });
                        return;
                    }
                    Ok(batch) => {
                        let _ = tx.send(StoreMessage::LoadBatch {
                            dir: id,
                            token: token.clone(),
                            entries: batch,
                        });
                    }
                    Err(error) => {
                        let _ = tx.send(StoreMessage::LoadFailed { dir: id, token, error });
                        return;
                    }
                }
            }
        });
    }

    /// Whether a load continuation is still current: node alive, still in
    /// the loading state, same token, token not cancelled.
    fn valid_load(&self, dir: NodeId, token: &CancelToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        match self.arena.get(dir) {
            Some(node) => {
                matches!(&node.load, LoadState::Loading { token: t, .. } if t.same_as(token))
            }
            None => false,
        }
    }

    pub(crate) fn handle_load_batch(
        &mut self,
        dir: NodeId,
        token: CancelToken,
        entries: Vec<FileInfo>,
    ) {
        if !self.valid_load(dir, &token) {
            return;
        }
        let (parent_loc, snapshot, existing) = {
            let Some(node) = self.arena.get(dir) else { return };
            let snapshot = match &node.load {
                LoadState::Loading { snapshot, .. } => snapshot.clone(),
                _ => return,
            };
            let existing: HashSet<PathBuf> = node
                .children
                .iter()
                .filter_map(|&c| self.arena.get(c))
                .filter(|n| !n.dummy)
                .map(|n| n.location.clone())
                .collect();
            (node.location.clone(), snapshot, existing)
        };
        let mut fresh = Vec::new();
        for info in entries {
            if info.name == "." || info.name == ".." {
                continue;
            }
            if info.kind == EntryKind::Special {
                continue;
            }
            let location = parent_loc.join(&info.name);
            if snapshot.contains(&location) || existing.contains(&location) {
                continue;
            }
            let id = self.adopt_entry(dir, location, &info);
            fresh.push(id);
        }
        if fresh.is_empty() {
            return;
        }
        let mut children = {
            let Some(node) = self.arena.get_mut(dir) else { return };
            std::mem::take(&mut node.children)
        };
        let ordered = super::sort::merge(&self.arena, &mut children, fresh);
        if let Some(node) = self.arena.get_mut(dir) {
            node.children = children;
        }
        for id in ordered {
            self.emit_row_inserted(id);
        }
        self.refresh_dummy(dir, true);
    }

    pub(crate) fn handle_load_done(&mut self, dir: NodeId, token: CancelToken) {
        if !self.valid_load(dir, &token) {
            return;
        }
        let Some(location) = self.location_of(dir) else { return };
        let watch = match self.fs.watch(&location, self.watch_tx.clone()) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(dir = %location.display(), error = %e, "could not watch directory");
                None
            }
        };
        if let Some(node) = self.arena.get_mut(dir) {
            node.load = LoadState::Loaded;
            node.watch = watch;
        }
        self.refresh_dummy(dir, true);
        if let Some(path) = self.path_of(dir) {
            self.emit(StoreEvent::EndLoading { path });
        }
        debug!(dir = %location.display(), "directory loaded");
    }

    pub(crate) fn handle_load_failed(&mut self, dir: NodeId, token: CancelToken, error: io::Error) {
        if !self.valid_load(dir, &token) {
            return;
        }
        let (location, partial) = {
            let Some(node) = self.arena.get(dir) else { return };
            let snapshot = match &node.load {
                LoadState::Loading { snapshot, .. } => snapshot.clone(),
                _ => return,
            };
            let partial: Vec<NodeId> = node
                .children
                .iter()
                .copied()
                .filter(|&c| {
                    self.arena
                        .get(c)
                        .map(|n| !n.dummy && !snapshot.contains(&n.location))
                        .unwrap_or(false)
                })
                .collect();
            (node.location.clone(), partial)
        };
        warn!(dir = %location.display(), error = %error, "directory load failed");
        for child in partial {
            self.remove_subtree(child);
        }
        if let Some(node) = self.arena.get_mut(dir) {
            node.load = LoadState::Unloaded;
        }
        self.refresh_dummy(dir, true);
        if let Some(path) = self.path_of(dir) {
            self.emit(StoreEvent::EndLoading { path });
        }
        self.emit(StoreEvent::Error(StoreError::LoadDirectory {
            path: location,
            source: error,
        }));
    }
}
