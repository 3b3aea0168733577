//! The file-browser store: a lazily-populated, filtered, sorted in-memory
//! tree mirroring a region of the filesystem.
//!
//! The store is single-writer. Long-running filesystem work (enumeration,
//! mount, delete) runs in spawned tasks that post completion messages back
//! over an internal channel; [`FileBrowserStore::settle`] or
//! [`FileBrowserStore::pump`] fold them in on the owning thread. Change
//! notifications go out through the event channel handed to the
//! constructor, always after the internal state already reflects them.

pub mod arena;
pub mod filter;
pub mod history;
mod loader;
mod mutation;
pub mod path;
pub(crate) mod sort;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{FilterSettings, LoaderSettings, StoreSettings};
use crate::error::{Result, StoreError};
use crate::event::{NodeSummary, StoreEvent, StoreMessage};
use crate::fs::{CancelToken, EntryKind, FileInfo, FileSystem, Probe, WatchEvent, WatchKind};

use arena::{Node, NodeArena, NodeId, NodeKind};
use filter::{FilterEngine, FilterHandle, FilterPredicate};
use history::{Location, LocationHistory};
use mutation::DeleteBatch;
use path::TreePath;

/// Pending asynchronous mount of the root volume.
#[derive(Debug)]
struct MountRequest {
    root: PathBuf,
    virtual_root: PathBuf,
    token: CancelToken,
    push: bool,
}

/// The store. See the crate docs for the event contract.
pub struct FileBrowserStore {
    fs: Arc<dyn FileSystem>,
    arena: NodeArena,
    root: Option<NodeId>,
    virtual_root: Option<NodeId>,
    filter: FilterEngine,
    loader: LoaderSettings,
    history: LocationHistory,
    mounting: Option<MountRequest>,
    deletes: HashMap<u64, DeleteBatch>,
    next_batch_id: u64,
    events: mpsc::UnboundedSender<StoreEvent>,
    msg_tx: mpsc::UnboundedSender<StoreMessage>,
    msg_rx: mpsc::UnboundedReceiver<StoreMessage>,
    watch_tx: mpsc::UnboundedSender<WatchEvent>,
    watch_rx: mpsc::UnboundedReceiver<WatchEvent>,
    /// Spawned tasks that have not yet posted their terminal message.
    active_ops: usize,
}

impl FileBrowserStore {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        settings: StoreSettings,
        events: mpsc::UnboundedSender<StoreEvent>,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        Self {
            fs,
            arena: NodeArena::new(),
            root: None,
            virtual_root: None,
            filter: FilterEngine::new(settings.filter),
            loader: settings.loader,
            history: LocationHistory::default(),
            mounting: None,
            deletes: HashMap::new(),
            next_batch_id: 0,
            events,
            msg_tx,
            msg_rx,
            watch_tx,
            watch_rx,
            active_ops: 0,
        }
    }

    // ── Roots and navigation ─────────────────────────────────────────────

    /// Point the store at `root` and display `virtual_root` (which must be
    /// `root` or a descendant of it). A changed root drops the whole cache.
    /// Probe, mount, and load failures surface as events.
    pub fn set_root_and_virtual_root(&mut self, root: &Path, virtual_root: &Path) {
        if !virtual_root.starts_with(root) {
            self.emit(StoreEvent::Error(StoreError::SetRoot {
                path: virtual_root.to_path_buf(),
                reason: "not a descendant of the root".into(),
            }));
            return;
        }
        self.begin_set_roots(root.to_path_buf(), virtual_root.to_path_buf(), true);
    }

    /// Move the virtual root to a cached-or-new descendant of the root.
    pub fn set_virtual_root(&mut self, location: &Path) -> Result<()> {
        let Some(root_id) = self.root else {
            return Err(StoreError::InvalidTarget("no root set".into()));
        };
        let root_loc = self
            .arena
            .get(root_id)
            .map(|n| n.location.clone())
            .ok_or_else(|| StoreError::InvalidTarget("no root set".into()))?;
        if !location.starts_with(&root_loc) {
            return Err(StoreError::InvalidTarget(format!(
                "{} is outside the root",
                location.display()
            )));
        }
        let vr = self.materialize_chain(root_id, location).ok_or_else(|| {
            StoreError::InvalidTarget(format!("could not resolve {}", location.display()))
        })?;
        self.apply_virtual_root(vr, true, false);
        Ok(())
    }

    /// Virtual root moves to its parent; a no-op at the real root.
    pub fn set_virtual_root_up(&mut self) {
        let Some(vr) = self.virtual_root else { return };
        let Some(parent) = self.arena.get(vr).and_then(|n| n.parent) else {
            return;
        };
        self.apply_virtual_root(parent, true, false);
    }

    /// Virtual root moves to the real root; a no-op when already there.
    pub fn set_virtual_root_top(&mut self) {
        let (Some(root), Some(vr)) = (self.root, self.virtual_root) else {
            return;
        };
        if root == vr {
            return;
        }
        self.apply_virtual_root(root, true, false);
    }

    pub fn can_back(&self) -> bool {
        self.history.can_back()
    }

    pub fn can_forward(&self) -> bool {
        self.history.can_forward()
    }

    /// Navigate to the previous location. History navigation never pushes
    /// new history entries.
    pub fn back(&mut self) -> bool {
        match self.history.back() {
            Some(location) => {
                self.navigate_to(location);
                true
            }
            None => false,
        }
    }

    /// Navigate to the next location.
    pub fn forward(&mut self) -> bool {
        match self.history.forward() {
            Some(location) => {
                self.navigate_to(location);
                true
            }
            None => false,
        }
    }

    fn navigate_to(&mut self, location: Location) {
        let same_root = self
            .root_location()
            .map(|r| r == location.root.as_path())
            .unwrap_or(false);
        if same_root {
            if let Some(root_id) = self.root {
                if let Some(vr) = self.materialize_chain(root_id, &location.virtual_root) {
                    self.apply_virtual_root(vr, false, false);
                }
            }
        } else {
            self.begin_set_roots(location.root, location.virtual_root, false);
        }
    }

    fn begin_set_roots(&mut self, root: PathBuf, virtual_root: PathBuf, push: bool) {
        if let Some(request) = self.mounting.take() {
            request.token.cancel();
        }
        let root_changed = self
            .root_location()
            .map(|loc| loc != root.as_path())
            .unwrap_or(true);
        if root_changed {
            debug!(root = %root.display(), "setting new root");
            self.clear_all();
            let node = Node::new(root.clone(), NodeKind::Directory, None);
            let id = self.arena.insert(node);
            self.refresh_dummy(id, false);
            self.root = Some(id);
            self.virtual_root = Some(id);
            self.emit(StoreEvent::RootChanged {
                location: root.clone(),
            });
        }
        match self.fs.query_info(&root) {
            Probe::Found(_) => self.finish_set_roots(virtual_root, push),
            Probe::NotMounted => {
                debug!(root = %root.display(), "root not mounted, mounting");
                let token = CancelToken::new();
                self.mounting = Some(MountRequest {
                    root: root.clone(),
                    virtual_root,
                    token: token.clone(),
                    push,
                });
                self.emit(StoreEvent::BeginLoading {
                    path: TreePath::root(),
                });
                let fs = Arc::clone(&self.fs);
                let tx = self.msg_tx.clone();
                self.start_op();
                tokio::spawn(async move {
                    let result = fs.mount(&root, &token).await;
                    let _ = tx.send(StoreMessage::MountDone { token, result });
                });
            }
            Probe::NotFound => {
                self.emit(StoreEvent::Error(StoreError::SetRoot {
                    path: root,
                    reason: "no such location".into(),
                }));
                self.degraded();
            }
            Probe::Error(e) => {
                self.emit(StoreEvent::Error(StoreError::SetRoot {
                    path: root,
                    reason: e.to_string(),
                }));
                self.degraded();
            }
        }
    }

    fn finish_set_roots(&mut self, virtual_root: PathBuf, push: bool) {
        let Some(root_id) = self.root else { return };
        match self.materialize_chain(root_id, &virtual_root) {
            Some(vr) => self.apply_virtual_root(vr, push, true),
            None => {
                self.emit(StoreEvent::Error(StoreError::SetRoot {
                    path: virtual_root,
                    reason: "not inside the root".into(),
                }));
                self.degraded();
            }
        }
    }

    pub(crate) fn handle_mount_done(&mut self, token: CancelToken, result: io::Result<()>) {
        let matches = self
            .mounting
            .as_ref()
            .map(|r| r.token.same_as(&token) && !token.is_cancelled())
            .unwrap_or(false);
        if !matches {
            return;
        }
        let Some(request) = self.mounting.take() else {
            return;
        };
        self.emit(StoreEvent::EndLoading {
            path: TreePath::root(),
        });
        match result {
            Ok(()) => match self.fs.query_info(&request.root) {
                Probe::Found(_) => {
                    debug!(root = %request.root.display(), "mount finished");
                    self.finish_set_roots(request.virtual_root, request.push);
                }
                probe => {
                    self.emit(StoreEvent::Error(StoreError::SetRoot {
                        path: request.root,
                        reason: describe_probe(&probe),
                    }));
                    self.degraded();
                }
            },
            Err(e) => {
                warn!(root = %request.root.display(), error = %e, "mount failed");
                self.emit(StoreEvent::Error(StoreError::SetRoot {
                    path: request.root,
                    reason: e.to_string(),
                }));
                self.degraded();
            }
        }
    }

    /// Fall back to a usable single-node tree: the root doubles as the
    /// virtual root and nothing is enumerated.
    fn degraded(&mut self) {
        self.virtual_root = self.root;
        let Some(vr) = self.virtual_root else { return };
        if let Some(location) = self.location_of(vr) {
            self.emit(StoreEvent::VirtualRootChanged { location });
            self.model_fill(vr);
        }
    }

    /// Create or locate one directory node per path segment between the
    /// root and `target`. New chain nodes stay unloaded, holding only the
    /// one child the chain knows about; a later expand enumerates the rest.
    fn materialize_chain(&mut self, root_id: NodeId, target: &Path) -> Option<NodeId> {
        let root_loc = self.arena.get(root_id)?.location.clone();
        let rel = target.strip_prefix(&root_loc).ok()?.to_path_buf();
        let mut current = root_id;
        for component in rel.components() {
            let std::path::Component::Normal(segment) = component else {
                continue;
            };
            let location = self.arena.get(current)?.location.join(segment);
            let existing = self.arena.get(current)?.children.iter().copied().find(|&c| {
                self.arena
                    .get(c)
                    .map(|n| !n.dummy && n.location == location)
                    .unwrap_or(false)
            });
            current = match existing {
                Some(child) => child,
                None => {
                    let mut node = Node::new(location, NodeKind::Directory, Some(current));
                    node.filtered = self.filter.excludes(&node);
                    let id = self.arena.insert(node);
                    self.refresh_dummy(id, false);
                    // Linked silently: the virtual-root change that follows
                    // resets the view before anything here is shown.
                    let idx = {
                        let parent = self.arena.get(current)?;
                        let node_ref = self.arena.get(id)?;
                        sort::insertion_index(&self.arena, &parent.children, node_ref)
                    };
                    self.arena.get_mut(current)?.children.insert(idx, id);
                    self.refresh_dummy(current, false);
                    id
                }
            };
        }
        Some(current)
    }

    fn apply_virtual_root(&mut self, vr: NodeId, push: bool, force: bool) {
        if !force && self.virtual_root == Some(vr) {
            return;
        }
        self.virtual_root = Some(vr);
        self.evict_outside(vr);
        let Some(location) = self.location_of(vr) else {
            return;
        };
        if push {
            if let Some(root) = self.root_location().map(Path::to_path_buf) {
                self.history.push(Location {
                    root,
                    virtual_root: location.clone(),
                });
            }
        }
        debug!(virtual_root = %location.display(), "virtual root moved");
        self.emit(StoreEvent::VirtualRootChanged { location });
        self.model_fill(vr);
        let needs_load = self
            .arena
            .get(vr)
            .map(|n| !n.load.is_loaded() && !n.load.is_loading())
            .unwrap_or(false);
        if needs_load {
            self.begin_load(vr);
        }
    }

    /// Cache retention after a virtual-root move: ancestors of the new
    /// virtual root keep only direct-child stubs (so "go up" is instant),
    /// subtrees hanging off those ancestors are freed, and everything
    /// inside the new virtual root's subtree is preserved as-is.
    fn evict_outside(&mut self, vr: NodeId) {
        let mut chain = Vec::new();
        let mut current = vr;
        loop {
            chain.push(current);
            match self.arena.get(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        chain.reverse();
        if chain.len() <= 1 {
            return;
        }
        let chain_set: std::collections::HashSet<NodeId> = chain.iter().copied().collect();
        for &ancestor in &chain[..chain.len() - 1] {
            let children = match self.arena.get(ancestor) {
                Some(n) => n.children.clone(),
                None => continue,
            };
            for child in children {
                if chain_set.contains(&child) {
                    continue;
                }
                let keep = self
                    .arena
                    .get(child)
                    .map(|n| n.dummy)
                    .unwrap_or(true);
                if keep {
                    continue;
                }
                self.strip_node_children(child);
            }
            self.unload_in_place(ancestor);
        }
    }

    /// Reduce `id` to an unloaded stub: free all descendants, keep the
    /// node itself (plus a fresh dummy when it is a directory).
    fn strip_node_children(&mut self, id: NodeId) {
        let Some(node) = self.arena.get(id) else { return };
        if !node.is_dir() {
            return;
        }
        let children = node.children.clone();
        for child in children {
            self.free_subtree_inner(child);
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.children.clear();
        }
        self.unload_in_place(id);
        self.refresh_dummy(id, false);
    }

    /// Cancel the load, drop the watch, and mark unloaded; announces the
    /// eviction when a loaded subtree is being dropped.
    fn unload_in_place(&mut self, id: NodeId) {
        let released = {
            let Some(node) = self.arena.get_mut(id) else {
                return;
            };
            let was_loaded = node.load.is_loaded();
            node.release();
            was_loaded.then(|| node.location.clone())
        };
        if let Some(location) = released {
            self.emit(StoreEvent::Unloaded { location });
        }
    }

    /// Free `id` and its whole subtree without touching the parent's child
    /// list; row events are not emitted (callers handle the top row).
    fn free_subtree_inner(&mut self, id: NodeId) {
        let children = match self.arena.get(id) {
            Some(n) => n.children.clone(),
            None => return,
        };
        for child in children {
            self.free_subtree_inner(child);
        }
        if let Some(mut node) = self.arena.remove(id) {
            let evicted_dir = node.is_dir() && node.load.is_loaded();
            node.release();
            if evicted_dir {
                self.emit(StoreEvent::Unloaded {
                    location: node.location.clone(),
                });
            }
        }
    }

    /// Unlink and free a node with its subtree. Emits one `RowDeleted`
    /// carrying the path the row occupied, if it was visible; invisible
    /// removals are silent.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) {
        let row = self.path_of(id);
        let parent = self.arena.get(id).and_then(|n| n.parent);
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.arena.get_mut(parent_id) {
                parent_node.children.retain(|&c| c != id);
            }
        }
        self.free_subtree_inner(id);
        if let Some(path) = row {
            self.emit(StoreEvent::RowDeleted { path });
        }
        if let Some(parent_id) = parent {
            self.refresh_dummy(parent_id, true);
        }
    }

    fn clear_all(&mut self) {
        for (_, batch) in self.deletes.drain() {
            batch.cancel();
        }
        if let Some(request) = self.mounting.take() {
            request.token.cancel();
        }
        self.arena.clear();
        self.root = None;
        self.virtual_root = None;
    }

    // ── Node bookkeeping ─────────────────────────────────────────────────

    /// Create an unlinked node for an enumerated entry, classified and
    /// passed through the filter engine. Directories get their placeholder
    /// child attached.
    pub(crate) fn adopt_entry(
        &mut self,
        parent: NodeId,
        location: PathBuf,
        info: &FileInfo,
    ) -> NodeId {
        let kind = match info.kind {
            EntryKind::Directory => NodeKind::Directory,
            _ => NodeKind::File,
        };
        let mut node = Node::new(location, kind, Some(parent));
        node.hidden = node.hidden || info.hidden;
        node.text = info.text;
        node.filtered = self.filter.excludes(&node);
        let id = self.arena.insert(node);
        if kind == NodeKind::Directory {
            self.refresh_dummy(id, false);
        }
        id
    }

    /// Link a prepared node into its parent at the sorted position and
    /// announce the new row when visible.
    pub(crate) fn link_child(&mut self, parent: NodeId, id: NodeId) {
        let idx = {
            let Some(parent_node) = self.arena.get(parent) else {
                return;
            };
            let Some(node) = self.arena.get(id) else { return };
            sort::insertion_index(&self.arena, &parent_node.children, node)
        };
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children.insert(idx, id);
        }
        self.emit_row_inserted(id);
    }

    pub(crate) fn emit_row_inserted(&mut self, id: NodeId) {
        if let Some(path) = self.path_of(id) {
            if let Some(node) = self.arena.get(id).map(|n| n.summary()) {
                self.emit(StoreEvent::RowInserted { path, node });
            }
        }
    }

    /// Keep the invariant: exactly one dummy child iff a directory has no
    /// visible real children. Row events only fire when `announce` is set
    /// (and the row is visible).
    pub(crate) fn refresh_dummy(&mut self, dir: NodeId, announce: bool) {
        let Some(node) = self.arena.get(dir) else { return };
        if !node.is_dir() {
            return;
        }
        let location = node.location.clone();
        let dummy = node.children.iter().copied().find(|&c| {
            self.arena.get(c).map(|n| n.dummy).unwrap_or(false)
        });
        let has_real_visible = node.children.iter().any(|&c| {
            self.arena
                .get(c)
                .map(|n| !n.dummy && !n.filtered)
                .unwrap_or(false)
        });
        match (dummy, has_real_visible) {
            (None, false) => {
                let id = self.arena.insert(Node::new_dummy(location, dir));
                if let Some(parent) = self.arena.get_mut(dir) {
                    parent.children.insert(0, id);
                }
                if announce {
                    self.emit_row_inserted(id);
                }
            }
            (Some(dummy_id), true) => {
                let row = if announce { self.path_of(dummy_id) } else { None };
                if let Some(parent) = self.arena.get_mut(dir) {
                    parent.children.retain(|&c| c != dummy_id);
                }
                self.arena.remove(dummy_id);
                if let Some(path) = row {
                    self.emit(StoreEvent::RowDeleted { path });
                }
            }
            _ => {}
        }
    }

    /// Announce every cached visible row below `dir`, depth-first, after a
    /// virtual-root change reset the view.
    fn model_fill(&mut self, dir: NodeId) {
        let children = match self.arena.get(dir) {
            Some(n) => n.children.clone(),
            None => return,
        };
        for child in children {
            let Some((filtered, is_dir)) =
                self.arena.get(child).map(|n| (n.filtered, n.is_dir()))
            else {
                continue;
            };
            if filtered {
                continue;
            }
            self.emit_row_inserted(child);
            if is_dir {
                self.model_fill(child);
            }
        }
    }

    /// Re-sort the children of `parent` after an in-place change and emit
    /// one `RowsReordered` with the permutation when visible rows moved.
    pub(crate) fn resort_children(&mut self, parent: NodeId) {
        let Some(parent_node) = self.arena.get_mut(parent) else {
            return;
        };
        let mut children = std::mem::take(&mut parent_node.children);
        let permutation = sort::resort(&self.arena, &mut children);
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children = children;
        }
        if let Some(new_order) = permutation {
            if let Some(parent_path) = self.path_of(parent) {
                self.emit(StoreEvent::RowsReordered {
                    parent: parent_path,
                    new_order,
                });
            }
        }
    }

    // ── Settings ─────────────────────────────────────────────────────────

    pub fn loader_settings(&self) -> &LoaderSettings {
        &self.loader
    }

    /// Applies to loads started after the call; in-flight ones keep the
    /// old batch size.
    pub fn set_loader_settings(&mut self, settings: LoaderSettings) {
        self.loader = settings;
    }

    pub fn filter_settings(&self) -> &FilterSettings {
        self.filter.settings()
    }

    /// Replace the filter settings and reconcile visibility in one pass.
    pub fn set_filter_settings(&mut self, settings: FilterSettings) {
        if *self.filter.settings() == settings {
            return;
        }
        self.filter.set_settings(settings);
        self.refilter();
    }

    pub fn set_hide_hidden(&mut self, hide: bool) {
        let mut settings = self.filter.settings().clone();
        settings.hide_hidden = hide;
        self.set_filter_settings(settings);
    }

    pub fn set_hide_binary(&mut self, hide: bool) {
        let mut settings = self.filter.settings().clone();
        settings.hide_binary = hide;
        self.set_filter_settings(settings);
    }

    pub fn set_pattern(&mut self, pattern: Option<&str>) {
        let mut settings = self.filter.settings().clone();
        settings.pattern = pattern.map(String::from);
        self.set_filter_settings(settings);
    }

    /// Register a visibility predicate; consulted in registration order,
    /// first exclusion wins.
    pub fn register_filter(&mut self, predicate: FilterPredicate) -> FilterHandle {
        let handle = self.filter.register(predicate);
        self.refilter();
        handle
    }

    /// Remove a predicate (dropping its closure) and reconcile visibility.
    pub fn unregister_filter(&mut self, handle: FilterHandle) {
        if self.filter.unregister(handle) {
            self.refilter();
        }
    }

    /// One depth-first pass recomputing every node's filtered bit, emitting
    /// removes for newly hidden rows and inserts for newly visible ones.
    /// Nodes that keep their visibility are never reordered.
    fn refilter(&mut self) {
        let Some(vr) = self.virtual_root else { return };
        self.refilter_dir(vr, true);
    }

    fn refilter_dir(&mut self, dir: NodeId, announce: bool) {
        let children = match self.arena.get(dir) {
            Some(n) => n.children.clone(),
            None => return,
        };
        for child in children {
            let Some((old, is_dir, is_dummy)) = self
                .arena
                .get(child)
                .map(|n| (n.filtered, n.is_dir(), n.dummy))
            else {
                continue;
            };
            if is_dummy {
                continue;
            }
            let fresh = match self.arena.get(child) {
                Some(node) => self.filter.excludes(node),
                None => continue,
            };
            let row_before = if announce && !old {
                self.path_of(child)
            } else {
                None
            };
            if let Some(node) = self.arena.get_mut(child) {
                node.filtered = fresh;
            }
            match (old, fresh) {
                (false, true) => {
                    if is_dir {
                        self.refilter_dir(child, false);
                    }
                    if let Some(path) = row_before {
                        self.emit(StoreEvent::RowDeleted { path });
                    }
                }
                (true, false) => {
                    if is_dir {
                        self.refilter_dir(child, false);
                    }
                    if announce {
                        self.emit_row_inserted(child);
                        if is_dir && self.path_of(child).is_some() {
                            self.model_fill(child);
                        }
                    }
                }
                _ => {
                    if is_dir {
                        self.refilter_dir(child, announce && !fresh);
                    }
                }
            }
        }
        self.refresh_dummy(dir, announce);
    }

    // ── Watch folding ────────────────────────────────────────────────────

    fn handle_watch_event(&mut self, event: WatchEvent) {
        let Some(dir_id) = self.find(&event.dir) else { return };
        let loaded = self
            .arena
            .get(dir_id)
            .map(|n| n.is_dir() && n.load.is_loaded())
            .unwrap_or(false);
        if !loaded {
            return;
        }
        let existing = self.arena.get(dir_id).and_then(|n| {
            n.children.iter().copied().find(|&c| {
                self.arena
                    .get(c)
                    .map(|cn| !cn.dummy && cn.location == event.path)
                    .unwrap_or(false)
            })
        });
        match event.kind {
            WatchKind::Created => {
                if existing.is_some() {
                    return;
                }
                let info = match self.fs.query_info(&event.path) {
                    Probe::Found(info) => info,
                    _ => return,
                };
                if info.kind == EntryKind::Special {
                    return;
                }
                debug!(path = %event.path.display(), "watched entry created");
                let id = self.adopt_entry(dir_id, event.path, &info);
                self.link_child(dir_id, id);
                self.refresh_dummy(dir_id, true);
            }
            WatchKind::Deleted => {
                if let Some(child) = existing {
                    debug!(path = %event.path.display(), "watched entry deleted");
                    self.remove_subtree(child);
                }
            }
        }
    }

    // ── Message pump ─────────────────────────────────────────────────────

    pub(crate) fn handle_message(&mut self, message: StoreMessage) {
        match message {
            StoreMessage::LoadBatch { dir, token, entries } => {
                self.handle_load_batch(dir, token, entries);
            }
            StoreMessage::LoadDone { dir, token } => {
                self.finish_op();
                self.handle_load_done(dir, token);
            }
            StoreMessage::LoadFailed { dir, token, error } => {
                self.finish_op();
                self.handle_load_failed(dir, token, error);
            }
            StoreMessage::MountDone { token, result } => {
                self.finish_op();
                self.handle_mount_done(token, result);
            }
            StoreMessage::DeleteDone {
                batch,
                token,
                outcome,
            } => {
                self.finish_op();
                self.handle_delete_done(batch, token, outcome);
            }
        }
    }

    /// Fold in completions until every in-flight operation finished (or is
    /// parked waiting on a caller decision). Watch events queued meanwhile
    /// are folded in too.
    pub async fn settle(&mut self) {
        loop {
            self.pump();
            if self.active_ops == 0 {
                break;
            }
            let message = self.msg_rx.recv().await;
            match message {
                Some(message) => self.handle_message(message),
                None => break,
            }
        }
    }

    /// Fold in everything already queued without waiting.
    pub fn pump(&mut self) {
        loop {
            let mut progressed = false;
            while let Ok(message) = self.msg_rx.try_recv() {
                self.handle_message(message);
                progressed = true;
            }
            while let Ok(event) = self.watch_rx.try_recv() {
                self.handle_watch_event(event);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    pub fn has_pending_operations(&self) -> bool {
        self.active_ops > 0
    }

    pub(crate) fn start_op(&mut self) {
        self.active_ops += 1;
    }

    pub(crate) fn finish_op(&mut self) {
        self.active_ops = self.active_ops.saturating_sub(1);
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    // ── Read access ──────────────────────────────────────────────────────

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn virtual_root(&self) -> Option<NodeId> {
        self.virtual_root
    }

    pub fn root_location(&self) -> Option<&Path> {
        self.root
            .and_then(|id| self.arena.get(id))
            .map(|n| n.location.as_path())
    }

    pub fn virtual_root_location(&self) -> Option<&Path> {
        self.virtual_root
            .and_then(|id| self.arena.get(id))
            .map(|n| n.location.as_path())
    }

    pub fn location_of(&self, id: NodeId) -> Option<PathBuf> {
        self.arena.get(id).map(|n| n.location.clone())
    }

    pub fn summary(&self, id: NodeId) -> Option<NodeSummary> {
        self.arena.get(id).map(|n| n.summary())
    }

    /// Children of `id` that pass the filters (including the dummy), in
    /// display order.
    pub fn visible_children(&self, id: NodeId) -> Vec<NodeId> {
        self.arena
            .get(id)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|&c| self.arena.get(c).map(|cn| !cn.filtered).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of cached nodes, placeholders included. The retention policy
    /// on virtual-root moves keeps this bounded.
    pub fn cached_nodes(&self) -> usize {
        self.arena.len()
    }

    pub fn is_loaded(&self, id: NodeId) -> bool {
        self.arena
            .get(id)
            .map(|n| n.load.is_loaded())
            .unwrap_or(false)
    }

    /// Locate a cached node by its absolute location, scoped to the
    /// current root. Dummy placeholders are never returned.
    pub fn find(&self, location: &Path) -> Option<NodeId> {
        let mut current = self.root?;
        loop {
            let node = self.arena.get(current)?;
            if node.location == location {
                return Some(current);
            }
            let next = node.children.iter().copied().find(|&c| {
                self.arena
                    .get(c)
                    .map(|n| !n.dummy && location.starts_with(&n.location))
                    .unwrap_or(false)
            })?;
            current = next;
        }
    }
}

fn describe_probe(probe: &Probe) -> String {
    match probe {
        Probe::Found(_) => "found".into(),
        Probe::NotMounted => "not mounted".into(),
        Probe::NotFound => "no such location".into(),
        Probe::Error(e) => e.to_string(),
    }
}
