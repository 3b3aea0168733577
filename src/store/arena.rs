//! Arena of filesystem nodes addressed by stable generational ids.
//!
//! Nodes never hold references to each other; parent/child relations are
//! id lists. A slot's generation bumps on every free, so a stale id kept
//! by an in-flight async operation simply fails to resolve instead of
//! touching a recycled node.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::event::NodeSummary;
use crate::fs::{CancelToken, WatchGuard};

/// Display name of the placeholder child shown under a directory with no
/// visible children.
pub const DUMMY_NAME: &str = "(Empty)";

/// Stable identifier of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Kind of a materialized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Enumeration state of a directory node.
#[derive(Debug, Default)]
pub(crate) enum LoadState {
    #[default]
    Unloaded,
    Loading {
        token: CancelToken,
        /// Children known when the load started; entries already present
        /// are never clobbered by a batch.
        snapshot: HashSet<PathBuf>,
    },
    Loaded,
}

impl LoadState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }
}

/// One filesystem entry in the cache.
#[derive(Debug)]
pub(crate) struct Node {
    pub location: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Kept in sort order by the store, not insertion order.
    pub children: Vec<NodeId>,
    /// Hidden attribute of the entry itself (dotfile), not the filter state.
    pub hidden: bool,
    pub text: bool,
    /// Computed by the filter engine; an excluded node stays cached but
    /// invisible.
    pub filtered: bool,
    pub dummy: bool,
    pub load: LoadState,
    pub watch: Option<Box<dyn WatchGuard>>,
}

impl Node {
    pub fn new(location: PathBuf, kind: NodeKind, parent: Option<NodeId>) -> Self {
        let name = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.to_string_lossy().into_owned());
        let hidden = name.starts_with('.');
        Self {
            location,
            name,
            kind,
            parent,
            children: Vec::new(),
            hidden,
            text: false,
            filtered: false,
            dummy: false,
            load: LoadState::Unloaded,
            watch: None,
        }
    }

    /// Placeholder child; carries the parent directory's location.
    pub fn new_dummy(parent_location: PathBuf, parent: NodeId) -> Self {
        Self {
            location: parent_location,
            name: DUMMY_NAME.to_string(),
            kind: NodeKind::File,
            parent: Some(parent),
            children: Vec::new(),
            hidden: false,
            text: false,
            filtered: false,
            dummy: true,
            load: LoadState::Unloaded,
            watch: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Cancel the in-flight load and tear down the watch. Called before a
    /// node is freed or unloaded; safe to call repeatedly.
    pub fn release(&mut self) {
        if let LoadState::Loading { token, .. } = &self.load {
            token.cancel();
        }
        self.load = LoadState::Unloaded;
        self.watch = None;
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            location: self.location.clone(),
            name: self.name.clone(),
            kind: self.kind,
            hidden: self.hidden,
            dummy: self.dummy,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Owner of all node records.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Free one slot; the id (and any stale clone of it) stops resolving.
    /// Children are not touched; recursive removal is the store's job.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(node)
    }

    /// Free everything, releasing watches and cancelling in-flight loads.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(mut node) = slot.node.take() {
                node.release();
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn file_node(path: &str) -> Node {
        Node::new(PathBuf::from(path), NodeKind::File, None)
    }

    #[test]
    fn insert_and_get() {
        let mut arena = NodeArena::new();
        let id = arena.insert(file_node("/home/u/a.txt"));
        let node = arena.get(id).unwrap();
        assert_eq!(node.name, "a.txt");
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn name_derives_from_location() {
        let node = file_node("/home/u/.bashrc");
        assert_eq!(node.name, ".bashrc");
        assert!(node.hidden);
    }

    #[test]
    fn removed_id_stops_resolving() {
        let mut arena = NodeArena::new();
        let id = arena.insert(file_node("/a"));
        assert!(arena.remove(id).is_some());
        assert!(arena.get(id).is_none());
        assert!(arena.remove(id).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut arena = NodeArena::new();
        let stale = arena.insert(file_node("/a"));
        arena.remove(stale);
        let fresh = arena.insert(file_node("/b"));
        assert_ne!(stale, fresh);
        assert!(arena.get(stale).is_none());
        assert_eq!(arena.get(fresh).unwrap().name, "b");
    }

    #[test]
    fn clear_invalidates_all_ids() {
        let mut arena = NodeArena::new();
        let a = arena.insert(file_node("/a"));
        let b = arena.insert(file_node("/b"));
        arena.clear();
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_none());
        assert!(arena.is_empty());
        // Slots are reusable after a clear.
        let c = arena.insert(file_node("/c"));
        assert_eq!(arena.get(c).unwrap().name, "c");
    }

    #[test]
    fn clear_cancels_inflight_loads() {
        let mut arena = NodeArena::new();
        let id = arena.insert(Node::new(
            PathBuf::from("/d"),
            NodeKind::Directory,
            None,
        ));
        let token = CancelToken::new();
        arena.get_mut(id).unwrap().load = LoadState::Loading {
            token: token.clone(),
            snapshot: HashSet::new(),
        };
        arena.clear();
        assert!(token.is_cancelled());
    }

    #[test]
    fn dummy_uses_parent_location() {
        let mut arena = NodeArena::new();
        let dir = arena.insert(Node::new(
            PathBuf::from("/home/u/sub"),
            NodeKind::Directory,
            None,
        ));
        let dummy = Node::new_dummy(PathBuf::from("/home/u/sub"), dir);
        assert_eq!(dummy.name, DUMMY_NAME);
        assert_eq!(dummy.location, Path::new("/home/u/sub"));
        assert!(dummy.dummy);
        assert!(!dummy.hidden);
    }

    #[test]
    fn release_cancels_token_and_drops_watch() {
        let mut node = Node::new(PathBuf::from("/d"), NodeKind::Directory, None);
        let token = CancelToken::new();
        node.load = LoadState::Loading {
            token: token.clone(),
            snapshot: HashSet::new(),
        };
        node.release();
        assert!(token.is_cancelled());
        assert!(matches!(node.load, LoadState::Unloaded));
        node.release();
    }
}
