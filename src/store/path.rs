//! Position paths over the visible tree.
//!
//! A [`TreePath`] addresses a row by its per-level index among *visible*
//! siblings, counted from the virtual root (the empty path). Paths are only
//! stable between change notifications.

use std::fmt;

use super::arena::NodeId;
use super::FileBrowserStore;

/// Index path in the visible tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    /// The virtual root itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn from_indices(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let mut first = true;
        for idx in &self.0 {
            if !first {
                write!(f, ":")?;
            }
            write!(f, "{}", idx)?;
            first = false;
        }
        Ok(())
    }
}

impl FileBrowserStore {
    /// Whether `id` is currently shown: it is the virtual root, or an
    /// unfiltered node whose every ancestor below the virtual root is
    /// unfiltered too.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(vr) = self.virtual_root else {
            return false;
        };
        if id == vr {
            return true;
        }
        let mut current = id;
        loop {
            let Some(node) = self.arena.get(current) else {
                return false;
            };
            if node.filtered {
                return false;
            }
            match node.parent {
                Some(parent) if parent == vr => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Index of `id` among the visible children of its parent.
    fn visible_index(&self, parent: NodeId, id: NodeId) -> Option<usize> {
        let parent = self.arena.get(parent)?;
        let mut position = 0;
        for &child in &parent.children {
            if child == id {
                return Some(position);
            }
            if self.arena.get(child).map(|n| !n.filtered).unwrap_or(false) {
                position += 1;
            }
        }
        None
    }

    /// Path of a node in the visible tree; `None` when the node is not
    /// reachable from the virtual root or is itself invisible.
    pub fn path_of(&self, id: NodeId) -> Option<TreePath> {
        let vr = self.virtual_root?;
        if id == vr {
            return Some(TreePath::root());
        }
        if !self.is_visible(id) {
            return None;
        }
        let mut indices = Vec::new();
        let mut current = id;
        while current != vr {
            let parent = self.arena.get(current)?.parent?;
            indices.push(self.visible_index(parent, current)?);
            current = parent;
        }
        indices.reverse();
        Some(TreePath::from_indices(indices))
    }

    /// Resolve a path back to a node, descending by visible child index.
    pub fn node_at(&self, path: &TreePath) -> Option<NodeId> {
        let mut current = self.virtual_root?;
        for &target in path.indices() {
            let node = self.arena.get(current)?;
            let mut position = 0;
            let mut found = None;
            for &child in &node.children {
                if self.arena.get(child).map(|n| !n.filtered).unwrap_or(false) {
                    if position == target {
                        found = Some(child);
                        break;
                    }
                    position += 1;
                }
            }
            current = found?;
        }
        Some(current)
    }
}
