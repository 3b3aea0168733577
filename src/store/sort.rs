//! Sibling ordering: dummy first, directories before files, hidden last,
//! then case-folded name comparison.

use std::cmp::Ordering;

use super::arena::{Node, NodeArena, NodeId};

/// Total order over sibling nodes.
pub(crate) fn compare(a: &Node, b: &Node) -> Ordering {
    // true sorts first
    b.dummy
        .cmp(&a.dummy)
        .then_with(|| b.is_dir().cmp(&a.is_dir()))
        .then_with(|| a.hidden.cmp(&b.hidden))
        .then_with(|| folded_name_cmp(&a.name, &b.name))
}

/// Per-character case-fold comparison with a case-sensitive tiebreak, so
/// names differing only in case still have a deterministic total order.
pub(crate) fn folded_name_cmp(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

fn by_id(arena: &NodeArena, a: NodeId, b: NodeId) -> Ordering {
    match (arena.get(a), arena.get(b)) {
        (Some(a), Some(b)) => compare(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Index at which `node` sorts within the already-sorted `children`.
/// Equal entries stay before the new one, keeping insertion stable.
pub(crate) fn insertion_index(arena: &NodeArena, children: &[NodeId], node: &Node) -> usize {
    children.partition_point(|&id| {
        arena
            .get(id)
            .map(|child| compare(child, node) != Ordering::Greater)
            .unwrap_or(false)
    })
}

/// Merge `incoming` (unsorted) into the already-sorted `children`.
/// Existing entries keep their relative order; ties favor existing
/// entries. Returns the incoming ids in their final ascending order.
pub(crate) fn merge(
    arena: &NodeArena,
    children: &mut Vec<NodeId>,
    mut incoming: Vec<NodeId>,
) -> Vec<NodeId> {
    incoming.sort_by(|&a, &b| by_id(arena, a, b));
    let old = std::mem::take(children);
    let mut merged = Vec::with_capacity(old.len() + incoming.len());
    let mut old_iter = old.into_iter().peekable();
    let mut new_iter = incoming.iter().copied().peekable();
    while let (Some(&o), Some(&n)) = (old_iter.peek(), new_iter.peek()) {
        if by_id(arena, n, o) == Ordering::Less {
            merged.push(n);
            new_iter.next();
        } else {
            merged.push(o);
            old_iter.next();
        }
    }
    merged.extend(old_iter);
    merged.extend(new_iter);
    *children = merged;
    incoming
}

/// Stable re-sort of `children` in place. Returns the permutation of
/// *visible* (unfiltered) row positions, `new_order[new_pos] = old_pos`,
/// or `None` when no visible row moved.
pub(crate) fn resort(arena: &NodeArena, children: &mut Vec<NodeId>) -> Option<Vec<usize>> {
    let visible = |id: NodeId| arena.get(id).map(|n| !n.filtered).unwrap_or(false);
    let old_visible: Vec<NodeId> = children.iter().copied().filter(|&id| visible(id)).collect();
    children.sort_by(|&a, &b| by_id(arena, a, b));
    let new_visible: Vec<NodeId> = children.iter().copied().filter(|&id| visible(id)).collect();
    if old_visible == new_visible {
        return None;
    }
    let new_order = new_visible
        .iter()
        .map(|id| {
            old_visible
                .iter()
                .position(|o| o == id)
                .expect("visible set is unchanged by a re-sort")
        })
        .collect();
    Some(new_order)
}
