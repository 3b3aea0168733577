//! Visibility rules: filter mode, glob pattern, registered predicates.

use std::fmt;
use std::path::Path;

use globset::{Glob, GlobMatcher};
use tracing::warn;

use crate::config::FilterSettings;

use super::arena::{Node, NodeKind};

/// Borrowed view of a node handed to filter predicates.
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo<'a> {
    pub location: &'a Path,
    pub name: &'a str,
    pub kind: NodeKind,
    pub hidden: bool,
    pub text: bool,
}

/// Handle identifying a registered filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterHandle(u64);

/// Predicate consulted for every node; returning `false` excludes it.
/// Predicates run in registration order and the first exclusion wins.
pub type FilterPredicate = Box<dyn FnMut(&NodeInfo<'_>) -> bool + Send>;

pub(crate) struct FilterEngine {
    settings: FilterSettings,
    matcher: Option<GlobMatcher>,
    predicates: Vec<(FilterHandle, FilterPredicate)>,
    next_handle: u64,
}

impl FilterEngine {
    pub fn new(settings: FilterSettings) -> Self {
        let matcher = compile_pattern(settings.pattern.as_deref());
        Self {
            settings,
            matcher,
            predicates: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: FilterSettings) {
        self.matcher = compile_pattern(settings.pattern.as_deref());
        self.settings = settings;
    }

    pub fn register(&mut self, predicate: FilterPredicate) -> FilterHandle {
        let handle = FilterHandle(self.next_handle);
        self.next_handle += 1;
        self.predicates.push((handle, predicate));
        handle
    }

    /// Remove a predicate; its closure is dropped here. Returns whether
    /// the handle was registered.
    pub fn unregister(&mut self, handle: FilterHandle) -> bool {
        let before = self.predicates.len();
        self.predicates.retain(|(h, _)| *h != handle);
        self.predicates.len() != before
    }

    /// Whether the current rules exclude this node. Dummy placeholders are
    /// never excluded; their presence is managed separately.
    pub fn excludes(&mut self, node: &Node) -> bool {
        if node.dummy {
            return false;
        }
        if self.settings.hide_hidden && (node.hidden || node.name.ends_with('~')) {
            return true;
        }
        if self.settings.hide_binary && node.kind == NodeKind::File && !node.text {
            return true;
        }
        if let Some(matcher) = &self.matcher {
            if node.kind == NodeKind::File && !matcher.is_match(&node.name) {
                return true;
            }
        }
        let info = NodeInfo {
            location: &node.location,
            name: &node.name,
            kind: node.kind,
            hidden: node.hidden,
            text: node.text,
        };
        for (_, predicate) in &mut self.predicates {
            if !predicate(&info) {
                return true;
            }
        }
        false
    }
}

impl fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEngine")
            .field("settings", &self.settings)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

fn compile_pattern(pattern: Option<&str>) -> Option<GlobMatcher> {
    let pattern = pattern?;
    if pattern.is_empty() {
        return None;
    }
    match Glob::new(pattern) {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            warn!(pattern, error = %e, "ignoring unparsable filter pattern");
            None
        }
    }
}
