//! Per-path traversal state for the graph resolver.

use std::collections::HashSet;
use std::sync::Arc;

/// Depth and visited `object#relation` keys along one resolution path.
///
/// Sibling branches share the visited set until one of them records a new
/// key, at which point that branch gets its own copy.
#[derive(Debug, Clone, Default)]
pub(crate) struct TraversalContext {
    pub(crate) depth: u32,
    pub(crate) visited: Arc<HashSet<String>>,
}

impl TraversalContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the context one level deeper on the same path.
    pub(crate) fn increment_depth(&self) -> Self {
        Self {
            depth: self.depth + 1,
            visited: Arc::clone(&self.visited),
        }
    }

    /// Returns the context with `key` recorded as visited.
    pub(crate) fn with_visited(&self, key: &str) -> Self {
        let mut visited = Arc::clone(&self.visited);
        Arc::make_mut(&mut visited).insert(key.to_string());
        Self {
            depth: self.depth,
            visited,
        }
    }
}
