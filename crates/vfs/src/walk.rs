use crate::fs::{Fs, NodeId};

/// Depth-first pre-order traversal over a tree.
///
/// The cursor holds no borrow of the tree, so callers may mutate nodes
/// between steps. Nodes detached after being scheduled are skipped when
/// the cursor reaches them, which makes "remove while walking" rules
/// safe without snapshotting the whole tree up front.
#[derive(Debug)]
pub struct WalkCursor {
    stack: Vec<NodeId>,
}

impl WalkCursor {
    /// Starts a traversal rooted at `start` (inclusive).
    #[must_use]
    pub fn new(start: NodeId) -> Self {
        Self { stack: vec![start] }
    }

    /// Yields the next attached node, scheduling its children.
    pub fn next(&mut self, fs: &Fs) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            if fs.is_detached(id) {
                continue;
            }
            let mut children = fs.children(id);
            children.reverse();
            self.stack.extend(children);
            return Some(id);
        }
        None
    }
}

impl Fs {
    /// Collects every attached node in depth-first pre-order, root first.
    #[must_use]
    pub fn all_paths(&self) -> Vec<NodeId> {
        let mut cursor = WalkCursor::new(self.root());
        let mut out = Vec::new();
        while let Some(id) = cursor.next(self) {
            out.push(id);
        }
        out
    }
}
