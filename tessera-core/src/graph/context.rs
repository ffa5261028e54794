//! Compute Stack
//!
//! Reads are pull-based: reading a stale node recomputes it, which reads its
//! dependencies, which may recompute them in turn. The compute stack records
//! which nodes are mid-computation so that a node reached again through its
//! own dependencies is detected as a cycle instead of recursing forever.
//!
//! This design supports nested computations (a derived value that reads
//! another derived value) without any thread-local state: the stack lives
//! on the engine that owns the graph.

use super::node::NodeId;

#[derive(Debug, Default)]
pub struct ComputeStack {
    frames: Vec<NodeId>,
}

impl ComputeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `node`. Returns `false`, leaving the stack untouched, if the
    /// node is already being computed.
    pub fn enter(&mut self, node: NodeId) -> bool {
        if self.frames.contains(&node) {
            return false;
        }
        self.frames.push(node);
        true
    }

    /// Pop `node`, which must be the innermost frame.
    pub fn exit(&mut self, node: NodeId) {
        let popped = self.frames.pop();
        debug_assert_eq!(
            popped,
            Some(node),
            "ComputeStack mismatch: expected {node:?}, got {popped:?}"
        );
    }

    /// The frames from the first occurrence of `node` to the top: the cycle
    /// that re-entering `node` would close.
    pub fn cycle_through(&self, node: NodeId) -> &[NodeId] {
        match self.frames.iter().position(|&frame| frame == node) {
            Some(start) => &self.frames[start..],
            None => &[],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_frames() {
        let mut stack = ComputeStack::new();
        let outer = NodeId::from(1);
        let inner = NodeId::from(2);

        assert!(!stack.is_active());
        assert!(stack.enter(outer));
        assert!(stack.enter(inner));
        assert_eq!(stack.depth(), 2);

        stack.exit(inner);
        stack.exit(outer);
        assert!(!stack.is_active());
    }

    #[test]
    fn reentry_is_a_cycle() {
        let mut stack = ComputeStack::new();
        let a = NodeId::from(1);
        let b = NodeId::from(2);

        assert!(stack.enter(a));
        assert!(stack.enter(b));
        assert!(!stack.enter(a));
        assert_eq!(stack.cycle_through(a), &[a, b]);
        assert_eq!(stack.depth(), 2);
    }
}
