//! Graph Nodes
//!
//! This module defines the node type that lives in the dependency graph.
//! Every state variable and attribute of every component instance owns
//! exactly one node.

use std::collections::HashSet;

use super::cell::CellId;
use crate::component::Handle;
use crate::value::Value;

/// Unique identifier for a node in the dependency graph.
///
/// IDs are allocated by the [`UpdateScheduler`](super::UpdateScheduler) that
/// owns the node and are never reused within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Reads an essential cell. Aliased nodes share one cell.
    /// These are the roots of the graph: they have dependents but no
    /// dependencies, and never cache.
    Essential(CellId),

    /// A pure derivation. Caches its value until a dependency changes.
    Derived,

    /// The replacement plan of a composite. Computed like a derived node,
    /// but materialized eagerly by the engine during settlement.
    Plan,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed (or the node was never computed). The next read
    /// recomputes.
    Stale,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// The component instance the node belongs to.
    owner: Handle,

    /// State variable or attribute name on the owner.
    variable: String,

    /// Current dirty state.
    dirty: DirtyState,

    /// Memoized value, `None` until first computed.
    value: Option<Value>,

    /// Nodes that this node read during its last computation.
    dependencies: HashSet<NodeId>,

    /// Nodes that read this node during their last computation.
    dependents: HashSet<NodeId>,

    /// How many times the definition has run.
    recomputes: u64,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind, owner: Handle, variable: &str) -> Self {
        Self {
            id,
            kind,
            owner,
            variable: variable.to_string(),
            dirty: match kind {
                NodeKind::Essential(_) => DirtyState::Clean,
                // Start stale to ensure first computation
                NodeKind::Derived | NodeKind::Plan => DirtyState::Stale,
            },
            value: None,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            recomputes: 0,
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn owner(&self) -> Handle {
        self.owner
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// The essential cell behind this node, if any.
    pub fn cell(&self) -> Option<CellId> {
        match self.kind {
            NodeKind::Essential(cell) => Some(cell),
            _ => None,
        }
    }

    /// Get the current dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as stale. Essential nodes have nothing to recompute and
    /// stay clean.
    pub fn mark_stale(&mut self) {
        if !matches!(self.kind, NodeKind::Essential(_)) {
            self.dirty = DirtyState::Stale;
        }
    }

    /// The memoized value, if one has been computed.
    pub fn cached(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn store(&mut self, value: Value) {
        self.value = Some(value);
        self.recomputes += 1;
        self.dirty = DirtyState::Clean;
    }

    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    /// Add a dependency (a node that this node reads from).
    pub fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.remove(&node_id);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &HashSet<NodeId> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.remove(&node_id);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &HashSet<NodeId> {
        &self.dependents
    }

    /// Clear all dependencies, returning them.
    pub(crate) fn take_dependencies(&mut self) -> HashSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derived(id: u64) -> Node {
        Node::new(NodeId::from(id), NodeKind::Derived, Handle::from(0), "value")
    }

    #[test]
    fn essential_node_starts_clean_and_stays_clean() {
        let mut node = Node::new(
            NodeId::from(1),
            NodeKind::Essential(CellId::from(7)),
            Handle::from(0),
            "x",
        );
        assert!(node.is_clean());
        node.mark_stale();
        assert!(node.is_clean());
        assert_eq!(node.cell(), Some(CellId::from(7)));
    }

    #[test]
    fn derived_node_starts_stale() {
        let node = derived(1);
        assert_eq!(node.kind(), NodeKind::Derived);
        assert_eq!(node.dirty_state(), DirtyState::Stale);
        assert!(node.cached().is_none());
    }

    #[test]
    fn storing_a_value_cleans_and_counts() {
        let mut node = derived(1);
        node.store(Value::Number(2.0));
        assert!(node.is_clean());
        assert_eq!(node.cached(), Some(&Value::Number(2.0)));
        assert_eq!(node.recomputes(), 1);

        node.mark_stale();
        assert_eq!(node.dirty_state(), DirtyState::Stale);
        // the cache survives until the next recompute
        assert_eq!(node.cached(), Some(&Value::Number(2.0)));
    }

    #[test]
    fn dependency_management() {
        let mut node = derived(1);
        let dep1 = NodeId::from(2);
        let dep2 = NodeId::from(3);

        node.add_dependency(dep1);
        node.add_dependency(dep2);
        assert_eq!(node.dependencies().len(), 2);

        node.remove_dependency(dep1);
        assert!(!node.dependencies().contains(&dep1));

        let taken = node.take_dependencies();
        assert!(taken.contains(&dep2));
        assert!(node.dependencies().is_empty());
    }
}
