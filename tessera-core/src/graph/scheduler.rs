//! Update Scheduler
//!
//! The scheduler owns every node in the dependency graph together with its
//! forward and reverse edges, and decides what must be recomputed after a
//! write.
//!
//! # Algorithm
//!
//! Invalidation is push, recomputation is pull:
//!
//! 1. When an essential cell changes, walk the reverse edges breadth-first
//!    from every node that reads the cell, marking each reached node stale.
//! 2. Nothing is recomputed eagerly. A stale node recomputes the next time
//!    somebody reads it, and re-records its dependencies while doing so.
//!
//! Because a stale node's dependents are always stale too, the walk stops at
//! nodes that are already stale. Cost is proportional to what actually
//! changed, not to graph size.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use super::node::{Node, NodeId, NodeKind};
use crate::component::Handle;

/// The update scheduler manages the dependency graph and its invalidation.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    /// Next ID to hand out.
    next_id: u64,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node and add it to the graph.
    pub fn add_node(&mut self, kind: NodeKind, owner: Handle, variable: &str) -> NodeId {
        let id = NodeId::from(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, kind, owner, variable));
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        // Remove this node from its dependencies' dependent lists
        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        // Remove this node from its dependents' dependency lists
        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// This means when `dependency` changes, `dependent` may need to update.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Drop every incoming edge of `node_id`, ahead of a recomputation that
    /// will record them again.
    pub fn clear_dependencies(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        for dep_id in node.take_dependencies() {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(node_id);
            }
        }
    }

    /// Mark `roots` and everything downstream of them stale.
    ///
    /// Returns how many nodes changed from clean to stale.
    pub fn mark_stale<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut marked = 0;
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if let Some(node) = self.nodes.get_mut(&root) {
                if node.is_clean() && !matches!(node.kind(), NodeKind::Essential(_)) {
                    marked += 1;
                }
                node.mark_stale();
                visited.insert(root);
                queue.extend(node.dependents().iter().copied());
            }
        }

        // BFS over reverse edges
        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            if !node.is_clean() {
                // Already stale: its dependents are stale too
                continue;
            }
            node.mark_stale();
            marked += 1;
            queue.extend(node.dependents().iter().copied());
        }

        marked
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Order `keys` so that for every edge `(a, b)`, `a` comes before `b`.
///
/// Ties keep the order of `keys`, so the result is deterministic. Edges that
/// mention keys outside the set are ignored. When the edges contain a cycle,
/// returns one cycle as `Err`, starting and ending with the same key.
pub fn topological_order<K>(keys: &[K], edges: &[(K, K)]) -> Result<Vec<K>, Vec<K>>
where
    K: Copy + Eq + Hash,
{
    let position: HashMap<K, usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let mut in_degree = vec![0usize; keys.len()];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];

    for (from, to) in edges {
        let (Some(&f), Some(&t)) = (position.get(from), position.get(to)) else {
            continue;
        };
        outgoing[f].push(t);
        in_degree[t] += 1;
    }
    for targets in &mut outgoing {
        targets.sort_unstable();
    }

    // Kahn's algorithm, always taking the earliest ready key
    let mut ready: std::collections::BTreeSet<usize> =
        (0..keys.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut result = Vec::with_capacity(keys.len());

    while let Some(index) = ready.pop_first() {
        result.push(keys[index]);
        for &target in &outgoing[index] {
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                ready.insert(target);
            }
        }
    }

    if result.len() == keys.len() {
        return Ok(result);
    }

    // Every remaining key has a remaining predecessor, so walking backwards
    // through remaining keys must eventually repeat one.
    let remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
    for (from, targets) in outgoing.iter().enumerate() {
        for &to in targets {
            incoming[to].push(from);
        }
    }
    let Some(start) = remaining.iter().position(|&r| r) else {
        return Ok(result);
    };
    let mut path = vec![start];
    let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let Some(&previous) = incoming[current].iter().find(|&&f| remaining[f]) else {
            return Err(path.into_iter().rev().map(|i| keys[i]).collect());
        };
        if let Some(&at) = seen.get(&previous) {
            // path[at..] walks the cycle backwards; flip it to edge order
            let mut cycle: Vec<K> = path[at..].iter().rev().map(|&i| keys[i]).collect();
            cycle.insert(0, keys[previous]);
            return Err(cycle);
        }
        seen.insert(previous, path.len());
        path.push(previous);
        current = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::DirtyState;

    fn owner() -> Handle {
        Handle::from(0)
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut scheduler = UpdateScheduler::new();

        let id1 = scheduler.add_node(NodeKind::Derived, owner(), "a");
        let id2 = scheduler.add_node(NodeKind::Derived, owner(), "b");

        assert_eq!(scheduler.node_count(), 2);
        assert_ne!(id1, id2);

        scheduler.add_edge(id1, id2);
        scheduler.remove_node(id1);
        assert_eq!(scheduler.node_count(), 1);
        assert!(scheduler.get_node(id1).is_none());
        assert!(scheduler.get_node(id2).unwrap().dependencies().is_empty());
    }

    #[test]
    fn add_and_remove_edges() {
        let mut scheduler = UpdateScheduler::new();

        let source_id = scheduler.add_node(NodeKind::Derived, owner(), "source");
        let derived_id = scheduler.add_node(NodeKind::Derived, owner(), "derived");

        scheduler.add_edge(source_id, derived_id);

        // Check the edge exists
        assert!(scheduler
            .get_node(source_id)
            .unwrap()
            .dependents()
            .contains(&derived_id));
        assert!(scheduler
            .get_node(derived_id)
            .unwrap()
            .dependencies()
            .contains(&source_id));

        // Remove the edge
        scheduler.remove_edge(source_id, derived_id);

        assert!(!scheduler
            .get_node(source_id)
            .unwrap()
            .dependents()
            .contains(&derived_id));
        assert!(!scheduler
            .get_node(derived_id)
            .unwrap()
            .dependencies()
            .contains(&source_id));
    }

    #[test]
    fn mark_stale_propagates_through_chain() {
        let mut scheduler = UpdateScheduler::new();

        // source -> derived1 -> derived2
        let source_id = scheduler.add_node(
            NodeKind::Essential(crate::graph::CellId::from(0)),
            owner(),
            "source",
        );
        let derived1_id = scheduler.add_node(NodeKind::Derived, owner(), "d1");
        let derived2_id = scheduler.add_node(NodeKind::Derived, owner(), "d2");

        scheduler.add_edge(source_id, derived1_id);
        scheduler.add_edge(derived1_id, derived2_id);

        scheduler.get_node_mut(derived1_id).unwrap().mark_clean();
        scheduler.get_node_mut(derived2_id).unwrap().mark_clean();

        let marked = scheduler.mark_stale([source_id]);

        assert_eq!(marked, 2);
        assert_eq!(
            scheduler.get_node(derived2_id).unwrap().dirty_state(),
            DirtyState::Stale
        );
        assert!(scheduler.get_node(source_id).unwrap().is_clean());
    }

    #[test]
    fn clear_dependencies_removes_reverse_edges() {
        let mut scheduler = UpdateScheduler::new();
        let a = scheduler.add_node(NodeKind::Derived, owner(), "a");
        let b = scheduler.add_node(NodeKind::Derived, owner(), "b");
        scheduler.add_edge(a, b);

        scheduler.clear_dependencies(b);
        assert!(scheduler.get_node(a).unwrap().dependents().is_empty());
    }

    #[test]
    fn topological_order_respects_edges_and_input_order() {
        let order = topological_order(&[1, 2, 3, 4], &[(3, 1), (4, 2)]).unwrap();
        assert_eq!(order, vec![3, 1, 4, 2]);

        let untouched = topological_order(&[5, 6, 7], &[]).unwrap();
        assert_eq!(untouched, vec![5, 6, 7]);
    }

    #[test]
    fn topological_order_reports_a_cycle() {
        let err = topological_order(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c"), ("c", "a")])
            .unwrap_err();
        assert_eq!(err.first(), err.last());
        assert_eq!(err.len(), 4);
        assert!(err.contains(&"b"));
    }
}
