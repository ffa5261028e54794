//! Dependency Graph
//!
//! This module implements the dependency graph over state variable nodes.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent state variables and attributes of component instances
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//! - Essential nodes are the roots; they read authoritative [`ValueCell`]s
//!
//! When a cell changes, we traverse the graph to find all affected nodes and
//! mark them stale. Stale nodes recompute when next read.
//!
//! # Design Decisions
//!
//! 1. We use a centralized graph rather than per-value subscriber lists:
//!    - It keeps removal of whole subtrees a matter of dropping node IDs
//!    - It simplifies cycle detection
//!    - The same ordering routine serves trigger chains
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod cell;
mod context;
mod node;
mod scheduler;

pub use cell::{CellId, CellStore, ValueCell};
pub use context::ComputeStack;
pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::{topological_order, UpdateScheduler};
