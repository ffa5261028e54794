//! Engine
//!
//! The engine owns the whole document: the component arena, the name
//! table, the dependency graph with its essential cells, every composite's
//! materialized plan, and the trigger registry.
//!
//! # Microcycles
//!
//! Each external action is one microcycle:
//!
//! 1. Dispatch the action. Writes go to essential cells and mark their
//!    transitive dependents stale; nothing is recomputed yet.
//! 2. Settle: expand every composite whose plan went stale, then evaluate
//!    trigger conditions and fire the ones that turned true. Repeat until a
//!    pass changes nothing.
//! 3. Hand back a report. Reads after this point see one consistent state.
//!
//! All of this runs on one thread, to completion, before the next action
//! is accepted.

mod actions;
mod expand;
mod fire;
mod lifecycle;
mod resolve;
mod two_stage;
mod write;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::component::{Component, ComponentArena, Handle, NameTable, StateVarDecl};
use crate::composite::{CompositeDecl, Materialized, Replacement};
use crate::config::EngineConfig;
use crate::error::Diagnostic;
use crate::graph::{CellStore, ComputeStack, NodeId, NodeKind, UpdateScheduler};
use crate::snapshot::StateSnapshot;
use crate::trigger::TriggerRegistry;
use crate::value::Value;

/// What a dependency key resolved to during the last recompute.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolved {
    Node(NodeId),
    /// A collection, read as a list.
    Nodes(SmallVec<[NodeId; 4]>),
    /// A value computed from the component tree rather than read from a
    /// node (names, child lists).
    Structural(Value),
    Missing,
}

/// Per-node declaration and the inputs of its last computation.
#[derive(Debug)]
pub(crate) struct Slot {
    pub decl: Arc<StateVarDecl>,
    pub resolved: IndexMap<String, Resolved>,
    pub inputs: IndexMap<String, Value>,
}

impl Slot {
    fn new(decl: Arc<StateVarDecl>) -> Self {
        Self {
            decl,
            resolved: IndexMap::new(),
            inputs: IndexMap::new(),
        }
    }
}

/// Live state of one composite.
#[derive(Debug)]
pub(crate) struct CompositeState {
    pub decl: CompositeDecl,
    pub plan_node: NodeId,
    /// Plan computed by the last recompute of `plan_node`, not yet
    /// materialized.
    pub pending: Option<Vec<Replacement>>,
    pub materialized: Vec<Materialized>,
    pub expanded: bool,
}

/// Bookkeeping for the microcycle in progress.
#[derive(Debug, Default)]
pub(crate) struct Microcycle {
    pub fired: HashSet<Handle>,
    pub fired_names: Vec<String>,
    pub created: usize,
    pub destroyed: usize,
}

/// The dependency-graph state-variable engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    scheduler: UpdateScheduler,
    cells: CellStore,
    components: ComponentArena,
    names: NameTable,
    slots: HashMap<NodeId, Slot>,
    stack: ComputeStack,
    composites: IndexMap<Handle, CompositeState>,
    triggers: TriggerRegistry,
    triggers_dirty: bool,
    root: Option<Handle>,
    diagnostics: Vec<Diagnostic>,
    /// `(component, name)` pairs already reported as unresolved.
    unresolved: HashSet<(String, String)>,
    cycle: u64,
    microcycle: Microcycle,
}

impl Engine {
    /// Create an empty engine. Documents are loaded through
    /// [`DocumentLoader`](crate::document::DocumentLoader) or
    /// [`Engine::build`].
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            scheduler: UpdateScheduler::new(),
            cells: CellStore::new(),
            components: ComponentArena::new(),
            names: NameTable::new(),
            slots: HashMap::new(),
            stack: ComputeStack::new(),
            composites: IndexMap::new(),
            triggers: TriggerRegistry::new(),
            triggers_dirty: false,
            root: None,
            diagnostics: Vec::new(),
            unresolved: HashSet::new(),
            cycle: 0,
            microcycle: Microcycle::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of microcycles processed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn root(&self) -> Option<&Component> {
        self.root.and_then(|h| self.components.get(h))
    }

    /// Look up a live component by name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.names.resolve(name).and_then(|h| self.components.get(h))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Names of the live components, in creation order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names of a component's children, in order.
    pub fn children_of(&self, name: &str) -> Vec<&str> {
        let Some(component) = self.component(name) else {
            return Vec::new();
        };
        component
            .children
            .iter()
            .filter_map(|h| self.components.get(*h))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn node_count(&self) -> usize {
        self.scheduler.node_count()
    }

    /// Read a state variable or attribute, recomputing if stale.
    pub fn value(&mut self, component: &str, variable: &str) -> Option<Value> {
        let node = self.component(component)?.variable(variable)?;
        Some(self.read(node))
    }

    /// How many times a derived variable's definition has run.
    pub fn recompute_count(&self, component: &str, variable: &str) -> Option<u64> {
        let node = self.component(component)?.variable(variable)?;
        self.scheduler.get_node(node).map(|n| n.recomputes())
    }

    /// Whether two variables share one essential cell.
    pub fn aliased(&self, a: (&str, &str), b: (&str, &str)) -> bool {
        let cell = |(component, variable): (&str, &str)| {
            let node = self.component(component)?.variable(variable)?;
            self.scheduler.get_node(node)?.cell()
        };
        matches!((cell(a), cell(b)), (Some(x), Some(y)) if x == y)
    }

    /// Whether `component.variable` has storage of its own, rather than
    /// deriving its value.
    pub fn is_essential(&self, component: &str, variable: &str) -> bool {
        self.component(component)
            .and_then(|c| c.variable(variable))
            .and_then(|node| self.scheduler.get_node(node))
            .is_some_and(|n| n.cell().is_some())
    }

    /// Structural and reference diagnostics not yet taken.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// The state-read API: every public state variable of every live
    /// component.
    pub fn read_all_state_variables(&mut self) -> StateSnapshot {
        let targets: Vec<(String, Vec<(String, NodeId)>)> = self
            .components
            .iter()
            .map(|component| {
                let variables = component
                    .state
                    .iter()
                    .filter(|(_, node)| self.slots.get(node).is_some_and(|s| s.decl.public))
                    .map(|(variable, node)| (variable.clone(), *node))
                    .collect();
                (component.name.clone(), variables)
            })
            .collect();

        let mut snapshot = StateSnapshot::new(self.cycle);
        for (component, variables) in targets {
            let values = variables
                .into_iter()
                .map(|(variable, node)| (variable, self.read(node)))
                .collect();
            snapshot.insert(component, values);
        }
        snapshot
    }

    fn component_name(&self, handle: Handle) -> &str {
        self.components
            .get(handle)
            .map(|c| c.name.as_str())
            .unwrap_or("<destroyed>")
    }

    /// Human-readable `component.variable` for a node.
    fn describe(&self, node: NodeId) -> String {
        match self.scheduler.get_node(node) {
            Some(n) => format!("{}.{}", self.component_name(n.owner()), n.variable()),
            None => format!("<node {}>", node.raw()),
        }
    }

    fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.scheduler.get_node(node).map(|n| n.kind())
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(%diagnostic, "diagnostic reported");
        self.diagnostics.push(diagnostic);
    }
}
