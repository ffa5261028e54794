//! Writes: retargeting through inverse definitions down to essential
//! cells, then applying the whole plan at once.

use std::sync::Arc;

use super::{Engine, Resolved};
use crate::component::{DependencyValues, Handle};
use crate::error::WriteRejection;
use crate::graph::{CellId, NodeId, NodeKind};
use crate::trigger::TargetRef;
use crate::value::Value;

/// Essential cell writes collected before anything is applied.
#[derive(Debug, Default)]
struct WritePlan {
    writes: Vec<(CellId, Value)>,
}

impl WritePlan {
    /// Queue a write. When two paths reach the same cell, the first wins.
    fn push(&mut self, cell: CellId, value: Value) {
        if !self.writes.iter().any(|(c, _)| *c == cell) {
            self.writes.push((cell, value));
        }
    }
}

impl Engine {
    /// Ask for `node` to take `value`.
    ///
    /// Derived nodes forward the request through their inverse until it
    /// reaches essential cells. Either every cell in the plan accepts and
    /// all are written, or nothing changes. Returns how many cells changed.
    pub(crate) fn request_write(&mut self, node: NodeId, value: Value) -> Result<usize, WriteRejection> {
        if value.is_invalid() {
            return Err(WriteRejection::InvalidValue);
        }
        let mut plan = WritePlan::default();
        self.plan_write(node, value, 0, &mut plan)?;
        Ok(self.apply_writes(plan.writes))
    }

    /// Write a committed input value.
    ///
    /// An input with its own essential storage takes whatever it is given,
    /// the invalid sentinel included; only `fixed` and a frozen cell stop
    /// it. A bound input's `value` is derived, so the commit is retargeted
    /// like any other write and an invalid value is refused.
    pub(crate) fn commit_write(&mut self, node: NodeId, value: Value) -> Result<usize, WriteRejection> {
        let Some((kind, owner, variable)) = self
            .scheduler
            .get_node(node)
            .map(|n| (n.kind(), n.owner(), n.variable().to_string()))
        else {
            return Err(WriteRejection::Unresolved(format!("<node {}>", node.raw())));
        };
        let NodeKind::Essential(cell) = kind else {
            return self.request_write(node, value);
        };
        if self.is_fixed(owner) {
            return Err(WriteRejection::Fixed {
                component: self.component_name(owner).to_string(),
                variable,
            });
        }
        if self.cells.is_frozen(cell) {
            return Err(WriteRejection::Frozen {
                component: self.component_name(owner).to_string(),
                variable,
            });
        }
        Ok(self.apply_writes(vec![(cell, value)]))
    }

    fn plan_write(
        &mut self,
        node: NodeId,
        value: Value,
        depth: usize,
        plan: &mut WritePlan,
    ) -> Result<(), WriteRejection> {
        if depth > self.config.max_write_depth {
            return Err(WriteRejection::TooDeep(self.config.max_write_depth));
        }
        let Some((kind, owner, variable)) = self
            .scheduler
            .get_node(node)
            .map(|n| (n.kind(), n.owner(), n.variable().to_string()))
        else {
            return Err(WriteRejection::Unresolved(format!("<node {}>", node.raw())));
        };
        let component = self.component_name(owner).to_string();

        if self.is_fixed(owner) {
            return Err(WriteRejection::Fixed {
                component,
                variable,
            });
        }

        match kind {
            NodeKind::Essential(cell) => {
                if self.cells.is_frozen(cell) {
                    return Err(WriteRejection::Frozen {
                        component,
                        variable,
                    });
                }
                let current = self.cells.value(cell).cloned().unwrap_or(Value::Invalid);
                if !current.same_shape(&value) {
                    return Err(WriteRejection::ShapeMismatch {
                        component,
                        variable,
                        found: value.type_name(),
                    });
                }
                plan.push(cell, value);
                Ok(())
            }
            NodeKind::Derived | NodeKind::Plan => {
                let Some(inverse) = self
                    .slots
                    .get(&node)
                    .and_then(|slot| slot.decl.inverse.as_ref().map(Arc::clone))
                else {
                    return Err(WriteRejection::NotWritable {
                        component,
                        variable,
                    });
                };

                // The inverse sees fresh dependency values
                self.read(node);
                let Some((inputs, resolved)) = self
                    .slots
                    .get(&node)
                    .map(|slot| (slot.inputs.clone(), slot.resolved.clone()))
                else {
                    return Err(WriteRejection::Unresolved(format!("{component}.{variable}")));
                };

                let writes = inverse(&value, &DependencyValues::new(&inputs, &self.config))?;
                for (key, desired) in writes {
                    match resolved.get(&key) {
                        Some(Resolved::Node(target)) => {
                            self.plan_write(*target, desired, depth + 1, plan)?;
                        }
                        Some(Resolved::Nodes(targets)) => {
                            let items = desired
                                .elements()
                                .filter(|items| items.len() == targets.len())
                                .ok_or_else(|| WriteRejection::ShapeMismatch {
                                    component: component.clone(),
                                    variable: format!("{variable}:{key}"),
                                    found: desired.type_name(),
                                })?
                                .to_vec();
                            for (target, item) in targets.iter().zip(items) {
                                self.plan_write(*target, item, depth + 1, plan)?;
                            }
                        }
                        _ => {
                            return Err(WriteRejection::Unresolved(format!(
                                "{component}.{variable}:{key}"
                            )))
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Apply cell writes and invalidate their readers.
    fn apply_writes(&mut self, writes: Vec<(CellId, Value)>) -> usize {
        let mut changed = 0;
        for (cell, value) in writes {
            if let Some(readers) = self.cells.set(cell, value) {
                changed += 1;
                let marked = self.scheduler.mark_stale(readers);
                tracing::trace!(cell = ?cell, marked, "cell written");
            }
        }
        changed
    }

    /// Set an essential node directly, bypassing inverses and `fixed`.
    /// Used for engine-owned bookkeeping variables.
    pub(crate) fn set_essential(&mut self, node: NodeId, value: Value) -> bool {
        let Some(NodeKind::Essential(cell)) = self.node_kind(node) else {
            return false;
        };
        self.apply_writes(vec![(cell, value)]) > 0
    }

    /// A component's `fixed` attribute, read at write time.
    pub(crate) fn is_fixed(&mut self, handle: Handle) -> bool {
        let Some(node) = self.components.get(handle).and_then(|c| c.attribute("fixed")) else {
            return false;
        };
        self.read(node).as_bool().unwrap_or(false)
    }

    /// Write `value` into a target, replacing only the element at its path.
    pub(crate) fn write_target(&mut self, target: &TargetRef, value: Value) -> Result<usize, WriteRejection> {
        let unresolved = || WriteRejection::Unresolved(format!("{}.{}", target.component, target.variable));
        let node = self
            .component(&target.component)
            .and_then(|c| c.variable(&target.variable))
            .ok_or_else(unresolved)?;
        let value = if target.path.is_empty() {
            value
        } else {
            self.read(node)
                .with_path(&target.path, value)
                .ok_or_else(unresolved)?
        };
        self.request_write(node, value)
    }

    fn essential_cell(&self, component: &str, variable: &str) -> Option<CellId> {
        let node = self.component(component)?.variable(variable)?;
        self.scheduler.get_node(node)?.cell()
    }

    /// Write a state variable from outside an action, as the host's
    /// `setValue` does. Marks dependents stale; call
    /// [`Engine::settle`] afterwards to expand and fire.
    pub fn set_value(&mut self, component: &str, variable: &str, value: Value) -> Result<usize, WriteRejection> {
        let node = self
            .component(component)
            .and_then(|c| c.variable(variable))
            .ok_or_else(|| WriteRejection::Unresolved(format!("{component}.{variable}")))?;
        self.request_write(node, value)
    }

    /// Reject further writes into an essential variable.
    pub fn freeze(&mut self, component: &str, variable: &str) -> bool {
        match self.essential_cell(component, variable) {
            Some(cell) => {
                self.cells.set_frozen(cell, true);
                true
            }
            None => false,
        }
    }

    pub fn unfreeze(&mut self, component: &str, variable: &str) -> bool {
        match self.essential_cell(component, variable) {
            Some(cell) => {
                self.cells.set_frozen(cell, false);
                true
            }
            None => false,
        }
    }

    /// Restore an essential variable to the value its cell was created
    /// with. Frozen cells are restored too.
    pub fn revert(&mut self, component: &str, variable: &str) -> bool {
        let Some(cell) = self.essential_cell(component, variable) else {
            return false;
        };
        let Some(initial) = self.cells.initial(cell).cloned() else {
            return false;
        };
        self.apply_writes(vec![(cell, initial)]);
        true
    }
}
