//! Pull-based reads: dependency resolution and memoized recompute.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::{Engine, Resolved};
use crate::component::{Definition, DependencySpec, DependencyValues, Handle, WatchKey};
use crate::error::{DefinitionError, Diagnostic};
use crate::graph::{NodeId, NodeKind};
use crate::value::Value;

impl Engine {
    /// Read a node, recomputing it first if stale.
    pub(crate) fn read(&mut self, node: NodeId) -> Value {
        let Some(n) = self.scheduler.get_node(node) else {
            return Value::Invalid;
        };
        match n.kind() {
            NodeKind::Essential(cell) => self.cells.value(cell).cloned().unwrap_or(Value::Invalid),
            NodeKind::Derived | NodeKind::Plan if n.is_clean() => {
                n.cached().cloned().unwrap_or(Value::Invalid)
            }
            NodeKind::Derived | NodeKind::Plan => self.recompute(node),
        }
    }

    fn recompute(&mut self, node: NodeId) -> Value {
        if !self.stack.enter(node) {
            let cycle: Vec<String> = self
                .stack
                .cycle_through(node)
                .iter()
                .map(|n| self.describe(*n))
                .collect();
            tracing::warn!(
                node = %self.describe(node),
                cycle = %cycle.join(" -> "),
                "dependency cycle; reading as invalid"
            );
            return Value::Invalid;
        }

        let Some((owner, kind)) = self.scheduler.get_node(node).map(|n| (n.owner(), n.kind()))
        else {
            self.stack.exit(node);
            return Value::Invalid;
        };
        let Some(decl) = self.slots.get(&node).map(|slot| Arc::clone(&slot.decl)) else {
            self.stack.exit(node);
            return Value::Invalid;
        };

        // Dependencies are re-recorded on every recompute
        self.scheduler.clear_dependencies(node);
        self.names.unwatch(node);

        let mut resolved = IndexMap::with_capacity(decl.dependencies.len());
        let mut inputs = IndexMap::with_capacity(decl.dependencies.len());
        for (key, spec) in &decl.dependencies {
            let target = self.resolve(node, owner, spec);
            let value = self.value_of(node, &target);
            resolved.insert(key.clone(), target);
            inputs.insert(key.clone(), value);
        }

        let value = match kind {
            NodeKind::Plan => self.evaluate_plan(node, owner, &inputs),
            _ => match &decl.definition {
                Definition::Derived(definition) => {
                    let deps = DependencyValues::new(&inputs, &self.config);
                    match definition(&deps) {
                        Ok(value) => value,
                        Err(err) => self.definition_failed(node, &err),
                    }
                }
                Definition::Essential { default } => default.clone(),
            },
        };

        if let Some(n) = self.scheduler.get_node_mut(node) {
            n.store(value.clone());
        }
        if let Some(slot) = self.slots.get_mut(&node) {
            slot.resolved = resolved;
            slot.inputs = inputs;
        }
        self.stack.exit(node);
        value
    }

    fn evaluate_plan(
        &mut self,
        node: NodeId,
        owner: Handle,
        inputs: &IndexMap<String, Value>,
    ) -> Value {
        let Some(rule) = self.composites.get(&owner).map(|s| Arc::clone(&s.decl.rule)) else {
            return Value::Invalid;
        };
        let deps = DependencyValues::new(inputs, &self.config);
        let (plan, value) = match rule.plan(&deps) {
            Ok(plan) => {
                let keys = plan.iter().map(|r| Value::string(r.key.as_str())).collect();
                (plan, Value::List(keys))
            }
            Err(err) => (Vec::new(), self.definition_failed(node, &err)),
        };
        tracing::trace!(
            composite = %self.component_name(owner),
            rule = rule.name(),
            replacements = plan.len(),
            "planned replacements"
        );
        if let Some(state) = self.composites.get_mut(&owner) {
            state.pending = Some(plan);
        }
        value
    }

    fn definition_failed(&self, node: NodeId, err: &DefinitionError) -> Value {
        match err {
            // Invalid inputs propagate quietly; the first failure was logged
            DefinitionError::InvalidDependency(_) => {
                tracing::trace!(node = %self.describe(node), error = %err, "invalid input");
            }
            _ => tracing::warn!(node = %self.describe(node), error = %err, "definition failed"),
        }
        Value::Invalid
    }

    /// Bring every derived node up to date, resolving all references once.
    pub(crate) fn evaluate_all(&mut self) {
        let nodes: Vec<NodeId> = self.slots.keys().copied().collect();
        for node in nodes {
            self.read(node);
        }
    }

    /// Find the node(s) a dependency spec points at right now.
    pub(crate) fn resolve(&mut self, reader: NodeId, owner: Handle, spec: &DependencySpec) -> Resolved {
        match spec {
            DependencySpec::Sibling { variable } => {
                match self.components.get(owner).and_then(|c| c.variable(variable)) {
                    Some(node) => Resolved::Node(node),
                    None => {
                        tracing::warn!(
                            node = %self.describe(reader),
                            variable = %variable,
                            "no such sibling variable"
                        );
                        Resolved::Missing
                    }
                }
            }

            DependencySpec::Component { target, variable } => {
                let Some(handle) = self.lookup(reader, target) else {
                    self.report_unresolved(reader, owner, target);
                    return Resolved::Missing;
                };
                match self.components.get(handle).and_then(|c| c.variable(variable)) {
                    Some(node) => Resolved::Node(node),
                    None => {
                        tracing::warn!(
                            node = %self.describe(reader),
                            target = %target,
                            variable = %variable,
                            "referenced component has no such variable"
                        );
                        Resolved::Missing
                    }
                }
            }

            DependencySpec::Attribute { target, attribute } => {
                let handle = match target {
                    Some(name) => {
                        let handle = self.lookup(reader, name);
                        if handle.is_none() {
                            self.report_unresolved(reader, owner, name);
                        }
                        handle
                    }
                    None => Some(owner),
                };
                handle
                    .and_then(|h| self.components.get(h))
                    .and_then(|c| c.attribute(attribute))
                    .map_or(Resolved::Missing, Resolved::Node)
            }

            DependencySpec::Children {
                of,
                component_type,
                variable,
            } => {
                let Some(base) = self.collection_base(reader, owner, of.as_deref()) else {
                    return Resolved::Missing;
                };
                let nodes = self
                    .flattened_children(reader, base, component_type.as_deref())
                    .into_iter()
                    .filter_map(|h| self.components.get(h)?.variable(variable))
                    .collect();
                Resolved::Nodes(nodes)
            }

            DependencySpec::Indirect {
                name_from,
                variable,
            } => {
                let Some(name_node) = self.components.get(owner).and_then(|c| c.variable(name_from))
                else {
                    return Resolved::Missing;
                };
                self.scheduler.add_edge(name_node, reader);
                let name = self.read(name_node);
                let Some(name) = name.as_str() else {
                    return Resolved::Missing;
                };
                let Some(handle) = self.lookup(reader, name) else {
                    self.report_unresolved(reader, owner, name);
                    return Resolved::Missing;
                };
                self.components
                    .get(handle)
                    .and_then(|c| c.variable(variable))
                    .map_or(Resolved::Missing, Resolved::Node)
            }

            DependencySpec::Ancestor { variable } => self
                .components
                .ancestors(owner)
                .find_map(|c| c.variable(variable))
                .map_or(Resolved::Missing, Resolved::Node),

            DependencySpec::ComponentName { target } => {
                let value = match self.lookup(reader, target) {
                    Some(_) => Value::string(target.as_str()),
                    None => Value::Invalid,
                };
                Resolved::Structural(value)
            }

            DependencySpec::ChildNames { of, component_type } => {
                let Some(base) = self.collection_base(reader, owner, of.as_deref()) else {
                    return Resolved::Structural(Value::Invalid);
                };
                let names = self
                    .flattened_children(reader, base, component_type.as_deref())
                    .into_iter()
                    .filter_map(|h| self.components.get(h))
                    .map(|c| Value::string(c.name.as_str()))
                    .collect();
                Resolved::Structural(Value::List(names))
            }
        }
    }

    /// Resolve a name and watch it for rebinding.
    /// Surface a name that resolves to nothing. The reader still watches
    /// the name; each `(component, name)` pair is reported once.
    fn report_unresolved(&mut self, reader: NodeId, owner: Handle, name: &str) {
        tracing::debug!(node = %self.describe(reader), target = %name, "unresolved reference");
        let component = self.component_name(owner).to_string();
        if !self.unresolved.insert((component.clone(), name.to_string())) {
            return;
        }
        let location = self.components.get(owner).and_then(|c| c.template.location);
        self.report(
            Diagnostic::warning(format!("unresolved reference `{name}`"))
                .for_component(component)
                .at(location),
        );
    }

    fn lookup(&mut self, reader: NodeId, name: &str) -> Option<Handle> {
        self.names.watch(reader, WatchKey::Name(name.to_string()));
        self.names.resolve(name)
    }

    fn collection_base(&mut self, reader: NodeId, owner: Handle, of: Option<&str>) -> Option<Handle> {
        match of {
            Some(name) => self.lookup(reader, name),
            None => Some(owner),
        }
    }

    /// Children of `base`, with composites replaced by what they currently
    /// materialize. Every child list visited is watched.
    fn flattened_children(
        &mut self,
        reader: NodeId,
        base: Handle,
        component_type: Option<&str>,
    ) -> Vec<Handle> {
        let mut result = Vec::new();
        self.collect_children(reader, base, component_type, &mut result);
        result
    }

    fn collect_children(
        &mut self,
        reader: NodeId,
        parent: Handle,
        component_type: Option<&str>,
        out: &mut Vec<Handle>,
    ) {
        self.names.watch(reader, WatchKey::Children(parent));
        let children = self
            .components
            .get(parent)
            .map(|c| c.children.clone())
            .unwrap_or_default();
        for child in children {
            let Some((composite, matches)) = self.components.get(child).map(|c| {
                (
                    c.is_composite(),
                    component_type.map_or(true, |t| c.component_type == t),
                )
            }) else {
                continue;
            };
            if composite {
                self.collect_children(reader, child, component_type, out);
            } else if matches {
                out.push(child);
            }
        }
    }

    /// Record edges to the resolved nodes and read them.
    fn value_of(&mut self, reader: NodeId, resolved: &Resolved) -> Value {
        match resolved {
            Resolved::Node(node) => {
                self.scheduler.add_edge(*node, reader);
                self.read(*node)
            }
            Resolved::Nodes(nodes) => {
                let nodes: SmallVec<[NodeId; 4]> = nodes.clone();
                let mut items = Vec::with_capacity(nodes.len());
                for node in nodes {
                    self.scheduler.add_edge(node, reader);
                    items.push(self.read(node));
                }
                Value::List(items)
            }
            Resolved::Structural(value) => value.clone(),
            Resolved::Missing => Value::Invalid,
        }
    }
}
