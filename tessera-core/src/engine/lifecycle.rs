//! Creating and destroying component subtrees.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{CompositeState, Engine, Slot};
use crate::component::{
    Component, ComponentKind, ComponentTemplate, Definition, Handle, StateVarDecl, WatchKey,
};
use crate::error::{Diagnostic, StructuralError};
use crate::graph::{CellId, NodeId, NodeKind};
use crate::trigger::{RuleEntry, TriggerAction};
use crate::value::Value;

/// How a subtree is being created.
#[derive(Debug, Clone, Default)]
pub(crate) struct Instantiation {
    /// Prefix for the names of unnamed descendants.
    pub namespace: Option<String>,
    pub generated_by: Option<Handle>,
    /// Report failing children as diagnostics and keep going, instead of
    /// failing the whole subtree.
    pub contain_errors: bool,
}

/// Where a new essential node gets its storage.
enum Storage {
    Fresh(Value),
    Alias(CellId),
}

impl Engine {
    /// Instantiate a document's root. Failing descendants are reported as
    /// diagnostics and left out.
    pub(crate) fn instantiate_root(&mut self, template: ComponentTemplate) -> Result<Handle, StructuralError> {
        let name = template.name.clone().unwrap_or_else(|| "_document".to_string());
        let options = Instantiation {
            contain_errors: true,
            ..Instantiation::default()
        };
        self.instantiate(Arc::new(template), None, name, &options)
    }

    /// Create `template` as a child of `parent` under `name`, with its
    /// whole subtree.
    pub(crate) fn instantiate(
        &mut self,
        template: Arc<ComponentTemplate>,
        parent: Option<Handle>,
        name: String,
        options: &Instantiation,
    ) -> Result<Handle, StructuralError> {
        if self.names.contains(&name) {
            return Err(StructuralError::NameTaken(name));
        }
        let handle = self.insert_component(Arc::clone(&template), parent, &name, options.generated_by)?;

        for (attribute, decl) in &template.attributes {
            let node = self.create_node(handle, attribute, Arc::new(decl.clone()), None);
            self.attach_attribute(handle, attribute, node);
        }
        for (variable, decl) in &template.state {
            let node = self.create_node(handle, variable, Arc::new(decl.clone()), None);
            self.attach_state(handle, variable, node);
        }
        if let ComponentKind::Input(input) = &template.kind {
            for (variable, decl) in input.state_decls() {
                if template.state.contains_key(variable) {
                    continue;
                }
                let node = self.create_node(handle, variable, Arc::new(decl), None);
                self.attach_state(handle, variable, node);
            }
        }
        if let ComponentKind::Composite(decl) = &template.kind {
            self.register_composite(handle, decl.clone());
        }

        if !template.is_composite_template() {
            let namespace = options.namespace.clone();
            for (index, child) in template.children.iter().enumerate() {
                let child_name = match &child.name {
                    Some(author) => match &namespace {
                        Some(ns) => format!("{ns}/{author}"),
                        None => author.clone(),
                    },
                    None => format!("{name}/_{}{}", child.component_type, index + 1),
                };
                let location = child.location;
                if let Err(err) = self.instantiate(Arc::clone(child), Some(handle), child_name.clone(), options) {
                    if options.contain_errors {
                        self.report(Diagnostic::from(err).for_component(child_name).at(location));
                    } else {
                        self.destroy(handle);
                        return Err(err);
                    }
                }
            }
        }

        self.register_trigger(handle);
        self.attach_to_parent(handle, parent);
        self.microcycle.created += 1;
        tracing::trace!(component = %name, handle = %handle, "instantiated");
        Ok(handle)
    }

    /// Create a copy of the live component `source`.
    ///
    /// Linked copies alias every essential cell of the source, so edits
    /// through either are seen by both. Unlinked copies start from the
    /// source's current values and diverge from then on.
    pub(crate) fn instantiate_copy(
        &mut self,
        source: Handle,
        parent: Option<Handle>,
        name: String,
        generated_by: Option<Handle>,
        link: bool,
    ) -> Result<Handle, StructuralError> {
        if self.names.contains(&name) {
            return Err(StructuralError::NameTaken(name));
        }
        let Some((template, attributes, state, children, composite)) = self.components.get(source).map(|c| {
            (
                Arc::clone(&c.template),
                c.attributes.clone(),
                c.state.clone(),
                c.children.clone(),
                c.is_composite(),
            )
        }) else {
            return Err(StructuralError::MissingSource(format!("{source}")));
        };

        let handle = self.insert_component(Arc::clone(&template), parent, &name, generated_by)?;
        if let Some(component) = self.components.get_mut(handle) {
            component.shadows = Some(source);
        }

        for (attribute, node) in attributes {
            let copied = self.copy_node(handle, &attribute, node, link);
            self.attach_attribute(handle, &attribute, copied);
        }
        for (variable, node) in state {
            let copied = self.copy_node(handle, &variable, node, link);
            self.attach_state(handle, &variable, copied);
        }

        if composite {
            // The copy computes its own replacements
            if let ComponentKind::Composite(decl) = &template.kind {
                self.register_composite(handle, decl.clone());
            }
        } else {
            for child in children {
                let Some(local) = self.components.get(child).map(|c| c.local_name().to_string()) else {
                    continue;
                };
                let child_name = format!("{name}/{local}");
                if let Err(err) = self.instantiate_copy(child, Some(handle), child_name, generated_by, link) {
                    self.destroy(handle);
                    return Err(err);
                }
            }
        }

        self.register_trigger(handle);
        self.attach_to_parent(handle, parent);
        self.microcycle.created += 1;
        tracing::trace!(component = %name, source = %source, link, "copied");
        Ok(handle)
    }

    /// Remove a component and its subtree, releasing every node, name and
    /// rule it owned.
    pub(crate) fn destroy(&mut self, handle: Handle) {
        let Some(children) = self.components.get(handle).map(|c| c.children.clone()) else {
            return;
        };
        for child in children.into_iter().rev() {
            self.destroy(child);
        }

        let parent = self.components.get(handle).and_then(|c| c.parent);
        if let Some(parent) = parent {
            if let Some(component) = self.components.get_mut(parent) {
                component.children.retain(|h| *h != handle);
            }
            self.notify(&WatchKey::Children(parent));
        }

        let Some(component) = self.components.remove(handle) else {
            return;
        };
        let mut nodes: Vec<NodeId> = component.nodes().collect();
        if let Some(state) = self.composites.shift_remove(&handle) {
            nodes.push(state.plan_node);
        }
        for node in nodes {
            self.release_node(node);
        }

        let watchers = self.names.unregister(&component.name, handle);
        self.scheduler.mark_stale(watchers);
        self.notify(&WatchKey::Children(handle));

        if self.triggers.unregister(handle).is_some() {
            self.triggers_dirty = true;
        }
        if self.root == Some(handle) {
            self.root = None;
        }
        self.microcycle.destroyed += 1;
        tracing::trace!(component = %component.name, handle = %handle, "destroyed");
    }

    fn insert_component(
        &mut self,
        template: Arc<ComponentTemplate>,
        parent: Option<Handle>,
        name: &str,
        generated_by: Option<Handle>,
    ) -> Result<Handle, StructuralError> {
        let component_type = template.component_type.clone();
        let handle = self.components.insert_with(|handle| Component {
            handle,
            component_type,
            name: name.to_string(),
            parent,
            children: Vec::new(),
            state: IndexMap::new(),
            attributes: IndexMap::new(),
            template,
            generated_by,
            shadows: None,
        });
        match self.names.register(name, handle) {
            Ok(watchers) => {
                self.scheduler.mark_stale(watchers);
                Ok(handle)
            }
            Err(err) => {
                self.components.remove(handle);
                Err(err)
            }
        }
    }

    fn create_node(
        &mut self,
        owner: Handle,
        variable: &str,
        decl: Arc<StateVarDecl>,
        storage: Option<CellId>,
    ) -> NodeId {
        let storage = match (&decl.definition, storage) {
            (Definition::Essential { .. }, Some(cell)) => Some(Storage::Alias(cell)),
            (Definition::Essential { default }, None) => Some(Storage::Fresh(default.clone())),
            (Definition::Derived(_), _) => None,
        };
        self.add_node(owner, variable, decl, storage)
    }

    fn add_node(
        &mut self,
        owner: Handle,
        variable: &str,
        decl: Arc<StateVarDecl>,
        storage: Option<Storage>,
    ) -> NodeId {
        let node = match storage {
            Some(storage) => {
                let cell = match storage {
                    Storage::Fresh(value) => self.cells.create(value),
                    Storage::Alias(cell) => cell,
                };
                let node = self.scheduler.add_node(NodeKind::Essential(cell), owner, variable);
                self.cells.attach(cell, node);
                node
            }
            None => self.scheduler.add_node(NodeKind::Derived, owner, variable),
        };
        self.slots.insert(node, Slot::new(decl));
        node
    }

    /// A node on `owner` mirroring the source node `node`.
    fn copy_node(&mut self, owner: Handle, variable: &str, node: NodeId, link: bool) -> NodeId {
        let Some(decl) = self.slots.get(&node).map(|slot| Arc::clone(&slot.decl)) else {
            return self.add_node(owner, variable, Arc::new(StateVarDecl::essential(Value::Invalid)), None);
        };
        match self.node_kind(node) {
            Some(NodeKind::Essential(cell)) if link => {
                self.add_node(owner, variable, decl, Some(Storage::Alias(cell)))
            }
            Some(NodeKind::Essential(cell)) => {
                let current = self.cells.value(cell).cloned().unwrap_or(Value::Invalid);
                self.add_node(owner, variable, decl, Some(Storage::Fresh(current)))
            }
            _ => self.add_node(owner, variable, decl, None),
        }
    }

    fn release_node(&mut self, node: NodeId) {
        let dependents: Vec<NodeId> = self
            .scheduler
            .get_node(node)
            .map(|n| n.dependents().iter().copied().collect())
            .unwrap_or_default();
        self.scheduler.mark_stale(dependents);
        if let Some(removed) = self.scheduler.remove_node(node) {
            if let Some(cell) = removed.cell() {
                self.cells.detach(cell, node);
            }
        }
        self.names.unwatch(node);
        self.slots.remove(&node);
    }

    fn attach_attribute(&mut self, handle: Handle, attribute: &str, node: NodeId) {
        if let Some(component) = self.components.get_mut(handle) {
            component.attributes.insert(attribute.to_string(), node);
        }
    }

    fn attach_state(&mut self, handle: Handle, variable: &str, node: NodeId) {
        if let Some(component) = self.components.get_mut(handle) {
            component.state.insert(variable.to_string(), node);
        }
    }

    fn attach_to_parent(&mut self, handle: Handle, parent: Option<Handle>) {
        match parent {
            Some(parent) => {
                if let Some(component) = self.components.get_mut(parent) {
                    component.children.push(handle);
                }
                self.notify(&WatchKey::Children(parent));
            }
            None => {
                if self.root.is_none() {
                    self.root = Some(handle);
                }
            }
        }
    }

    /// Give a composite its plan node. The plan is computed during the
    /// next settle.
    fn register_composite(&mut self, handle: Handle, decl: crate::composite::CompositeDecl) {
        let mut plan_decl = StateVarDecl::constant(Value::Invalid).hidden();
        plan_decl.dependencies = decl.rule.dependencies();
        let plan_node = self.scheduler.add_node(NodeKind::Plan, handle, "replacements");
        self.slots.insert(plan_node, Slot::new(Arc::new(plan_decl)));
        self.composites.insert(
            handle,
            CompositeState {
                decl,
                plan_node,
                pending: None,
                materialized: Vec::new(),
                expanded: false,
            },
        );
    }

    fn register_trigger(&mut self, handle: Handle) {
        let Some(component) = self.components.get(handle) else {
            return;
        };
        let ComponentKind::Trigger(decl) = &component.template.kind else {
            return;
        };
        let mut entry = RuleEntry::new(component.name.clone(), decl.clone());
        entry.condition = component.state.get("triggerWhen").copied();
        entry.member_of = component.parent.filter(|parent| {
            self.components
                .get(*parent)
                .is_some_and(|p| matches!(&p.template.kind, ComponentKind::Trigger(d) if matches!(d.action, TriggerAction::Set)))
        });
        self.triggers.register(handle, entry);
        self.triggers_dirty = true;
    }

    /// Mark everything watching `key` stale.
    pub(crate) fn notify(&mut self, key: &WatchKey) {
        let watchers = self.names.watchers_of(key);
        if !watchers.is_empty() {
            self.scheduler.mark_stale(watchers);
        }
    }
}

impl ComponentTemplate {
    fn is_composite_template(&self) -> bool {
        matches!(self.kind, ComponentKind::Composite(_))
    }
}
