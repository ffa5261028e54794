//! Component Instances
//!
//! Components live in an arena and are addressed by [`Handle`]s. A parent
//! owns the ordered list of its children's handles; the parent link is a
//! plain back-reference. Composites hold handles to what they materialized,
//! so creating, destroying and re-parenting subtrees are index operations.
//!
//! Handles are never reused within one engine, so a handle held past its
//! component's destruction simply stops resolving.

pub mod library;
mod names;
mod template;

pub use names::{NameTable, WatchKey};
pub use template::{
    ComponentKind, ComponentTemplate, Definition, DefinitionFn, DependencySpec, DependencyValues,
    InverseFn, StateVarDecl,
};

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::graph::NodeId;

/// Stable index of a component instance in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Handle {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live component instance.
#[derive(Debug)]
pub struct Component {
    pub handle: Handle,
    pub component_type: String,
    /// Author-assigned or generated name, registered in the name table.
    pub name: String,
    pub parent: Option<Handle>,
    pub children: Vec<Handle>,
    /// State variable nodes, in declaration order.
    pub state: IndexMap<String, NodeId>,
    pub attributes: IndexMap<String, NodeId>,
    /// The template this instance was built from. Copies share it.
    pub template: Arc<ComponentTemplate>,
    /// The composite that materialized this component, if any.
    pub generated_by: Option<Handle>,
    /// The component this one is a copy of.
    pub shadows: Option<Handle>,
}

impl Component {
    /// State variable node, falling back to an attribute of the same name.
    pub fn variable(&self, name: &str) -> Option<NodeId> {
        self.state
            .get(name)
            .or_else(|| self.attributes.get(name))
            .copied()
    }

    pub fn attribute(&self, name: &str) -> Option<NodeId> {
        self.attributes.get(name).copied()
    }

    /// Every node owned by this component.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.attributes.values().chain(self.state.values()).copied()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.template.kind, ComponentKind::Composite(_))
    }

    /// Last segment of the component's name.
    pub fn local_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Storage for every live component, indexed by [`Handle`].
#[derive(Debug, Default)]
pub struct ComponentArena {
    slots: Vec<Option<Component>>,
    live: usize,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next handle and store the component `build` returns.
    pub fn insert_with(&mut self, build: impl FnOnce(Handle) -> Component) -> Handle {
        let handle = Handle::from(self.slots.len() as u32);
        self.slots.push(Some(build(handle)));
        self.live += 1;
        handle
    }

    pub fn get(&self, handle: Handle) -> Option<&Component> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Component> {
        self.slots.get_mut(handle.index()).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Component> {
        let removed = self.slots.get_mut(handle.index())?.take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Live components in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Ancestors of `handle`, nearest first.
    pub fn ancestors(&self, handle: Handle) -> impl Iterator<Item = &Component> {
        let mut next = self.get(handle).and_then(|c| c.parent);
        std::iter::from_fn(move || {
            let current = self.get(next?)?;
            next = current.parent;
            Some(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(handle: Handle, name: &str, parent: Option<Handle>) -> Component {
        Component {
            handle,
            component_type: "group".into(),
            name: name.into(),
            parent,
            children: Vec::new(),
            state: IndexMap::new(),
            attributes: IndexMap::new(),
            template: Arc::new(ComponentTemplate::new("group")),
            generated_by: None,
            shadows: None,
        }
    }

    #[test]
    fn handles_are_not_reused() {
        let mut arena = ComponentArena::new();
        let a = arena.insert_with(|h| component(h, "a", None));
        arena.remove(a);
        let b = arena.insert_with(|h| component(h, "b", None));

        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn ancestors_walk_up_to_the_root() {
        let mut arena = ComponentArena::new();
        let root = arena.insert_with(|h| component(h, "root", None));
        let mid = arena.insert_with(|h| component(h, "mid", Some(root)));
        let leaf = arena.insert_with(|h| component(h, "mid/leaf", Some(mid)));

        let names: Vec<_> = arena.ancestors(leaf).map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["mid", "root"]);
        assert_eq!(arena.get(leaf).unwrap().local_name(), "leaf");
    }
}
