//! Name Table
//!
//! Maps stable component names to handles. Dependencies that reach another
//! component by name go through this table on every recompute, so a node
//! that read a name also *watches* it: when the name is registered or
//! unregistered (a composite created or destroyed a named subtree), every
//! watcher is handed back to the engine to be marked stale.
//!
//! Child lists are watched the same way, for dependencies that collect
//! over a component's children.

use std::collections::{HashMap, HashSet};

use super::Handle;
use crate::error::StructuralError;
use crate::graph::NodeId;

/// Something a node can watch for structural change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// The binding of a name.
    Name(String),
    /// The child list of a component.
    Children(Handle),
}

#[derive(Debug, Default)]
pub struct NameTable {
    by_name: HashMap<String, Handle>,
    watchers: HashMap<WatchKey, HashSet<NodeId>>,
    /// Reverse index so a node's watches can be dropped in one call.
    watching: HashMap<NodeId, Vec<WatchKey>>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> Option<Handle> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Bind `name` to `handle`.
    ///
    /// Returns the nodes that watched the name, which must be invalidated.
    pub fn register(&mut self, name: &str, handle: Handle) -> Result<Vec<NodeId>, StructuralError> {
        if self.by_name.contains_key(name) {
            return Err(StructuralError::NameTaken(name.to_string()));
        }
        self.by_name.insert(name.to_string(), handle);
        Ok(self.watchers_of(&WatchKey::Name(name.to_string())))
    }

    /// Remove the binding of `name` if it points at `handle`.
    ///
    /// Returns the nodes that watched the name.
    pub fn unregister(&mut self, name: &str, handle: Handle) -> Vec<NodeId> {
        if self.by_name.get(name) != Some(&handle) {
            return Vec::new();
        }
        self.by_name.remove(name);
        self.watchers_of(&WatchKey::Name(name.to_string()))
    }

    pub fn watch(&mut self, node: NodeId, key: WatchKey) {
        if self.watchers.entry(key.clone()).or_default().insert(node) {
            self.watching.entry(node).or_default().push(key);
        }
    }

    /// Drop every watch `node` holds.
    pub fn unwatch(&mut self, node: NodeId) {
        let Some(keys) = self.watching.remove(&node) else {
            return;
        };
        for key in keys {
            if let Some(set) = self.watchers.get_mut(&key) {
                set.remove(&node);
                if set.is_empty() {
                    self.watchers.remove(&key);
                }
            }
        }
    }

    /// Nodes watching `key`, sorted for deterministic invalidation.
    pub fn watchers_of(&self, key: &WatchKey) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .watchers
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        nodes.sort_unstable();
        nodes
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, Handle)> {
        self.by_name.iter().map(|(name, handle)| (name.as_str(), *handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_duplicates() {
        let mut names = NameTable::new();
        names.register("p", Handle::from(1)).unwrap();
        assert_eq!(
            names.register("p", Handle::from(2)),
            Err(StructuralError::NameTaken("p".into()))
        );
        assert_eq!(names.resolve("p"), Some(Handle::from(1)));
    }

    #[test]
    fn watchers_hear_about_name_changes() {
        let mut names = NameTable::new();
        let reader = NodeId::from(10);
        names.watch(reader, WatchKey::Name("later".into()));

        // the name did not exist when it was read; creating it notifies
        assert_eq!(names.register("later", Handle::from(3)).unwrap(), vec![reader]);
        assert_eq!(names.unregister("later", Handle::from(3)), vec![reader]);

        names.unwatch(reader);
        names.register("later", Handle::from(4)).unwrap();
        assert!(names.unregister("later", Handle::from(4)).is_empty());
    }

    #[test]
    fn unregister_ignores_a_rebound_name() {
        let mut names = NameTable::new();
        names.register("a", Handle::from(1)).unwrap();
        names.unregister("a", Handle::from(1));
        names.register("a", Handle::from(2)).unwrap();

        assert!(names.unregister("a", Handle::from(1)).is_empty());
        assert_eq!(names.resolve("a"), Some(Handle::from(2)));
    }
}
