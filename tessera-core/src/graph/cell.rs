//! Essential Cells
//!
//! An essential cell is the single authoritative storage location for one
//! logical piece of state. Every node that exposes that state (the original
//! component and any linked copies of it) reads the same cell, so a write
//! through any alias is observed through every other alias.
//!
//! # Freeze and Revert
//!
//! A frozen cell rejects writes. Reverting restores the value the cell held
//! when it was created.

use std::collections::{HashMap, HashSet};

use super::node::NodeId;
use crate::value::Value;

/// Unique identifier for an essential cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl From<u64> for CellId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Authoritative storage for one piece of state.
#[derive(Debug)]
pub struct ValueCell {
    value: Value,

    /// Value at creation, restored by [`CellStore::revert`].
    initial: Value,

    frozen: bool,

    /// Essential nodes reading this cell. The cell is dropped when the last
    /// reader goes away.
    readers: HashSet<NodeId>,
}

impl ValueCell {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn readers(&self) -> &HashSet<NodeId> {
        &self.readers
    }
}

/// Arena of essential cells.
#[derive(Debug, Default)]
pub struct CellStore {
    cells: HashMap<CellId, ValueCell>,
    next_id: u64,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a cell holding `value`. It has no readers until one attaches.
    pub fn create(&mut self, value: Value) -> CellId {
        let id = CellId(self.next_id);
        self.next_id += 1;
        self.cells.insert(
            id,
            ValueCell {
                initial: value.clone(),
                value,
                frozen: false,
                readers: HashSet::new(),
            },
        );
        id
    }

    pub fn get(&self, id: CellId) -> Option<&ValueCell> {
        self.cells.get(&id)
    }

    pub fn value(&self, id: CellId) -> Option<&Value> {
        self.cells.get(&id).map(|cell| &cell.value)
    }

    /// Register `node` as a reader (an alias) of the cell.
    pub fn attach(&mut self, id: CellId, node: NodeId) {
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.readers.insert(node);
        }
    }

    /// Unregister a reader. Returns `true` if the cell was dropped because
    /// nothing reads it any more.
    pub fn detach(&mut self, id: CellId, node: NodeId) -> bool {
        let Some(cell) = self.cells.get_mut(&id) else {
            return false;
        };
        cell.readers.remove(&node);
        if cell.readers.is_empty() {
            self.cells.remove(&id);
            true
        } else {
            false
        }
    }

    /// Store a new value.
    ///
    /// Returns the readers to invalidate, or `None` when nothing changed.
    /// Frozen cells are checked by the caller before planning a write.
    pub fn set(&mut self, id: CellId, value: Value) -> Option<Vec<NodeId>> {
        let cell = self.cells.get_mut(&id)?;
        if cell.value == value {
            return None;
        }
        cell.value = value;
        Some(cell.readers.iter().copied().collect())
    }

    pub fn is_frozen(&self, id: CellId) -> bool {
        self.cells.get(&id).is_some_and(|cell| cell.frozen)
    }

    pub fn set_frozen(&mut self, id: CellId, frozen: bool) {
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.frozen = frozen;
        }
    }

    /// The value the cell was created with.
    pub fn initial(&self, id: CellId) -> Option<&Value> {
        self.cells.get(&id).map(|cell| &cell.initial)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
