//! Trigger registry: the live set of rules and their firing order.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::{EventKind, TriggerAction, TriggerDecl};
use crate::component::Handle;
use crate::graph::{topological_order, NodeId};

/// A registered rule.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub name: String,
    pub decl: TriggerDecl,
    /// The rule's `triggerWhen` node.
    pub condition: Option<NodeId>,
    /// Condition value at the end of the last settled pass.
    pub last_condition: bool,
    /// Whether `last_condition` has been observed yet. A rule's first
    /// observation never fires it.
    pub primed: bool,
    /// The trigger set this rule belongs to.
    pub member_of: Option<Handle>,
    /// Set when the rule sits on a chain cycle.
    pub disabled: bool,
}

impl RuleEntry {
    pub fn new(name: impl Into<String>, decl: TriggerDecl) -> Self {
        Self {
            name: name.into(),
            decl,
            condition: None,
            last_condition: false,
            primed: false,
            member_of: None,
            disabled: false,
        }
    }

    /// Whether chaining may fire this rule.
    fn chainable(&self) -> bool {
        !self.disabled && self.condition.is_none() && self.member_of.is_none()
    }
}

#[derive(Debug, Default)]
pub struct TriggerRegistry {
    rules: IndexMap<Handle, RuleEntry>,
    /// Enabled rules in chain order.
    order: Vec<Handle>,
    followers: HashMap<Handle, Vec<Handle>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: Handle, entry: RuleEntry) {
        self.rules.insert(handle, entry);
    }

    pub fn unregister(&mut self, handle: Handle) -> Option<RuleEntry> {
        let removed = self.rules.shift_remove(&handle)?;
        self.order.retain(|h| *h != handle);
        self.followers.remove(&handle);
        for followers in self.followers.values_mut() {
            followers.retain(|h| *h != handle);
        }
        Some(removed)
    }

    pub fn get(&self, handle: Handle) -> Option<&RuleEntry> {
        self.rules.get(&handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut RuleEntry> {
        self.rules.get_mut(&handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.rules.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Recompute the chain order.
    ///
    /// `resolve` maps a `triggerWith` name to a handle. Every declared edge
    /// takes part in the cycle check, including edges of rules whose own
    /// condition overrides chaining. Each cycle found is returned as rule
    /// names, and its rules are disabled.
    pub fn rebuild(&mut self, resolve: impl Fn(&str) -> Option<Handle>) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        loop {
            let keys: Vec<Handle> = self
                .rules
                .iter()
                .filter(|(_, entry)| !entry.disabled)
                .map(|(handle, _)| *handle)
                .collect();

            let mut edges = Vec::new();
            for &handle in &keys {
                for predecessor in &self.rules[&handle].decl.trigger_with {
                    match resolve(predecessor) {
                        Some(p) if self.rules.get(&p).is_some_and(|e| !e.disabled) => {
                            edges.push((p, handle));
                        }
                        _ => tracing::debug!(
                            rule = %self.rules[&handle].name,
                            predecessor = %predecessor,
                            "triggerWith names no active rule"
                        ),
                    }
                }
            }

            match topological_order(&keys, &edges) {
                Ok(order) => {
                    let position: HashMap<Handle, usize> =
                        order.iter().enumerate().map(|(i, h)| (*h, i)).collect();
                    let mut followers: HashMap<Handle, Vec<Handle>> = HashMap::new();
                    for (from, to) in edges {
                        followers.entry(from).or_default().push(to);
                    }
                    for list in followers.values_mut() {
                        list.sort_by_key(|h| position.get(h).copied().unwrap_or(usize::MAX));
                        list.dedup();
                    }
                    self.order = order;
                    self.followers = followers;
                    return cycles;
                }
                Err(cycle) => {
                    let names = cycle
                        .iter()
                        .filter_map(|h| self.rules.get(h).map(|e| e.name.clone()))
                        .collect();
                    for handle in &cycle {
                        if let Some(entry) = self.rules.get_mut(handle) {
                            entry.disabled = true;
                        }
                    }
                    cycles.push(names);
                }
            }
        }
    }

    /// Enabled rules in chain order.
    pub fn order(&self) -> &[Handle] {
        &self.order
    }

    /// Rules to chain-fire after `handle`, in order.
    pub fn followers(&self, handle: Handle) -> Vec<Handle> {
        self.followers
            .get(&handle)
            .map(|list| {
                list.iter()
                    .copied()
                    .filter(|h| self.rules.get(h).is_some_and(RuleEntry::chainable))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rules with their own condition, in order. Set members are skipped:
    /// the set decides when they fire.
    pub fn conditional(&self) -> Vec<(Handle, NodeId)> {
        self.order
            .iter()
            .filter_map(|h| {
                let entry = self.rules.get(h)?;
                if entry.disabled || entry.member_of.is_some() {
                    return None;
                }
                Some((*h, entry.condition?))
            })
            .collect()
    }

    /// Rules listening for `kind` events on the component named `component`.
    pub fn listeners(&self, component: &str, kind: EventKind) -> Vec<Handle> {
        self.order
            .iter()
            .copied()
            .filter(|h| {
                self.rules.get(h).is_some_and(|entry| {
                    entry.member_of.is_none()
                        && entry
                            .decl
                            .on_event
                            .as_ref()
                            .is_some_and(|e| e.component == component && e.kind == kind)
                })
            })
            .collect()
    }

    /// Members of the trigger set `set`, in order.
    pub fn members(&self, set: Handle) -> Vec<Handle> {
        self.order
            .iter()
            .copied()
            .filter(|h| self.rules.get(h).is_some_and(|e| e.member_of == Some(set)))
            .collect()
    }

    pub fn is_set(&self, handle: Handle) -> bool {
        self.rules
            .get(&handle)
            .is_some_and(|e| matches!(e.decl.action, TriggerAction::Set))
    }
}
