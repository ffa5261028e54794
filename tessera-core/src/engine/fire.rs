//! Firing trigger rules and settling a microcycle.

use super::Engine;
use crate::action::{Action, ActionArgs};
use crate::component::Handle;
use crate::error::{ActionError, Diagnostic, StructuralError};
use crate::trigger::{FireCause, TargetRef, TriggerAction};
use crate::value::Value;

/// A write a rule has computed but not yet applied.
struct PendingWrite {
    rule: String,
    target: TargetRef,
    value: Value,
}

impl Engine {
    /// Fire one rule. Returns `false` if it did not fire.
    pub(crate) fn fire(&mut self, rule: Handle, cause: FireCause) -> bool {
        if self.microcycle.fired.contains(&rule) {
            return false;
        }
        let Some(entry) = self.triggers.get(rule) else {
            return false;
        };
        if entry.disabled {
            tracing::debug!(rule = %entry.name, "rule is disabled");
            return false;
        }
        let (name, action, condition) = (entry.name.clone(), entry.decl.action.clone(), entry.condition);

        // Direct firing of a conditioned rule needs the condition to hold now
        if matches!(cause, FireCause::External | FireCause::Event) {
            if let Some(condition) = condition {
                if self.read(condition).as_bool() != Some(true) {
                    tracing::debug!(rule = %name, "condition does not hold; not firing");
                    return false;
                }
            }
        }

        self.microcycle.fired.insert(rule);
        self.microcycle.fired_names.push(name.clone());
        tracing::debug!(rule = %name, ?cause, "firing");

        match action {
            TriggerAction::UpdateValue { target } => {
                if let Some(write) = self.pending_write(rule, &name, target) {
                    self.apply_pending(write);
                }
            }
            TriggerAction::CallAction {
                component,
                action,
                args,
            } => self.call_action(&name, &component, &action, &args),
            TriggerAction::Set => self.fire_set(rule),
        }

        for follower in self.triggers.followers(rule) {
            self.fire(follower, FireCause::Chain);
        }
        true
    }

    /// Fire every member of a set. All member values are read before any
    /// is written, so members see the state from before the set fired.
    /// Rules chained to a member fire once the whole set has written.
    fn fire_set(&mut self, set: Handle) {
        let members: Vec<Handle> = self
            .triggers
            .members(set)
            .into_iter()
            .filter(|m| !self.microcycle.fired.contains(m))
            .collect();

        let mut writes = Vec::new();
        let mut calls = Vec::new();
        for member in &members {
            let Some(entry) = self.triggers.get(*member) else {
                continue;
            };
            let (name, action) = (entry.name.clone(), entry.decl.action.clone());
            self.microcycle.fired.insert(*member);
            self.microcycle.fired_names.push(name.clone());
            tracing::debug!(rule = %name, cause = ?FireCause::Member, "firing");
            match action {
                TriggerAction::UpdateValue { target } => {
                    writes.extend(self.pending_write(*member, &name, target));
                }
                TriggerAction::CallAction {
                    component,
                    action,
                    args,
                } => calls.push((name, component, action, args)),
                TriggerAction::Set => {
                    tracing::warn!(rule = %name, "nested trigger sets are not fired");
                }
            }
        }

        for write in writes {
            self.apply_pending(write);
        }
        for (name, component, action, args) in calls {
            self.call_action(&name, &component, &action, &args);
        }
        for member in members {
            for follower in self.triggers.followers(member) {
                self.fire(follower, FireCause::Chain);
            }
        }
    }

    fn pending_write(&mut self, rule: Handle, name: &str, target: TargetRef) -> Option<PendingWrite> {
        let value = match self.components.get(rule).and_then(|c| c.variable("newValue")) {
            Some(node) => self.read(node),
            None => Value::Invalid,
        };
        if value.is_invalid() {
            tracing::warn!(rule = %name, "newValue is invalid; dropping the write");
            return None;
        }
        Some(PendingWrite {
            rule: name.to_string(),
            target,
            value,
        })
    }

    fn apply_pending(&mut self, write: PendingWrite) {
        if let Err(rejection) = self.write_target(&write.target, write.value) {
            tracing::warn!(
                rule = %write.rule,
                target = %format!("{}.{}", write.target.component, write.target.variable),
                %rejection,
                "trigger write rejected"
            );
        }
    }

    fn call_action(&mut self, rule: &str, component: &str, action: &str, args: &ActionArgs) {
        let result = Action::parse(action, args).and_then(|parsed| {
            let target = self
                .names
                .resolve(component)
                .ok_or_else(|| ActionError::UnknownComponent(component.to_string()))?;
            self.dispatch(target, action, parsed)
        });
        if let Err(err) = result {
            tracing::warn!(rule = %rule, error = %err, "called action failed");
        }
    }

    /// Fire every conditioned rule whose condition turned from false to
    /// true since it was last observed. Returns how many fired.
    pub(crate) fn evaluate_conditions(&mut self) -> usize {
        let mut fired = 0;
        for (rule, condition) in self.triggers.conditional() {
            let now = self.read(condition).as_bool().unwrap_or(false);
            let Some(entry) = self.triggers.get_mut(rule) else {
                continue;
            };
            let rising = entry.primed && !entry.last_condition && now;
            entry.last_condition = now;
            entry.primed = true;
            if rising && self.fire(rule, FireCause::Condition) {
                fired += 1;
            }
        }
        fired
    }

    /// Re-derive the chain order, reporting any cycles.
    pub(crate) fn rebuild_triggers(&mut self) {
        if !self.triggers_dirty {
            return;
        }
        self.triggers_dirty = false;
        let names = &self.names;
        let cycles = self.triggers.rebuild(|name| names.resolve(name));
        for rules in cycles {
            let location = rules
                .first()
                .and_then(|name| self.component(name))
                .and_then(|c| c.template.location);
            let first = rules.first().cloned();
            let mut diagnostic = Diagnostic::from(StructuralError::TriggerCycle { rules }).at(location);
            if let Some(first) = first {
                diagnostic = diagnostic.for_component(first);
            }
            self.report(diagnostic);
        }
    }

    /// Expand composites and fire conditioned rules until nothing changes.
    pub fn settle(&mut self) {
        for pass in 0..self.config.max_settle_passes {
            self.rebuild_triggers();
            self.expand_composites();
            self.rebuild_triggers();
            if self.evaluate_conditions() == 0 {
                tracing::trace!(pass, "settled");
                return;
            }
        }
        tracing::warn!(
            passes = self.config.max_settle_passes,
            "trigger conditions did not settle"
        );
    }
}
