//! Preview and commit for two-stage inputs.

use super::Engine;
use crate::component::{ComponentKind, Handle};
use crate::input::TwoStageState;
use crate::value::Value;

impl Engine {
    /// Record a preview edit. The committed value is untouched.
    pub(crate) fn preview_edit(&mut self, input: Handle, raw: &str) {
        let Some((name, kind, raw_node, changed_node)) = self.components.get(input).and_then(|c| {
            let ComponentKind::Input(decl) = &c.template.kind else {
                return None;
            };
            Some((
                c.name.clone(),
                decl.kind,
                c.variable("rawImmediateValue")?,
                c.variable("immediateValueChanged")?,
            ))
        }) else {
            return;
        };
        if self.is_fixed(input) {
            tracing::debug!(input = %name, "input is fixed; ignoring edit");
            return;
        }
        let parsed = kind.parse(raw);
        tracing::trace!(input = %name, raw, parsed = %parsed, "preview edit");
        self.set_essential(raw_node, parsed);
        self.set_essential(changed_node, Value::Boolean(true));
    }

    /// Commit the pending preview edit, if any.
    ///
    /// An unbound input always accepts its own commit, even an invalid one.
    /// A bound input's commit becomes a write request against its target.
    /// Whether or not the target accepts, the pending flag is cleared, so
    /// the immediate value shows the committed one afterwards.
    pub(crate) fn commit(&mut self, input: Handle) {
        let Some((name, value_node, immediate_node, changed_node, committed_node)) =
            self.components.get(input).and_then(|c| {
                Some((
                    c.name.clone(),
                    c.variable("value")?,
                    c.variable("immediateValue")?,
                    c.variable("immediateValueChanged")?,
                    c.variable("valueChanged")?,
                ))
            })
        else {
            return;
        };
        if self.read(changed_node).as_bool() != Some(true) {
            tracing::trace!(input = %name, "nothing to commit");
            return;
        }

        let immediate = self.read(immediate_node);
        let outcome = self.commit_write(value_node, immediate);
        self.set_essential(changed_node, Value::Boolean(false));
        match outcome {
            Ok(changed) => {
                self.set_essential(committed_node, Value::Boolean(true));
                tracing::debug!(input = %name, changed, "committed");
            }
            Err(rejection) => {
                tracing::debug!(input = %name, %rejection, "commit rejected; reverting");
            }
        }
    }

    /// Settled view of an input's preview and committed values.
    pub fn two_stage_state(&mut self, input: &str) -> Option<TwoStageState> {
        let component = self.component(input)?;
        if !matches!(component.template.kind, ComponentKind::Input(_)) {
            return None;
        }
        let nodes = (
            component.variable("immediateValue")?,
            component.variable("value")?,
            component.variable("immediateValueChanged")?,
            component.variable("valueChanged")?,
        );
        Some(TwoStageState {
            immediate_value: self.read(nodes.0),
            committed_value: self.read(nodes.1),
            immediate_changed: self.read(nodes.2).as_bool().unwrap_or(false),
            committed_changed: self.read(nodes.3).as_bool().unwrap_or(false),
        })
    }
}
