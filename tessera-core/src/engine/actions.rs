//! The action API: one external action, one microcycle.

use super::{Engine, Microcycle};
use crate::action::{Action, ActionArgs, ActionReport, ActionRequest};
use crate::component::{ComponentKind, Handle};
use crate::error::ActionError;
use crate::trigger::{EventKind, FireCause};
use crate::value::Value;

impl Engine {
    /// Perform `action` on the component named `component` and settle.
    ///
    /// Rejected writes are not errors: the action completes and the state
    /// stays as it was. Errors mean the request itself was bad, in which
    /// case nothing ran.
    pub fn perform_action(
        &mut self,
        component: &str,
        action: &str,
        args: &ActionArgs,
    ) -> Result<ActionReport, ActionError> {
        let parsed = Action::parse(action, args).map_err(|err| match err {
            ActionError::UnknownAction { action, .. } => ActionError::UnknownAction {
                component: component.to_string(),
                action,
            },
            other => other,
        })?;
        let target = self
            .names
            .resolve(component)
            .ok_or_else(|| ActionError::UnknownComponent(component.to_string()))?;

        self.cycle += 1;
        let span = tracing::debug_span!("microcycle", cycle = self.cycle, component, action);
        let _enter = span.enter();

        self.microcycle = Microcycle::default();
        self.rebuild_triggers();
        let dispatched = self.dispatch(target, action, parsed);
        // Whatever was written before a failure still settles
        self.settle();
        dispatched?;

        let microcycle = std::mem::take(&mut self.microcycle);
        let report = ActionReport {
            cycle: self.cycle,
            fired: microcycle.fired_names,
            created: microcycle.created,
            destroyed: microcycle.destroyed,
            diagnostics: self.take_diagnostics(),
        };
        tracing::debug!(
            fired = report.fired.len(),
            created = report.created,
            destroyed = report.destroyed,
            "microcycle complete"
        );
        Ok(report)
    }

    /// [`Engine::perform_action`] for a deserialized request.
    pub fn perform(&mut self, request: &ActionRequest) -> Result<ActionReport, ActionError> {
        self.perform_action(&request.component, &request.action, &request.args)
    }

    /// Run one parsed action against `target`, without settling.
    pub(crate) fn dispatch(&mut self, target: Handle, name: &str, action: Action) -> Result<(), ActionError> {
        let Some((component, kind)) = self.components.get(target).map(|c| {
            let kind = match &c.template.kind {
                ComponentKind::Point => TargetKind::Point,
                ComponentKind::Input(_) => TargetKind::Input,
                ComponentKind::Trigger(_) => TargetKind::Trigger,
                _ => TargetKind::Other,
            };
            (c.name.clone(), kind)
        }) else {
            return Err(ActionError::UnknownComponent(format!("{target}")));
        };
        let unknown = || ActionError::UnknownAction {
            component: component.clone(),
            action: name.to_string(),
        };

        match (action, kind) {
            (Action::RecordClick, _) => self.record_event(&component, EventKind::Click),
            (Action::RecordFocus, _) => self.record_event(&component, EventKind::Focus),

            (Action::SetValue { variable, value }, _) => {
                if let Err(rejection) = self.set_value(&component, &variable, value) {
                    tracing::debug!(component = %component, variable = %variable, %rejection, "setValue rejected");
                }
            }

            (Action::MovePoint { x, y }, TargetKind::Point) => self.move_point(target, &component, x, y),

            (Action::UpdateImmediateValue { text }, TargetKind::Input) => {
                self.preview_edit(target, &text);
            }
            (Action::UpdateValue, TargetKind::Input) => self.commit(target),

            (
                Action::UpdateValue | Action::CallAction | Action::TriggerActions | Action::Fire,
                TargetKind::Trigger,
            ) => {
                self.fire(target, FireCause::External);
            }

            _ => return Err(unknown()),
        }
        Ok(())
    }

    fn record_event(&mut self, component: &str, kind: EventKind) {
        let listeners = self.triggers.listeners(component, kind);
        tracing::debug!(component, ?kind, listeners = listeners.len(), "event recorded");
        for rule in listeners {
            self.fire(rule, FireCause::Event);
        }
    }

    /// Drag a point. Respects its `draggable` attribute.
    fn move_point(&mut self, handle: Handle, component: &str, x: f64, y: f64) {
        let draggable = match self.components.get(handle).and_then(|c| c.attribute("draggable")) {
            Some(node) => self.read(node).as_bool().unwrap_or(true),
            None => true,
        };
        if !draggable {
            tracing::debug!(component, "point is not draggable");
            return;
        }
        let coords = Value::Tuple(vec![Value::Number(x), Value::Number(y)]);
        if let Err(rejection) = self.set_value(component, "coords", coords) {
            tracing::debug!(component, %rejection, "movePoint rejected");
        }
    }
}

/// What a component accepts beyond the universal actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Point,
    Input,
    Trigger,
    Other,
}
