//! Standard Components
//!
//! Template constructors for the component types the engine ships with.
//! A document loader maps markup onto these; tests build documents with
//! them directly.
//!
//! Every numeric component carries a hidden `displayPolicy` state variable
//! that starts from the nearest ancestor's policy (or the engine default)
//! and applies its own `displayDigits`, `displayDecimals` and
//! `displaySmallAsZero` attributes on top. `valueForDisplay` and `text`
//! are derived from it.

use std::sync::Arc;

use super::{ComponentKind, ComponentTemplate, DependencySpec, StateVarDecl};
use crate::action::ActionArgs;
use crate::composite::{
    CompositeDecl, ConditionalRule, CopyChildrenRule, CopyPropRule, CopyRule, MapRule, SelectRule,
    SequenceRule,
};
use crate::error::WriteRejection;
use crate::input::{InputDecl, InputKind};
use crate::trigger::{TargetRef, TriggerAction, TriggerDecl};
use crate::value::{format_for_display, DisplayPolicy, Value};

/// Whether a copy shares its source's essential storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Writes through the copy reach the source, and the other way round.
    #[default]
    Link,
    /// The copy starts from the source's current values and then evolves
    /// on its own.
    Snapshot,
}

impl CopyMode {
    fn link(self) -> bool {
        self == CopyMode::Link
    }
}

fn display_policy(bound: Option<&str>) -> StateVarDecl {
    let decl = StateVarDecl::derived(|deps| {
        let mut policy = deps
            .optional("bound")
            .or_else(|| deps.optional("inherited"))
            .and_then(DisplayPolicy::from_value)
            .unwrap_or(deps.config().display);

        let digits = deps.optional("displayDigits").and_then(Value::as_f64);
        let decimals = deps.optional("displayDecimals").and_then(Value::as_f64);
        // Declaring one of the two replaces the inherited pair
        match (digits, decimals) {
            (Some(d), None) => {
                policy.digits = Some(d.max(1.0) as u32);
                policy.decimals = None;
            }
            (None, Some(d)) => {
                policy.digits = None;
                policy.decimals = Some(d as i32);
            }
            (Some(a), Some(b)) => {
                policy.digits = Some(a.max(1.0) as u32);
                policy.decimals = Some(b as i32);
            }
            (None, None) => {}
        }
        match deps.optional("displaySmallAsZero") {
            Some(Value::Boolean(false)) => policy.small_as_zero = 0.0,
            Some(Value::Boolean(true)) if policy.small_as_zero == 0.0 => {
                policy.small_as_zero = DisplayPolicy::default().small_as_zero;
            }
            Some(Value::Number(threshold)) => policy.small_as_zero = *threshold,
            _ => {}
        }
        Ok(policy.to_value())
    })
    .depends_on("inherited", DependencySpec::ancestor("displayPolicy"))
    .depends_on("displayDigits", DependencySpec::attribute("displayDigits"))
    .depends_on("displayDecimals", DependencySpec::attribute("displayDecimals"))
    .depends_on(
        "displaySmallAsZero",
        DependencySpec::attribute("displaySmallAsZero"),
    )
    .hidden();

    match bound {
        Some(target) => decl.depends_on("bound", DependencySpec::component(target, "displayPolicy")),
        None => decl,
    }
}

fn value_for_display() -> StateVarDecl {
    StateVarDecl::derived(|deps| {
        let value = deps.get("value")?;
        let policy = DisplayPolicy::from_value(deps.get("policy")?)
            .unwrap_or(deps.config().display);
        Ok(format_for_display(value, &policy))
    })
    .depends_on("value", DependencySpec::sibling("value"))
    .depends_on("policy", DependencySpec::sibling("displayPolicy"))
}

fn text_of(variable: &str) -> StateVarDecl {
    StateVarDecl::derived(|deps| {
        let value = deps.get("value")?;
        if value.is_invalid() {
            return Ok(Value::Invalid);
        }
        Ok(Value::string(value.to_string()))
    })
    .depends_on("value", DependencySpec::sibling(variable))
}

/// Root of every document. Carries the top-level display policy.
pub fn document() -> ComponentTemplate {
    ComponentTemplate::new("document").with_state("displayPolicy", display_policy(None))
}

/// Plain container. Passes display policy down to its descendants.
pub fn group() -> ComponentTemplate {
    ComponentTemplate::new("group").with_state("displayPolicy", display_policy(None))
}

/// A component with a `value` plus the derived display variables.
pub fn value_component(component_type: &str, value: StateVarDecl) -> ComponentTemplate {
    ComponentTemplate::new(component_type)
        .with_state("value", value)
        .with_state("displayPolicy", display_policy(None))
        .with_state("valueForDisplay", value_for_display())
        .with_state("text", text_of("valueForDisplay"))
}

/// Take display policy from `target` instead of the nearest ancestor.
pub fn with_bound_display(template: ComponentTemplate, target: &str) -> ComponentTemplate {
    if template.state.contains_key("displayPolicy") {
        template.with_state("displayPolicy", display_policy(Some(target)))
    } else {
        template
    }
}

pub fn number(value: f64) -> ComponentTemplate {
    value_component("number", StateVarDecl::essential(value))
}

/// A number whose value is derived.
pub fn computed_number(value: StateVarDecl) -> ComponentTemplate {
    value_component("number", value)
}

pub fn math(source: &str) -> ComponentTemplate {
    value_component("math", StateVarDecl::essential(Value::expression(source)))
}

pub fn text(value: &str) -> ComponentTemplate {
    ComponentTemplate::new("text")
        .with_state("value", StateVarDecl::essential(value))
        .with_state("text", text_of("value"))
}

pub fn boolean(value: bool) -> ComponentTemplate {
    ComponentTemplate::new("boolean")
        .with_state("value", StateVarDecl::essential(value))
        .with_state("text", text_of("value"))
}

/// A draggable point. `coords` is derived from `x` and `y` and writes
/// back to them.
pub fn point(x: f64, y: f64) -> ComponentTemplate {
    let coords = StateVarDecl::derived(|deps| {
        Ok(Value::Tuple(vec![
            deps.get("x")?.clone(),
            deps.get("y")?.clone(),
        ]))
    })
    .depends_on("x", DependencySpec::sibling("x"))
    .depends_on("y", DependencySpec::sibling("y"))
    .with_inverse(|desired, _| match desired.elements() {
        Some([x, y]) => Ok(vec![
            ("x".to_string(), x.clone()),
            ("y".to_string(), y.clone()),
        ]),
        _ => Err(WriteRejection::Rejected(format!(
            "point coordinates need two entries, got {desired}"
        ))),
    });

    let coords_for_display = StateVarDecl::derived(|deps| {
        let policy = DisplayPolicy::from_value(deps.get("policy")?)
            .unwrap_or(deps.config().display);
        Ok(format_for_display(deps.get("coords")?, &policy))
    })
    .depends_on("coords", DependencySpec::sibling("coords"))
    .depends_on("policy", DependencySpec::sibling("displayPolicy"));

    ComponentTemplate::new("point")
        .with_kind(ComponentKind::Point)
        .with_constant_attribute("draggable", true)
        .with_state("x", StateVarDecl::essential(x))
        .with_state("y", StateVarDecl::essential(y))
        .with_state("coords", coords)
        .with_state("displayPolicy", display_policy(None))
        .with_state("valueForDisplay", coords_for_display)
}

fn input(component_type: &str, kind: InputKind) -> ComponentTemplate {
    ComponentTemplate::new(component_type).with_kind(ComponentKind::Input(InputDecl::new(kind)))
}

pub fn text_input() -> ComponentTemplate {
    input("textInput", InputKind::Text)
}

pub fn math_input() -> ComponentTemplate {
    input("mathInput", InputKind::Math)
}

pub fn number_input() -> ComponentTemplate {
    input("numberInput", InputKind::Number)
}

pub fn boolean_input() -> ComponentTemplate {
    input("booleanInput", InputKind::Boolean)
}

/// A rule that writes `new_value` into `component.variable` when fired.
pub fn update_value(component: &str, variable: &str, new_value: StateVarDecl) -> ComponentTemplate {
    update_value_at(TargetRef::new(component, variable), new_value)
}

/// Like [`update_value`], for a target that may carry an element path.
pub fn update_value_at(target: TargetRef, new_value: StateVarDecl) -> ComponentTemplate {
    ComponentTemplate::new("updateValue")
        .with_kind(ComponentKind::Trigger(TriggerDecl::new(
            TriggerAction::UpdateValue { target },
        )))
        .with_state("newValue", new_value)
}

/// A rule that performs `action` on `component` when fired.
pub fn call_action(component: &str, action: &str, args: ActionArgs) -> ComponentTemplate {
    ComponentTemplate::new("callAction").with_kind(ComponentKind::Trigger(TriggerDecl::new(
        TriggerAction::CallAction {
            component: component.to_string(),
            action: action.to_string(),
            args,
        },
    )))
}

/// A group of rules that fire together.
pub fn trigger_set(members: Vec<ComponentTemplate>) -> ComponentTemplate {
    ComponentTemplate::new("triggerSet")
        .with_kind(ComponentKind::Trigger(TriggerDecl::new(TriggerAction::Set)))
        .with_children(members)
}

fn composite(component_type: &str, decl: CompositeDecl) -> ComponentTemplate {
    ComponentTemplate::new(component_type).with_kind(ComponentKind::Composite(decl))
}

pub fn copy(target: &str, mode: CopyMode) -> ComponentTemplate {
    let mut rule = CopyRule::of(target);
    rule.link = mode.link();
    composite("copy", CompositeDecl::new(rule))
}

/// Copy the component named by the copy's own `attribute` attribute. The
/// copy follows the name when it changes.
pub fn copy_named_by(attribute: &str, mode: CopyMode) -> ComponentTemplate {
    composite(
        "copy",
        CompositeDecl::new(CopyRule {
            source: DependencySpec::attribute(attribute),
            link: mode.link(),
        }),
    )
}

pub fn copy_children(of: &str, mode: CopyMode) -> ComponentTemplate {
    composite(
        "copy",
        CompositeDecl::new(CopyChildrenRule {
            of: of.to_string(),
            component_type: None,
            link: mode.link(),
        }),
    )
}

pub fn copy_prop(target: &str, variable: &str, mode: CopyMode) -> ComponentTemplate {
    composite(
        "copy",
        CompositeDecl::new(CopyPropRule {
            target: target.to_string(),
            variable: variable.to_string(),
            link: mode.link(),
        }),
    )
}

/// One subtree per element of the list produced by `source`.
pub fn map<F>(source: DependencySpec, build: F) -> ComponentTemplate
where
    F: Fn(&Value, usize) -> ComponentTemplate + Send + Sync + 'static,
{
    composite("map", CompositeDecl::new(MapRule::new(source, build)))
}

/// Copies of the children of `of` at the given 1-based indices.
pub fn select(of: &str, indices: &[usize]) -> ComponentTemplate {
    let indices = Value::List(indices.iter().map(|&i| Value::Number(i as f64)).collect());
    composite(
        "select",
        CompositeDecl::new(SelectRule {
            of: of.to_string(),
            link: true,
        }),
    )
    .with_constant_attribute("indices", indices)
}

/// The children of the first case whose condition holds, else `otherwise`.
pub fn conditional_content(
    cases: Vec<(StateVarDecl, Vec<ComponentTemplate>)>,
    otherwise: Vec<ComponentTemplate>,
) -> ComponentTemplate {
    let mut conditions = Vec::with_capacity(cases.len());
    let mut branches = Vec::with_capacity(cases.len());
    for (condition, children) in cases {
        conditions.push(condition);
        branches.push(children.into_iter().map(Arc::new).collect());
    }
    let rule = ConditionalRule {
        cases: branches,
        otherwise: otherwise.into_iter().map(Arc::new).collect(),
    };
    conditions.into_iter().enumerate().fold(
        composite("conditionalContent", CompositeDecl::new(rule)),
        |template, (k, condition)| {
            template.with_attribute(ConditionalRule::condition_attribute(k), condition)
        },
    )
}

/// Numbers `from..=to`.
pub fn sequence(from: f64, to: f64) -> ComponentTemplate {
    composite("sequence", CompositeDecl::new(SequenceRule))
        .with_constant_attribute("from", from)
        .with_constant_attribute("to", to)
}

impl ComponentTemplate {
    pub fn display_digits(self, digits: u32) -> Self {
        self.with_constant_attribute("displayDigits", f64::from(digits))
    }

    pub fn display_decimals(self, decimals: i32) -> Self {
        self.with_constant_attribute("displayDecimals", f64::from(decimals))
    }

    pub fn draggable(self, draggable: bool) -> Self {
        self.with_constant_attribute("draggable", draggable)
    }
}
