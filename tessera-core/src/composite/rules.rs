//! Built-in composite rules.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{CompositeRule, Replacement};
use crate::component::{library, ComponentTemplate, DependencySpec, DependencyValues, StateVarDecl};
use crate::error::DefinitionError;
use crate::value::Value;

fn deps(entries: &[(&str, DependencySpec)]) -> IndexMap<String, DependencySpec> {
    entries
        .iter()
        .map(|(key, spec)| (key.to_string(), spec.clone()))
        .collect()
}

fn local(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Names from a list value, skipping anything that is not a string.
fn names(value: Option<&Value>) -> Vec<&str> {
    value
        .and_then(Value::elements)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Copies one component, found by name.
#[derive(Debug, Clone)]
pub struct CopyRule {
    /// Dependency yielding the source's name.
    pub source: DependencySpec,
    pub link: bool,
}

impl CopyRule {
    pub fn of(target: impl Into<String>) -> Self {
        Self {
            source: DependencySpec::component_name(target),
            link: true,
        }
    }
}

impl CompositeRule for CopyRule {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn dependencies(&self) -> IndexMap<String, DependencySpec> {
        deps(&[("source", self.source.clone())])
    }

    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError> {
        let Some(source) = deps.optional("source").and_then(Value::as_str) else {
            return Ok(Vec::new());
        };
        Ok(vec![Replacement::copy(local(source), source, self.link)])
    }
}

/// Copies every child of a component.
#[derive(Debug, Clone)]
pub struct CopyChildrenRule {
    pub of: String,
    pub component_type: Option<String>,
    pub link: bool,
}

impl CompositeRule for CopyChildrenRule {
    fn name(&self) -> &'static str {
        "copyChildren"
    }

    fn dependencies(&self) -> IndexMap<String, DependencySpec> {
        let spec = DependencySpec::child_names(&self.of);
        let spec = match &self.component_type {
            Some(component_type) => spec.of_type(component_type),
            None => spec,
        };
        deps(&[("children", spec)])
    }

    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError> {
        Ok(names(deps.optional("children"))
            .into_iter()
            .map(|name| Replacement::copy(local(name), name, self.link))
            .collect())
    }
}

/// Copies a single state variable into a standalone component of the
/// matching type.
///
/// A linked copy mirrors the source and writes back through it; a snapshot
/// copy starts from the current value and then evolves independently.
#[derive(Debug, Clone)]
pub struct CopyPropRule {
    pub target: String,
    pub variable: String,
    pub link: bool,
}

impl CopyPropRule {
    fn component_type(value: &Value) -> &'static str {
        match value {
            Value::Number(_) => "number",
            Value::Expression(_) => "math",
            Value::String(_) => "text",
            Value::Boolean(_) => "boolean",
            _ => "value",
        }
    }
}

impl CompositeRule for CopyPropRule {
    fn name(&self) -> &'static str {
        "copyProp"
    }

    fn dependencies(&self) -> IndexMap<String, DependencySpec> {
        deps(&[(
            "value",
            DependencySpec::component(&self.target, &self.variable),
        )])
    }

    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError> {
        let Some(value) = deps.optional("value") else {
            return Ok(Vec::new());
        };
        let component_type = Self::component_type(value);
        let decl = if self.link {
            StateVarDecl::passthrough(DependencySpec::component(&self.target, &self.variable))
        } else {
            StateVarDecl::essential(value.clone())
        };
        let template = library::with_bound_display(
            library::value_component(component_type, decl),
            &self.target,
        );
        let signature = Value::Tuple(vec![
            Value::string(&self.target),
            Value::string(component_type),
        ]);
        Ok(vec![Replacement::template(
            self.variable.clone(),
            signature,
            template,
        )])
    }
}

/// Builds the template for one element of a mapped list.
pub type TemplateFn = Arc<dyn Fn(&Value, usize) -> ComponentTemplate + Send + Sync>;

/// One template per element of a list value.
#[derive(Clone)]
pub struct MapRule {
    pub source: DependencySpec,
    pub build: TemplateFn,
}

impl MapRule {
    pub fn new<F>(source: DependencySpec, build: F) -> Self
    where
        F: Fn(&Value, usize) -> ComponentTemplate + Send + Sync + 'static,
    {
        Self {
            source,
            build: Arc::new(build),
        }
    }
}

impl fmt::Debug for MapRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapRule")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CompositeRule for MapRule {
    fn name(&self) -> &'static str {
        "map"
    }

    fn dependencies(&self) -> IndexMap<String, DependencySpec> {
        deps(&[("source", self.source.clone())])
    }

    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError> {
        let Some(items) = deps.optional("source").and_then(Value::elements) else {
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                Replacement::template(format!("#{}", i + 1), item.clone(), (self.build)(item, i))
            })
            .collect())
    }
}

/// Copies the children of a component at 1-based indices taken from the
/// composite's `indices` attribute. Out-of-range indices are skipped.
#[derive(Debug, Clone)]
pub struct SelectRule {
    pub of: String,
    pub link: bool,
}

impl CompositeRule for SelectRule {
    fn name(&self) -> &'static str {
        "select"
    }

    fn dependencies(&self) -> IndexMap<String, DependencySpec> {
        deps(&[
            ("children", DependencySpec::child_names(&self.of)),
            ("indices", DependencySpec::attribute("indices")),
        ])
    }

    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError> {
        let children = names(deps.optional("children"));
        let Some(indices) = deps.optional("indices").and_then(Value::elements) else {
            return Ok(Vec::new());
        };

        let mut used: HashMap<&str, usize> = HashMap::new();
        let mut plan = Vec::new();
        for index in indices.iter().filter_map(Value::as_f64) {
            if index < 1.0 || index.fract() != 0.0 {
                continue;
            }
            let Some(&name) = children.get(index as usize - 1) else {
                continue;
            };
            let seen = used.entry(name).or_insert(0);
            *seen += 1;
            let key = if *seen == 1 {
                local(name).to_string()
            } else {
                format!("{}-{}", local(name), seen)
            };
            plan.push(Replacement::copy(key, name, self.link));
        }
        Ok(plan)
    }
}

/// Materializes the children of the first case whose condition holds.
///
/// Conditions are the composite's `case1`, `case2`, ... attributes. An
/// invalid condition counts as false.
#[derive(Debug, Clone)]
pub struct ConditionalRule {
    pub cases: Vec<Vec<Arc<ComponentTemplate>>>,
    pub otherwise: Vec<Arc<ComponentTemplate>>,
}

impl ConditionalRule {
    pub fn condition_attribute(case: usize) -> String {
        format!("case{}", case + 1)
    }
}

impl CompositeRule for ConditionalRule {
    fn name(&self) -> &'static str {
        "conditionalContent"
    }

    fn dependencies(&self) -> IndexMap<String, DependencySpec> {
        (0..self.cases.len())
            .map(|k| {
                let attribute = Self::condition_attribute(k);
                (attribute.clone(), DependencySpec::attribute(attribute))
            })
            .collect()
    }

    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError> {
        let chosen = (0..self.cases.len()).find(|&k| {
            deps.optional(&Self::condition_attribute(k))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        });
        let (prefix, children) = match chosen {
            Some(k) => (format!("case{}", k + 1), &self.cases[k]),
            None => ("else".to_string(), &self.otherwise),
        };
        Ok(children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let key = format!("{prefix}-{}", i + 1);
                Replacement {
                    signature: Value::String(key.clone()),
                    key,
                    build: super::ReplacementBuild::Template(Arc::clone(child)),
                }
            })
            .collect())
    }
}

/// Number components for every integer in `from..=to`, read from the
/// composite's `from` and `to` attributes.
#[derive(Debug, Clone, Default)]
pub struct SequenceRule;

impl CompositeRule for SequenceRule {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn dependencies(&self) -> IndexMap<String, DependencySpec> {
        deps(&[
            ("from", DependencySpec::attribute("from")),
            ("to", DependencySpec::attribute("to")),
        ])
    }

    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError> {
        let from = deps.number("from")?.round() as i64;
        let to = deps.number("to")?.round() as i64;
        Ok((from..=to)
            .enumerate()
            .map(|(i, n)| {
                let n = n as f64;
                Replacement::template(format!("#{}", i + 1), Value::Number(n), library::number(n))
            })
            .collect())
    }
}
