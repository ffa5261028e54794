//! Composite Resolution
//!
//! A composite is a component whose children are computed rather than
//! authored. Its [`CompositeRule`] turns dependency values into an ordered
//! replacement plan; the engine diffs each new plan against what is
//! currently materialized and creates, keeps or destroys subtrees.
//!
//! # Plans
//!
//! Each [`Replacement`] carries:
//!
//! - a `key`, unique within the plan, used for the generated name when the
//!   author did not assign one;
//! - a `signature`, compared against the previous plan. A materialized
//!   subtree is kept in place (with all of its essential state) exactly
//!   when the name and signature are unchanged;
//! - how to build it: a fresh template, or a copy of a named component.
//!
//! The plan is a pure function of the rule's dependencies. An identical
//! plan causes no churn at all.

mod rules;

pub use rules::{
    ConditionalRule, CopyChildrenRule, CopyPropRule, CopyRule, MapRule, SelectRule, SequenceRule,
    TemplateFn,
};

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::component::{ComponentTemplate, DependencySpec, DependencyValues};
use crate::error::DefinitionError;
use crate::value::Value;

/// Computes a composite's replacement plan.
pub trait CompositeRule: Send + Sync + fmt::Debug {
    /// Short rule name for logs.
    fn name(&self) -> &'static str;

    /// What the plan reads, keyed the way [`CompositeRule::plan`] asks for it.
    fn dependencies(&self) -> IndexMap<String, DependencySpec>;

    /// Produce the ordered replacement plan.
    fn plan(&self, deps: &DependencyValues<'_>) -> Result<Vec<Replacement>, DefinitionError>;
}

/// How to build one replacement.
#[derive(Debug, Clone)]
pub enum ReplacementBuild {
    /// Instantiate a template.
    Template(Arc<ComponentTemplate>),
    /// Copy a live component. Linked copies share its essential storage;
    /// otherwise the copy takes a snapshot of the current values.
    Copy { source: String, link: bool },
}

/// One entry of a replacement plan.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub key: String,
    pub signature: Value,
    pub build: ReplacementBuild,
}

impl Replacement {
    pub fn template(key: impl Into<String>, signature: Value, template: ComponentTemplate) -> Self {
        Self {
            key: key.into(),
            signature,
            build: ReplacementBuild::Template(Arc::new(template)),
        }
    }

    pub fn copy(key: impl Into<String>, source: impl Into<String>, link: bool) -> Self {
        let source = source.into();
        Self {
            key: key.into(),
            signature: Value::String(source.clone()),
            build: ReplacementBuild::Copy { source, link },
        }
    }
}

/// Composite behavior attached to a component template.
#[derive(Clone)]
pub struct CompositeDecl {
    pub rule: Arc<dyn CompositeRule>,
    /// Names pinned by the author, applied to replacements in order.
    pub assign_names: Vec<String>,
}

impl CompositeDecl {
    pub fn new(rule: impl CompositeRule + 'static) -> Self {
        Self {
            rule: Arc::new(rule),
            assign_names: Vec::new(),
        }
    }
}

impl fmt::Debug for CompositeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDecl")
            .field("rule", &self.rule)
            .field("assign_names", &self.assign_names)
            .finish()
    }
}

impl ComponentTemplate {
    /// Pin the names of a composite's replacements, in order.
    ///
    /// Has no effect on templates that are not composites.
    pub fn assign_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let crate::component::ComponentKind::Composite(decl) = &mut self.kind {
            decl.assign_names = names.into_iter().map(Into::into).collect();
        }
        self
    }
}

/// A plan entry after names have been assigned.
#[derive(Debug, Clone)]
pub(crate) struct PlannedReplacement {
    pub name: String,
    pub signature: Value,
    pub build: ReplacementBuild,
}

/// A subtree currently materialized by a composite.
#[derive(Debug, Clone)]
pub(crate) struct Materialized {
    pub name: String,
    pub signature: Value,
    pub handle: crate::component::Handle,
}

/// Outcome of diffing a new plan against the materialized list.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PlanDiff {
    /// Indices into the old list to destroy.
    pub destroy: Vec<usize>,
    /// For each new entry, the index of the old entry it keeps, if any.
    pub keep: Vec<Option<usize>>,
}

/// Name every replacement: pinned names first, then `{composite}/{key}`.
///
/// Fails on a duplicate name within the plan.
pub(crate) fn assign_names(
    composite: &str,
    assign: &[String],
    plan: Vec<Replacement>,
) -> Result<Vec<PlannedReplacement>, String> {
    let mut seen = std::collections::HashSet::new();
    let mut named = Vec::with_capacity(plan.len());
    for (i, replacement) in plan.into_iter().enumerate() {
        let name = match assign.get(i) {
            Some(pinned) if !pinned.is_empty() => pinned.clone(),
            _ => format!("{composite}/{}", replacement.key),
        };
        if !seen.insert(name.clone()) {
            return Err(name);
        }
        named.push(PlannedReplacement {
            name,
            signature: replacement.signature,
            build: replacement.build,
        });
    }
    Ok(named)
}

/// Match new entries to old ones by name and signature.
pub(crate) fn diff(old: &[Materialized], new: &[PlannedReplacement]) -> PlanDiff {
    let by_name: IndexMap<&str, usize> = old
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();

    let keep: Vec<Option<usize>> = new
        .iter()
        .map(|entry| {
            by_name
                .get(entry.name.as_str())
                .copied()
                .filter(|&i| old[i].signature == entry.signature)
        })
        .collect();

    let destroy = (0..old.len())
        .filter(|i| !keep.contains(&Some(*i)))
        .collect();

    PlanDiff { destroy, keep }
}
