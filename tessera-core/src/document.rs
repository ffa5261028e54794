//! Document Loading
//!
//! A [`Document`] is the resolved component tree the front end produces.
//! The loader checks what only makes sense across the whole tree, builds
//! the engine, and runs the first settle so that composites are expanded
//! and trigger conditions are observed once before any action arrives.
//!
//! # Binding cycles
//!
//! Inputs bound to each other in a loop would make each one's `value` a
//! derivation of itself. The first input declared on such a loop is
//! unbound (it keeps its own storage instead) and a warning is reported.
//!
//! # Strictness
//!
//! By default structural problems are diagnostics: the offending subtree is
//! left out and the rest of the document loads. With
//! [`EngineConfig::strict_structure`] any error diagnostic fails the load.

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{ComponentKind, ComponentTemplate};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{BuildError, Diagnostic};
use crate::graph::topological_order;

/// A complete document ready to load.
#[derive(Debug, Clone)]
pub struct Document {
    pub root: ComponentTemplate,
}

impl Document {
    pub fn new(root: ComponentTemplate) -> Self {
        Self { root }
    }
}

/// A loaded engine together with what the loader reported.
#[derive(Debug)]
pub struct LoadOutcome {
    pub engine: Engine,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    config: EngineConfig,
}

impl DocumentLoader {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn load(&self, document: Document) -> Result<LoadOutcome, BuildError> {
        let mut root = document.root;
        let mut diagnostics = break_binding_cycles(&mut root);

        let mut engine = Engine::new(self.config.clone());
        let span = tracing::debug_span!("load", root = root.name.as_deref().unwrap_or("_document"));
        let _enter = span.enter();

        if let Err(err) = engine.instantiate_root(root) {
            return Err(BuildError::Structural(vec![Diagnostic::from(err)]));
        }
        engine.settle();
        engine.evaluate_all();
        diagnostics.extend(engine.take_diagnostics());

        if self.config.strict_structure && diagnostics.iter().any(Diagnostic::is_error) {
            let errors = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
            return Err(BuildError::Structural(errors));
        }
        tracing::debug!(
            components = engine.component_count(),
            nodes = engine.node_count(),
            diagnostics = diagnostics.len(),
            "document loaded"
        );
        Ok(LoadOutcome {
            engine,
            diagnostics,
        })
    }
}

impl Engine {
    /// Load `document`, failing on any structural error.
    pub fn build(document: Document, config: EngineConfig) -> Result<Engine, BuildError> {
        let config = EngineConfig {
            strict_structure: true,
            ..config
        };
        DocumentLoader::new(config).load(document).map(|outcome| outcome.engine)
    }
}

/// A named input found in the tree, in declaration order.
struct BoundInput {
    path: Vec<usize>,
    name: String,
    target: Option<String>,
}

fn collect_inputs(template: &ComponentTemplate, path: &mut Vec<usize>, out: &mut Vec<BoundInput>) {
    if let (ComponentKind::Input(decl), Some(name)) = (&template.kind, &template.name) {
        out.push(BoundInput {
            path: path.clone(),
            name: name.clone(),
            target: decl.bind.as_ref().map(|t| t.component.clone()),
        });
    }
    for (index, child) in template.children.iter().enumerate() {
        path.push(index);
        collect_inputs(child, path, out);
        path.pop();
    }
}

fn template_at_mut<'a>(template: &'a mut ComponentTemplate, path: &[usize]) -> Option<&'a mut ComponentTemplate> {
    match path.split_first() {
        None => Some(template),
        Some((index, rest)) => {
            let child = template.children.get_mut(*index)?;
            template_at_mut(Arc::make_mut(child), rest)
        }
    }
}

/// Unbind inputs until no binding loop remains.
fn break_binding_cycles(root: &mut ComponentTemplate) -> Vec<Diagnostic> {
    let mut inputs = Vec::new();
    collect_inputs(root, &mut Vec::new(), &mut inputs);
    let index: HashMap<&str, usize> = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| (input.name.as_str(), i))
        .collect();
    let keys: Vec<usize> = (0..inputs.len()).collect();
    let mut edges: Vec<(usize, usize)> = inputs
        .iter()
        .enumerate()
        .filter_map(|(i, input)| Some((*index.get(input.target.as_deref()?)?, i)))
        .collect();

    let mut diagnostics = Vec::new();
    while let Err(cycle) = topological_order(&keys, &edges) {
        let Some(&first) = cycle.iter().min() else {
            break;
        };
        let input = &inputs[first];
        if let Some(ComponentKind::Input(decl)) = template_at_mut(root, &input.path).map(|t| &mut t.kind) {
            decl.bind = None;
        }
        edges.retain(|(_, to)| *to != first);

        let loop_names: Vec<&str> = cycle.iter().map(|i| inputs[*i].name.as_str()).collect();
        tracing::warn!(input = %input.name, cycle = %loop_names.join(" -> "), "unbinding input on a binding loop");
        diagnostics.push(
            Diagnostic::warning(format!(
                "input `{}` is bound in a loop ({}); it keeps its own value instead",
                input.name,
                loop_names.join(" -> ")
            ))
            .for_component(input.name.clone()),
        );
    }
    diagnostics
}
