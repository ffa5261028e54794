//! Composite expansion: turning fresh plans into live subtrees.

use std::collections::HashSet;
use std::sync::Arc;

use super::lifecycle::Instantiation;
use super::Engine;
use crate::component::{ComponentKind, ComponentTemplate, Handle, WatchKey};
use crate::composite::{
    assign_names, diff, Materialized, PlannedReplacement, Replacement, ReplacementBuild,
};
use crate::error::{Diagnostic, SourceLocation, StructuralError};

impl Engine {
    /// Expand every composite that was never expanded or whose plan went
    /// stale, until a pass finds nothing to do.
    ///
    /// Returns `true` if any composite was re-expanded.
    pub(crate) fn expand_composites(&mut self) -> bool {
        let mut expanded_any = false;
        for _ in 0..self.config.max_settle_passes {
            let due: Vec<Handle> = self
                .composites
                .iter()
                .filter(|(_, state)| {
                    !state.expanded
                        || self
                            .scheduler
                            .get_node(state.plan_node)
                            .is_some_and(|n| !n.is_clean())
                })
                .map(|(handle, _)| *handle)
                .collect();
            if due.is_empty() {
                return expanded_any;
            }
            for handle in due {
                // An earlier expansion in this pass may have destroyed it
                let Some(plan_node) = self.composites.get(&handle).map(|s| s.plan_node) else {
                    continue;
                };
                self.read(plan_node);
                let Some(state) = self.composites.get_mut(&handle) else {
                    continue;
                };
                state.expanded = true;
                if let Some(plan) = state.pending.take() {
                    self.materialize(handle, plan);
                    expanded_any = true;
                }
            }
        }
        tracing::warn!(
            passes = self.config.max_settle_passes,
            "composite expansion did not settle"
        );
        expanded_any
    }

    /// Bring the composite's materialized children in line with `plan`.
    ///
    /// Either the whole new list takes effect or the old one stays: every
    /// name the new subtrees would claim is checked before anything is
    /// destroyed.
    fn materialize(&mut self, handle: Handle, plan: Vec<Replacement>) {
        let Some((composite, assign)) = self.components.get(handle).and_then(|c| {
            let state = self.composites.get(&handle)?;
            Some((c.name.clone(), state.decl.assign_names.clone()))
        }) else {
            return;
        };
        let location = self.components.get(handle).and_then(|c| c.template.location);

        let planned = match assign_names(&composite, &assign, plan) {
            Ok(planned) => Ok(self.screen_plan(handle, &composite, planned, location)),
            Err(name) => Err(StructuralError::DuplicateName {
                composite: composite.clone(),
                name,
            }),
        };
        let old = self
            .composites
            .get(&handle)
            .map(|s| s.materialized.clone())
            .unwrap_or_default();

        let checked = planned.and_then(|planned| {
            let changes = diff(&old, &planned);
            let released = self.subtree_names(changes.destroy.iter().map(|&i| old[i].handle));
            self.check_claims(&planned, &changes.keep, &released)?;
            Ok((planned, changes))
        });
        let (planned, changes) = match checked {
            Ok(checked) => checked,
            Err(err) => {
                self.report(Diagnostic::from(err).for_component(composite.clone()).at(location));
                tracing::debug!(composite = %composite, kept = old.len(), "keeping the previous replacements");
                return;
            }
        };

        let unchanged = old.len() == planned.len()
            && changes.keep.iter().enumerate().all(|(i, kept)| *kept == Some(i));
        if unchanged {
            tracing::trace!(composite = %composite, "plan unchanged");
            return;
        }

        for &index in &changes.destroy {
            self.destroy(old[index].handle);
        }

        let mut materialized = Vec::with_capacity(planned.len());
        let mut created = Vec::new();
        let mut failed = None;
        for (entry, kept) in planned.into_iter().zip(changes.keep) {
            if let Some(index) = kept {
                materialized.push(old[index].clone());
                continue;
            }
            match self.build_replacement(handle, &entry) {
                Ok(child) => {
                    created.push(child);
                    materialized.push(Materialized {
                        name: entry.name,
                        signature: entry.signature,
                        handle: child,
                    });
                }
                Err(err) => {
                    failed = Some((entry.name, err));
                    break;
                }
            }
        }

        if let Some((name, err)) = failed {
            self.report(Diagnostic::from(err).for_component(name).at(location));
            // Only what this pass built is undone; kept subtrees stay
            for child in &created {
                self.destroy(*child);
            }
            materialized.retain(|m| !created.contains(&m.handle));
        }

        let order: Vec<Handle> = materialized.iter().map(|m| m.handle).collect();
        if let Some(component) = self.components.get_mut(handle) {
            component.children = order;
        }
        if let Some(state) = self.composites.get_mut(&handle) {
            state.materialized = materialized;
        }
        self.notify(&WatchKey::Children(handle));
        tracing::debug!(
            composite = %composite,
            destroyed = changes.destroy.len(),
            children = self.components.get(handle).map_or(0, |c| c.children.len()),
            "materialized"
        );
    }

    /// Drop copies of the composite itself or anything enclosing it.
    fn screen_plan(
        &mut self,
        handle: Handle,
        composite: &str,
        planned: Vec<PlannedReplacement>,
        location: Option<SourceLocation>,
    ) -> Vec<PlannedReplacement> {
        let enclosing: HashSet<Handle> = std::iter::once(handle)
            .chain(self.components.ancestors(handle).map(|c| c.handle))
            .collect();
        let mut screened = Vec::with_capacity(planned.len());
        for entry in planned {
            if let ReplacementBuild::Copy { source, .. } = &entry.build {
                if self.names.resolve(source).is_some_and(|h| enclosing.contains(&h)) {
                    self.report(
                        Diagnostic::from(StructuralError::SelfCopy {
                            composite: composite.to_string(),
                            source_name: source.clone(),
                        })
                        .for_component(composite)
                        .at(location),
                    );
                    continue;
                }
            }
            screened.push(entry);
        }
        screened
    }

    /// Names held by the given subtrees.
    fn subtree_names(&self, roots: impl Iterator<Item = Handle>) -> HashSet<String> {
        let mut names = HashSet::new();
        let mut pending: Vec<Handle> = roots.collect();
        while let Some(handle) = pending.pop() {
            if let Some(component) = self.components.get(handle) {
                names.insert(component.name.clone());
                pending.extend(component.children.iter().copied());
            }
        }
        names
    }

    /// Check that every name the entries to be built would take is free,
    /// counting names in `released` as free, and that copy sources exist.
    fn check_claims(
        &self,
        planned: &[PlannedReplacement],
        keep: &[Option<usize>],
        released: &HashSet<String>,
    ) -> Result<(), StructuralError> {
        let mut claims = Vec::new();
        for (entry, kept) in planned.iter().zip(keep) {
            if kept.is_some() {
                continue;
            }
            match &entry.build {
                ReplacementBuild::Template(template) => {
                    template_claims(template, &entry.name, &entry.name, &mut claims);
                }
                ReplacementBuild::Copy { source, .. } => {
                    let source_handle = self
                        .names
                        .resolve(source)
                        .filter(|_| !released.contains(source))
                        .ok_or_else(|| StructuralError::MissingSource(source.clone()))?;
                    self.copy_claims(source_handle, &entry.name, &mut claims);
                }
            }
        }

        let mut seen = HashSet::new();
        for name in claims {
            let held = self.names.contains(&name) && !released.contains(&name);
            if held || !seen.insert(name.clone()) {
                return Err(StructuralError::NameTaken(name));
            }
        }
        Ok(())
    }

    /// Names a copy of `source` under `name` would take.
    fn copy_claims(&self, source: Handle, name: &str, claims: &mut Vec<String>) {
        claims.push(name.to_string());
        let Some(component) = self.components.get(source) else {
            return;
        };
        if component.is_composite() {
            return;
        }
        for &child in &component.children {
            if let Some(local) = self.components.get(child).map(|c| c.local_name().to_string()) {
                self.copy_claims(child, &format!("{name}/{local}"), claims);
            }
        }
    }

    fn build_replacement(
        &mut self,
        composite: Handle,
        entry: &PlannedReplacement,
    ) -> Result<Handle, StructuralError> {
        match &entry.build {
            ReplacementBuild::Template(template) => {
                let options = Instantiation {
                    namespace: Some(entry.name.clone()),
                    generated_by: Some(composite),
                    contain_errors: false,
                };
                self.instantiate(Arc::clone(template), Some(composite), entry.name.clone(), &options)
            }
            ReplacementBuild::Copy { source, link } => {
                let source_handle = self
                    .names
                    .resolve(source)
                    .ok_or_else(|| StructuralError::MissingSource(source.clone()))?;
                self.instantiate_copy(source_handle, Some(composite), entry.name.clone(), Some(composite), *link)
            }
        }
    }
}

/// Names instantiating `template` as `name` would take. Composites claim
/// only their own name; their replacements are checked when they expand.
fn template_claims(template: &ComponentTemplate, name: &str, namespace: &str, claims: &mut Vec<String>) {
    claims.push(name.to_string());
    if matches!(template.kind, ComponentKind::Composite(_)) {
        return;
    }
    for (index, child) in template.children.iter().enumerate() {
        let child_name = match &child.name {
            Some(author) => format!("{namespace}/{author}"),
            None => format!("{name}/_{}{}", child.component_type, index + 1),
        };
        template_claims(child, &child_name, namespace, claims);
    }
}
