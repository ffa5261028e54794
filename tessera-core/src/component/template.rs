//! Component Templates
//!
//! A template is the already-resolved description of a component the
//! document loader hands to the engine: its type, optional author name,
//! attributes, state variable declarations and children. Composites also
//! produce templates at run time for the subtrees they materialize.
//!
//! # Declarations
//!
//! Each state variable is a [`StateVarDecl`]: a list of named
//! [`DependencySpec`]s plus either an essential default (authoritative,
//! externally settable storage) or a pure definition function over the
//! dependency values. Derived variables may also carry an inverse so that a
//! write against them can be retargeted to their dependencies.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::composite::CompositeDecl;
use crate::config::EngineConfig;
use crate::error::{DefinitionError, SourceLocation, WriteRejection};
use crate::input::InputDecl;
use crate::trigger::TriggerDecl;
use crate::value::Value;

/// Pure definition: dependency values in, value out.
pub type DefinitionFn =
    Arc<dyn Fn(&DependencyValues<'_>) -> Result<Value, DefinitionError> + Send + Sync>;

/// Inverse definition: desired value and current dependency values in,
/// writes to named dependencies out.
pub type InverseFn = Arc<
    dyn Fn(&Value, &DependencyValues<'_>) -> Result<Vec<(String, Value)>, WriteRejection>
        + Send
        + Sync,
>;

/// How a state variable obtains its value.
#[derive(Clone)]
pub enum Definition {
    /// Authoritative storage, initialized to `default`.
    Essential { default: Value },
    /// Pure function of the declared dependencies.
    Derived(DefinitionFn),
}

/// Declaration of one state variable or attribute.
#[derive(Clone)]
pub struct StateVarDecl {
    pub dependencies: IndexMap<String, DependencySpec>,
    pub definition: Definition,
    pub inverse: Option<InverseFn>,
    /// Included in state snapshots handed to the renderer.
    pub public: bool,
}

impl StateVarDecl {
    /// Essential storage with a default value.
    pub fn essential(default: impl Into<Value>) -> Self {
        Self {
            dependencies: IndexMap::new(),
            definition: Definition::Essential {
                default: default.into(),
            },
            inverse: None,
            public: true,
        }
    }

    /// A derived variable computed by `definition`.
    pub fn derived<F>(definition: F) -> Self
    where
        F: Fn(&DependencyValues<'_>) -> Result<Value, DefinitionError> + Send + Sync + 'static,
    {
        Self {
            dependencies: IndexMap::new(),
            definition: Definition::Derived(Arc::new(definition)),
            inverse: None,
            public: true,
        }
    }

    /// A derived variable with no dependencies.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::derived(move |_| Ok(value.clone()))
    }

    /// A derived variable that mirrors a single dependency and writes back
    /// through it.
    pub fn passthrough(spec: DependencySpec) -> Self {
        Self::derived(|deps| Ok(deps.get("source")?.clone()))
            .depends_on("source", spec)
            .with_inverse(|desired, _| Ok(vec![("source".to_string(), desired.clone())]))
    }

    pub fn depends_on(mut self, key: impl Into<String>, spec: DependencySpec) -> Self {
        self.dependencies.insert(key.into(), spec);
        self
    }

    pub fn with_inverse<F>(mut self, inverse: F) -> Self
    where
        F: Fn(&Value, &DependencyValues<'_>) -> Result<Vec<(String, Value)>, WriteRejection>
            + Send
            + Sync
            + 'static,
    {
        self.inverse = Some(Arc::new(inverse));
        self
    }

    /// Keep the variable out of renderer snapshots.
    pub fn hidden(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn is_essential(&self) -> bool {
        matches!(self.definition, Definition::Essential { .. })
    }
}

impl fmt::Debug for StateVarDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let definition = match &self.definition {
            Definition::Essential { default } => format!("essential({default:?})"),
            Definition::Derived(_) => "derived".to_string(),
        };
        f.debug_struct("StateVarDecl")
            .field("dependencies", &self.dependencies)
            .field("definition", &definition)
            .field("invertible", &self.inverse.is_some())
            .field("public", &self.public)
            .finish()
    }
}

/// Where a dependency's value comes from.
///
/// Names are resolved through the engine's name table every time the
/// dependent recomputes, never when the template is authored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpec {
    /// Another state variable on the same component.
    Sibling { variable: String },

    /// A state variable on a named component.
    Component { target: String, variable: String },

    /// An attribute of this component (`target: None`) or a named one.
    Attribute {
        target: Option<String>,
        attribute: String,
    },

    /// One variable from every child, as a list. Composite children are
    /// replaced by what they currently materialize.
    Children {
        of: Option<String>,
        component_type: Option<String>,
        variable: String,
    },

    /// Macro-style indirection: the sibling `name_from` holds a component
    /// name, and the dependency is `variable` on that component.
    Indirect { name_from: String, variable: String },

    /// `variable` on the nearest ancestor that declares it.
    Ancestor { variable: String },

    /// The stable name of a component, as a string. Invalid when the name
    /// does not resolve.
    ComponentName { target: String },

    /// Names of the children of a component, as a list of strings.
    ChildNames {
        of: Option<String>,
        component_type: Option<String>,
    },
}

impl DependencySpec {
    pub fn sibling(variable: impl Into<String>) -> Self {
        Self::Sibling {
            variable: variable.into(),
        }
    }

    pub fn component(target: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::Component {
            target: target.into(),
            variable: variable.into(),
        }
    }

    pub fn attribute(attribute: impl Into<String>) -> Self {
        Self::Attribute {
            target: None,
            attribute: attribute.into(),
        }
    }

    pub fn attribute_of(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Attribute {
            target: Some(target.into()),
            attribute: attribute.into(),
        }
    }

    pub fn children(variable: impl Into<String>) -> Self {
        Self::Children {
            of: None,
            component_type: None,
            variable: variable.into(),
        }
    }

    pub fn children_of(target: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::Children {
            of: Some(target.into()),
            component_type: None,
            variable: variable.into(),
        }
    }

    pub fn indirect(name_from: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::Indirect {
            name_from: name_from.into(),
            variable: variable.into(),
        }
    }

    pub fn ancestor(variable: impl Into<String>) -> Self {
        Self::Ancestor {
            variable: variable.into(),
        }
    }

    pub fn component_name(target: impl Into<String>) -> Self {
        Self::ComponentName {
            target: target.into(),
        }
    }

    pub fn child_names(of: impl Into<String>) -> Self {
        Self::ChildNames {
            of: Some(of.into()),
            component_type: None,
        }
    }

    /// Restrict a child collection to one component type.
    pub fn of_type(self, component_type: impl Into<String>) -> Self {
        match self {
            Self::Children { of, variable, .. } => Self::Children {
                of,
                component_type: Some(component_type.into()),
                variable,
            },
            Self::ChildNames { of, .. } => Self::ChildNames {
                of,
                component_type: Some(component_type.into()),
            },
            other => other,
        }
    }
}

/// Dependency values handed to a definition or inverse function.
pub struct DependencyValues<'a> {
    entries: &'a IndexMap<String, Value>,
    config: &'a EngineConfig,
}

impl<'a> DependencyValues<'a> {
    pub fn new(entries: &'a IndexMap<String, Value>, config: &'a EngineConfig) -> Self {
        Self { entries, config }
    }

    pub fn get(&self, key: &str) -> Result<&'a Value, DefinitionError> {
        self.entries
            .get(key)
            .ok_or_else(|| DefinitionError::MissingDependency(key.to_string()))
    }

    /// The value if present and valid.
    pub fn optional(&self, key: &str) -> Option<&'a Value> {
        self.entries.get(key).filter(|value| !value.is_invalid())
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, DefinitionError> {
        let value = self.get(key)?;
        if value.is_invalid() {
            return Err(DefinitionError::InvalidDependency(key.to_string()));
        }
        extract(value).ok_or_else(|| DefinitionError::TypeMismatch {
            dependency: key.to_string(),
            expected,
            found: value.type_name(),
        })
    }

    pub fn number(&self, key: &str) -> Result<f64, DefinitionError> {
        self.typed(key, "number", Value::as_f64)
    }

    pub fn boolean(&self, key: &str) -> Result<bool, DefinitionError> {
        self.typed(key, "boolean", Value::as_bool)
    }

    pub fn string(&self, key: &str) -> Result<&'a str, DefinitionError> {
        self.typed(key, "string", Value::as_str)
    }

    pub fn elements(&self, key: &str) -> Result<&'a [Value], DefinitionError> {
        self.typed(key, "list", Value::elements)
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Runtime behavior attached to a component type.
#[derive(Debug, Clone, Default)]
pub enum ComponentKind {
    #[default]
    Plain,
    /// Draggable point with `x`, `y` and `coords`.
    Point,
    /// Two-stage input.
    Input(InputDecl),
    /// Update-trigger rule or rule group.
    Trigger(TriggerDecl),
    /// Component whose children are computed.
    Composite(CompositeDecl),
}

/// Resolved description of a component to instantiate.
#[derive(Debug, Clone)]
pub struct ComponentTemplate {
    pub component_type: String,
    pub name: Option<String>,
    pub attributes: IndexMap<String, StateVarDecl>,
    pub state: IndexMap<String, StateVarDecl>,
    pub children: Vec<Arc<ComponentTemplate>>,
    pub kind: ComponentKind,
    pub location: Option<SourceLocation>,
}

impl ComponentTemplate {
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            name: None,
            attributes: IndexMap::new(),
            state: IndexMap::new(),
            children: Vec::new(),
            kind: ComponentKind::Plain,
            location: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_state(mut self, variable: impl Into<String>, decl: StateVarDecl) -> Self {
        self.state.insert(variable.into(), decl);
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>, decl: StateVarDecl) -> Self {
        self.attributes.insert(attribute.into(), decl);
        self
    }

    pub fn with_constant_attribute(
        self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.with_attribute(attribute, StateVarDecl::constant(value))
    }

    pub fn with_child(mut self, child: ComponentTemplate) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = ComponentTemplate>,
    {
        self.children.extend(children.into_iter().map(Arc::new));
        self
    }

    /// Reject every write into this component's essential state.
    pub fn fixed(self) -> Self {
        self.with_constant_attribute("fixed", true)
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Some(SourceLocation { line, column });
        self
    }
}
