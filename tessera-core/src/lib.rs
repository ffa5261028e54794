//! Tessera Core
//!
//! This crate is the state engine behind Tessera interactive documents.
//! Every value a document shows is a state variable. Each one is either
//! essential (authoritative storage that actions write into) or derived (a
//! pure function of other variables). The engine implements:
//!
//! - A dependency graph with push invalidation and pull, memoized recompute
//! - Write retargeting through inverse definitions down to essential storage
//! - Composites whose children are computed, diffed and kept stable
//! - Two-stage inputs with separate preview and commit values
//! - Update triggers fired by conditions, chains, events and the host
//! - Consistent state snapshots for renderers
//!
//! # Architecture
//!
//! - `value`: the tagged value type, parsing and display rounding
//! - `graph`: nodes, essential cells, invalidation and the compute stack
//! - `component`: templates, live instances and the name table
//! - `composite`: replacement rules and plan diffing
//! - `trigger`: rule declarations and firing order
//! - `engine`: the engine that ties these together, one microcycle per action
//! - `document` and `host`: loading documents and running an engine on a task
//!
//! # Example
//!
//! ```rust
//! use tessera_core::component::library;
//! use tessera_core::{ActionArgs, Document, Engine, EngineConfig, Value};
//!
//! let doc = Document::new(library::document().with_children([
//!     library::number(2.0).named("n"),
//!     library::number_input().named("ni").bind_to("n", "value"),
//! ]));
//! let mut engine = Engine::build(doc, EngineConfig::default()).unwrap();
//!
//! let edit = ActionArgs::new().with("text", "7");
//! engine.perform_action("ni", "updateImmediateValue", &edit).unwrap();
//! assert_eq!(engine.value("n", "value"), Some(Value::Number(2.0)));
//!
//! engine.perform_action("ni", "updateValue", &ActionArgs::new()).unwrap();
//! assert_eq!(engine.value("n", "value"), Some(Value::Number(7.0)));
//! ```

pub mod action;
pub mod component;
pub mod composite;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod graph;
pub mod host;
pub mod input;
pub mod snapshot;
pub mod trigger;
pub mod value;

pub use action::{ActionArgs, ActionReport, ActionRequest};
pub use component::{ComponentTemplate, DependencySpec, StateVarDecl};
pub use config::EngineConfig;
pub use document::{Document, DocumentLoader, LoadOutcome};
pub use engine::Engine;
pub use error::{ActionError, BuildError, Diagnostic, WriteRejection};
pub use host::EngineHost;
pub use input::{InputPhase, TwoStageState};
pub use snapshot::StateSnapshot;
pub use value::{DisplayPolicy, Value};
