//! Integration Tests for the Engine
//!
//! These tests load whole documents and drive them through the action API,
//! the way a host process would.

use tessera_core::component::library::{self, CopyMode};
use tessera_core::{
    ActionArgs, ComponentTemplate, DependencySpec, Document, DocumentLoader, Engine, EngineConfig,
    InputPhase, StateVarDecl, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn build(children: impl IntoIterator<Item = ComponentTemplate>) -> Engine {
    init_tracing();
    let doc = Document::new(library::document().with_children(children));
    Engine::build(doc, EngineConfig::default()).expect("document builds")
}

fn edit(engine: &mut Engine, input: &str, text: &str) {
    let args = ActionArgs::new().with("text", text);
    engine
        .perform_action(input, "updateImmediateValue", &args)
        .expect("preview edit");
}

fn commit(engine: &mut Engine, input: &str) {
    engine
        .perform_action(input, "updateValue", &ActionArgs::new())
        .expect("commit");
}

fn move_point(engine: &mut Engine, point: &str, x: f64, y: f64) {
    let args = ActionArgs::new().with("x", x).with("y", y);
    engine.perform_action(point, "movePoint", &args).expect("move");
}

fn sum_of(a: &str, b: &str) -> StateVarDecl {
    StateVarDecl::derived(|deps| Ok(Value::Number(deps.number("a")? + deps.number("b")?)))
        .depends_on("a", DependencySpec::component(a, "value"))
        .depends_on("b", DependencySpec::component(b, "value"))
}

/// A preview edit leaves the committed value alone until the commit.
#[test]
fn unbound_input_commits_its_preview() {
    let mut engine = build([library::number_input().named("A").prefill(5.0)]);

    edit(&mut engine, "A", "12");
    edit(&mut engine, "A", "123");
    let state = engine.two_stage_state("A").unwrap();
    assert_eq!(state.immediate_value, Value::Number(123.0));
    assert_eq!(state.committed_value, Value::Number(5.0));
    assert_eq!(state.phase(), InputPhase::Uncommitted);

    commit(&mut engine, "A");
    let state = engine.two_stage_state("A").unwrap();
    assert_eq!(state.committed_value, Value::Number(123.0));
    assert_eq!(state.immediate_value, Value::Number(123.0));
    assert_eq!(state.phase(), InputPhase::Committed);
}

/// Committing into a fixed source reverts both stages to the source value.
#[test]
fn commit_into_fixed_source_reverts() {
    let mut engine = build([
        library::text("x").named("src").fixed(),
        library::text_input().named("B").bind_to("src", "value"),
    ]);

    edit(&mut engine, "B", "y");
    assert_eq!(engine.value("B", "immediateValue"), Some(Value::string("y")));

    commit(&mut engine, "B");
    assert_eq!(engine.value("B", "immediateValue"), Some(Value::string("x")));
    assert_eq!(engine.value("B", "value"), Some(Value::string("x")));
    assert_eq!(engine.value("src", "value"), Some(Value::string("x")));
}

/// Reverting re-reads the live source rather than a remembered copy.
#[test]
fn revert_law_holds_after_many_edits() {
    let mut engine = build([
        library::number(4.0).named("src").fixed(),
        library::number_input().named("B").bind_to("src", "value"),
    ]);

    for text in ["1", "1.", "1.5", "abc", "2"] {
        edit(&mut engine, "B", text);
    }
    commit(&mut engine, "B");

    let state = engine.two_stage_state("B").unwrap();
    assert_eq!(state.immediate_value, Value::Number(4.0));
    assert_eq!(state.committed_value, Value::Number(4.0));
    assert!(!state.committed_changed);
}

/// A bound input writes through to its source.
#[test]
fn bound_input_commits_into_source() {
    let mut engine = build([
        library::number(2.0).named("n"),
        library::number_input().named("ni").bind_to("n", "value"),
        library::computed_number(sum_of("n", "n")).named("twice"),
    ]);

    edit(&mut engine, "ni", "7");
    assert_eq!(engine.value("twice", "value"), Some(Value::Number(4.0)));

    commit(&mut engine, "ni");
    assert_eq!(engine.value("n", "value"), Some(Value::Number(7.0)));
    assert_eq!(engine.value("twice", "value"), Some(Value::Number(14.0)));
}

/// An unbound input keeps whatever is committed, an incomplete entry included.
#[test]
fn invalid_preview_commits_into_own_storage() {
    let mut engine = build([library::number_input().named("A").prefill(1.0)]);

    edit(&mut engine, "A", "3+");
    assert_eq!(engine.value("A", "immediateValue"), Some(Value::Invalid));

    commit(&mut engine, "A");
    assert_eq!(engine.value("A", "value"), Some(Value::Invalid));
    assert_eq!(engine.value("A", "immediateValue"), Some(Value::Invalid));
    assert_eq!(engine.value("A", "valueChanged"), Some(Value::Boolean(true)));

    // A well-formed entry after an invalid one is accepted again
    edit(&mut engine, "A", "4");
    commit(&mut engine, "A");
    assert_eq!(engine.value("A", "value"), Some(Value::Number(4.0)));
}

/// A bound input refuses to push an invalid entry into its source.
#[test]
fn invalid_preview_is_not_written_through() {
    let mut engine = build([
        library::number(1.0).named("n"),
        library::number_input().named("A").bind_to("n", "value"),
    ]);

    edit(&mut engine, "A", "3+");
    commit(&mut engine, "A");
    assert_eq!(engine.value("n", "value"), Some(Value::Number(1.0)));
    assert_eq!(engine.value("A", "value"), Some(Value::Number(1.0)));
    assert_eq!(engine.value("A", "immediateValue"), Some(Value::Number(1.0)));
}

/// Shrinking a copied list destroys only the tail and keeps dragged state.
#[test]
fn shrinking_source_keeps_named_copies() {
    let source = ComponentTemplate::new("list")
        .named("src")
        .with_state(
            "value",
            StateVarDecl::essential(Value::List(vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0),
            ])),
        );
    let points = library::map(DependencySpec::component("src", "value"), |value, _| {
        library::point(value.as_f64().unwrap_or(0.0), 0.0)
    })
    .named("pts");
    let copies = library::copy_children("pts", CopyMode::Snapshot)
        .assign_names(["a", "b", "c"])
        .named("C");
    let mut engine = build([source, points, copies]);

    assert_eq!(engine.children_of("C"), vec!["a", "b", "c"]);
    move_point(&mut engine, "a", 10.0, 20.0);
    assert_eq!(engine.value("a", "x"), Some(Value::Number(10.0)));
    assert_eq!(engine.value("pts/#1", "x"), Some(Value::Number(1.0)));

    let a = engine.component("a").unwrap().handle;
    let b = engine.component("b").unwrap().handle;

    let args = ActionArgs::new()
        .with("variable", "value")
        .with("value", serde_json::json!([1.0, 2.0]));
    let report = engine.perform_action("src", "setValue", &args).unwrap();

    assert_eq!(engine.children_of("C"), vec!["a", "b"]);
    assert!(!engine.contains("c"));
    assert!(!engine.contains("pts/#3"));
    assert_eq!(report.destroyed, 2);
    assert_eq!(report.created, 0);
    assert_eq!(engine.component("a").unwrap().handle, a);
    assert_eq!(engine.component("b").unwrap().handle, b);
    assert_eq!(
        engine.value("a", "coords"),
        Some(Value::Tuple(vec![Value::Number(10.0), Value::Number(20.0)]))
    );
}

/// Reading a destroyed component degrades to invalid instead of failing.
#[test]
fn readers_of_destroyed_children_go_invalid() {
    let numbers = library::map(DependencySpec::component("src", "value"), |value, _| {
        library::number(value.as_f64().unwrap_or(0.0))
    })
    .named("nums");
    let third = library::computed_number(StateVarDecl::passthrough(DependencySpec::component(
        "nums/#3", "value",
    )))
    .named("third");
    let mut engine = build([
        ComponentTemplate::new("list").named("src").with_state(
            "value",
            StateVarDecl::essential(Value::List(vec![Value::Number(4.0); 3])),
        ),
        numbers,
        third,
    ]);
    assert_eq!(engine.value("third", "value"), Some(Value::Number(4.0)));

    let args = ActionArgs::new()
        .with("variable", "value")
        .with("value", serde_json::json!([4.0]));
    engine.perform_action("src", "setValue", &args).unwrap();

    assert_eq!(engine.children_of("nums"), vec!["nums/#1"]);
    assert_eq!(engine.value("third", "value"), Some(Value::Invalid));
    assert_eq!(engine.value("third", "text"), Some(Value::Invalid));
}

/// Trigger rules chain within one action.
#[test]
fn chained_rule_fires_after_its_predecessor() {
    let increment = StateVarDecl::derived(|deps| Ok(Value::Number(deps.number("n")? + 1.0)))
        .depends_on("n", DependencySpec::component("N", "value"));
    let double = StateVarDecl::derived(|deps| Ok(Value::Number(deps.number("m")? * 2.0)))
        .depends_on("m", DependencySpec::component("M", "value"));
    let mut engine = build([
        library::number(1.0).named("N"),
        library::number(1.0).named("M"),
        library::update_value("N", "value", increment).named("R1"),
        library::update_value("M", "value", double)
            .named("R2")
            .trigger_with("R1"),
    ]);

    let report = engine.perform_action("R1", "fire", &ActionArgs::new()).unwrap();
    assert_eq!(engine.value("N", "value"), Some(Value::Number(2.0)));
    assert_eq!(engine.value("M", "value"), Some(Value::Number(2.0)));
    assert_eq!(report.fired, vec!["R1", "R2"]);
}

/// A conditioned rule fires once per false-to-true transition.
#[test]
fn condition_fires_on_rising_edge_only() {
    let in_quadrant = StateVarDecl::derived(|deps| {
        Ok(Value::Boolean(deps.number("x")? > 0.0 && deps.number("y")? > 0.0))
    })
    .depends_on("x", DependencySpec::component("P", "x"))
    .depends_on("y", DependencySpec::component("P", "y"));
    let count = StateVarDecl::derived(|deps| Ok(Value::Number(deps.number("c")? + 1.0)))
        .depends_on("c", DependencySpec::component("count", "value"));
    let mut engine = build([
        library::point(-1.0, 2.0).named("P"),
        library::number(0.0).named("count"),
        library::update_value("count", "value", count)
            .named("R3")
            .trigger_when(in_quadrant),
    ]);

    move_point(&mut engine, "P", 3.0, -4.0);
    assert_eq!(engine.value("count", "value"), Some(Value::Number(0.0)));

    move_point(&mut engine, "P", 1.0, 7.0);
    assert_eq!(engine.value("count", "value"), Some(Value::Number(1.0)));

    move_point(&mut engine, "P", 2.0, 2.0);
    assert_eq!(engine.value("count", "value"), Some(Value::Number(1.0)));
}

/// Two reads with no write in between agree and recompute nothing.
#[test]
fn reads_are_idempotent() {
    let mut engine = build([
        library::number(3.0).named("a"),
        library::computed_number(sum_of("a", "a")).named("b"),
    ]);

    let first = engine.value("b", "valueForDisplay");
    let count = engine.recompute_count("b", "value");
    assert_eq!(engine.value("b", "valueForDisplay"), first);
    assert_eq!(engine.recompute_count("b", "value"), count);
}

/// A diamond recomputes its sink once per change.
#[test]
fn diamond_recomputes_each_node_once() {
    let mut engine = build([
        library::number(1.0).named("a"),
        library::computed_number(sum_of("a", "one")).named("b"),
        library::number(1.0).named("one"),
        library::computed_number(sum_of("a", "a")).named("c"),
        library::computed_number(sum_of("b", "c")).named("d"),
    ]);

    assert_eq!(engine.value("d", "value"), Some(Value::Number(4.0)));
    assert_eq!(engine.recompute_count("d", "value"), Some(1));

    let args = ActionArgs::new().with("variable", "value").with("value", 5.0);
    engine.perform_action("a", "setValue", &args).unwrap();

    assert_eq!(engine.value("d", "value"), Some(Value::Number(16.0)));
    assert_eq!(engine.recompute_count("d", "value"), Some(2));
    assert_eq!(engine.recompute_count("b", "value"), Some(2));
    assert_eq!(engine.recompute_count("c", "value"), Some(2));
}

/// Linked copies share storage with their source.
#[test]
fn linked_copy_aliases_its_source() {
    let mut engine = build([
        library::number(3.0).named("src"),
        library::copy("src", CopyMode::Link).named("cp"),
        library::copy("src", CopyMode::Snapshot).named("snap"),
    ]);
    assert!(engine.aliased(("src", "value"), ("cp/src", "value")));
    assert!(!engine.aliased(("src", "value"), ("snap/src", "value")));

    let args = ActionArgs::new().with("variable", "value").with("value", 9.0);
    engine.perform_action("cp/src", "setValue", &args).unwrap();
    assert_eq!(engine.value("src", "value"), Some(Value::Number(9.0)));
    assert_eq!(engine.value("snap/src", "value"), Some(Value::Number(3.0)));
}

/// Numbers inherit display digits through any number of containers.
#[test]
fn display_digits_are_inherited() {
    init_tracing();
    let doc = Document::new(library::document().display_digits(5).with_child(
        library::group().with_child(
            library::group().with_child(library::number(1.23456789).named("deep")),
        ),
    ));
    let mut engine = Engine::build(doc, EngineConfig::default()).unwrap();

    assert_eq!(engine.value("deep", "valueForDisplay"), Some(Value::Number(1.2346)));
    assert_eq!(engine.value("deep", "value"), Some(Value::Number(1.23456789)));
}

/// A chain cycle fails the build.
#[test]
fn trigger_cycle_fails_the_build() {
    init_tracing();
    let doc = Document::new(library::document().with_children([
        library::number(0.0).named("n"),
        library::update_value("n", "value", StateVarDecl::constant(1.0))
            .named("r1")
            .trigger_with("r2"),
        library::update_value("n", "value", StateVarDecl::constant(2.0))
            .named("r2")
            .trigger_with("r1"),
    ]));

    let err = Engine::build(doc.clone(), EngineConfig::default()).unwrap_err();
    assert!(err.to_string().contains("cycle"));

    // Without strictness the rest of the document still loads
    let outcome = DocumentLoader::new(EngineConfig::default()).load(doc).unwrap();
    assert!(outcome.diagnostics.iter().any(|d| d.is_error()));
    let mut engine = outcome.engine;
    assert_eq!(engine.value("n", "value"), Some(Value::Number(0.0)));
}

/// The snapshot covers public variables of every component.
#[test]
fn snapshot_lists_public_state() {
    let mut engine = build([
        library::number(2.5).named("n"),
        library::point(1.0, 2.0).named("P"),
    ]);
    let snapshot = engine.read_all_state_variables();

    assert_eq!(snapshot.get("n", "value"), Some(&Value::Number(2.5)));
    assert_eq!(snapshot.get("n", "text"), Some(&Value::string("2.5")));
    assert!(snapshot.get("n", "displayPolicy").is_none());
    assert_eq!(
        snapshot.get("P", "coords"),
        Some(&Value::Tuple(vec![Value::Number(1.0), Value::Number(2.0)]))
    );
}

/// Unknown components and actions are errors; nothing runs.
#[test]
fn bad_requests_are_rejected() {
    let mut engine = build([library::number(1.0).named("n")]);
    assert!(engine.perform_action("ghost", "recordClick", &ActionArgs::new()).is_err());
    assert!(engine.perform_action("n", "movePoint", &ActionArgs::new()).is_err());
    assert!(engine.perform_action("n", "explode", &ActionArgs::new()).is_err());
}

/// Points that are not draggable ignore moves.
#[test]
fn undraggable_points_stay_put() {
    let mut engine = build([library::point(1.0, 1.0).named("P").draggable(false)]);
    move_point(&mut engine, "P", 5.0, 5.0);
    assert_eq!(engine.value("P", "x"), Some(Value::Number(1.0)));
}

/// A misspelled reference loads as invalid and is reported once per reader.
#[test]
fn unresolved_reference_is_reported() {
    init_tracing();
    let children = || {
        [
            library::number(1.0).named("n"),
            library::computed_number(StateVarDecl::passthrough(DependencySpec::component("nn", "value")))
                .named("typo")
                .at(3, 5),
            library::computed_number(sum_of("nn", "nn")).named("twice"),
        ]
    };
    let doc = Document::new(library::document().with_children(children()));
    let outcome = DocumentLoader::new(EngineConfig::default()).load(doc).unwrap();

    let warnings: Vec<_> = outcome.diagnostics.iter().filter(|d| !d.is_error()).collect();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|d| d.message.contains("`nn`")));
    let typo = warnings.iter().find(|d| d.component.as_deref() == Some("typo")).unwrap();
    assert_eq!(typo.location.map(|l| (l.line, l.column)), Some((3, 5)));
    assert!(warnings.iter().any(|d| d.component.as_deref() == Some("twice")));

    let mut engine = outcome.engine;
    assert_eq!(engine.value("typo", "value"), Some(Value::Invalid));
    let args = ActionArgs::new().with("variable", "value").with("value", 2.0);
    let report = engine.perform_action("n", "setValue", &args).unwrap();
    assert!(report.diagnostics.is_empty());

    // Warnings alone do not fail a strict build
    let doc = Document::new(library::document().with_children(children()));
    assert!(Engine::build(doc, EngineConfig::default()).is_ok());
}

/// A name that stops resolving during an action shows up in its report.
#[test]
fn reference_broken_by_an_action_is_reported() {
    let mut engine = build([
        library::number(1.0).named("n"),
        library::number(0.0).named("out"),
        library::text("n").named("which"),
        library::update_value(
            "out",
            "value",
            StateVarDecl::passthrough(DependencySpec::indirect("target", "value")),
        )
        .named("R")
        .with_state(
            "target",
            StateVarDecl::passthrough(DependencySpec::component("which", "value")),
        ),
    ]);

    let args = ActionArgs::new().with("variable", "value").with("value", "nn");
    engine.perform_action("which", "setValue", &args).unwrap();
    let report = engine.perform_action("R", "fire", &ActionArgs::new()).unwrap();

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].component.as_deref(), Some("R"));
    assert!(report.diagnostics[0].message.contains("`nn`"));
    assert_eq!(engine.value("out", "value"), Some(Value::Number(0.0)));
}

/// A variable that starts as a list only ever holds lists.
#[test]
fn list_valued_storage_keeps_its_shape() {
    let points = || Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
    let mut engine = build([ComponentTemplate::new("list")
        .named("L")
        .with_state("value", StateVarDecl::essential(points()))]);

    let args = ActionArgs::new().with("variable", "value").with("value", 3.0);
    engine.perform_action("L", "setValue", &args).unwrap();
    assert_eq!(engine.value("L", "value"), Some(points()));

    let args = ActionArgs::new()
        .with("variable", "value")
        .with("value", serde_json::json!([4.0, 5.0, 6.0]));
    engine.perform_action("L", "setValue", &args).unwrap();
    assert_eq!(
        engine.value("L", "value"),
        Some(Value::List(vec![
            Value::Number(4.0),
            Value::Number(5.0),
            Value::Number(6.0)
        ]))
    );
}

/// Two inputs bound to each other share the first one's stored value.
#[test]
fn mutual_binding_keeps_one_store() {
    init_tracing();
    let doc = Document::new(library::document().with_children([
        library::number_input()
            .named("a")
            .prefill(3.0)
            .bind_to("b", "value"),
        library::number_input().named("b").bind_to("a", "value"),
    ]));
    let outcome = DocumentLoader::new(EngineConfig::default()).load(doc).unwrap();
    let warning = outcome
        .diagnostics
        .iter()
        .find(|d| d.component.as_deref() == Some("a"))
        .unwrap();
    assert!(!warning.is_error());

    let mut engine = outcome.engine;
    assert!(engine.is_essential("a", "value"));
    assert!(!engine.is_essential("b", "value"));
    assert_eq!(engine.value("b", "value"), Some(Value::Number(3.0)));

    edit(&mut engine, "b", "8");
    commit(&mut engine, "b");
    assert_eq!(engine.value("a", "value"), Some(Value::Number(8.0)));
    assert_eq!(engine.value("b", "value"), engine.value("a", "value"));
    assert_eq!(engine.value("a", "immediateValue"), Some(Value::Number(8.0)));
}
