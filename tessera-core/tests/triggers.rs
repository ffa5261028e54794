//! Trigger Tests
//!
//! Firing order, conditions, events, trigger sets and called actions.

use tessera_core::component::library;
use tessera_core::{
    ActionArgs, ActionReport, ComponentTemplate, DependencySpec, Document, Engine, EngineConfig,
    StateVarDecl, Value,
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

fn fire(engine: &mut Engine, rule: &str) -> ActionReport {
    engine
        .perform_action(rule, "fire", &ActionArgs::new())
        .expect("fire")
}

/// `target + 1`.
fn increment(target: &str) -> StateVarDecl {
    StateVarDecl::derived(|deps| Ok(Value::Number(deps.number("n")? + 1.0)))
        .depends_on("n", DependencySpec::component(target, "value"))
}

fn flag_is_set() -> StateVarDecl {
    StateVarDecl::passthrough(DependencySpec::component("flag", "value"))
}

/// A rule with its own condition ignores `triggerWith`.
#[test]
fn condition_overrides_chaining() {
    let mut engine = build([
        library::number(0.0).named("N"),
        library::number(0.0).named("M"),
        library::boolean(false).named("flag"),
        library::update_value("N", "value", increment("N")).named("R1"),
        library::update_value("M", "value", increment("M"))
            .named("R2")
            .trigger_with("R1")
            .trigger_when(flag_is_set()),
    ]);

    let report = fire(&mut engine, "R1");
    assert_eq!(report.fired, vec!["R1"]);
    assert_eq!(engine.value("M", "value"), Some(Value::Number(0.0)));
}

/// Firing a conditioned rule directly only works while its condition holds.
#[test]
fn external_fire_checks_the_condition() {
    let mut engine = build([
        library::number(0.0).named("count"),
        library::boolean(false).named("flag"),
        library::update_value("count", "value", increment("count"))
            .named("R")
            .trigger_when(flag_is_set()),
    ]);

    assert!(fire(&mut engine, "R").fired.is_empty());
    assert_eq!(engine.value("count", "value"), Some(Value::Number(0.0)));

    // Turning the flag on fires the rule by itself
    let args = ActionArgs::new().with("variable", "value").with("value", true);
    let report = engine.perform_action("flag", "setValue", &args).unwrap();
    assert_eq!(report.fired, vec!["R"]);
    assert_eq!(engine.value("count", "value"), Some(Value::Number(1.0)));

    assert_eq!(fire(&mut engine, "R").fired, vec!["R"]);
    assert_eq!(engine.value("count", "value"), Some(Value::Number(2.0)));
}

/// A click on a component fires the rules listening for it.
#[test]
fn click_fires_listeners() {
    let mut engine = build([
        library::text("press").named("button"),
        library::number(0.0).named("count"),
        library::update_value("count", "value", increment("count"))
            .named("onClick")
            .on_click("button"),
        library::update_value("count", "value", increment("count"))
            .named("onFocus")
            .on_focus("button"),
    ]);

    for _ in 0..2 {
        let report = engine
            .perform_action("button", "recordClick", &ActionArgs::new())
            .unwrap();
        assert_eq!(report.fired, vec!["onClick"]);
    }
    assert_eq!(engine.value("count", "value"), Some(Value::Number(2.0)));
}

/// Members of a set read their values before any member writes.
#[test]
fn trigger_set_swaps_values() {
    let copy_of = |target: &str| StateVarDecl::passthrough(DependencySpec::component(target, "value"));
    let mut engine = build([
        library::number(1.0).named("N"),
        library::number(2.0).named("M"),
        library::trigger_set(vec![
            library::update_value("N", "value", copy_of("M")),
            library::update_value("M", "value", copy_of("N")),
        ])
        .named("swap"),
    ]);

    let report = fire(&mut engine, "swap");
    assert_eq!(report.fired.len(), 3);
    assert_eq!(report.fired[0], "swap");
    assert_eq!(engine.value("N", "value"), Some(Value::Number(2.0)));
    assert_eq!(engine.value("M", "value"), Some(Value::Number(1.0)));

    fire(&mut engine, "swap");
    assert_eq!(engine.value("N", "value"), Some(Value::Number(1.0)));
    assert_eq!(engine.value("M", "value"), Some(Value::Number(2.0)));
}

/// A rule can fire another rule through the action API.
#[test]
fn call_action_fires_another_rule() {
    let mut engine = build([
        library::number(0.0).named("N"),
        library::update_value("N", "value", increment("N")).named("R1"),
        library::call_action("R1", "fire", ActionArgs::new()).named("C1"),
    ]);

    let report = fire(&mut engine, "C1");
    assert_eq!(report.fired, vec!["C1", "R1"]);
    assert_eq!(engine.value("N", "value"), Some(Value::Number(1.0)));
}

/// A write into a component that does not exist is dropped.
#[test]
fn unresolved_target_is_dropped() {
    let mut engine = build([
        library::update_value("ghost", "value", StateVarDecl::constant(1.0)).named("R"),
        library::call_action("ghost", "fire", ActionArgs::new()).named("C"),
    ]);

    assert_eq!(fire(&mut engine, "R").fired, vec!["R"]);
    assert_eq!(fire(&mut engine, "C").fired, vec!["C"]);
    assert!(!engine.contains("ghost"));
}

/// A rule reachable along two chains fires once per microcycle.
#[test]
fn diamond_chain_fires_each_rule_once() {
    let mut engine = build([
        library::number(0.0).named("N"),
        library::number(0.0).named("count"),
        library::update_value("N", "value", increment("N")).named("R1"),
        library::update_value("N", "value", increment("N"))
            .named("R2")
            .trigger_with("R1"),
        library::update_value("N", "value", increment("N"))
            .named("R3")
            .trigger_with("R1"),
        library::update_value("count", "value", increment("count"))
            .named("R4")
            .trigger_with("R2")
            .trigger_with("R3"),
    ]);

    let report = fire(&mut engine, "R1");
    assert_eq!(report.fired.len(), 4);
    assert_eq!(report.fired.iter().filter(|r| *r == "R4").count(), 1);
    assert_eq!(report.fired[0], "R1");
    assert_eq!(engine.value("N", "value"), Some(Value::Number(3.0)));
    assert_eq!(engine.value("count", "value"), Some(Value::Number(1.0)));
}

/// Rules chained to a set member fire after every member has written.
#[test]
fn set_members_chain_their_followers() {
    let copy_of = |target: &str| StateVarDecl::passthrough(DependencySpec::component(target, "value"));
    let mut engine = build([
        library::number(1.0).named("N"),
        library::number(5.0).named("M"),
        library::number(0.0).named("seen"),
        library::trigger_set(vec![
            library::update_value("N", "value", increment("N")).named("bumpN"),
            library::update_value("M", "value", increment("M")).named("bumpM"),
        ])
        .named("S"),
        library::update_value("seen", "value", copy_of("M"))
            .named("after")
            .trigger_with("bumpN"),
    ]);

    let report = fire(&mut engine, "S");
    assert_eq!(report.fired, vec!["S", "bumpN", "bumpM", "after"]);
    assert_eq!(engine.value("N", "value"), Some(Value::Number(2.0)));
    // The follower sees the second member's write too
    assert_eq!(engine.value("seen", "value"), Some(Value::Number(6.0)));
}
