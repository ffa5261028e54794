//! Benchmarks for write-then-read cycles over chains and mapped lists.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::component::library;
use tessera_core::{
    ActionArgs, ComponentTemplate, DependencySpec, Document, Engine, EngineConfig, StateVarDecl,
    Value,
};

/// `n0 -> n1 -> ... -> n{len}`, each one more than the last.
fn chain(len: usize) -> Engine {
    let mut children: Vec<ComponentTemplate> = vec![library::number(0.0).named("n0")];
    for i in 1..=len {
        let previous = format!("n{}", i - 1);
        let decl = StateVarDecl::derived(|deps| Ok(Value::Number(deps.number("p")? + 1.0)))
            .depends_on("p", DependencySpec::component(previous, "value"));
        children.push(library::computed_number(decl).named(format!("n{i}")));
    }
    let doc = Document::new(library::document().with_children(children));
    Engine::build(doc, EngineConfig::default()).expect("chain builds")
}

/// A map over `0..len` whose elements all read `offset`.
fn mapped(len: usize) -> Engine {
    let items = Value::List((0..len).map(|i| Value::Number(i as f64)).collect());
    let doc = Document::new(library::document().with_children([
        library::number(0.0).named("offset"),
        ComponentTemplate::new("list")
            .named("items")
            .with_state("value", StateVarDecl::constant(items)),
        library::map(DependencySpec::component("items", "value"), |value, _| {
            let base = value.as_f64().unwrap_or(0.0);
            library::computed_number(
                StateVarDecl::derived(move |deps| Ok(Value::Number(base + deps.number("o")?)))
                    .depends_on("o", DependencySpec::component("offset", "value")),
            )
        })
        .named("m"),
    ]));
    Engine::build(doc, EngineConfig::default()).expect("map builds")
}

fn set_args(value: f64) -> ActionArgs {
    ActionArgs::new().with("variable", "value").with("value", value)
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for len in [10, 50, 250] {
        group.bench_with_input(BenchmarkId::new("write_read_tail", len), &len, |b, &len| {
            let mut engine = chain(len);
            let tail = format!("n{len}");
            let mut next = 0.0;
            b.iter(|| {
                next += 1.0;
                engine
                    .perform_action("n0", "setValue", &set_args(next))
                    .expect("setValue");
                engine.value(&tail, "value")
            });
        });
    }
    group.finish();
}

fn bench_mapped(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapped");
    for len in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("write_snapshot", len), &len, |b, &len| {
            let mut engine = mapped(len);
            let mut next = 0.0;
            b.iter(|| {
                next += 1.0;
                engine
                    .perform_action("offset", "setValue", &set_args(next))
                    .expect("setValue");
                engine.read_all_state_variables()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain, bench_mapped);
criterion_main!(benches);
