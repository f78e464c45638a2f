//! Criterion benchmarks for the cascade evaluator.
//!
//! Measures raw evaluation cost over already-decoded trees; JSON parsing is done
//! once outside the timed loop.
//!
//! Run:
//!   cargo bench
//!   cargo bench -- interpolation    # one group
//!   cargo bench -- cascade          # one group

use cascade_tpl::evaluator::Evaluator;
use cascade_tpl::math::{DefaultMath, MathEvaluator};
use cascade_tpl::registry::Registry;
use cascade_tpl::value::{Map, Value};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Document builders ─────────────────────────────────────────────────────────

/// `n` services, each referencing shared settings from its siblings.
fn services(n: usize) -> Value {
    let mut root = Map::new();
    root.insert("domain".to_string(), Value::from("example.com"));
    root.insert("port".to_string(), Value::from(8080));
    for i in 0..n {
        let mut svc = Map::new();
        svc.insert("name".to_string(), Value::from(format!("svc{i}")));
        svc.insert("host".to_string(), Value::from("${name}.${domain}"));
        svc.insert("url".to_string(), Value::from("http://${host}:${port}/"));
        root.insert(format!("svc{i}"), Value::object(svc));
    }
    Value::object(root)
}

/// A construct with `n` competing selector-gated assignments.
fn cascade(n: usize) -> Value {
    let mut selectors = Map::new();
    let mut root = Map::new();
    for i in 0..n {
        selectors.insert(format!("s{i}"), Value::from(i + 1));
    }
    root.insert("<select".to_string(), Value::object(selectors));
    root.insert("=".to_string(), Value::from_json_str(r#"{"a": 0, "b": [1], "c": true}"#).unwrap_or(Value::Null));
    for i in 0..n {
        root.insert(format!("=a(s{i})"), Value::from(i));
        root.insert(format!("+b(s{i})"), Value::array(vec![Value::from(i)]));
    }
    root.insert("-".to_string(), Value::from_json_str(r#"{"c": true}"#).unwrap_or(Value::Null));
    Value::object(root)
}

/// `<map` over a sequence of `n` numbers with a math template.
fn mapped(n: usize) -> Value {
    let from: Vec<Value> = (0..n).map(Value::from).collect();
    let mut args = Map::new();
    args.insert("from".to_string(), Value::array(from));
    args.insert("to".to_string(), Value::from("=$value * 2 + 1"));
    let mut root = Map::new();
    root.insert("<map".to_string(), Value::object(args));
    Value::object(root)
}

// ── Helper ────────────────────────────────────────────────────────────────────

#[inline]
fn eval(registry: &Registry, doc: &Value) -> Value {
    Evaluator::new(registry).evaluate(doc, None).unwrap()
}

// ── Bench groups ──────────────────────────────────────────────────────────────

fn bench_interpolation(c: &mut Criterion) {
    let registry = Registry::new();
    let mut group = c.benchmark_group("interpolation");

    for n in [10_usize, 100] {
        let doc = services(n);
        group.bench_with_input(BenchmarkId::new("services", n), &doc, |b, doc| {
            b.iter(|| black_box(eval(&registry, black_box(doc))))
        });
    }

    let plain = Value::from_json_str(r#"{"a": {"b": {"c": [1, 2, 3], "d": "plain text"}}}"#).unwrap();
    group.bench_function("no_markers", |b| {
        b.iter(|| black_box(eval(&registry, black_box(&plain))))
    });

    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let registry = Registry::new();
    let mut group = c.benchmark_group("cascade");

    for n in [4_usize, 32] {
        let doc = cascade(n);
        group.bench_with_input(BenchmarkId::new("selectors", n), &doc, |b, doc| {
            b.iter(|| black_box(eval(&registry, black_box(doc))))
        });
    }

    group.finish();
}

fn bench_functions(c: &mut Criterion) {
    let registry = Registry::new();
    let mut group = c.benchmark_group("functions");

    for n in [10_usize, 100] {
        let doc = mapped(n);
        group.bench_with_input(BenchmarkId::new("map_math", n), &doc, |b, doc| {
            b.iter(|| black_box(eval(&registry, black_box(doc))))
        });
    }

    group.finish();
}

fn bench_math(c: &mut Criterion) {
    let mut group = c.benchmark_group("math");
    let mut bindings = Map::new();
    bindings.insert("price".to_string(), Value::from(10.5));
    bindings.insert("quantity".to_string(), Value::from(3));

    for expr in ["price * quantity", "(price + 1) * quantity > 30 ? 'big' : 'small'"] {
        group.bench_with_input(BenchmarkId::new("default", expr), expr, |b, expr| {
            b.iter(|| black_box(DefaultMath.evaluate(black_box(expr), &bindings).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_interpolation, bench_cascade, bench_functions, bench_math);
criterion_main!(benches);
