// Integration tests for the evaluator, interpolation and built-in functions
//
// These run complete documents through the public API.

use cascade_tpl::bridge::LayerSubstitutions;
use cascade_tpl::interpolate::interpolate;
use cascade_tpl::state::Layer;
use cascade_tpl::{
    evaluate, CommandRunner, ErrorKind, EvalOptions, Evaluator, EvaluatorError, Registry,
    StaticResolver, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

fn doc(v: serde_json::Value) -> Value {
    Value::from(v)
}

fn eval(v: serde_json::Value) -> Value {
    evaluate(&doc(v), None).unwrap()
}

fn eval_err(v: serde_json::Value) -> EvaluatorError {
    evaluate(&doc(v), None).unwrap_err()
}

fn plain_tree() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z0-9 .:/]{0,10}".prop_map(Value::from),
    ];
    leaf.prop_recursive(4, 32, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::array),
            prop::collection::vec(("[a-z][a-z_]{0,6}", inner), 0..5)
                .prop_map(|pairs| Value::object(pairs.into_iter().collect())),
        ]
    })
}

proptest! {
    /// Trees without operator keys or interpolation markers come back unchanged.
    #[test]
    fn plain_trees_are_fixed_points(tree in plain_tree()) {
        let out = evaluate(&tree, None).unwrap();
        prop_assert_eq!(out, tree);
    }
}

#[test]
fn test_interpolation_reports_change() {
    let registry = Registry::new();
    let mut ev = Evaluator::new(&registry);
    let mut layer = Layer::root(false);
    layer.state.auto.insert("x".to_string(), Value::from("1"));

    let mut subs = LayerSubstitutions::new(&mut ev, &mut layer);
    let out = interpolate(&Value::from("a${x}b"), &mut subs).unwrap();
    assert_eq!(out.value, Value::from("a1b"));
    assert!(out.changed);

    let out = interpolate(&Value::from("no markers here"), &mut subs).unwrap();
    assert_eq!(out.value, Value::from("no markers here"));
    assert!(!out.changed);
}

#[test]
fn test_sibling_interpolation() {
    assert_eq!(eval(json!({"x": "1", "y": "a${x}b"})), doc(json!({"x": "1", "y": "a1b"})));
}

#[test]
fn test_escaped_markers_stay_literal() {
    assert_eq!(eval(json!({"x": "1", "y": "\\$\\{x\\}"})), doc(json!({"x": "1", "y": "${x}"})));
}

#[test]
fn test_precedence_independent_of_order() {
    let forward = eval(json!({
        "<select": {"sel1": 1, "sel2": 2},
        "=a(sel1)": 1,
        "=a(sel2)": 2
    }));
    let backward = eval(json!({
        "<select": {"sel1": 1, "sel2": 2},
        "=a(sel2)": 2,
        "=a(sel1)": 1
    }));
    assert_eq!(forward, doc(json!({"a": 2})));
    assert_eq!(backward, doc(json!({"a": 2})));
}

#[test]
fn test_selector_expressions() {
    let out = eval(json!({
        "<select": {"eu": 1, "prod": 2},
        "=": {"region": "default", "size": "s"},
        "=region(us|eu)": "eu-west",
        "=size(eu&prod)": "xl",
        "=size(us&prod)": "m"
    }));
    assert_eq!(out, doc(json!({"region": "eu-west", "size": "xl"})));
}

#[test]
fn test_union_merge() {
    let out = eval(json!({"=": {"a": 0, "b": 2}, "+": {"a": 1}}));
    assert_eq!(out, doc(json!({"a": 1, "b": 2})));

    let out = eval(json!({"=": {"tags": ["a"]}, "+": {"tags": ["b"]}}));
    assert_eq!(out, doc(json!({"tags": ["a", "b"]})));
}

#[test]
fn test_subtract_merge() {
    let out = eval(json!({"=": {"a": 1, "b": 2}, "-": {"b": true}}));
    assert_eq!(out, doc(json!({"a": 1})));
}

#[test]
fn test_each_is_side_effect_only() {
    let out = eval(json!({
        "<each": {"of": [1, 2, 3], "do": {"<stack": {"n": "$value"}}},
        "n": "${stack.n}"
    }));
    assert_eq!(out, doc(json!({"n": 3})));
}

#[test]
fn test_map_with_math() {
    let out = eval(json!({"<map": {"from": {"a": 1, "b": 2}, "to": "=$value+1"}}));
    assert_eq!(out, doc(json!({"a": 2, "b": 3})));
}

#[test]
fn test_reduce_and_extend() {
    let out = eval(json!({
        "total": {"<reduce": {"each": [2, 3, 4], "memo": 1, "with": "=$memo*$value"}},
        "merged": {"<extend": {"source": {"a": 1}, "patch": {"b": 2}}}
    }));
    assert_eq!(out, doc(json!({"total": 24, "merged": {"a": 1, "b": 2}})));
}

#[test]
fn test_match_uses_bindings() {
    let base = doc(json!({"env": "prod"}));
    let trunk = doc(json!({
        "replicas": {"<match": {"env == 'prod'": 3, "default": 1}}
    }));
    assert_eq!(evaluate(&trunk, Some(&base)).unwrap(), doc(json!({"replicas": 3})));
}

#[test]
fn test_error_path_names_failing_index() {
    let registry = Registry::new();
    let mut ev = Evaluator::with_options(&registry, EvalOptions::strict());
    let trunk = doc(json!({"servers": ["a", "b", "${missing}", "d", "e"]}));
    let err = ev.evaluate(&trunk, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnresolvedReference);
    assert_eq!(err.current_path(), vec!["servers".to_string(), "2".to_string()]);
}

#[test]
fn test_unknown_function_at_any_depth() {
    for trunk in [
        json!({"<frobnicate": {}}),
        json!({"a": {"b": [{"c": {"frobnicate<": 1}}]}}),
    ] {
        let err = eval_err(trunk);
        assert_eq!(err.kind, ErrorKind::UnknownFunction);
        assert_eq!(err.message, "no known function frobnicate");
    }
}

#[test]
fn test_strict_and_lenient_references() {
    let trunk = doc(json!({"a": "x${nothing}y"}));
    assert_eq!(evaluate(&trunk, None).unwrap(), doc(json!({"a": "xy"})));

    let registry = Registry::new();
    let err = Evaluator::with_options(&registry, EvalOptions::strict())
        .evaluate(&trunk, None)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnresolvedReference);
    assert_eq!(err.message, "no value for required keypath nothing");
}

#[test]
fn test_fetch_from_resolver() {
    let mut registry = Registry::new();
    registry.register_resolver(
        "static",
        StaticResolver::new("shared/db", doc(json!({"db_port": "${port}"}))),
    );
    let mut ev = Evaluator::new(&registry);

    let base = doc(json!({"port": 5432}));
    let out = ev.evaluate(&doc(json!({"db": "^{shared/db}"})), Some(&base)).unwrap();
    assert_eq!(out, doc(json!({"db": {"db_port": 5432}})));

    let out = ev.evaluate(&doc(json!({"all": "^{?shared/db}"})), Some(&base)).unwrap();
    assert_eq!(out, doc(json!({"all": [{"db_port": 5432}]})));

    let err = ev.evaluate(&doc(json!({"x": "^{other}"})), None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ResolverFailure);
}

struct Echo;

impl CommandRunner for Echo {
    fn run(&self, command: &str) -> Result<String, EvaluatorError> {
        Ok(format!("ran {}", command))
    }
}

#[test]
fn test_shell_substitution() {
    let trunk = doc(json!({"host": "$(hostname)"}));
    assert_eq!(
        evaluate(&trunk, None).unwrap(),
        doc(json!({"host": "no shell method supplied"}))
    );

    let mut registry = Registry::new();
    registry.set_command_runner(Echo);
    let out = Evaluator::new(&registry).evaluate(&trunk, None).unwrap();
    assert_eq!(out, doc(json!({"host": "ran hostname"})));
}

#[test]
fn test_registered_function() {
    let mut registry = Registry::new();
    registry.register_function(
        "upper",
        |ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value| -> Result<Option<Value>, EvaluatorError> {
            let text = ev.next_frame(layer, args)?.to_text().to_uppercase();
            Ok(Some(Value::from(text)))
        },
    );
    let out = Evaluator::new(&registry)
        .evaluate(&doc(json!({"name": "db", "label": {"<upper": "${name}-1"}})), None)
        .unwrap();
    assert_eq!(out, doc(json!({"name": "db", "label": "DB-1"})));
}

#[test]
fn test_error_display_includes_path() {
    let err = eval_err(json!({"checks": {"<assert": {"message": "port must be set"}}}));
    assert_eq!(err.kind, ErrorKind::UserAssertion);
    assert_eq!(
        err.to_string(),
        "assertion: port must be set (at checks.<assert)"
    );
}
