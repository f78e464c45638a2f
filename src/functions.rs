// Built-in function implementations
//
// Every built-in receives the enclosing layer and its raw, unevaluated argument, and
// decides itself which parts to evaluate and in which scope.

use crate::errors::{ErrorKind, EvaluatorError};
use crate::evaluator::Evaluator;
use crate::registry::{Function, Registry};
use crate::signature::Signature;
use crate::state::Layer;
use crate::value::{Map, Value};

type FunctionResult = Result<Option<Value>, EvaluatorError>;

/// Register every built-in on `registry`.
pub fn register_builtins(registry: &mut Registry) {
    registry.register_function("select", scope::select);
    registry.register_function("stack", scope::stack);
    registry.register_function("$", scope::stack);
    registry.register_function("each", iteration::each);
    registry.register_function("map", iteration::map);
    registry.register_function("reduce", iteration::reduce);
    registry.register_function("extend", structure::extend);
    registry.register_function("match", structure::match_cases);
    registry.register_function("compare", structure::compare);
    registry.register_function("sum", numeric::sum);
    registry.register_function("group", numeric::group);
    registry.register_function("assert", diagnostic::assert);
    registry.register_function("log", diagnostic::log);
    registry.register_function("schema", diagnostic::schema);
}

/// Bind the loop variables of one iteration.
fn bind_entry(layer: &mut Layer, index: usize, key: &str, value: &Value) {
    let auto = &mut layer.state.auto;
    auto.insert("index".to_string(), Value::from(index));
    auto.insert("key".to_string(), Value::from(key));
    auto.insert("value".to_string(), value.clone());
}

/// Scope redirection
pub mod scope {
    use super::*;
    use crate::cascade;
    use crate::state::Target;

    /// Evaluate `args` with key writes landing in the target map, then hand the
    /// accumulated stack and selectors back to the caller's scope.
    fn redirect(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value, target: Target) -> FunctionResult {
        let mut scope = layer.child();
        scope.state.target = target;
        scope.state.locked = true;

        let out = ev.evaluate_in(&mut scope, args)?;

        // A construct's merged result never goes through key writes
        if args.as_object().map_or(false, cascade::is_construct) {
            if let (Value::Object(out), Some(map)) = (&out, scope.state.redirected_target()) {
                for (k, v) in out.iter() {
                    map.insert(k.clone(), v.clone());
                }
            }
        }

        layer.state.stack = scope.state.stack;
        layer.state.selectors = scope.state.selectors;
        Ok(None)
    }

    /// `<select` - assign selector weights
    pub fn select(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        redirect(ev, layer, args, Target::Selectors)
    }

    /// `<stack` / `<$` - push explicit bindings
    pub fn stack(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        redirect(ev, layer, args, Target::Stack)
    }
}

/// Iteration over sequences and mappings
pub mod iteration {
    use super::*;
    use crate::cascade;

    fn parse_input(args: &Value) -> bool {
        args.get("parseInput").map_or(false, Value::is_truthy)
    }

    /// `<each` - run `do` once per entry of `of`, for its side effects only
    pub fn each(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        Signature::new("each").required("of").required("do").validate(args)?;
        let (Some(of), Some(body)) = (args.get("of"), args.get("do")) else {
            return Ok(None);
        };

        let of = ev.with_segment(layer, "of", |ev, layer| ev.next_frame(layer, of))?;
        for (index, key, value) in of.entries() {
            let mut iter = layer.child();
            bind_entry(&mut iter, index, &key, &value);
            ev.with_segment(&mut iter, &key, |ev, iter| ev.evaluate_in(iter, body))?;
            layer.state.stack.extend(iter.state.stack);
        }
        Ok(None)
    }

    /// `<map` - evaluate `to` per entry of `from`, keyed like `from`
    ///
    /// Sequence entries are keyed by their stringified index.
    pub fn map(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        Signature::new("map")
            .required("from")
            .required("to")
            .optional("parseInput")
            .validate(args)?;
        let (Some(from), Some(to)) = (args.get("from"), args.get("to")) else {
            return Ok(None);
        };
        let parse = parse_input(args);

        let from_ctx = layer.child();
        let from = ev.with_segment(layer, "from", |ev, layer| ev.next_frame(layer, from))?;

        let mut mapping = Map::new();
        for (index, key, value) in from.entries() {
            let mut item = from_ctx.child();
            let value = if parse {
                let parsed = ev.next_frame(&from_ctx, &value)?;
                item.data = parsed.clone();
                parsed
            } else {
                value
            };
            bind_entry(&mut item, index, &key, &value);

            let out = ev.with_segment(&mut item, &key, |ev, item| ev.evaluate_in(item, to))?;
            mapping.insert(key, out);
        }
        Ok(Some(Value::object(mapping)))
    }

    /// `<reduce` - left fold over `each`, starting from `memo` (0 by default)
    pub fn reduce(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        Signature::new("reduce")
            .required("each")
            .required("with")
            .optional("memo")
            .optional("parseInput")
            .validate(args)?;
        let (Some(each), Some(with)) = (args.get("each"), args.get("with")) else {
            return Ok(None);
        };
        let parse = parse_input(args);

        let items = ev.with_segment(layer, "each", |ev, layer| ev.next_frame(layer, each))?;
        let mut memo = match args.get("memo") {
            Some(memo) => ev.with_segment(layer, "memo", |ev, layer| ev.next_frame(layer, memo))?,
            None => Value::from(0),
        };

        let registry = ev.registry();
        let named = with.as_str().and_then(|name| registry.function(name));

        for (index, key, value) in items.entries() {
            let value = if parse { ev.next_frame(layer, &value)? } else { value };

            let result = match named {
                Some(function) => {
                    let mut call = Map::new();
                    call.insert("value".to_string(), value);
                    call.insert("memo".to_string(), memo.clone());
                    call.insert("index".to_string(), Value::from(index));
                    let mut scope = layer.child();
                    function
                        .call(ev, &mut scope, &Value::object(call))?
                        .unwrap_or(Value::Null)
                }
                None => {
                    let mut scope = layer.child();
                    bind_entry(&mut scope, index, &key, &value);
                    scope.state.auto.insert("memo".to_string(), memo.clone());
                    ev.with_segment(&mut scope, &key, |ev, scope| ev.evaluate_in(scope, with))?
                }
            };

            memo = if memo.is_object() && result.is_object() {
                cascade::union(memo, result)
            } else {
                result
            };
        }
        Ok(Some(memo))
    }
}

/// Structural helpers
pub mod structure {
    use super::*;
    use crate::cascade;

    /// `<extend` - shallow-overwrite `source` with every other key, in order
    pub fn extend(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        Signature::new("extend").required("source").validate(args)?;
        let evaluated = ev.next_frame(layer, args)?;
        let Some(fields) = evaluated.as_object() else {
            return Ok(Some(evaluated));
        };

        let mut out = fields.get("source").cloned().unwrap_or(Value::Null);
        for (key, value) in fields.iter().filter(|(k, _)| k.as_str() != "source") {
            tracing::trace!(key = key.as_str(), "extend");
            out = cascade::replace(out, value.clone());
        }
        Ok(Some(out))
    }

    fn is_hit(result: &Value) -> bool {
        matches!(result, Value::Bool(true)) || result.as_f64() == Some(1.0)
    }

    /// `<match` - evaluate the body of the first case whose condition holds
    pub fn match_cases(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        let Some(cases) = args.as_object() else {
            return Err(EvaluatorError::new(
                ErrorKind::ExpressionEvaluationFailure,
                "match expects a mapping of cases",
            )
            .with_source(args.clone()));
        };

        let math = ev.registry().math();
        let bindings = layer.math_bindings();
        for (condition, body) in cases.iter().filter(|(k, _)| k.as_str() != "default") {
            let result = math
                .evaluate(condition, &bindings)
                .map_err(|e| e.or_path(&layer.state.error_paths))?;
            if is_hit(&result) {
                tracing::debug!(case = condition.as_str(), "match");
                let out = ev.with_segment(layer, condition, |ev, layer| ev.next_frame(layer, body))?;
                return Ok(Some(out));
            }
        }

        match cases.get("default") {
            Some(body) => {
                let out = ev.with_segment(layer, "default", |ev, layer| ev.next_frame(layer, body))?;
                Ok(Some(out))
            }
            None => Ok(None),
        }
    }

    /// `<compare` - true when every evaluated element equals the first
    pub fn compare(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        let elements = ev.next_frame(layer, args)?.elements();
        let same = match elements.split_first() {
            Some((first, rest)) => rest.iter().all(|v| v == first),
            None => true,
        };
        Ok(Some(Value::from(same)))
    }
}

/// Numeric reductions
pub mod numeric {
    use super::*;
    use crate::utils::{as_number, flatten, to_array};

    fn total(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> Result<f64, EvaluatorError> {
        let evaluated = ev.next_frame(layer, args)?;
        let items = if evaluated.is_array() || evaluated.is_object() {
            flatten(&evaluated)
        } else {
            to_array(&evaluated)
        };
        items.iter().try_fold(0.0, |acc, item| {
            as_number(item)
                .map(|n| acc + n)
                .ok_or_else(|| EvaluatorError::expression(format!("cannot sum non-number {}", item)))
        })
    }

    /// `<sum` - numeric sum of the evaluated elements
    pub fn sum(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        total(ev, layer, args).map(|n| Some(Value::from(n)))
    }

    /// `<group` - currently the same reduction as `sum`
    pub fn group(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        total(ev, layer, args).map(|n| Some(Value::from(n)))
    }
}

/// Diagnostics. None of these alter the data.
pub mod diagnostic {
    use super::*;
    use crate::utils::to_array;

    /// `<assert` - always fails with the given message
    pub fn assert(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        let evaluated = ev.next_frame(layer, args)?;
        let message = evaluated
            .get("message")
            .map(Value::to_text)
            .unwrap_or_else(|| evaluated.to_text());
        Err(EvaluatorError::new(ErrorKind::UserAssertion, message)
            .or_path(&layer.state.error_paths)
            .with_source(args.clone()))
    }

    fn render(value: &Value, format: &str) -> String {
        let rendered = match format {
            "json" => value.to_json_string_pretty(),
            _ => value.to_json_string(),
        };
        rendered.unwrap_or_else(|_| value.to_string())
    }

    /// `<log` - print bindings by key path
    ///
    /// Accepts a key path, a list of key paths, or `{keyPath, format}` entries.
    pub fn log(_ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        let dictionary = layer.dictionary();
        for item in to_array(args) {
            let (path, format) = match &item {
                Value::Object(_) => (
                    item.get("keyPath").map(Value::to_text).unwrap_or_default(),
                    item.get("format").map(Value::to_text).unwrap_or_default(),
                ),
                other => (other.to_text(), String::new()),
            };
            let value = if path.is_empty() {
                Some(&layer.data)
            } else {
                dictionary.get_path(&path)
            };
            match value {
                Some(value) => tracing::info!(path = path.as_str(), "{}", render(value, &format)),
                None => tracing::info!(path = path.as_str(), "<unbound>"),
            }
        }
        Ok(None)
    }

    /// `<schema` - report the evaluated argument
    pub fn schema(ev: &mut Evaluator<'_>, layer: &mut Layer, args: &Value) -> FunctionResult {
        let evaluated = ev.next_frame(layer, args)?;
        tracing::info!(path = %layer.state.error_paths.current_path(), "schema {}", render(&evaluated, "compact"));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;
    use pretty_assertions::assert_eq;

    fn eval(input: Value) -> Result<Value, EvaluatorError> {
        let registry = Registry::new();
        Evaluator::new(&registry).evaluate(&input, None)
    }

    #[test]
    fn test_stack_binding() {
        let out = eval(value!({"<stack": {"region": "eu"}, "host": "db.${stack.region}"})).unwrap();
        assert_eq!(out, value!({"host": "db.eu"}));
    }

    #[test]
    fn test_each_produces_no_value() {
        let out = eval(value!({
            "<each": {"of": [1, 2, 3], "do": {"<stack": {"n": "$value"}}},
            "last": "${stack.n}"
        }))
        .unwrap();
        assert_eq!(out, value!({"last": 3}));
    }

    #[test]
    fn test_each_requires_do() {
        let err = eval(value!({"<each": {"of": [1]}})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredArgument);
        assert_eq!(err.message, "for each please supply 'do:'");
    }

    #[test]
    fn test_map_mapping_and_sequence() {
        let out = eval(value!({"<map": {"from": {"a": 1, "b": 2}, "to": "=$value+1"}})).unwrap();
        assert_eq!(out, value!({"a": 2, "b": 3}));

        let out = eval(value!({"xs": {"<map": {"from": [1, 2], "to": "item-${index}"}}})).unwrap();
        assert_eq!(out, value!({"xs": {"0": "item-0", "1": "item-1"}}));

        let out = eval(value!({"<map": {"from": [10, 20], "to": "$value"}})).unwrap();
        assert_eq!(out, value!({"0": 10, "1": 20}));
    }

    #[test]
    fn test_map_template_keys_shadowing_loop_bindings() {
        let out = eval(value!({"<map": {
            "from": {"a": 1, "b": 2},
            "to": {"key": "$key", "value": "$value"}
        }}))
        .unwrap();
        assert_eq!(
            out,
            value!({"a": {"key": "a", "value": 1}, "b": {"key": "b", "value": 2}})
        );
    }

    #[test]
    fn test_map_parse_input_evaluates_entries() {
        let out = eval(value!({"ports": {"<map": {
            "from": {"web>": {"=": {"port": 80}, "=(tls)": {"port": 443}}},
            "to": "=$value.port + 1",
            "parseInput": true
        }}}))
        .unwrap();
        assert_eq!(out, value!({"ports": {"web": 81}}));
    }

    #[test]
    fn test_reduce_parse_input_evaluates_entries() {
        let out = eval(value!({"total": {"<reduce": {
            "each": {"a>": "=2*3", "b>": "=1+1"},
            "with": "=$memo+$value",
            "parseInput": true
        }}}))
        .unwrap();
        assert_eq!(out, value!({"total": 8}));
    }

    #[test]
    fn test_reduce_template() {
        let out = eval(value!({"total": {"<reduce": {"each": [1, 2, 3], "with": "=$memo+$value"}}})).unwrap();
        assert_eq!(out, value!({"total": 6}));
    }

    #[test]
    fn test_reduce_merges_mappings() {
        let out = eval(value!({"<reduce": {
            "each": ["a", "b"],
            "memo": {"seen": true},
            "with": {"${value}": "${index}"}
        }}))
        .unwrap();
        assert_eq!(out, value!({"seen": true, "a": 0, "b": 1}));
    }

    #[test]
    fn test_extend() {
        let out = eval(value!({"<extend": {"source": {"a": 1, "b": 1}, "over": {"b": 2}}})).unwrap();
        assert_eq!(out, value!({"a": 1, "b": 2}));

        let err = eval(value!({"<extend": {"over": {"b": 2}}})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_match() {
        let registry = Registry::new();
        let mut ev = Evaluator::new(&registry);
        let base = value!({"size": 5});
        let doc = value!({"tier": {"<match": {"size > 10": "large", "size > 3": "medium", "default": "small"}}});
        assert_eq!(ev.evaluate(&doc, Some(&base)).unwrap(), value!({"tier": "medium"}));

        let doc = value!({"tier": {"<match": {"size > 10": "large", "default": "small"}}});
        assert_eq!(ev.evaluate(&doc, Some(&base)).unwrap(), value!({"tier": "small"}));

        let doc = value!({"tier": {"<match": {"size > 10": "large"}}});
        assert_eq!(ev.evaluate(&doc, Some(&base)).unwrap(), value!({"tier": {}}));
    }

    #[test]
    fn test_compare_and_sum() {
        let out = eval(value!({"same": {"<compare": [1, 1, 1]}, "diff": {"<compare": ["a", "b"]}})).unwrap();
        assert_eq!(out, value!({"same": true, "diff": false}));

        let out = eval(value!({"n": {"<sum": [1, [2, "3"]]}, "g": {"<group": {"a": 4, "b": 5}}})).unwrap();
        assert_eq!(out, value!({"n": 6, "g": 9}));

        let err = eval(value!({"n": {"<sum": [1, "x"]}})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExpressionEvaluationFailure);
    }

    #[test]
    fn test_assert() {
        let err = eval(value!({"checks": {"<assert": {"message": "bad port"}}})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UserAssertion);
        assert_eq!(err.message, "bad port");
        assert_eq!(err.current_path(), vec!["checks".to_string(), "<assert".to_string()]);
    }

    #[test]
    fn test_diagnostics_leave_data_alone() {
        let out = eval(value!({"a": 1, "<log": ["a", {"keyPath": "a", "format": "json"}], "<schema": {"b": 2}})).unwrap();
        assert_eq!(out, value!({"a": 1}));
    }
}
