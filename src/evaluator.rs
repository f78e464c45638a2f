// Cascade / merge evaluator
//
// Walks a document tree. Sequences recurse per element, plain mappings recurse key by
// key, constructs (mappings with merge or function keys) run the precedence-gated
// `=`, `+`, `-` passes, and scalars go through the interpolation engine, which calls
// back into this evaluator through the bridge.

use std::collections::HashMap;

use crate::bridge::LayerSubstitutions;
use crate::cascade::{self, MergeKey, MergeOperator};
use crate::error_path::PathFrame;
use crate::errors::{handle_error, ErrorKind, EvaluatorError};
use crate::interpolate::{interpolate, Interpolated};
use crate::key::{self, FunctionKey, KeyKind};
use crate::options::EvalOptions;
use crate::registry::{Function, Registry};
use crate::stack::ensure_sufficient_stack;
use crate::state::{Layer, MergeState};
use crate::value::{Map, Value};

/// The value a mapping evaluates to, built up key by key.
struct Node {
    value: Value,
}

impl Node {
    fn new() -> Self {
        Node {
            value: Value::empty_object(),
        }
    }

    fn insert(&mut self, key: &str, value: Value) {
        if let Some(map) = self.value.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }

    /// What sibling lookups see while `key` is evaluated: the entries written so
    /// far, without `key` itself.
    fn inline_view(&self, key: &str) -> Value {
        match self.value.as_object() {
            Some(map) if map.contains_key(key) => {
                let mut view = map.clone();
                view.shift_remove(key);
                Value::object(view)
            }
            Some(_) => self.value.clone(),
            None => Value::empty_object(),
        }
    }

    /// Apply a function's output: mappings extend the node, anything else replaces it.
    fn absorb(&mut self, output: Value) {
        match output {
            Value::Object(extra) if self.value.is_object() => {
                if let Some(node) = self.value.as_object_mut() {
                    for (k, v) in extra.iter() {
                        node.insert(k.clone(), v.clone());
                    }
                }
            }
            other => self.value = other,
        }
    }
}

/// Evaluator over a borrowed, frozen registry.
pub struct Evaluator<'r> {
    registry: &'r Registry,
    options: EvalOptions,
    recursion_depth: usize,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_options(registry, EvalOptions::default())
    }

    pub fn with_options(registry: &'r Registry, options: EvalOptions) -> Self {
        Evaluator {
            registry,
            options,
            recursion_depth: 0,
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Evaluate a document.
    ///
    /// When `base` is given it is evaluated first in the same root layer, so its
    /// bindings, stack and selectors are visible to `trunk`. Only the trunk's value is
    /// returned.
    pub fn evaluate(&mut self, trunk: &Value, base: Option<&Value>) -> Result<Value, EvaluatorError> {
        let mut layer = Layer::root(self.options.strict);
        if let Some(base) = base {
            self.evaluate_in(&mut layer, base)?;
        }
        self.evaluate_in(&mut layer, trunk)
    }

    /// Evaluate `input` in `layer` itself. Mapping keys bind into `layer`'s scope.
    pub fn evaluate_in(&mut self, layer: &mut Layer, input: &Value) -> Result<Value, EvaluatorError> {
        self.recursion_depth += 1;
        if self.recursion_depth > self.options.max_recursion_depth {
            self.recursion_depth -= 1;
            let err = EvaluatorError::new(
                ErrorKind::RecursionLimit,
                format!(
                    "maximum recursion depth ({}) exceeded",
                    self.options.max_recursion_depth
                ),
            );
            return Err(handle_error(err, layer, input));
        }

        let result = ensure_sufficient_stack(|| self.dispatch(layer, input));

        self.recursion_depth -= 1;
        result.map_err(|e| handle_error(e, layer, input))
    }

    fn dispatch(&mut self, layer: &mut Layer, input: &Value) -> Result<Value, EvaluatorError> {
        match input {
            Value::Array(items) => {
                tracing::trace!(len = items.len(), "sequence");
                self.evaluate_sequence(layer, input, items)
            }
            Value::Object(map) if cascade::is_construct(map) => {
                tracing::trace!(keys = map.len(), "construct");
                self.evaluate_construct(layer, input, map)
            }
            Value::Object(map) => {
                tracing::trace!(keys = map.len(), "mapping");
                match key::expand_dotted(map) {
                    Some(expanded) => self.evaluate_mapping(layer, input, &expanded),
                    None => self.evaluate_mapping(layer, input, map),
                }
            }
            _ => self.interpolate_scalar(layer, input),
        }
    }

    /// Evaluate `input` in a fresh child frame of `layer`.
    pub fn next_frame(&mut self, layer: &Layer, input: &Value) -> Result<Value, EvaluatorError> {
        let mut child = layer.child();
        self.evaluate_in(&mut child, input)
    }

    /// Run `f` with `segment` appended to the current error path.
    ///
    /// The path is restored afterwards whether `f` succeeds or fails; a failure
    /// captures the path before it is restored.
    pub fn with_segment<T>(
        &mut self,
        layer: &mut Layer,
        segment: &str,
        f: impl FnOnce(&mut Self, &mut Layer) -> Result<T, EvaluatorError>,
    ) -> Result<T, EvaluatorError> {
        let mark = layer.state.error_paths.push_segment(segment);
        let result = f(self, layer).map_err(|e| e.or_path(&layer.state.error_paths));
        layer.state.error_paths.restore(mark);
        result
    }

    /// Run `f` with a whole new error-path frame pushed; restored like [`Self::with_segment`].
    pub fn with_frame<T>(
        &mut self,
        layer: &mut Layer,
        frame: PathFrame,
        f: impl FnOnce(&mut Self, &mut Layer) -> Result<T, EvaluatorError>,
    ) -> Result<T, EvaluatorError> {
        let mark = layer.state.error_paths.push_frame(frame);
        let result = f(self, layer).map_err(|e| e.or_path(&layer.state.error_paths));
        layer.state.error_paths.restore(mark);
        result
    }

    fn with_data<T>(
        &mut self,
        layer: &mut Layer,
        data: &Value,
        f: impl FnOnce(&mut Self, &mut Layer) -> Result<T, EvaluatorError>,
    ) -> Result<T, EvaluatorError> {
        let saved = std::mem::replace(&mut layer.data, data.clone());
        let result = f(self, layer);
        layer.data = saved;
        result
    }

    fn evaluate_sequence(
        &mut self,
        layer: &mut Layer,
        input: &Value,
        items: &[Value],
    ) -> Result<Value, EvaluatorError> {
        self.with_data(layer, input, |ev, layer| {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let value =
                    ev.with_segment(layer, &index.to_string(), |ev, layer| ev.next_frame(layer, item))?;
                out.push(value);
            }
            Ok(Value::array(out))
        })
    }

    fn evaluate_mapping(
        &mut self,
        layer: &mut Layer,
        input: &Value,
        map: &Map,
    ) -> Result<Value, EvaluatorError> {
        self.with_data(layer, input, |ev, layer| ev.evaluate_keys(layer, map))
    }

    /// Evaluate `map` key by key into a fresh node. While a key is evaluated, the
    /// layer's inline data is the node as built so far, so a key never reads its own
    /// unevaluated value and falls through to inherited bindings instead.
    fn evaluate_keys(&mut self, layer: &mut Layer, map: &Map) -> Result<Value, EvaluatorError> {
        let mut node = Node::new();
        for (key, value) in map.iter() {
            layer.data = node.inline_view(key);
            self.evaluate_key(layer, &mut node, key, value)?;
        }
        Ok(node.value)
    }

    fn evaluate_construct(
        &mut self,
        layer: &mut Layer,
        input: &Value,
        map: &Map,
    ) -> Result<Value, EvaluatorError> {
        self.with_data(layer, input, |ev, layer| {
            layer.state.merge = MergeState::default();

            // Plain and function keys first; their result seeds the accumulator
            let plain: Map = map
                .iter()
                .filter(|(k, _)| !key::is_merge_key(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut acc = if plain.is_empty() {
                Value::Null
            } else {
                ev.evaluate_keys(layer, &plain)?
            };
            layer.data = input.clone();

            for operator in MergeOperator::PASSES {
                acc = ev.cascade_pass(layer, map, operator, acc)?;
            }
            Ok(acc)
        })
    }

    /// One pass of a construct over its declared keys.
    fn cascade_pass(
        &mut self,
        layer: &mut Layer,
        map: &Map,
        operator: MergeOperator,
        mut acc: Value,
    ) -> Result<Value, EvaluatorError> {
        // Highest weight applied so far, per target path
        let mut sites: HashMap<String, f64> = HashMap::new();

        for (key, value) in map.iter() {
            let Some(merge_key) = MergeKey::parse(key) else {
                continue;
            };
            if merge_key.operator != operator {
                continue;
            }
            let Some(weight) = cascade::selector_weight(&merge_key.selector, &layer.state.selectors)
            else {
                tracing::debug!(key = key.as_str(), "selector not active");
                continue;
            };

            if operator.uses_precedence() {
                let site = merge_key.site();
                if let Some(best) = sites.get(&site) {
                    if weight < *best {
                        tracing::debug!(key = key.as_str(), weight, best = *best, "outweighed");
                        continue;
                    }
                }
                sites.insert(site, weight);
                let recorded = layer.state.merge.precedence.entry(operator.as_char()).or_insert(weight);
                *recorded = recorded.max(weight);
            }

            let rhs = self.with_segment(layer, key, |ev, layer| {
                layer.state.merge.operator = Some(operator.as_char());
                let rhs = ev.next_frame(layer, value);
                layer.state.merge.operator = None;
                rhs
            })?;
            acc = cascade::merge_at(acc, &merge_key.target, operator, rhs);
        }
        Ok(acc)
    }

    fn evaluate_key(
        &mut self,
        layer: &mut Layer,
        node: &mut Node,
        key: &str,
        value: &Value,
    ) -> Result<(), EvaluatorError> {
        if key.is_empty() {
            return Ok(());
        }
        self.with_segment(layer, key, |ev, layer| {
            ev.evaluate_kind(layer, node, key::classify(key), key, value)
        })
    }

    fn evaluate_kind(
        &mut self,
        layer: &mut Layer,
        node: &mut Node,
        kind: KeyKind,
        key: &str,
        value: &Value,
    ) -> Result<(), EvaluatorError> {
        match kind {
            KeyKind::OptionalRef(base) => {
                let existing = layer
                    .dictionary()
                    .get_path(&base)
                    .filter(|v| v.is_truthy())
                    .cloned();
                match existing {
                    Some(existing) => {
                        write(layer, node, &base, existing);
                        Ok(())
                    }
                    None => self.evaluate_kind(layer, node, key::classify(&base), &base, value),
                }
            }
            KeyKind::FunctionCall(function) => self.call_function_key(layer, node, &function, value),
            KeyKind::DynamicKey => {
                let name = self.interpolate_scalar(layer, &Value::from(key))?.to_text();
                let res = self.next_frame(layer, value)?;
                if !name.is_empty() {
                    write(layer, node, &name, res);
                }
                Ok(())
            }
            KeyKind::Escaped(name) => {
                let res = self.next_frame(layer, value)?;
                write(layer, node, &name, res);
                Ok(())
            }
            KeyKind::RawAssign(name) => {
                write(layer, node, &name, value.clone());
                Ok(())
            }
            KeyKind::Plain => {
                let res = self.next_frame(layer, value)?;
                write(layer, node, key, res);
                Ok(())
            }
        }
    }

    fn call_function_key(
        &mut self,
        layer: &mut Layer,
        node: &mut Node,
        function: &FunctionKey,
        args: &Value,
    ) -> Result<(), EvaluatorError> {
        let registry = self.registry;
        match function {
            FunctionKey::Closure => {
                let out = self.evaluate_in(layer, args)?;
                node.absorb(out);
            }
            FunctionKey::MergeOperator { operator, selector } => {
                let name = operator.to_string();
                if let Some(f) = registry.function(&name) {
                    tracing::debug!(function = name.as_str(), "dispatch");
                    if let Some(out) = f.call(self, layer, args)? {
                        node.absorb(out);
                    }
                    return Ok(());
                }
                let recorded = layer.state.merge.precedence_of(*operator);
                match cascade::selector_weight(selector, &layer.state.selectors) {
                    Some(weight) if weight >= recorded => {
                        layer.state.merge.precedence.insert(*operator, weight);
                        let res = self.next_frame(layer, args)?;
                        write(layer, node, &name, res);
                    }
                    weight => {
                        tracing::debug!(operator = name.as_str(), ?weight, recorded, "merge function skipped");
                    }
                }
            }
            FunctionKey::Named(name) => {
                let f = registry
                    .function(name)
                    .ok_or_else(|| EvaluatorError::unknown_function(name))?;
                tracing::debug!(
                    function = name.as_str(),
                    path = %layer.state.error_paths.current_path(),
                    "dispatch"
                );
                if let Some(out) = f.call(self, layer, args)? {
                    node.absorb(out);
                }
            }
        }
        Ok(())
    }

    /// Interpolate a scalar, re-interpolating string results until they settle.
    pub fn interpolate_scalar(&mut self, layer: &mut Layer, input: &Value) -> Result<Value, EvaluatorError> {
        let mut current = input.clone();
        for _ in 0..=self.options.max_recursion_depth {
            let Interpolated { value, changed } = {
                let mut subs = LayerSubstitutions::new(self, layer);
                interpolate(&current, &mut subs)?
            };
            if !changed || !value.is_string() {
                return Ok(value);
            }
            current = value;
        }
        Err(EvaluatorError::new(
            ErrorKind::RecursionLimit,
            format!("interpolation of {} did not settle", input),
        ))
    }
}

/// Record a finished key and write it to the current target.
fn write(layer: &mut Layer, node: &mut Node, key: &str, value: Value) {
    layer.state.bind(key, value.clone());
    match layer.state.redirected_target() {
        Some(target) => {
            target.insert(key.to_string(), value);
        }
        None => {
            // Drop the sibling view first; it shares the node's map
            layer.data = Value::Null;
            node.insert(key, value);
        }
    }
}
