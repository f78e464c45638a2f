// Interpolation <-> evaluation bridge
//
// LayerSubstitutions answers the interpolation engine's questions using the current
// layer and evaluator: references are looked up in the layer's binding dictionary and
// re-evaluated, mappings are evaluated as nested documents, fetches go through the
// registry's resolvers.

use crate::error_path::PathFrame;
use crate::errors::{ErrorKind, EvaluatorError};
use crate::evaluator::Evaluator;
use crate::interpolate::{Lookup, Substitutions};
use crate::state::Layer;
use crate::value::{Map, Value};

pub struct LayerSubstitutions<'a, 'r> {
    ev: &'a mut Evaluator<'r>,
    layer: &'a mut Layer,
}

impl<'a, 'r> LayerSubstitutions<'a, 'r> {
    pub fn new(ev: &'a mut Evaluator<'r>, layer: &'a mut Layer) -> Self {
        LayerSubstitutions { ev, layer }
    }

    /// Key path a binding was written from, extended by the rest of `path`.
    fn origin(&self, path: &str) -> Vec<String> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut origin = self
            .layer
            .state
            .auto_map
            .get(first)
            .cloned()
            .unwrap_or_else(|| vec![first.to_string()]);
        origin.extend(segments.map(str::to_string));
        origin
    }
}

impl Substitutions for LayerSubstitutions<'_, '_> {
    fn dereference(&mut self, path: &str, lookup: &Lookup) -> Result<Value, EvaluatorError> {
        if path.is_empty() {
            return Ok(Value::Null);
        }
        let found = self.layer.dictionary().get_path(path).cloned();
        match found {
            Some(value) if value.is_truthy() => {
                let frame = PathFrame::rhs(self.origin(path));
                self.ev
                    .with_frame(self.layer, frame, |ev, layer| ev.next_frame(layer, &value))
            }
            // Present but falsy values are not re-evaluated
            Some(value) => Ok(value),
            None if self.layer.state.strict => Err(EvaluatorError::unresolved(path)
                .or_path(&self.layer.state.error_paths)
                .with_source(Value::from(lookup.source.as_str()))),
            None => {
                tracing::trace!(path, "unresolved reference");
                Ok(Value::Null)
            }
        }
    }

    fn call(&mut self, mapping: &Value) -> Result<Value, EvaluatorError> {
        match mapping.as_object() {
            Some(map) if map.is_empty() => Ok(Value::from("")),
            _ => self.ev.next_frame(self.layer, mapping),
        }
    }

    fn fetch(&mut self, locator: &str) -> Result<Value, EvaluatorError> {
        let all = locator.starts_with('?');
        let name = locator.trim_start_matches('?');
        let registry = self.ev.registry();

        let mut branches = Vec::new();
        for (resolver_name, resolver) in registry.resolvers() {
            if !resolver.matches(name) {
                continue;
            }
            tracing::debug!(locator = name, resolver = resolver_name, "resolving branch");
            let found = resolver.resolve(name, self.layer).map_err(|e| {
                EvaluatorError::resolver(format!("Failed to resolve {}: {}", name, e.message))
            })?;
            branches.extend(found);
        }
        if branches.is_empty() {
            return Err(EvaluatorError::resolver(format!(
                "No results for {}, in {} resolvers",
                name,
                registry.resolver_count()
            )));
        }

        let mut parsed = Vec::with_capacity(branches.len());
        for branch in branches {
            let frame = PathFrame::rhs(vec![format!("^{}", branch.encoded_locator())]);
            let value = self
                .ev
                .with_frame(self.layer, frame, |ev, layer| ev.next_frame(layer, &branch.ast))?;
            parsed.push(value);
            if !all {
                break;
            }
        }
        if all {
            Ok(Value::array(parsed))
        } else {
            Ok(parsed.into_iter().next().unwrap_or(Value::Null))
        }
    }

    fn bindings(&mut self) -> Map {
        self.layer.math_bindings()
    }

    fn math(&mut self, expression: &str, bindings: &Map) -> Result<Value, EvaluatorError> {
        self.ev.registry().math().evaluate(expression, bindings)
    }

    fn shell(&mut self, command: &str) -> Result<Value, EvaluatorError> {
        match self.ev.registry().command_runner() {
            Some(runner) => runner.run(command).map(Value::from).map_err(|e| {
                EvaluatorError::new(ErrorKind::CommandFailure, format!("{}: {}", command, e.message))
            }),
            None => {
                tracing::warn!(command, "shell substitution without a command runner");
                Ok(Value::from("no shell method supplied"))
            }
        }
    }
}
