// Registry of functions, resolvers and external evaluators
//
// Built once and handed to the Evaluator by reference. The evaluator only ever holds
// a shared borrow, so the registry cannot change while an evaluation is running.

use indexmap::IndexMap;

use crate::errors::EvaluatorError;
use crate::evaluator::Evaluator;
use crate::functions;
use crate::math::{DefaultMath, MathEvaluator};
use crate::resolver::Resolver;
use crate::state::Layer;
use crate::value::Value;

/// An extension function callable through a function key.
///
/// Receives the enclosing layer and the raw, unevaluated argument. `Some(mapping)`
/// extends the node under construction, `Some(other)` replaces it and `None` leaves
/// it untouched.
pub trait Function {
    fn call(
        &self,
        ev: &mut Evaluator<'_>,
        layer: &mut Layer,
        args: &Value,
    ) -> Result<Option<Value>, EvaluatorError>;
}

impl<F> Function for F
where
    F: Fn(&mut Evaluator<'_>, &mut Layer, &Value) -> Result<Option<Value>, EvaluatorError>,
{
    fn call(
        &self,
        ev: &mut Evaluator<'_>,
        layer: &mut Layer,
        args: &Value,
    ) -> Result<Option<Value>, EvaluatorError> {
        self(ev, layer, args)
    }
}

/// Runs shell substitutions (`$(…)`).
pub trait CommandRunner {
    fn run(&self, command: &str) -> Result<String, EvaluatorError>;
}

pub struct Registry {
    functions: IndexMap<String, Box<dyn Function>>,
    resolvers: IndexMap<String, Box<dyn Resolver>>,
    math: Box<dyn MathEvaluator>,
    shell: Option<Box<dyn CommandRunner>>,
}

impl Registry {
    /// A registry holding the built-in functions and the default math evaluator.
    pub fn new() -> Self {
        let mut registry = Registry::empty();
        functions::register_builtins(&mut registry);
        registry
    }

    /// A registry with no functions at all.
    pub fn empty() -> Self {
        Registry {
            functions: IndexMap::new(),
            resolvers: IndexMap::new(),
            math: Box::new(DefaultMath),
            shell: None,
        }
    }

    /// Register (or replace) a function under `name`.
    pub fn register_function(&mut self, name: impl Into<String>, function: impl Function + 'static) {
        self.functions.insert(name.into(), Box::new(function));
    }

    /// Register (or replace) a resolver. Resolvers are consulted in registration order.
    pub fn register_resolver(&mut self, name: impl Into<String>, resolver: impl Resolver + 'static) {
        self.resolvers.insert(name.into(), Box::new(resolver));
    }

    pub fn set_math_evaluator(&mut self, math: impl MathEvaluator + 'static) {
        self.math = Box::new(math);
    }

    pub fn set_command_runner(&mut self, runner: impl CommandRunner + 'static) {
        self.shell = Some(Box::new(runner));
    }

    pub fn function(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn resolvers(&self) -> impl Iterator<Item = (&str, &dyn Resolver)> {
        self.resolvers.iter().map(|(k, r)| (k.as_str(), r.as_ref()))
    }

    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    pub fn math(&self) -> &dyn MathEvaluator {
        self.math.as_ref()
    }

    pub fn command_runner(&self) -> Option<&dyn CommandRunner> {
        self.shell.as_deref()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(_: &mut Evaluator<'_>, _: &mut Layer, _: &Value) -> Result<Option<Value>, EvaluatorError> {
        Ok(Some(Value::from(1)))
    }

    #[test]
    fn test_builtins_registered() {
        let registry = Registry::new();
        for name in [
            "select", "stack", "$", "extend", "match", "schema", "log", "assert", "each", "map",
            "reduce", "compare", "sum", "group",
        ] {
            assert!(registry.has_function(name), "missing {}", name);
        }
        assert!(Registry::empty().function_names().next().is_none());
    }

    #[test]
    fn test_register_function() {
        let mut registry = Registry::empty();
        registry.register_function("one", constant);
        registry.register_function(
            "two",
            |_: &mut Evaluator<'_>, _: &mut Layer, _: &Value| -> Result<Option<Value>, EvaluatorError> {
                Ok(Some(Value::from(2)))
            },
        );
        let names: Vec<&str> = registry.function_names().collect();
        assert_eq!(names, vec!["one", "two"]);
    }
}
