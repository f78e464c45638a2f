// Evaluation context: per-scope State and the (data, state) Layer threaded
// through every recursive call

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error_path::ErrorPaths;
use crate::value::{Map, Value};

/// Where key writes of the mapping currently being evaluated land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// The node under construction.
    #[default]
    Data,
    /// `state.stack`, set by the `stack` / `$` scope functions.
    Stack,
    /// `state.selectors`, set by `select`.
    Selectors,
}

/// Merge bookkeeping for the construct being evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeState {
    /// The operator whose right-hand side is being evaluated, if any.
    pub operator: Option<char>,
    /// Highest weight applied so far, per operator.
    pub precedence: HashMap<char, f64>,
}

impl MergeState {
    pub fn precedence_of(&self, operator: char) -> f64 {
        self.precedence.get(&operator).copied().unwrap_or(0.0)
    }
}

/// Per-scope record.
#[derive(Debug, Clone)]
pub struct State {
    /// Bindings accumulated from already-evaluated siblings and ancestors.
    pub auto: Map,
    /// Bindings pushed explicitly by scope functions.
    pub stack: Map,
    /// Named precedence weights.
    pub selectors: Map,
    pub merge: MergeState,
    pub target: Target,
    /// Binding name to the key path it was written from.
    pub auto_map: IndexMap<String, Vec<String>>,
    pub error_paths: ErrorPaths,
    pub locked: bool,
    pub strict: bool,
}

impl Default for State {
    fn default() -> Self {
        State {
            auto: Map::new(),
            stack: Map::new(),
            selectors: Map::new(),
            merge: MergeState::default(),
            target: Target::Data,
            auto_map: IndexMap::new(),
            error_paths: ErrorPaths::new(),
            locked: false,
            strict: false,
        }
    }
}

impl State {
    pub fn new(strict: bool) -> Self {
        State {
            strict,
            ..Default::default()
        }
    }

    /// Independent copy for a child frame.
    ///
    /// Bindings and selectors are copied by value; merge precedence starts over and
    /// writes go back to the child's own node.
    pub fn child(&self) -> State {
        State {
            auto: self.auto.clone(),
            stack: self.stack.clone(),
            selectors: self.selectors.clone(),
            merge: MergeState {
                operator: self.merge.operator,
                precedence: HashMap::new(),
            },
            target: Target::Data,
            auto_map: self.auto_map.clone(),
            error_paths: self.error_paths.clone(),
            locked: self.locked,
            strict: self.strict,
        }
    }

    /// Record a finished key: bind it and remember where it came from.
    pub fn bind(&mut self, key: &str, value: Value) {
        self.auto.insert(key.to_string(), value);
        self.auto_map
            .insert(key.to_string(), self.error_paths.current().segments.clone());
    }

    /// The mapping that receives writes when the target is redirected.
    pub fn redirected_target(&mut self) -> Option<&mut Map> {
        match self.target {
            Target::Data => None,
            Target::Stack => Some(&mut self.stack),
            Target::Selectors => Some(&mut self.selectors),
        }
    }
}

/// One evaluation frame: the raw input being evaluated plus its scope.
#[derive(Debug, Clone)]
pub struct Layer {
    pub data: Value,
    pub state: State,
}

impl Layer {
    pub fn new(data: Value, state: State) -> Self {
        Layer { data, state }
    }

    pub fn root(strict: bool) -> Self {
        Layer::new(Value::Null, State::new(strict))
    }

    pub fn child(&self) -> Layer {
        Layer {
            data: self.data.clone(),
            state: self.state.child(),
        }
    }

    /// Names visible to references: `auto`, overridden by the inline data (when it
    /// is a mapping), overridden by `stack`. The whole stack is also reachable as
    /// `stack.*` unless a binding named `stack` already exists.
    pub fn dictionary(&self) -> Value {
        let mut dict = self.state.auto.clone();
        if let Value::Object(data) = &self.data {
            for (k, v) in data.iter() {
                dict.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in self.state.stack.iter() {
            dict.insert(k.clone(), v.clone());
        }
        if !dict.contains_key("stack") {
            dict.insert("stack".to_string(), Value::object(self.state.stack.clone()));
        }
        Value::object(dict)
    }

    /// Bindings handed to the math evaluator. Strict scopes only expose the stack.
    pub fn math_bindings(&self) -> Map {
        if self.state.strict {
            let mut bindings = Map::new();
            bindings.insert("stack".to_string(), Value::object(self.state.stack.clone()));
            return bindings;
        }
        match self.dictionary() {
            Value::Object(map) => map.as_ref().clone(),
            _ => Map::new(),
        }
    }
}
