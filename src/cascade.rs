// Cascade primitives: merge-key parsing, selector weights and the three merge
// operations applied by a construct's `=`, `+` and `-` passes

use std::fmt;

use crate::key;
use crate::value::{Map, Value};

/// The operators that drive the built-in cascade passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOperator {
    Replace,
    Union,
    Subtract,
}

impl MergeOperator {
    /// Pass order.
    pub const PASSES: [MergeOperator; 3] = [
        MergeOperator::Replace,
        MergeOperator::Union,
        MergeOperator::Subtract,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '=' => Some(MergeOperator::Replace),
            '+' => Some(MergeOperator::Union),
            '-' => Some(MergeOperator::Subtract),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            MergeOperator::Replace => '=',
            MergeOperator::Union => '+',
            MergeOperator::Subtract => '-',
        }
    }

    /// Only replacement is gated by selector precedence.
    pub fn uses_precedence(self) -> bool {
        self == MergeOperator::Replace
    }

    pub fn apply(self, lhs: Value, rhs: Value) -> Value {
        match self {
            MergeOperator::Replace => replace(lhs, rhs),
            MergeOperator::Union => union(lhs, rhs),
            MergeOperator::Subtract => subtract(lhs, rhs),
        }
    }
}

impl fmt::Display for MergeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A parsed construct key: `<op>[target][(selector)]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeKey {
    pub operator: MergeOperator,
    /// Dotted path the value is merged at; empty for the node itself.
    pub target: Vec<String>,
    pub selector: String,
}

impl MergeKey {
    pub fn parse(key: &str) -> Option<MergeKey> {
        if !key::is_merge_key(key) {
            return None;
        }
        let mut chars = key.chars();
        let operator = MergeOperator::from_char(chars.next()?)?;
        let rest = chars.as_str();

        let (target, selector) = match (rest.find('('), rest.strip_suffix(')')) {
            (Some(open), Some(inner)) => (&rest[..open], &inner[open + 1..]),
            _ => ("", rest),
        };
        let target = target
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Some(MergeKey {
            operator,
            target,
            selector: selector.trim().to_string(),
        })
    }

    pub fn site(&self) -> String {
        self.target.join(".")
    }
}

/// Weight of one selector name, or `None` if it is not selected.
fn name_weight(name: &str, selectors: &Map) -> Option<f64> {
    let weight = match selectors.get(name)? {
        Value::Number(n) => *n,
        Value::Bool(true) => 1.0,
        _ => return None,
    };
    (weight > 0.0).then_some(weight)
}

/// Resolve a selector expression against the current selector table.
///
/// The empty expression is the base case: always selected with weight 0.
/// `a|b` takes the best selected alternative, `a&b` requires every part and sums
/// their weights.
pub fn selector_weight(expression: &str, selectors: &Map) -> Option<f64> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Some(0.0);
    }
    expression
        .split('|')
        .filter_map(|alternative| {
            alternative
                .split('&')
                .map(|name| name_weight(name.trim(), selectors))
                .sum::<Option<f64>>()
        })
        .fold(None, |best: Option<f64>, w| {
            Some(best.map_or(w, |b| b.max(w)))
        })
}

/// `=`: an object onto an object overwrites key by key, anything else replaces.
pub fn replace(lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Object(mut l), Value::Object(r)) => {
            let map = std::rc::Rc::make_mut(&mut l);
            for (k, v) in r.iter() {
                map.insert(k.clone(), v.clone());
            }
            Value::Object(l)
        }
        (_, rhs) => rhs,
    }
}

/// `+`: deep union. Objects merge recursively, arrays concatenate, scalars on the
/// right win and a missing left side takes the right side as is.
pub fn union(lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Null, rhs) => rhs,
        (Value::Object(mut l), Value::Object(r)) => {
            let map = std::rc::Rc::make_mut(&mut l);
            for (k, v) in r.iter() {
                let merged = match map.get(k) {
                    Some(existing) => union(existing.clone(), v.clone()),
                    None => v.clone(),
                };
                map.insert(k.clone(), merged);
            }
            Value::Object(l)
        }
        (Value::Array(mut l), Value::Array(r)) => {
            std::rc::Rc::make_mut(&mut l).extend(r.iter().cloned());
            Value::Array(l)
        }
        (_, rhs) => rhs,
    }
}

/// `-`: remove from the left whatever the right names.
///
/// An object on the right removes its keys (recursing where both sides hold
/// objects); a sequence or string on the right names keys to remove from an object,
/// or elements to remove from a sequence.
pub fn subtract(lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Object(mut l), Value::Object(r)) => {
            let map = std::rc::Rc::make_mut(&mut l);
            for (k, v) in r.iter() {
                match (map.get(k).cloned(), v) {
                    (Some(existing @ Value::Object(_)), Value::Object(_)) => {
                        map.insert(k.clone(), subtract(existing, v.clone()));
                    }
                    _ => {
                        map.shift_remove(k);
                    }
                }
            }
            Value::Object(l)
        }
        (Value::Object(mut l), Value::Array(r)) => {
            let map = std::rc::Rc::make_mut(&mut l);
            for name in r.iter() {
                map.shift_remove(&name.to_text());
            }
            Value::Object(l)
        }
        (Value::Object(mut l), Value::String(name)) => {
            std::rc::Rc::make_mut(&mut l).shift_remove(name.as_ref());
            Value::Object(l)
        }
        (Value::Array(l), Value::Array(r)) => {
            Value::array(l.iter().filter(|e| !r.contains(e)).cloned().collect())
        }
        (Value::Array(l), rhs) => Value::array(l.iter().filter(|e| **e != rhs).cloned().collect()),
        (lhs, _) => lhs,
    }
}

/// Apply `operator` at `path` inside `acc`, creating intermediate objects as needed.
pub fn merge_at(acc: Value, path: &[String], operator: MergeOperator, rhs: Value) -> Value {
    let Some((head, rest)) = path.split_first() else {
        return operator.apply(acc, rhs);
    };
    let mut map = match acc {
        Value::Object(map) => map,
        _ => std::rc::Rc::new(Map::new()),
    };
    let inner = std::rc::Rc::make_mut(&mut map);
    match inner.get(head).cloned() {
        Some(existing) => {
            let merged = merge_at(existing, rest, operator, rhs);
            inner.insert(head.clone(), merged);
        }
        None if operator == MergeOperator::Subtract => {}
        None => {
            let merged = merge_at(Value::Null, rest, operator, rhs);
            inner.insert(head.clone(), merged);
        }
    }
    Value::Object(map)
}

/// A mapping is a construct when any key is a merge key or a function key.
pub fn is_construct(map: &Map) -> bool {
    map.keys()
        .any(|k| key::is_merge_key(k) || key::is_function_key(k))
}
