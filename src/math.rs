// Default math / condition evaluator
//
// Used for `=` substitutions and `match` case conditions unless the registry is
// given another implementation.

use crate::ast::{AstNode, BinaryOp, UnaryOp};
use crate::errors::EvaluatorError;
use crate::parser;
use crate::value::{Map, Value};

/// The external expression evaluator seam.
pub trait MathEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Map) -> Result<Value, EvaluatorError>;
}

/// Tree-walking evaluator over the crate's own expression grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMath;

impl MathEvaluator for DefaultMath {
    fn evaluate(&self, expression: &str, bindings: &Map) -> Result<Value, EvaluatorError> {
        let ast = parser::parse(expression)
            .map_err(|e| EvaluatorError::expression(format!("{} in '{}'", e, expression)))?;
        eval(&ast, bindings)
    }
}

fn lookup(segments: &[String], bindings: &Map) -> Result<Value, EvaluatorError> {
    let undefined = || EvaluatorError::expression(format!("Undefined symbol {}", segments.join(".")));
    let (first, rest) = segments.split_first().ok_or_else(undefined)?;
    let mut current = bindings.get(first).ok_or_else(undefined)?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        }
        .ok_or_else(undefined)?;
    }
    Ok(current.clone())
}

fn to_number(value: &Value) -> Result<f64, EvaluatorError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EvaluatorError::expression(format!("Cannot convert \"{}\" to a number", s))),
        other => Err(EvaluatorError::expression(format!(
            "Cannot convert {} to a number",
            other
        ))),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<bool, EvaluatorError> {
    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return Ok(match op {
            BinaryOp::Equal => a == b,
            BinaryOp::NotEqual => a != b,
            BinaryOp::LessThan => a < b,
            BinaryOp::LessThanOrEqual => a <= b,
            BinaryOp::GreaterThan => a > b,
            _ => a >= b,
        });
    }
    if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
        let equal = match (to_number(lhs), to_number(rhs)) {
            (Ok(a), Ok(b)) => a == b,
            _ => lhs == rhs,
        };
        return Ok(if op == BinaryOp::Equal { equal } else { !equal });
    }
    let (a, b) = (to_number(lhs)?, to_number(rhs)?);
    Ok(match op {
        BinaryOp::LessThan => a < b,
        BinaryOp::LessThanOrEqual => a <= b,
        BinaryOp::GreaterThan => a > b,
        _ => a >= b,
    })
}

fn call(name: &str, args: &[Value]) -> Result<Value, EvaluatorError> {
    let numbers = args.iter().map(to_number).collect::<Result<Vec<f64>, _>>()?;
    let unary = |f: fn(f64) -> f64| match numbers.as_slice() {
        [n] => Ok(Value::from(f(*n))),
        _ => Err(EvaluatorError::expression(format!(
            "{}() takes exactly one argument",
            name
        ))),
    };
    match name {
        "abs" => unary(f64::abs),
        "ceil" => unary(f64::ceil),
        "floor" => unary(f64::floor),
        "round" => unary(f64::round),
        "sqrt" => unary(f64::sqrt),
        "min" | "max" if numbers.is_empty() => Err(EvaluatorError::expression(format!(
            "{}() needs at least one argument",
            name
        ))),
        "min" => Ok(Value::from(numbers.iter().copied().fold(f64::INFINITY, f64::min))),
        "max" => Ok(Value::from(numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max))),
        _ => Err(EvaluatorError::expression(format!("Undefined function {}", name))),
    }
}

fn eval(node: &AstNode, bindings: &Map) -> Result<Value, EvaluatorError> {
    match node {
        AstNode::String(s) => Ok(Value::from(s.as_str())),
        AstNode::Number(n) => Ok(Value::from(*n)),
        AstNode::Boolean(b) => Ok(Value::from(*b)),
        AstNode::Null => Ok(Value::Null),
        AstNode::Path(segments) => lookup(segments, bindings),
        AstNode::Unary { op, operand } => {
            let value = eval(operand, bindings)?;
            match op {
                UnaryOp::Negate => Ok(Value::from(-to_number(&value)?)),
                UnaryOp::Not => Ok(Value::from(!value.is_truthy())),
            }
        }
        AstNode::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if eval(condition, bindings)?.is_truthy() {
                eval(then_branch, bindings)
            } else {
                eval(else_branch, bindings)
            }
        }
        AstNode::Function { name, args } => {
            let args = args
                .iter()
                .map(|a| eval(a, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &args)
        }
        // Logical operators short-circuit
        AstNode::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => Ok(Value::from(
            eval(lhs, bindings)?.is_truthy() && eval(rhs, bindings)?.is_truthy(),
        )),
        AstNode::Binary {
            op: BinaryOp::Or,
            lhs,
            rhs,
        } => Ok(Value::from(
            eval(lhs, bindings)?.is_truthy() || eval(rhs, bindings)?.is_truthy(),
        )),
        AstNode::Binary { op, lhs, rhs } => {
            let left = eval(lhs, bindings)?;
            let right = eval(rhs, bindings)?;
            match op {
                BinaryOp::Add => match (to_number(&left), to_number(&right)) {
                    (Ok(a), Ok(b)) => Ok(Value::from(a + b)),
                    _ if left.is_string() || right.is_string() => {
                        Ok(Value::from(format!("{}{}", left.to_text(), right.to_text())))
                    }
                    (Err(e), _) | (_, Err(e)) => Err(e),
                },
                BinaryOp::Subtract => Ok(Value::from(to_number(&left)? - to_number(&right)?)),
                BinaryOp::Multiply => Ok(Value::from(to_number(&left)? * to_number(&right)?)),
                BinaryOp::Divide => Ok(Value::from(to_number(&left)? / to_number(&right)?)),
                BinaryOp::Modulo => Ok(Value::from(to_number(&left)? % to_number(&right)?)),
                BinaryOp::Power => Ok(Value::from(to_number(&left)?.powf(to_number(&right)?))),
                _ => Ok(Value::from(compare(*op, &left, &right)?)),
            }
        }
    }
}
