// cascade-tpl - Cascading configuration templates
// Copyright (c) 2025 cascade-tpl contributors
// Licensed under the MIT License

//! # cascade-tpl
//!
//! Evaluates configuration documents (JSON-like trees) that carry their own templating:
//! string interpolation, precedence-gated cascading merges and extension functions.
//!
//! ## Architecture
//!
//! - `value` - Value tree shared by every stage
//! - `key` - Key classification (plain, escaped, function call, merge key, ...)
//! - `evaluator` - Cascade/merge evaluator walking the tree
//! - `interpolate` - Interpolation engine for `${ref}`, `={math}`, `^{fetch}`, `$(shell)`
//! - `bridge` - Answers interpolation requests from the current layer
//! - `cascade` - Selector weights and the `=` / `+` / `-` merge primitives
//! - `functions` - Built-in functions (`each`, `map`, `reduce`, `select`, ...)
//! - `registry` - Functions, resolvers and external evaluators, injected per evaluation
//! - `state`, `error_path`, `errors` - Scopes, error-path tracking and error reporting
//! - `parser`, `ast`, `math` - Default expression evaluator
//!
//! ## Example
//!
//! ```
//! use cascade_tpl::{evaluate, value};
//!
//! let doc = value!({
//!     "<select": {"prod": 1},
//!     "=": {"replicas": 1},
//!     "=(prod)": {"replicas": 3}
//! });
//! let out = evaluate(&doc, None).unwrap();
//! assert_eq!(out, value!({"replicas": 3}));
//! ```

use thiserror::Error;

pub mod ast;
pub mod bridge;
pub mod cascade;
pub mod error_path;
pub mod errors;
pub mod evaluator;
pub mod functions;
pub mod interpolate;
pub mod key;
pub mod math;
pub mod options;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod signature;
pub mod stack;
pub mod state;
pub mod utils;
pub mod value;

pub use errors::{ErrorKind, EvaluatorError};
pub use evaluator::Evaluator;
pub use options::EvalOptions;
pub use registry::{CommandRunner, Function, Registry};
pub use resolver::{ResolvedBranch, Resolver, StaticResolver};
pub use value::{Map, Value};

/// Errors from the JSON convenience API.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Evaluation(#[from] EvaluatorError),
}

/// Evaluate `trunk` with the built-in registry and default options.
///
/// `base`, when given, is evaluated first and seeds the bindings, stack and
/// selectors `trunk` sees.
pub fn evaluate(trunk: &Value, base: Option<&Value>) -> Result<Value, EvaluatorError> {
    let registry = Registry::new();
    Evaluator::new(&registry).evaluate(trunk, base)
}

/// Evaluate a JSON document and return the result as pretty-printed JSON.
///
/// # Examples
///
/// ```
/// let out = cascade_tpl::evaluate_json(r#"{"x": "1", "y": "a${x}b"}"#, None).unwrap();
/// assert!(out.contains(r#""y": "a1b""#));
/// ```
pub fn evaluate_json(config: &str, base: Option<&str>) -> Result<String, Error> {
    let trunk = Value::from_json_str(config)?;
    let base = base.map(Value::from_json_str).transpose()?;
    let result = evaluate(&trunk, base.as_ref())?;
    Ok(result.to_json_string_pretty()?)
}
