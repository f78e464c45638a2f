// Evaluation errors
//
// Every failure is a single structured type carrying what went wrong, the error-path
// snapshot at the point of failure and, where useful, the fragment being evaluated.

use std::fmt;

use thiserror::Error;

use crate::error_path::{ErrorPaths, PathFrame};
use crate::state::Layer;
use crate::value::Value;

/// What kind of failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A function-marked key names no registered function.
    UnknownFunction,
    /// A built-in was called without a sub-key it requires.
    MissingRequiredArgument,
    /// No bound value for a reference path (strict mode).
    UnresolvedReference,
    /// A branch locator matched nothing, or a resolver failed.
    ResolverFailure,
    /// An `assert` function was reached.
    UserAssertion,
    /// The math/boolean expression evaluator rejected an expression.
    ExpressionEvaluationFailure,
    /// The command runner failed.
    CommandFailure,
    /// Evaluation nested deeper than the configured limit.
    RecursionLimit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownFunction => "unknown function",
            ErrorKind::MissingRequiredArgument => "missing required argument",
            ErrorKind::UnresolvedReference => "unresolved reference",
            ErrorKind::ResolverFailure => "resolver failure",
            ErrorKind::UserAssertion => "assertion",
            ErrorKind::ExpressionEvaluationFailure => "expression error",
            ErrorKind::CommandFailure => "command failure",
            ErrorKind::RecursionLimit => "recursion limit",
        };
        f.write_str(name)
    }
}

/// Evaluator errors
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}{}", format_location(.path))]
pub struct EvaluatorError {
    pub kind: ErrorKind,
    pub message: String,
    /// Error-path stack captured where the failure happened.
    pub path: Option<Vec<PathFrame>>,
    pub source_fragment: Option<Value>,
}

fn format_location(path: &Option<Vec<PathFrame>>) -> String {
    match path {
        Some(frames) => {
            let rendered: Vec<String> = frames
                .iter()
                .filter(|f| !f.segments.is_empty())
                .map(|f| f.to_string())
                .collect();
            if rendered.is_empty() {
                String::new()
            } else {
                format!(" (at {})", rendered.join(" "))
            }
        }
        None => String::new(),
    }
}

impl EvaluatorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        EvaluatorError {
            kind,
            message: message.into(),
            path: None,
            source_fragment: None,
        }
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(ErrorKind::UnknownFunction, format!("no known function {}", name))
    }

    pub fn missing_argument(function: &str, argument: &str) -> Self {
        Self::new(
            ErrorKind::MissingRequiredArgument,
            format!("for {} please supply '{}:'", function, argument),
        )
    }

    pub fn unresolved(path: &str) -> Self {
        Self::new(
            ErrorKind::UnresolvedReference,
            format!("no value for required keypath {}", path),
        )
    }

    pub fn resolver(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResolverFailure, message)
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExpressionEvaluationFailure, message)
    }

    /// Attach the path snapshot unless one was already captured deeper down.
    pub fn or_path(mut self, paths: &ErrorPaths) -> Self {
        if self.path.is_none() {
            self.path = Some(paths.snapshot());
        }
        self
    }

    pub fn with_source(mut self, fragment: Value) -> Self {
        if self.source_fragment.is_none() {
            self.source_fragment = Some(fragment);
        }
        self
    }

    /// Segments of the innermost frame of the captured path.
    pub fn current_path(&self) -> Vec<String> {
        self.path
            .as_ref()
            .and_then(|frames| frames.last())
            .map(|f| f.segments.clone())
            .unwrap_or_default()
    }
}

/// The single error-handling collaborator used at every structural node.
///
/// Fills in whatever context is still missing and hands the error back for
/// propagation; evaluation never recovers from an error here.
pub fn handle_error(err: EvaluatorError, layer: &Layer, input: &Value) -> EvaluatorError {
    let err = err.or_path(&layer.state.error_paths).with_source(input.clone());
    tracing::debug!(kind = %err.kind, path = %layer.state.error_paths.current_path(), "{}", err.message);
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_path() {
        let err = EvaluatorError::unknown_function("frobnicate");
        assert_eq!(err.to_string(), "unknown function: no known function frobnicate");
    }

    #[test]
    fn test_display_with_path() {
        let mut paths = ErrorPaths::new();
        paths.push_segment("servers");
        paths.push_segment("1");
        let err = EvaluatorError::missing_argument("each", "of").or_path(&paths);
        assert_eq!(
            err.to_string(),
            "missing required argument: for each please supply 'of:' (at servers.1)"
        );
        assert_eq!(err.current_path(), vec!["servers".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_first_path_wins() {
        let mut inner = ErrorPaths::new();
        inner.push_segment("deep");
        let outer = ErrorPaths::new();
        let err = EvaluatorError::unresolved("x").or_path(&inner).or_path(&outer);
        assert_eq!(err.current_path(), vec!["deep".to_string()]);
    }
}
