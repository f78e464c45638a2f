// Evaluation options

use serde::Deserialize;

/// Knobs for one evaluation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    /// Unresolved references fail instead of expanding to nothing, and math
    /// expressions only see the `stack` bindings.
    pub strict: bool,
    /// Maximum nesting of structural evaluation before giving up.
    pub max_recursion_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            strict: false,
            max_recursion_depth: 302,
        }
    }
}

impl EvalOptions {
    pub fn strict() -> Self {
        EvalOptions {
            strict: true,
            ..Default::default()
        }
    }

    /// Load options from JSON. Missing fields keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = EvalOptions::default();
        assert!(!options.strict);
        assert_eq!(options.max_recursion_depth, 302);
    }

    #[test]
    fn test_from_json_partial() {
        let options = EvalOptions::from_json_str(r#"{"strict": true}"#).unwrap();
        assert!(options.strict);
        assert_eq!(options.max_recursion_depth, 302);

        let options = EvalOptions::from_json_str(r#"{"max_recursion_depth": 10}"#).unwrap();
        assert!(!options.strict);
        assert_eq!(options.max_recursion_depth, 10);
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        assert!(EvalOptions::from_json_str(r#"{"strict": "yes"}"#).is_err());
    }
}
