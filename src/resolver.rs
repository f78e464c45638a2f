// Branch resolution
//
// Fetch substitutions (`^locator`) are answered by resolvers registered on the
// Registry. Locating and loading branches is up to the resolver; the evaluator only
// evaluates the `ast` each resolved branch carries.

use crate::errors::EvaluatorError;
use crate::state::Layer;
use crate::value::{Map, Value};

/// One branch returned by a resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBranch {
    /// Locator fields identifying the branch (organization, name, version, ...).
    pub locator: Map,
    /// Source text of the branch as loaded.
    pub text: String,
    /// The decoded document tree, evaluated by the caller.
    pub ast: Value,
}

impl ResolvedBranch {
    pub fn new(locator: Map, text: impl Into<String>, ast: Value) -> Self {
        ResolvedBranch {
            locator,
            text: text.into(),
            ast,
        }
    }

    /// Render the locator fields as `a/b/c` for diagnostics.
    pub fn encoded_locator(&self) -> String {
        self.locator
            .values()
            .map(Value::to_text)
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// A branch resolver.
pub trait Resolver {
    /// Whether this resolver handles `locator`.
    fn matches(&self, locator: &str) -> bool;

    /// Resolve `locator`. The layer is the scope the fetch happens in.
    fn resolve(&self, locator: &str, layer: &Layer) -> Result<Vec<ResolvedBranch>, EvaluatorError>;
}

/// Serves one fixed document under an exact name.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    name: String,
    branch: ResolvedBranch,
}

impl StaticResolver {
    pub fn new(name: impl Into<String>, ast: Value) -> Self {
        let name = name.into();
        let mut locator = Map::new();
        locator.insert("name".to_string(), Value::from(name.as_str()));
        let text = ast.to_json_string().unwrap_or_default();
        StaticResolver {
            branch: ResolvedBranch::new(locator, text, ast),
            name,
        }
    }
}

impl Resolver for StaticResolver {
    fn matches(&self, locator: &str) -> bool {
        locator == self.name
    }

    fn resolve(&self, _locator: &str, _layer: &Layer) -> Result<Vec<ResolvedBranch>, EvaluatorError> {
        Ok(vec![self.branch.clone()])
    }
}
