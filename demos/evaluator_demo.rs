// Demonstration of the cascade evaluator
//
// Walks through the main features:
// - References between siblings
// - Selector-gated replacement and union/subtract merges
// - Built-in functions (each, map, reduce, match)
// - Branch fetches through a resolver
// - Error reporting with the failing key path
//
// Set RUST_LOG=cascade_tpl=debug to watch function dispatch.

use cascade_tpl::{Evaluator, Registry, StaticResolver, Value};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn show(title: &str, registry: &Registry, trunk: serde_json::Value, base: Option<serde_json::Value>) {
    println!("{}", title);
    let trunk = Value::from(trunk);
    let base = base.map(Value::from);
    println!("  input:  {}", trunk);
    match Evaluator::new(registry).evaluate(&trunk, base.as_ref()) {
        Ok(out) => println!("  output: {}\n", out),
        Err(e) => println!("  error:  {}\n", e),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Cascade Evaluator Demo ===\n");

    let mut registry = Registry::new();
    registry.register_resolver(
        "static",
        StaticResolver::new("shared/postgres", Value::from(json!({"image": "postgres:16", "port": 5432}))),
    );

    show(
        "Example 1: References",
        &registry,
        json!({"name": "api", "domain": "example.com", "host": "${name}.${domain}", "url": "https://${host}/"}),
        None,
    );

    show(
        "Example 2: Selectors and merges",
        &registry,
        json!({
            "<select": {"prod": 2, "eu": 1},
            "=": {"replicas": 1, "regions": ["us"], "debug": true},
            "=replicas(prod)": 5,
            "=replicas(eu)": 2,
            "+regions(eu)": ["eu-west"],
            "-(prod)": {"debug": true}
        }),
        None,
    );

    show(
        "Example 3: Stack bindings from a base layer",
        &registry,
        json!({"image": "registry.local/${stack.app}:${stack.tag}"}),
        Some(json!({"<stack": {"app": "web", "tag": "1.4.2"}})),
    );

    show(
        "Example 4: map and reduce",
        &registry,
        json!({
            "ports": {"<map": {"from": {"http": 80, "https": 443}, "to": "=$value + 8000"}},
            "total": {"<reduce": {"each": [1, 2, 3, 4], "with": "=$memo + $value"}}
        }),
        None,
    );

    show(
        "Example 5: match",
        &registry,
        json!({"size": {"<match": {"cpus > 8": "large", "cpus > 2": "medium", "default": "small"}}}),
        Some(json!({"cpus": 4})),
    );

    show(
        "Example 6: Fetching a branch",
        &registry,
        json!({"db": "^{shared/postgres}"}),
        None,
    );

    show(
        "Example 7: Errors carry the failing path",
        &registry,
        json!({"services": [{"ok": 1}, {"bad": {"<frobnicate": {}}}]}),
        None,
    );
}
