// Parser demonstration
// Shows the trees the default math evaluator builds for `={...}` substitutions
// and `match` conditions, and what they evaluate to.

use cascade_tpl::math::{DefaultMath, MathEvaluator};
use cascade_tpl::parser;
use cascade_tpl::value::{Map, Value};

fn main() {
    println!("Expression Parser Demo\n");
    println!("======================\n");

    let mut bindings = Map::new();
    bindings.insert("replicas".to_string(), Value::from(3));
    bindings.insert("env".to_string(), Value::from("prod"));
    let mut limits = Map::new();
    limits.insert("cpu".to_string(), Value::from(0.5));
    bindings.insert("limits".to_string(), Value::object(limits));

    let examples = [
        ("Arithmetic", "1 + 2 * 3"),
        ("Power is right-associative", "2 ^ 3 ^ 2"),
        ("Dotted binding", "$limits.cpu * replicas"),
        ("Comparison", "env == 'prod' and replicas >= 3"),
        ("Ternary", "replicas > 5 ? 'large' : 'small'"),
        ("Function call", "max(replicas, 10) - min(1, 2)"),
        ("Undefined symbol", "missing + 1"),
        ("Syntax error", "(1 + 2"),
    ];

    for (i, (title, expr)) in examples.iter().enumerate() {
        println!("Example {}: {}", i + 1, title);
        match parser::parse(expr) {
            Ok(ast) => {
                println!("  '{}' => {:?}", expr, ast);
                match DefaultMath.evaluate(expr, &bindings) {
                    Ok(value) => println!("  value: {}\n", value),
                    Err(e) => println!("  Error: {}\n", e),
                }
            }
            Err(e) => println!("  Error: {}\n", e),
        }
    }
}
