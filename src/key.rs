// Key classification
//
// Every mapping key is sniffed exactly once by its first/last characters and turned
// into a closed KeyKind the evaluator matches on exhaustively.

use crate::value::{Map, Value};

/// Operator characters recognised after a leading `<` in a function key.
pub const MERGE_OPERATORS: [char; 8] = ['=', '+', '|', '^', '*', '&', '-', '?'];

/// Operators that drive the built-in cascade passes, in pass order.
pub const CONSTRUCT_OPERATORS: [char; 3] = ['=', '+', '-'];

/// What a function-marked key calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKey {
    /// Bare `<`: evaluate the argument in the enclosing layer.
    Closure,
    /// `<` followed by a merge operator and a selector expression.
    MergeOperator { operator: char, selector: String },
    /// `<name` or `name<`.
    Named(String),
}

/// The closed set of key kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// `\key`: written as `key` with no further transformation.
    Escaped(String),
    FunctionCall(FunctionKey),
    /// `$…`: the key text is interpolated to obtain the write key.
    DynamicKey,
    /// `key>`: stored without evaluation.
    RawAssign(String),
    /// `key?`: reuse an existing binding for `key` when there is one.
    OptionalRef(String),
    Plain,
}

pub fn is_function_key(key: &str) -> bool {
    key.starts_with('<') || key.ends_with('<')
}

/// Keys that take part in a construct's `=`/`+`/`-` passes.
pub fn is_merge_key(key: &str) -> bool {
    !is_function_key(key) && key.starts_with(CONSTRUCT_OPERATORS)
}

pub fn parse_function_key(key: &str) -> FunctionKey {
    if key == "<" {
        return FunctionKey::Closure;
    }
    if let Some(rest) = key.strip_prefix('<') {
        let mut chars = rest.chars();
        if let Some(op) = chars.next() {
            if MERGE_OPERATORS.contains(&op) {
                return FunctionKey::MergeOperator {
                    operator: op,
                    selector: chars.as_str().to_string(),
                };
            }
        }
        return FunctionKey::Named(rest.to_string());
    }
    let name = key.strip_suffix('<').unwrap_or(key);
    FunctionKey::Named(name.to_string())
}

/// Classify a key. Checks run in a fixed order; the first match wins.
pub fn classify(key: &str) -> KeyKind {
    if let Some(base) = key.strip_suffix('?') {
        if !base.is_empty() {
            return KeyKind::OptionalRef(base.to_string());
        }
    }
    if is_function_key(key) {
        return KeyKind::FunctionCall(parse_function_key(key));
    }
    if key.starts_with('$') {
        return KeyKind::DynamicKey;
    }
    if let Some(rest) = key.strip_prefix('\\') {
        return KeyKind::Escaped(rest.to_string());
    }
    if let Some(name) = key.strip_suffix('>') {
        return KeyKind::RawAssign(name.to_string());
    }
    KeyKind::Plain
}

/// Spread `~a.b` keys into nested mappings: `{"~a.b": 1}` becomes `{"a": {"b": 1}}`.
///
/// Keys are applied in order, so a later key overwrites an earlier one on the same
/// path. Returns `None` when the mapping has no such key.
pub fn expand_dotted(map: &Map) -> Option<Map> {
    if !map.keys().any(|k| k.starts_with('~') && k.contains('.')) {
        return None;
    }
    let mut out = Map::new();
    for (key, value) in map.iter() {
        match key.strip_prefix('~').filter(|path| path.contains('.')) {
            Some(path) => {
                let segments: Vec<&str> = path.split('.').collect();
                set_path(&mut out, &segments, value.clone());
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Some(out)
}

fn set_path(target: &mut Map, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => {
            target.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = target
                .entry(head.to_string())
                .or_insert_with(Value::empty_object);
            if !slot.is_object() {
                *slot = Value::empty_object();
            }
            if let Some(inner) = slot.as_object_mut() {
                set_path(inner, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    #[test]
    fn test_classify_order() {
        assert_eq!(classify("name"), KeyKind::Plain);
        assert_eq!(classify("name?"), KeyKind::OptionalRef("name".into()));
        assert_eq!(classify("<each?"), KeyKind::OptionalRef("<each".into()));
        assert_eq!(classify("$name>"), KeyKind::DynamicKey);
        assert_eq!(classify("\\<literal"), KeyKind::Escaped("<literal".into()));
        assert_eq!(classify("\\$literal"), KeyKind::Escaped("$literal".into()));
        assert_eq!(classify("raw>"), KeyKind::RawAssign("raw".into()));
        assert_eq!(classify("?"), KeyKind::Plain);
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(classify("<"), KeyKind::FunctionCall(FunctionKey::Closure));
        assert_eq!(
            classify("<each"),
            KeyKind::FunctionCall(FunctionKey::Named("each".into()))
        );
        assert_eq!(
            classify("map<"),
            KeyKind::FunctionCall(FunctionKey::Named("map".into()))
        );
        assert_eq!(
            classify("<=prod"),
            KeyKind::FunctionCall(FunctionKey::MergeOperator {
                operator: '=',
                selector: "prod".into()
            })
        );
        assert_eq!(
            classify("<|"),
            KeyKind::FunctionCall(FunctionKey::MergeOperator {
                operator: '|',
                selector: String::new()
            })
        );
    }

    #[test]
    fn test_merge_keys() {
        assert!(is_merge_key("="));
        assert!(is_merge_key("+"));
        assert!(is_merge_key("-(prod)"));
        assert!(is_merge_key("=a.b(dev)"));
        assert!(!is_merge_key("=fn<"));
        assert!(!is_merge_key("\\=x"));
        assert!(!is_merge_key("name"));
    }

    #[test]
    fn test_expand_dotted() {
        let map = value!({"name": "db", "~conn.host": "h", "~conn.port": 5432, "~x": 1});
        let expanded = expand_dotted(map.as_object().unwrap()).unwrap();
        assert_eq!(
            Value::object(expanded),
            value!({"name": "db", "conn": {"host": "h", "port": 5432}, "~x": 1})
        );
    }

    #[test]
    fn test_expand_dotted_merges_into_existing_mapping() {
        let map = value!({"conn": {"host": "h"}, "~conn.tls.on": true, "~name.first": "a"});
        let expanded = expand_dotted(map.as_object().unwrap()).unwrap();
        assert_eq!(
            Value::object(expanded),
            value!({"conn": {"host": "h", "tls": {"on": true}}, "name": {"first": "a"}})
        );
        assert!(expand_dotted(value!({"a.b": 1}).as_object().unwrap()).is_none());
    }
}
