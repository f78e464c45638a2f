// Value: Rc-wrapped document tree with O(1) cloning
// Every scope copy in the evaluator clones bindings, so cheap clones matter here

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A node of the configuration tree.
///
/// Scalars are stored inline; strings, sequences and mappings are wrapped in `Rc`
/// so that copying a scope (which copies every binding it holds) never deep-copies
/// a subtree. Mappings preserve insertion order.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<IndexMap<String, Value>>),
}

/// Insertion-ordered mapping used for every object in the tree.
pub type Map = IndexMap<String, Value>;

/// The integer a number prints as, when it has no fractional part and fits.
fn integral(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64).then_some(n as i64)
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Truthiness as configuration authors expect it from the templating language:
    /// `null`, `false`, `0`, `NaN` and `""` are falsy, every sequence and mapping
    /// (even an empty one) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        if let Value::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        if let Value::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        if let Value::Object(map) = self {
            Some(map)
        } else {
            None
        }
    }

    /// Mutable access to a mapping; a shared mapping is copied first.
    pub fn as_object_mut(&mut self) -> Option<&mut Map> {
        if let Value::Object(map) = self {
            Some(Rc::make_mut(map))
        } else {
            None
        }
    }

    /// Look up `key` in a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Follow a dotted key path (`a.b.0.c`). Numeric segments index sequences.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
    }

    /// Iterate `(index, key, value)` over the entries of a sequence or mapping.
    /// Sequence keys are the stringified indices; scalars have no entries.
    pub fn entries(&self) -> Vec<(usize, String, Value)> {
        match self {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i, i.to_string(), v.clone()))
                .collect(),
            Value::Object(map) => map
                .iter()
                .enumerate()
                .map(|(i, (k, v))| (i, k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The element values of a sequence, or the values of a mapping.
    pub fn elements(&self) -> Vec<Value> {
        match self {
            Value::Array(items) => items.as_ref().clone(),
            Value::Object(map) => map.values().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Render the value the way it appears when spliced into surrounding text.
    ///
    /// Strings are inserted verbatim, numbers use their shortest form, and
    /// compound values are inserted as compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn object(map: Map) -> Self {
        Value::Object(Rc::new(map))
    }

    pub fn empty_object() -> Self {
        Value::object(Map::new())
    }

    pub fn from_json_str(s: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Compact JSON rendering.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

macro_rules! from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

from_number!(i32, i64, u32, u64, usize);

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::object(map)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

/// Compact JSON, the same text `to_json_string` produces.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            // JSON has no encoding for NaN or the infinities
            Value::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            Value::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => serializer.collect_seq(items.iter()),
            Value::Object(map) => serializer.collect_map(map.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            Json::String(s) => Value::from(s),
            Json::Array(items) => items.into_iter().map(Value::from).collect::<Vec<_>>().into(),
            Json::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect::<Map>()
                .into(),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
    }
}

/// Build a [`Value`] from a JSON-like literal, in the manner of `serde_json::json!`.
///
/// `null`, `true` and `false` are keywords, `[..]` builds a sequence, `{k: v, ..}`
/// a mapping, and any other token tree goes through `Value::from`.
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::value::Value::Null
    };

    (true) => {
        $crate::value::Value::Bool(true)
    };

    (false) => {
        $crate::value::Value::Bool(false)
    };

    ([ $($item:tt),* $(,)? ]) => {
        $crate::value::Value::array(vec![ $( $crate::value!($item) ),* ])
    };

    ({ $($key:tt : $val:tt),* $(,)? }) => {{
        #[allow(unused_mut)]
        let mut entries = $crate::value::Map::new();
        $( entries.insert(($key).to_string(), $crate::value!($val)); )*
        $crate::value::Value::object(entries)
    }};

    ($other:expr) => {
        $crate::value::Value::from($other)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clones_share_storage() {
        let seq = value!([1, 2]);
        match (&seq, &seq.clone()) {
            (Value::Array(a), Value::Array(b)) => assert!(Rc::ptr_eq(a, b)),
            _ => panic!("expected sequences"),
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("0").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(Value::empty_object().is_truthy());
    }

    #[test]
    fn test_get_path() {
        let v = value!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(v.get_path("a.b.0"), Some(&Value::Number(10.0)));
        assert_eq!(v.get_path("a.b.1.c").and_then(|v| v.as_str()), Some("deep"));
        assert_eq!(v.get_path("a.missing"), None);
        assert_eq!(v.get_path("a.b.x"), None);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::string("plain").to_text(), "plain");
        assert_eq!(Value::Number(3.0).to_text(), "3");
        assert_eq!(Value::Number(2.5).to_text(), "2.5");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Number(f64::INFINITY).to_text(), "null");
        assert_eq!(value!({"a": [1, "x\"y"]}).to_text(), r#"{"a":[1,"x\"y"]}"#);
    }

    #[test]
    fn test_entries_and_elements() {
        let seq = value!(["x", "y"]);
        let entries = seq.entries();
        assert_eq!(entries[1].0, 1);
        assert_eq!(entries[1].1, "1");
        assert_eq!(entries[1].2, Value::string("y"));

        let map = value!({"k": 1, "j": 2});
        assert_eq!(map.elements(), vec![Value::from(1), Value::from(2)]);
        assert!(Value::Bool(true).entries().is_empty());
    }

    #[test]
    fn test_macro_nesting() {
        let obj = value!({"name": "web", "replicas": 3, "ports": [80, 443], "tls": null});
        assert_eq!(obj.get("name").and_then(|v| v.as_str()), Some("web"));
        assert_eq!(obj.get("replicas").and_then(|v| v.as_f64()), Some(3.0));
        assert_eq!(obj.get("ports").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));
        assert_eq!(obj.get("tls"), Some(&Value::Null));
    }

    #[test]
    fn test_json_preserves_key_order() {
        let v = Value::from_json_str(r#"{"z": 1, "a": {"y": true, "b": null}}"#).unwrap();
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(v.to_json_string().unwrap(), r#"{"z":1,"a":{"y":true,"b":null}}"#);
    }

    #[test]
    fn test_serde_json_conversions() {
        let json = serde_json::json!({"name": "db", "limits": [1, 2.5]});
        let v = Value::from(json.clone());
        assert_eq!(v.get_path("limits.1"), Some(&Value::Number(2.5)));
        assert_eq!(serde_json::Value::from(&v), json);
    }

    #[test]
    fn test_object_mut_copies_shared_map() {
        let mut a = value!({"x": 1});
        let b = a.clone();
        a.as_object_mut().unwrap().insert("y".into(), Value::from(2));
        assert_eq!(a.as_object().map(|m| m.len()), Some(2));
        assert_eq!(b.as_object().map(|m| m.len()), Some(1));
    }
}
