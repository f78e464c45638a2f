// Utility functions and helpers shared by the built-in functions

use crate::value::Value;

/// Convert value to array (wraps non-arrays, Null becomes empty)
pub fn to_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(arr) => arr.as_ref().clone(),
        Value::Null => Vec::new(),
        _ => vec![value.clone()],
    }
}

/// Flatten nested arrays; the values of a mapping count as its elements
pub fn flatten(value: &Value) -> Vec<Value> {
    let mut result = Vec::new();
    for item in value.elements() {
        if item.is_array() {
            result.extend(flatten(&item));
        } else {
            result.push(item);
        }
    }
    result
}

/// Numeric view of a value for summing: numbers as is, numeric strings parsed
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    #[test]
    fn test_to_array() {
        let arr = to_array(&Value::from(42));
        assert_eq!(arr, vec![Value::from(42)]);

        let arr2 = to_array(&value!([1, 2]));
        assert_eq!(arr2.len(), 2);

        assert!(to_array(&Value::Null).is_empty());
    }

    #[test]
    fn test_flatten() {
        let flat = flatten(&value!([1, [2, 3], 4]));
        assert_eq!(flat.len(), 4);

        let from_map = flatten(&value!({"a": 1, "b": [2, 3]}));
        assert_eq!(from_map, vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&Value::from(2)), Some(2.0));
        assert_eq!(as_number(&Value::from(" 1.5 ")), Some(1.5));
        assert_eq!(as_number(&Value::from("x")), None);
        assert_eq!(as_number(&Value::Null), None);
    }
}
