//! Value comparison with loose numeric coercion
//!
//! Ordering and equality comparisons coerce before comparing: numbers,
//! numeric strings and booleans all get a numeric view. Values without
//! a common view are simply unordered and ordering predicates fail
//! closed on them.

use std::cmp::Ordering;

use serde_json::Value;

/// Numeric view of a value, when one exists.
///
/// Numbers map directly, numeric strings parse, booleans map to 0/1.
/// NaN and infinities never come out of here.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Ordering between two values, if they are comparable at all.
///
/// Numeric views win; otherwise two strings compare lexicographically.
/// Everything else is unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (to_number(a), to_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Loose equality: numeric views compare numerically, everything else
/// falls back to strict structural equality.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (to_number(a), to_number(b)) {
        return x == y;
    }
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&json!(42)), Some(42.0));
        assert_eq!(to_number(&json!(-1.5)), Some(-1.5));
        assert_eq!(to_number(&json!("18")), Some(18.0));
        assert_eq!(to_number(&json!(" 3.5 ")), Some(3.5));
        assert_eq!(to_number(&json!(true)), Some(1.0));
        assert_eq!(to_number(&json!(false)), Some(0.0));
        assert_eq!(to_number(&json!("abc")), None);
        assert_eq!(to_number(&json!("")), None);
        assert_eq!(to_number(&json!(null)), None);
        assert_eq!(to_number(&json!([1])), None);
    }

    #[test]
    fn test_numeric_string_compares_numerically() {
        // "10" > "9" numerically even though "10" < "9" as strings
        assert_eq!(
            compare_values(&json!("10"), &json!("9")),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_values(&json!("18"), &json!(21)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_plain_strings_compare_lexicographically() {
        assert_eq!(
            compare_values(&json!("apple"), &json!("banana")),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&json!("b"), &json!("b")),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_incomparable_values_are_unordered() {
        assert_eq!(compare_values(&json!("abc"), &json!(5)), None);
        assert_eq!(compare_values(&json!(null), &json!(1)), None);
        assert_eq!(compare_values(&json!([1]), &json!([2])), None);
        assert_eq!(compare_values(&json!({"a": 1}), &json!({"a": 2})), None);
    }

    #[test]
    fn test_values_equal_coerces_numbers() {
        assert!(values_equal(&json!("18"), &json!(18)));
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!(true), &json!(1)));
        assert!(!values_equal(&json!("18"), &json!(19)));
    }

    #[test]
    fn test_values_equal_structural_fallback() {
        assert!(values_equal(&json!(null), &json!(null)));
        assert!(values_equal(&json!([1, 2]), &json!([1, 2])));
        assert!(values_equal(&json!({"a": 1}), &json!({"a": 1})));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!values_equal(&json!("abc"), &json!(null)));
    }
}
