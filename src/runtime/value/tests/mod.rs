//! Tests for script values

use crate::runtime::value::Value;

#[test]
fn test_void_is_default_and_falsy() {
    let v = Value::default();
    assert!(v.is_void());
    assert!(!v.is_truthy());
    assert_eq!(v.type_name(), "void");
}

#[test]
fn test_numeric_conversions() {
    assert_eq!(Value::from(3).to_float(), Some(3.0));
    assert_eq!(Value::from(2.5).to_float(), Some(2.5));
    assert_eq!(Value::from(2.5).to_int(), None);
    assert_eq!(Value::from("x").as_f64(), 0.0);
}

#[test]
fn test_truthiness() {
    assert!(Value::from(true).is_truthy());
    assert!(!Value::from(0).is_truthy());
    assert!(Value::from(-0.5).is_truthy());
    assert!(!Value::from([0.0, 0.0, 0.0]).is_truthy());
    assert!(Value::from([0.0, 1.0, 0.0]).is_truthy());
    assert!(!Value::from("").is_truthy());
}

#[test]
fn test_display() {
    assert_eq!(Value::from([1.0, 2.0, 3.5]).to_string(), "<1, 2, 3.5>");
    assert_eq!(Value::from("ball").to_string(), "\"ball\"");
    assert_eq!(Value::Void.to_string(), "void");
}

#[test]
fn test_serializes_untagged() {
    let json = serde_json::to_string(&vec![
        Value::Void,
        Value::from(1),
        Value::from([0.0, 1.0, 2.0]),
        Value::from("a"),
    ])
    .unwrap();
    assert_eq!(json, r#"[null,1,[0.0,1.0,2.0],"a"]"#);
}
