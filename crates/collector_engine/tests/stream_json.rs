use collector_engine::{JsonItems, StreamError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn items(body: &str, path: &str, skip_key: Option<&str>) -> Vec<Result<Value, StreamError>> {
    JsonItems::new(body.as_bytes(), path, skip_key)
        .expect("valid path")
        .collect()
}

fn values(body: &str, path: &str) -> Vec<Value> {
    items(body, path, None)
        .into_iter()
        .map(|r| r.expect("valid document"))
        .collect()
}

#[test]
fn empty_path_selects_the_document_root() {
    assert_eq!(values(r#"{"a": 1}"#, ""), vec![json!({"a": 1})]);
    assert_eq!(values("42", ""), vec![json!(42)]);
}

#[test]
fn item_selects_each_array_element() {
    assert_eq!(values(r#"{"a": [1, 2, 3]}"#, "a.item"), vec![json!(1), json!(2), json!(3)]);
}

#[test]
fn nested_paths_descend_without_matching_siblings() {
    let body = r#"{
        "meta": {"count": 2},
        "results": [
            {"data": {"x": 1}, "noise": [9, 9]},
            {"data": {"x": 2}}
        ]
    }"#;
    assert_eq!(
        values(body, "results.item.data"),
        vec![json!({"x": 1}), json!({"x": 2})]
    );
}

#[test]
fn empty_array_yields_nothing() {
    assert!(values(r#"{"a": []}"#, "a.item").is_empty());
    assert!(values(r#"{"b": 1}"#, "a.item").is_empty());
}

#[test]
fn skip_key_omits_the_substructure_from_matched_values() {
    let body = r#"{"uri": "u", "version": "1.1", "releases": [{"big": true}]}"#;
    let got = items(body, "", Some("releases"));
    assert_eq!(got.len(), 1);
    assert_eq!(
        *got[0].as_ref().unwrap(),
        json!({"uri": "u", "version": "1.1"})
    );
}

#[test]
fn skip_key_applies_at_any_depth() {
    let body = r#"{"packages": [
        {"uri": "u1", "releases": [1, 2]},
        {"uri": "u2", "releases": [3]}
    ]}"#;
    assert_eq!(
        values(body, "packages.item"),
        vec![
            json!({"uri": "u1", "releases": [1, 2]}),
            json!({"uri": "u2", "releases": [3]})
        ]
    );
    let got: Vec<Value> = items(body, "packages.item", Some("releases"))
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(got, vec![json!({"uri": "u1"}), json!({"uri": "u2"})]);
}

#[test]
fn strings_and_escapes_round_trip() {
    let body = r#"{"a": ["café", "line\nbreak", "😀", "sla\/sh"]}"#;
    assert_eq!(
        values(body, "a.item"),
        vec![json!("café"), json!("line\nbreak"), json!("😀"), json!("sla/sh")]
    );
}

#[test]
fn numbers_keep_their_shape() {
    let body = r#"[1, -2, 18446744073709551615, 2.5, 1e3]"#;
    let got = values(body, "item");
    assert_eq!(got[0], json!(1));
    assert_eq!(got[1], json!(-2));
    assert_eq!(got[2], json!(18446744073709551615u64));
    assert_eq!(got[3], json!(2.5));
    assert_eq!(got[4], json!(1000.0));
}

#[test]
fn malformed_tail_surfaces_after_partial_results() {
    let body = r#"{"a": [1, 2, oops"#;
    let got = items(body, "a.item", None);
    assert_eq!(got.len(), 3);
    assert_eq!(*got[0].as_ref().unwrap(), json!(1));
    assert_eq!(*got[1].as_ref().unwrap(), json!(2));
    assert!(matches!(got[2], Err(StreamError::Syntax { .. })));
}

#[test]
fn trailing_garbage_is_an_error() {
    let got = items(r#"{"a": 1} {"#, "", None);
    assert_eq!(got.len(), 2);
    assert!(got[0].is_ok());
    assert!(matches!(got[1], Err(StreamError::Syntax { .. })));
}

#[test]
fn iteration_is_not_restartable_after_an_error() {
    let mut reader = JsonItems::new(&b"[1, oops]"[..], "item", None).unwrap();
    assert_eq!(reader.next().unwrap().unwrap(), json!(1));
    assert!(reader.next().unwrap().is_err());
    assert!(reader.next().is_none());
}

#[test]
fn invalid_path_is_rejected_up_front() {
    assert!(matches!(
        JsonItems::new(&b"{}"[..], "a..b", None),
        Err(StreamError::Path { .. })
    ));
}
