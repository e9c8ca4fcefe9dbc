use std::rc::Rc;

use typed_json::{
    create_schema, deserializer_fn, parse_schema, parse_schema_with, parse_with_schema,
    validator_fn, Instance, Schema, SchemaOverrides, Value,
};

fn schema(source: &str) -> Rc<Schema> {
    parse_schema(source).unwrap()
}

#[test]
fn maybe_union_preserves_null_and_undefined() {
    let s = schema("schema { X: maybe oneOf [bigint, number] }");
    assert_eq!(parse_with_schema("X null", &s, None).unwrap(), Value::Null);
    assert_eq!(parse_with_schema("X", &s, None).unwrap(), Value::Undefined);
    assert_eq!(
        parse_with_schema("X bigint \"123\"", &s, None).unwrap(),
        Value::BigInt(123)
    );
    assert_eq!(
        parse_with_schema("X 4.5", &s, None).unwrap(),
        Value::Num(4.5)
    );
    let err = parse_with_schema("X true", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("invalid union of type `bigint | number`"), "{}", err);
    assert!(err.contains("expected bigint"), "{}", err);
    assert!(err.contains("expected number"), "{}", err);
}

#[test]
fn union_alternatives_are_tried_in_declaration_order() {
    let mut overrides = SchemaOverrides::default();
    for name in ["A", "B"] {
        overrides
            .validators
            .insert(name.to_string(), validator_fn(|_| None));
        overrides.deserializers.insert(
            name.to_string(),
            deserializer_fn(move |_| Ok(Value::Str(name.to_string()))),
        );
    }
    let base = create_schema(overrides);
    let s = parse_schema_with("schema { X: oneOf [A, B] }", &base, None).unwrap();
    // Both alternatives accept anything; the first must win.
    assert_eq!(
        parse_with_schema("X 1", &s, None).unwrap(),
        Value::Str("A".into())
    );
    let s = parse_schema_with("schema { X: oneOf [B, A] }", &base, None).unwrap();
    assert_eq!(
        parse_with_schema("X 1", &s, None).unwrap(),
        Value::Str("B".into())
    );
}

#[test]
fn structural_object_completeness() {
    let s = schema("schema { T: object {a: int, b: maybe string} }");

    let v = parse_with_schema("T {a: 1}", &s, None).unwrap();
    assert_eq!(serde_json::Value::from(v), serde_json::json!({"a": 1}));

    let v = parse_with_schema("T {a: 1, b: \"x\"}", &s, None).unwrap();
    assert_eq!(
        serde_json::Value::from(v),
        serde_json::json!({"a": 1, "b": "x"})
    );

    // `maybe` keeps an explicit null distinct from an absent field.
    let v = parse_with_schema("T {a: 1, b: null}", &s, None).unwrap();
    match v {
        Value::Object(map) => assert_eq!(map.get("b"), Some(&Value::Null)),
        other => panic!("expected object, got {:?}", other),
    }

    let err = parse_with_schema("T {a: 1, c: 2}", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("unknown field `c`"), "{}", err);

    let err = parse_with_schema("T {}", &s, None).unwrap_err().to_string();
    assert!(err.contains("missing field `a`"), "{}", err);

    // Every failing sub-key is aggregated into one composed error.
    let err = parse_with_schema("T {b: 5, c: 2}", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("missing field `a`"), "{}", err);
    assert!(err.contains("expected string"), "{}", err);
    assert!(err.contains("unknown field `c`"), "{}", err);
}

#[test]
fn document_root_type_restricts_the_whole_document() {
    let s = schema("schema { \":document\": arrayOf int }");
    let err = parse_with_schema("{}", &s, None).unwrap_err().to_string();
    assert!(err.contains("expected array of type `int[]`"), "{}", err);
    assert_eq!(
        parse_with_schema("[1, 2, 3]", &s, None).unwrap(),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn nominal_classes_validate_constructor_arguments() {
    let s = schema("schema { Test: class [int, string] }");
    assert_eq!(
        parse_with_schema("Test(1, \"a\")", &s, None).unwrap(),
        Value::Instance(Box::new(Instance {
            class: "Test".into(),
            value: Value::Array(vec![Value::Int(1), Value::Str("a".into())]),
        }))
    );
    let err = parse_with_schema("Test(1, \"a\", 2)", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("length mismatch: expected 2, got 3"), "{}", err);

    let err = parse_with_schema("Test(1)", &s, None).unwrap_err().to_string();
    assert!(err.contains("missing argument 1"), "{}", err);

    let err = parse_with_schema("Test(\"x\", \"a\")", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("expected int"), "{}", err);
}

#[test]
fn prototype_templates_merge_defaults() {
    let s = schema("schema { P: proto {x: int, y: 0} }");
    assert_eq!(
        parse_with_schema("P... {x: 5}", &s, None).unwrap(),
        Value::Instance(Box::new(Instance {
            class: "P".into(),
            value: Value::Object(
                [
                    ("x".to_string(), Value::Int(5)),
                    ("y".to_string(), Value::Int(0)),
                ]
                .into_iter()
                .collect()
            ),
        }))
    );
    // Document fields override template defaults.
    match parse_with_schema("P... {x: 1, y: 9}", &s, None).unwrap() {
        Value::Instance(inst) => assert_eq!(
            serde_json::Value::from(inst.value),
            serde_json::json!({"x": 1, "y": 9})
        ),
        other => panic!("expected instance, got {:?}", other),
    }

    let err = parse_with_schema("P... {}", &s, None).unwrap_err().to_string();
    assert!(err.contains("missing field `x`"), "{}", err);

    let err = parse_with_schema("P... {x: 1, z: 2}", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("unknown field `z`"), "{}", err);
}

#[test]
fn aliases_resolve_to_builtins() {
    let s = schema("schema { Age: int8 }");
    assert_eq!(parse_with_schema("Age 20", &s, None).unwrap(), Value::Int(20));
    let err = parse_with_schema("Age 200", &s, None).unwrap_err().to_string();
    assert!(err.contains("out of `int8` range"), "{}", err);
}

#[test]
fn forward_and_mutual_references_resolve_lazily() {
    let s = schema("schema { A: arrayOf B, B: oneOf [int, A] }");
    assert_eq!(
        parse_with_schema("A [1, [2, [3]]]", &s, None).unwrap(),
        Value::Array(vec![
            Value::Int(1),
            Value::Array(vec![Value::Int(2), Value::Array(vec![Value::Int(3)])]),
        ])
    );
    let err = parse_with_schema("A [true]", &s, None).unwrap_err().to_string();
    assert!(err.contains("invalid array of type"), "{}", err);
}

#[test]
fn literal_declarations_accept_only_the_constant() {
    let s = schema("schema { mode: \"fast\" }");
    assert_eq!(
        parse_with_schema("mode \"fast\"", &s, None).unwrap(),
        Value::Str("fast".into())
    );
    let err = parse_with_schema("mode \"slow\"", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("expected \"fast\""), "{}", err);
}

#[test]
fn fixed_arrays_are_positional() {
    let s = schema("schema { Pair: object {v: [int, string]} }");
    // An array-typed field is written as a fixed tuple.
    let err = parse_with_schema("Pair {v: [1]}", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("missing element 1"), "{}", err);
    let v = parse_with_schema("Pair {v: [1, \"a\"]}", &s, None).unwrap();
    assert_eq!(
        serde_json::Value::from(v),
        serde_json::json!({"v": [1, "a"]})
    );
}

#[test]
fn user_overrides_take_precedence_over_generated_entries() {
    let mut overrides = SchemaOverrides::default();
    overrides
        .validators
        .insert("X".to_string(), validator_fn(|_| None));
    overrides.deserializers.insert(
        "X".to_string(),
        deserializer_fn(|_| Ok(Value::Str("override".into()))),
    );
    let base = create_schema(overrides);
    let s = parse_schema_with("schema { X: int8 }", &base, None).unwrap();
    // The generated int8 alias must not shadow the explicit override.
    assert_eq!(
        parse_with_schema("X \"anything\"", &s, None).unwrap(),
        Value::Str("override".into())
    );
}

#[test]
fn schema_documents_can_declare_object_document_roots() {
    let s = schema("schema { \":document\": object {a: int} }");
    let v = parse_with_schema("{a: 3}", &s, None).unwrap();
    assert_eq!(serde_json::Value::from(v), serde_json::json!({"a": 3}));
    let err = parse_with_schema("{a: 3, b: 4}", &s, None)
        .unwrap_err()
        .to_string();
    assert!(err.contains("unknown field `b`"), "{}", err);
}

#[test]
fn generated_schemas_keep_the_builtin_entries() {
    let s = schema("schema { X: int }");
    assert_eq!(
        parse_with_schema("int8 12", &s, None).unwrap(),
        Value::Int(12)
    );
    assert_eq!(
        parse_with_schema("Uint8Array [1]", &s, None).unwrap(),
        Value::Bytes(vec![1])
    );
}
