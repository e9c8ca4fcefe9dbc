use typed_json::{parse, Instance, Value};

#[test]
fn untagged_primitives_materialize_as_raw_values() {
    assert_eq!(parse("42").unwrap(), Value::Int(42));
    assert_eq!(parse("-1.5").unwrap(), Value::Num(-1.5));
    assert_eq!(parse("\"hi\"").unwrap(), Value::Str("hi".into()));
    assert_eq!(parse("true").unwrap(), Value::Bool(true));
    assert_eq!(parse("null").unwrap(), Value::Null);
    assert_eq!(parse("undefined").unwrap(), Value::Undefined);
    assert_eq!(parse("12n").unwrap(), Value::BigInt(12));
    assert_eq!(parse("`tpl ${x}`").unwrap(), Value::Template("tpl ${x}".into()));
    assert_eq!(parse("/a+b/i").unwrap(), Value::Regex("/a+b/i".into()));
}

#[test]
fn tagged_primitives_round_trip_to_host_representations() {
    assert_eq!(parse("int 5").unwrap(), Value::Int(5));
    assert_eq!(parse("int 5.0").unwrap(), Value::Int(5));
    assert_eq!(parse("float 2").unwrap(), Value::Num(2.0));
    assert_eq!(parse("number 1.5").unwrap(), Value::Num(1.5));
    assert_eq!(parse("string \"x\"").unwrap(), Value::Str("x".into()));
    assert_eq!(parse("boolean false").unwrap(), Value::Bool(false));
    assert_eq!(parse("bigint \"123\"").unwrap(), Value::BigInt(123));
    assert_eq!(parse("bigint \"-9\"").unwrap(), Value::BigInt(-9));
    assert_eq!(parse("bigint 7").unwrap(), Value::BigInt(7));
    assert_eq!(parse("null null").unwrap(), Value::Null);
    assert_eq!(parse("undefined").unwrap(), Value::Undefined);
}

#[test]
fn compound_values_materialize_recursively() {
    assert_eq!(
        parse("[1, \"a\", [true]]").unwrap(),
        Value::Array(vec![
            Value::Int(1),
            Value::Str("a".into()),
            Value::Array(vec![Value::Bool(true)]),
        ])
    );
    let v = parse("{a: int 1, b: {c: null}}").unwrap();
    assert_eq!(
        serde_json::Value::from(v),
        serde_json::json!({"a": 1, "b": {"c": null}})
    );
}

#[test]
fn bounded_integers_check_range_and_integrality() {
    assert_eq!(parse("int8 127").unwrap(), Value::Int(127));
    assert_eq!(parse("int8 -128").unwrap(), Value::Int(-128));
    let err = parse("int8 128").unwrap_err().to_string();
    assert!(err.contains("out of `int8` range [-128, 127]"), "{}", err);
    let err = parse("int8 1.5").unwrap_err().to_string();
    assert!(err.contains("expected integral number for `int8`"), "{}", err);
    let err = parse("uint16 -1").unwrap_err().to_string();
    assert!(err.contains("out of `uint16` range"), "{}", err);
}

#[test]
fn sixty_four_bit_integers_accept_bigint_raw_values() {
    assert_eq!(
        parse("int64 9007199254740993n").unwrap(),
        Value::BigInt(9007199254740993)
    );
    let err = parse("int8 5n").unwrap_err().to_string();
    assert!(err.contains("expected number for `int8`"), "{}", err);
}

#[test]
fn binary_arrays_validate_every_element() {
    assert_eq!(
        parse("Uint8Array [1, 2, 255]").unwrap(),
        Value::Bytes(vec![1, 2, 255])
    );
    assert_eq!(
        parse("Uint8Array([3, 4])").unwrap(),
        Value::Bytes(vec![3, 4])
    );
    match parse("Int16Array [1, -2]").unwrap() {
        Value::Instance(inst) => {
            assert_eq!(inst.class, "Int16Array");
            assert_eq!(inst.value, Value::Array(vec![Value::Int(1), Value::Int(-2)]));
        }
        other => panic!("expected instance, got {:?}", other),
    }

    let err = parse("Int8Array [1, 200, 3, 999]").unwrap_err().to_string();
    assert!(err.contains("invalid `Int8Array` of element type `int8`"), "{}", err);
    assert!(err.contains("; 1: "), "{}", err);
    assert!(err.contains("; 3: "), "{}", err);
    assert!(!err.contains("; 2: "), "{}", err);

    let err = parse("Uint8Array 5").unwrap_err().to_string();
    assert!(err.contains("expected array for `Uint8Array`"), "{}", err);
}

#[test]
fn standard_nominal_classes_construct_instances() {
    assert_eq!(
        parse("date(\"2024-01-02\")").unwrap(),
        Value::Instance(Box::new(Instance {
            class: "date".into(),
            value: Value::Str("2024-01-02".into()),
        }))
    );
    match parse("map({a: 1})").unwrap() {
        Value::Instance(inst) => {
            assert_eq!(inst.class, "map");
            assert_eq!(
                serde_json::Value::from(inst.value),
                serde_json::json!({"a": 1})
            );
        }
        other => panic!("expected instance, got {:?}", other),
    }
    assert_eq!(
        parse("set([1, 2])").unwrap(),
        Value::Instance(Box::new(Instance {
            class: "set".into(),
            value: Value::Array(vec![Value::Int(1), Value::Int(2)]),
        }))
    );
    // Optional constructor arguments may be omitted.
    match parse("set()").unwrap() {
        Value::Instance(inst) => assert_eq!(inst.value, Value::Array(vec![])),
        other => panic!("expected instance, got {:?}", other),
    }

    let err = parse("date(5)").unwrap_err().to_string();
    assert!(err.contains("expected string"), "{}", err);
}

#[test]
fn unknown_tags_fail_validation_eagerly() {
    let err = parse("Mystery 1").unwrap_err().to_string();
    assert!(err.contains("unknown type `Mystery`"), "{}", err);
    // Nested unknown tags abort before the root validator runs.
    let err = parse("[1, Mystery 2]").unwrap_err().to_string();
    assert!(err.contains("unknown type `Mystery`"), "{}", err);
}

#[test]
fn kind_validators_reject_mismatched_raws() {
    for (src, needle) in [
        ("string 5", "expected string"),
        ("boolean \"x\"", "expected boolean"),
        ("bigint \"12.5\"", "expected bigint"),
        ("int \"x\"", "expected int"),
        ("undefined 1", "expected undefined"),
    ] {
        let err = parse(src).unwrap_err().to_string();
        assert!(err.contains(needle), "source {} gave {}", src, err);
    }
}
