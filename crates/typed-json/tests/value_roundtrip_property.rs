use proptest::prelude::*;

use typed_json::{parse, Value};

proptest! {
    #[test]
    fn tagged_int_round_trips(n in any::<i64>()) {
        prop_assert_eq!(parse(&format!("int {}", n)).unwrap(), Value::Int(n));
    }

    #[test]
    fn tagged_float_round_trips(x in proptest::num::f64::NORMAL) {
        // f64 Display prints the shortest representation that parses
        // back to the same value.
        prop_assert_eq!(parse(&format!("float {}", x)).unwrap(), Value::Num(x));
    }

    #[test]
    fn tagged_string_round_trips(s in "[a-zA-Z0-9 _.-]{0,24}") {
        prop_assert_eq!(parse(&format!("string {:?}", s)).unwrap(), Value::Str(s));
    }

    #[test]
    fn bigint_string_form_round_trips(n in any::<i64>()) {
        prop_assert_eq!(
            parse(&format!("bigint \"{}\"", n)).unwrap(),
            Value::BigInt(n as i128)
        );
    }

    #[test]
    fn bigint_literal_round_trips(n in any::<i64>()) {
        prop_assert_eq!(parse(&format!("{}n", n)).unwrap(), Value::BigInt(n as i128));
    }

    #[test]
    fn untagged_arrays_round_trip(items in proptest::collection::vec(any::<i32>(), 0..12)) {
        let source = format!(
            "[{}]",
            items.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
        );
        let expected = Value::Array(items.into_iter().map(|n| Value::Int(n as i64)).collect());
        prop_assert_eq!(parse(&source).unwrap(), expected);
    }
}
