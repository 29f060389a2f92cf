use finscript::lexer::{Scanner, TokenKind};
use finscript::runner::evaluate;
use finscript::variable::Heap;
use finscript::{parse, Value};
use proptest::prelude::*;

proptest! {
    /// The parser reports problems as diagnostics; it should never panic on
    /// arbitrary UTF-8 input.
    #[test]
    fn parser_does_not_panic(s in "\\PC*") {
        let _ = std::panic::catch_unwind(|| {
            let _ = parse(&s);
        });
    }
}

proptest! {
    /// Every error a parse produces is sorted by position.
    #[test]
    fn diagnostics_are_ordered(s in "[a-z0-9 +*()\\[\\]{};=,-]{0,40}") {
        let tree = parse(&s);
        let positions: Vec<_> = tree.errors().iter().map(|d| (d.row, d.column)).collect();
        let mut sorted = positions.clone();
        sorted.sort();
        prop_assert_eq!(positions, sorted);
    }
}

proptest! {
    #[test]
    fn integer_literals_scan_exactly(n in 0u32..1_000_000u32) {
        let tokens = Scanner::new(&n.to_string()).scan_tokens().unwrap();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(&tokens[0].kind, &TokenKind::Decimal(f64::from(n)));
    }
}

proptest! {
    /// Signed literals on either side of a binary operator evaluate like
    /// integer arithmetic.
    #[test]
    fn integer_arithmetic_matches(a in -1000i32..1000, b in -1000i32..1000) {
        let sum = evaluate(&format!("{} + {}", a, b)).unwrap().value;
        prop_assert_eq!(sum, Value::Numeric(f64::from(a + b)));

        let difference = evaluate(&format!("{} - {}", a, b)).unwrap().value;
        prop_assert_eq!(difference, Value::Numeric(f64::from(a - b)));

        let product = evaluate(&format!("{} * {}", a, b)).unwrap().value;
        prop_assert_eq!(product, Value::Numeric(f64::from(a * b)));

        let less = evaluate(&format!("{} < {}", a, b)).unwrap().value;
        prop_assert_eq!(less, Value::Numeric(if a < b { 1.0 } else { 0.0 }));
    }
}

fn value_tree() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        (-1.0e6f64..1.0e6).prop_map(Value::Numeric),
        "[a-z ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::Array)
    })
}

proptest! {
    /// A deep copy compares equal to its source and snapshots to the same value.
    #[test]
    fn deep_copies_compare_equal(value in value_tree()) {
        let mut heap = Heap::new();
        let original = heap.alloc_value(&value);
        let copy = heap.deep_clone(original).unwrap();

        prop_assert!(heap.equals(original, copy).unwrap());
        prop_assert_eq!(heap.to_value(copy).unwrap(), value);

        heap.free(original).unwrap();
        heap.free(copy).unwrap();
        prop_assert_eq!(heap.live_count(), 0);
    }
}
