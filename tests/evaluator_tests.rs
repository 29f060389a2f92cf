use finscript::error::ErrorKind;
use finscript::evaluator::{arity, calculate, factorial};
use finscript::lexer::OperatorKind;
use finscript::value::Value;
use finscript::variable::{Heap, Owner, VarId};
use pretty_assertions::assert_eq;

fn binary(heap: &mut Heap, op: OperatorKind, left: Value, right: Value) -> Result<Value, ErrorKind> {
    let l = heap.alloc_value(&left);
    let r = heap.alloc_value(&right);
    calculate(op, &[l, r], heap)
        .and_then(|id| heap.to_value(id))
        .map_err(|err| err.kind)
}

fn left_value(heap: &mut Heap, value: Value) -> VarId {
    let id = heap.alloc_value(&value);
    heap.set_left_value(id, true).unwrap();
    id
}

#[test]
fn factorial_of_integers() {
    assert_eq!(factorial(0.0).unwrap(), 1.0);
    assert_eq!(factorial(5.0).unwrap(), 120.0);
    assert_eq!(factorial(-3.0).unwrap(), -6.0);
    assert!(factorial(170.0).unwrap().is_finite());
}

#[test]
fn factorial_rejects_fractions_and_huge_values() {
    assert_eq!(factorial(2.5).unwrap_err().kind, ErrorKind::InvalidParam);
    assert_eq!(factorial(f64::NAN).unwrap_err().kind, ErrorKind::InvalidParam);
    assert_eq!(factorial(171.0).unwrap_err().kind, ErrorKind::Overflow);
    assert_eq!(factorial(-171.0).unwrap_err().kind, ErrorKind::Overflow);
}

#[test]
fn arity_of_operators() {
    assert_eq!(arity(OperatorKind::Negative), Some(1));
    assert_eq!(arity(OperatorKind::PostIncrement), Some(1));
    assert_eq!(arity(OperatorKind::Add), Some(2));
    assert_eq!(arity(OperatorKind::Access), Some(2));
    assert_eq!(arity(OperatorKind::Call), None);
    assert_eq!(arity(OperatorKind::Semicolon), None);
}

#[test]
fn wrong_operand_count_is_a_read_error() {
    let mut heap = Heap::new();
    let one = heap.alloc_numeric(1.0);
    let err = calculate(OperatorKind::Add, &[one], &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ReadError);

    let err = calculate(OperatorKind::Call, &[one], &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotImplemented);
}

#[test]
fn addition_concatenates_strings() {
    let mut heap = Heap::new();
    assert_eq!(
        binary(&mut heap, OperatorKind::Add, Value::from("a"), Value::from("b")),
        Ok(Value::from("ab"))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Add, Value::from("n = "), Value::Numeric(3.0)),
        Ok(Value::from("n = 3"))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Add, Value::Numeric(1.5), Value::from("x")),
        Ok(Value::from("1.5x"))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Add, Value::Numeric(1.0), Value::Null),
        Err(ErrorKind::InvalidParam)
    );
}

#[test]
fn arithmetic_needs_numbers() {
    let mut heap = Heap::new();
    assert_eq!(
        binary(&mut heap, OperatorKind::Mul, Value::from("a"), Value::Numeric(2.0)),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Div, Value::Numeric(1.0), Value::Numeric(0.0)),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Mod, Value::Numeric(7.0), Value::Numeric(0.0)),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Power, Value::Numeric(2.0), Value::Numeric(-1.0)),
        Ok(Value::Numeric(0.5))
    );
}

#[test]
fn bitwise_operands_fold_negatives() {
    let mut heap = Heap::new();
    assert_eq!(
        binary(&mut heap, OperatorKind::BitAnd, Value::Numeric(-1.0), Value::Numeric(255.0)),
        Ok(Value::Numeric(255.0))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::BitXor, Value::Numeric(6.0), Value::Numeric(3.0)),
        Ok(Value::Numeric(5.0))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::BitOr, Value::Numeric(1.5), Value::Numeric(1.0)),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::BitOr, Value::Numeric(4294967296.0), Value::Numeric(1.0)),
        Err(ErrorKind::Overflow)
    );

    let zero = heap.alloc_numeric(0.0);
    let result = calculate(OperatorKind::BitNot, &[zero], &mut heap).unwrap();
    assert_eq!(heap.numeric(result).unwrap(), 4294967295.0);
}

#[test]
fn equality_is_structural() {
    let mut heap = Heap::new();
    let pair = || Value::Array(vec![Value::Numeric(1.0), Value::from("a")]);
    assert_eq!(binary(&mut heap, OperatorKind::Equal, pair(), pair()), Ok(Value::Numeric(1.0)));
    assert_eq!(
        binary(&mut heap, OperatorKind::Equal, Value::from("1"), Value::Numeric(1.0)),
        Ok(Value::Numeric(0.0))
    );
    assert_eq!(binary(&mut heap, OperatorKind::Equal, Value::Null, Value::Null), Ok(Value::Numeric(1.0)));
    assert_eq!(
        binary(&mut heap, OperatorKind::NotEqual, Value::Null, Value::Numeric(0.0)),
        Ok(Value::Numeric(1.0))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Less, Value::from("a"), Value::from("b")),
        Err(ErrorKind::InvalidParam)
    );
}

#[test]
fn logic_uses_truthiness() {
    let mut heap = Heap::new();
    assert_eq!(
        binary(&mut heap, OperatorKind::LogicAnd, Value::from("yes"), Value::Numeric(2.0)),
        Ok(Value::Numeric(1.0))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::LogicXor, Value::Numeric(1.0), Value::Numeric(1.0)),
        Ok(Value::Numeric(0.0))
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::LogicOr, Value::Null, Value::Array(vec![Value::Null])),
        Ok(Value::Numeric(1.0))
    );
}

#[test]
fn assignment_needs_a_left_value() {
    let mut heap = Heap::new();
    let temp = heap.alloc_numeric(1.0);
    let source = heap.alloc_numeric(2.0);
    let err = calculate(OperatorKind::Assign, &[temp, source], &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StateError);

    let target = left_value(&mut heap, Value::Null);
    let result = calculate(OperatorKind::Assign, &[target, source], &mut heap).unwrap();
    assert_eq!(result, target);
    assert_eq!(heap.numeric(target).unwrap(), 2.0);

    let text = heap.alloc_string("x");
    let err = calculate(OperatorKind::Assign, &[target, text], &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParam);
}

#[test]
fn increments_start_from_null() {
    let mut heap = Heap::new();
    let counter = left_value(&mut heap, Value::Null);

    let old = calculate(OperatorKind::PostIncrement, &[counter], &mut heap).unwrap();
    assert_eq!(heap.numeric(old).unwrap(), 0.0);
    assert_eq!(heap.numeric(counter).unwrap(), 1.0);

    let same = calculate(OperatorKind::PreDecrement, &[counter], &mut heap).unwrap();
    assert_eq!(same, counter);
    assert_eq!(heap.numeric(counter).unwrap(), 0.0);

    let temp = heap.alloc_numeric(1.0);
    let err = calculate(OperatorKind::PreIncrement, &[temp], &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StateError);
}

#[test]
fn access_on_a_variable_returns_its_element() {
    let mut heap = Heap::new();
    let array = left_value(&mut heap, Value::Null);
    let index = heap.alloc_numeric(2.0);

    let element = calculate(OperatorKind::Access, &[array, index], &mut heap).unwrap();
    assert_eq!(heap.owner(element).unwrap(), Owner::Array(array));
    assert_eq!(heap.array_len(array).unwrap(), 3);
}

#[test]
fn access_on_a_temporary_detaches_the_element() {
    let mut heap = Heap::new();
    let array = heap.alloc_value(&Value::Array(vec![Value::Numeric(10.0), Value::Numeric(20.0)]));
    let index = heap.alloc_numeric(1.0);

    let element = calculate(OperatorKind::Access, &[array, index], &mut heap).unwrap();
    assert_eq!(heap.owner(element).unwrap(), Owner::Detached);
    assert_eq!(heap.numeric(element).unwrap(), 20.0);

    heap.free(array).unwrap();
    assert!(heap.contains(element));
}

#[test]
fn access_rejects_bad_indices() {
    let mut heap = Heap::new();
    assert_eq!(
        binary(&mut heap, OperatorKind::Access, Value::Array(Vec::new()), Value::Numeric(-1.0)),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Access, Value::Array(Vec::new()), Value::Numeric(0.5)),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Access, Value::from("abc"), Value::Numeric(0.0)),
        Err(ErrorKind::InvalidParam)
    );
    assert_eq!(
        binary(&mut heap, OperatorKind::Access, Value::Null, Value::Numeric(1e9)),
        Err(ErrorKind::OutOfMemory)
    );
}

#[test]
fn comma_yields_the_right_operand() {
    let mut heap = Heap::new();
    let left = heap.alloc_numeric(1.0);
    let right = heap.alloc_numeric(2.0);
    assert_eq!(calculate(OperatorKind::Comma, &[left, right], &mut heap).unwrap(), right);
}
