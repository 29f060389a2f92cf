use finscript::environment::Environments;
use finscript::error::ErrorKind;
use finscript::value::{Image, Value};
use finscript::variable::{Heap, Owner, Payload, VarType};
use pretty_assertions::assert_eq;

#[test]
fn links_resolve_to_their_target() {
    let mut heap = Heap::new();
    let target = heap.alloc_numeric(3.0);
    let link = heap.alloc_link(target).unwrap();

    assert_eq!(heap.resolve(link).unwrap(), target);
    assert_eq!(heap.numeric(link).unwrap(), 3.0);
    assert_eq!(heap.links_to(target), &[link]);

    heap.set_numeric(link, 4.0).unwrap();
    assert_eq!(heap.numeric(target).unwrap(), 4.0);
}

#[test]
fn links_never_chain() {
    let mut heap = Heap::new();
    let target = heap.alloc_numeric(1.0);
    let first = heap.alloc_link(target).unwrap();
    let second = heap.alloc_link(first).unwrap();

    assert_eq!(heap.get(second).unwrap().payload, Payload::Link(target));
    assert_eq!(heap.links_to(target).len(), 2);
}

#[test]
fn freeing_a_target_nulls_its_links() {
    let mut heap = Heap::new();
    let target = heap.alloc_string("gone");
    let link = heap.alloc_link(target).unwrap();

    heap.free(target).unwrap();
    assert!(!heap.contains(target));
    assert_eq!(heap.get(link).unwrap().payload, Payload::Null);
    assert!(heap.links_to(target).is_empty());
}

#[test]
fn unset_link_leaves_null() {
    let mut heap = Heap::new();
    let target = heap.alloc_numeric(1.0);
    let link = heap.alloc_link(target).unwrap();

    heap.unset_link(link).unwrap();
    assert!(heap.is_null(link).unwrap());
    assert!(heap.links_to(target).is_empty());
}

#[test]
fn link_to_self_is_rejected() {
    let mut heap = Heap::new();
    let var = heap.alloc_null();
    let err = heap.set_link(var, var).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParam);
}

#[test]
fn stale_handles_report_null_pointer() {
    let mut heap = Heap::new();
    let var = heap.alloc_numeric(1.0);
    heap.free(var).unwrap();

    let reused = heap.alloc_numeric(2.0);
    assert_ne!(var, reused);
    assert_eq!(heap.numeric(var).unwrap_err().kind, ErrorKind::NullPointer);
    assert_eq!(heap.numeric(reused).unwrap(), 2.0);
}

#[test]
fn type_is_set_once() {
    let mut heap = Heap::new();
    let var = heap.alloc_null();
    heap.set_type(var, VarType::String).unwrap();
    assert_eq!(heap.string(var).unwrap(), "");

    let err = heap.set_type(var, VarType::Numeric).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParam);
    assert_eq!(heap.set_numeric(var, 1.0).unwrap_err().kind, ErrorKind::InvalidParam);
}

#[test]
fn write_protection_blocks_setters() {
    let mut heap = Heap::new();
    let var = heap.alloc_numeric(1.0);
    heap.set_write_protected(var, true).unwrap();

    assert_eq!(heap.set_numeric(var, 2.0).unwrap_err().kind, ErrorKind::StateError);
    assert_eq!(heap.numeric(var).unwrap(), 1.0);
}

#[test]
fn element_access_grows_arrays() {
    let mut heap = Heap::new();
    let array = heap.alloc_null();
    heap.set_left_value(array, true).unwrap();

    let element = heap.element(array, 3).unwrap();
    assert_eq!(heap.var_type(array).unwrap(), VarType::Array);
    assert_eq!(heap.array_len(array).unwrap(), 4);
    assert_eq!(heap.owner(element).unwrap(), Owner::Array(array));
    assert!(heap.is_left_value(element).unwrap());
    assert!(heap.is_null(heap.array_items(array).unwrap()[0]).unwrap());

    let scalar = heap.alloc_numeric(1.0);
    let err = heap.element(scalar, 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParam);
}

#[test]
fn detached_element_leaves_a_placeholder() {
    let mut heap = Heap::new();
    let array = heap.alloc_value(&Value::Array(vec![Value::Numeric(1.0), Value::Numeric(2.0)]));

    let taken = heap.detach_element(array, 1).unwrap();
    assert_eq!(heap.owner(taken).unwrap(), Owner::Detached);
    assert_eq!(heap.numeric(taken).unwrap(), 2.0);
    assert_eq!(
        heap.to_value(array).unwrap(),
        Value::Array(vec![Value::Numeric(1.0), Value::Null])
    );
}

#[test]
fn smart_copy_steals_from_temporary_arrays() {
    let mut heap = Heap::new();
    let first = heap.alloc_numeric(1.0);
    let second = heap.alloc_numeric(2.0);
    let source = heap.alloc(Payload::Array(vec![first, second]));
    let target = heap.alloc_null();
    heap.set_left_value(target, true).unwrap();

    heap.smart_copy(target, source).unwrap();

    assert_eq!(heap.array_items(target).unwrap(), vec![first, second]);
    assert_eq!(heap.array_len(source).unwrap(), 0);
    assert_eq!(heap.owner(first).unwrap(), Owner::Array(target));
    assert!(heap.is_left_value(second).unwrap());
}

#[test]
fn copy_value_is_deep() {
    let mut heap = Heap::new();
    let source = heap.alloc_value(&Value::Array(vec![Value::from("a"), Value::Array(vec![Value::Numeric(1.0)])]));
    heap.set_left_value(source, true).unwrap();
    let target = heap.alloc_null();

    heap.copy_value(target, source).unwrap();
    assert!(heap.equals(target, source).unwrap());

    let inner = heap.array_items(target).unwrap()[1];
    let leaf = heap.array_items(inner).unwrap()[0];
    heap.set_numeric(leaf, 5.0).unwrap();
    assert!(!heap.equals(target, source).unwrap());
}

#[test]
fn release_only_frees_temporaries() {
    let mut heap = Heap::new();
    let mut envs = Environments::new();
    let env = envs.create("test", None);

    let owned = heap.alloc_numeric(1.0);
    heap.set_owner(owned, Owner::Env(env)).unwrap();
    heap.release(owned).unwrap();
    assert!(heap.contains(owned));

    let temp = heap.alloc_numeric(2.0);
    heap.release(temp).unwrap();
    assert!(!heap.contains(temp));

    // Releasing twice is harmless.
    heap.release(temp).unwrap();
}

#[test]
fn freeing_an_array_frees_its_elements() {
    let mut heap = Heap::new();
    let array = heap.alloc_value(&Value::Array(vec![Value::Numeric(1.0), Value::Array(vec![Value::Null])]));
    assert_eq!(heap.live_count(), 4);

    heap.free(array).unwrap();
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn truthiness() {
    let mut heap = Heap::new();
    let cases = [
        (Value::Null, false),
        (Value::Numeric(0.0), false),
        (Value::Numeric(1e-9), false),
        (Value::Numeric(-2.0), true),
        (Value::from("YES"), true),
        (Value::from("true"), true),
        (Value::from("no"), false),
        (Value::Array(Vec::new()), false),
        (Value::Array(vec![Value::Null]), true),
        (Value::Image(Image::default()), false),
        (Value::Image(Image::new(1, 1)), true),
    ];
    for (value, expected) in cases {
        let var = heap.alloc_value(&value);
        assert_eq!(heap.to_bool(var).unwrap(), expected, "truthiness of {:?}", value);
        assert_eq!(value.is_truthy(), expected);
    }
}

#[test]
fn environments_reject_duplicates_and_temporaries() {
    let mut heap = Heap::new();
    let mut envs = Environments::new();
    let env = envs.create("test", None);

    let first = heap.alloc_numeric(1.0);
    heap.set_left_value(first, true).unwrap();
    envs.add_variable(env, "x", first, &mut heap).unwrap();
    assert_eq!(heap.owner(first).unwrap(), Owner::Env(env));

    let second = heap.alloc_numeric(2.0);
    heap.set_left_value(second, true).unwrap();
    let err = envs.add_variable(env, "x", second, &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);

    let temp = heap.alloc_numeric(3.0);
    let err = envs.add_variable(env, "y", temp, &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParam);

    let err = envs.add_variable(env, "", second, &mut heap).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParam);
}

#[test]
fn lookup_walks_the_parent_chain() {
    let mut heap = Heap::new();
    let mut envs = Environments::new();
    let outer = envs.create("outer", None);
    let inner = envs.build_child_environment(outer, "inner").unwrap();

    let x = heap.alloc_numeric(1.0);
    heap.set_left_value(x, true).unwrap();
    envs.add_variable(outer, "x", x, &mut heap).unwrap();
    assert_eq!(envs.find_variable(inner, "x"), Some(x));

    let shadow = heap.alloc_numeric(2.0);
    heap.set_left_value(shadow, true).unwrap();
    envs.add_variable(inner, "x", shadow, &mut heap).unwrap();
    assert_eq!(envs.find_variable(inner, "x"), Some(shadow));
    assert_eq!(envs.find_variable(outer, "x"), Some(x));
    assert_eq!(envs.find_variable(inner, "y"), None);
}

#[test]
fn destroying_an_environment_frees_its_variables() {
    let mut heap = Heap::new();
    let mut envs = Environments::new();
    let env = envs.create("test", None);

    let x = heap.alloc_numeric(1.0);
    heap.set_left_value(x, true).unwrap();
    envs.add_variable(env, "x", x, &mut heap).unwrap();
    let outside = heap.alloc_link(x).unwrap();

    envs.destroy(env, &mut heap).unwrap();
    assert!(!envs.contains(env));
    assert!(!heap.contains(x));
    assert!(heap.is_null(outside).unwrap());
    assert_eq!(envs.live_count(), 0);
    assert_eq!(envs.get(env).unwrap_err().kind, ErrorKind::NullPointer);
}
