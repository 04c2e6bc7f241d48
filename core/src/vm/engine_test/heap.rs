use super::*;

fn state_with_object(type_hint: &str) -> VmState {
    let mut state = VmState::new();
    state.heap.insert("obj_0".into(), HeapObject::typed(type_hint));
    state.counter = 1;
    state.write_register("%0", Value::str("obj_0"));
    state
}

#[test]
fn test_new_object_allocates_fresh_address() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();

    let delta = decided(&engine, "%0 = new_object Point", &state);
    assert_eq!(reg(&delta, "%0"), Value::str("obj_0"));
    assert_eq!(delta.new_objects[0].type_hint.as_deref(), Some("Point"));

    state.apply_delta(&delta);
    assert_eq!(state.counter, 1);
    let delta = decided(&engine, "%1 = new_object Point", &state);
    assert_eq!(reg(&delta, "%1"), Value::str("obj_1"));
}

#[test]
fn test_new_array_records_length() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    let delta = decided(&engine, "%0 = new_array int 3", &state);
    state.apply_delta(&delta);
    assert_eq!(state.heap["arr_0"].fields.get("length"), Some(&Value::Int(3)));
}

#[test]
fn test_store_then_load_field() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = state_with_object("Point");
    state.write_register("%1", Value::Int(5));

    let delta = decided(&engine, "store_field %0 x %1", &state);
    assert_eq!(delta.heap_writes[0].field, "x");
    state.apply_delta(&delta);

    let delta = decided(&engine, "%2 = load_field %0 x", &state);
    assert_eq!(reg(&delta, "%2"), Value::Int(5));
    assert!(delta.heap_writes.is_empty());
}

#[test]
fn test_missing_field_is_memoized() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = state_with_object("Point");

    let first = decided(&engine, "%1 = load_field %0 y", &state);
    let value = reg(&first, "%1");
    let sym = value.as_symbolic().cloned().unwrap();
    assert_eq!(sym.constraints, vec!["obj_0[y]".to_string()]);
    assert_eq!(first.heap_writes.len(), 1);
    state.apply_delta(&first);

    let second = decided(&engine, "%2 = load_field %0 y", &state);
    assert_eq!(reg(&second, "%2"), value);
    assert!(second.heap_writes.is_empty());
}

#[test]
fn test_load_index_on_heap_array() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = state_with_object("array");
    if let Some(obj) = state.heap.get_mut("obj_0") {
        obj.fields.insert("0".into(), Value::Int(10));
        obj.fields.insert("1".into(), Value::Int(20));
        obj.fields.insert("length".into(), Value::Int(2));
    }
    state.write_register("%1", Value::Int(0));

    assert_eq!(reg(&decided(&engine, "%2 = load_index %0 %1", &state), "%2"), Value::Int(10));
    assert_eq!(reg(&decided(&engine, "%2 = load_index %0 -1", &state), "%2"), Value::Int(20));
}

#[test]
fn test_load_index_on_register_values() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    state.write_register("%1", Value::str("abc"));

    assert_eq!(reg(&decided(&engine, "%2 = load_index %0 1", &state), "%2"), Value::Int(2));
    assert_eq!(reg(&decided(&engine, "%2 = load_index %0 -1", &state), "%2"), Value::Int(3));
    assert_eq!(reg(&decided(&engine, "%2 = load_index %1 2", &state), "%2"), Value::str("c"));
    assert!(declines(&engine, "%2 = load_index %0 5", &state));
}

#[test]
fn test_member_access_declines() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = state_with_object("Point");
    state.write_register("%1", Value::str("nowhere"));
    state.write_register("%2", Value::Symbolic(crate::vm::SymbolicValue::new("sym_5")));

    // base is not a live heap object
    assert!(declines(&engine, "%3 = load_field %1 x", &state));
    assert!(declines(&engine, "store_field %1 x 1", &state));
    // symbolic index
    assert!(declines(&engine, "%3 = load_index %0 %2", &state));
    assert!(declines(&engine, "store_index %0 %2 1", &state));
}
