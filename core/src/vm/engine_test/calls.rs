use super::*;

const ADD: &str = "
    branch end_add_0
    func_add_0:
    %0 = symbolic param:a
    store_var a %0
    %1 = symbolic param:b
    store_var b %1
    %2 = load_var a
    %3 = load_var b
    %4 = binop + %2 %3
    return %4
    end_add_0:
    %5 = const <function:add@func_add_0>
    store_var add %5
";

const POINT: &str = "
    branch end_class_Point_0
    class_Point_0:
    branch end___init___1
    func___init___1:
    %0 = symbolic param:self
    %1 = symbolic param:x
    return
    end___init___1:
    %2 = const <function:__init__@func___init___1>
    store_var __init__ %2
    branch end_scale_2
    func_scale_2:
    %3 = symbolic param:self
    %4 = symbolic param:k
    return
    end_scale_2:
    %5 = const <function:scale@func_scale_2>
    store_var scale %5
    end_class_Point_0:
    %6 = const <class:Point@class_Point_0>
    store_var Point %6
    branch end_class_Bag_3
    class_Bag_3:
    end_class_Bag_3:
    %7 = const <class:Bag@class_Bag_3>
    store_var Bag %7
";

#[test]
fn test_call_binds_params_and_pushes() {
    let registry = registry_for(ADD);
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.store_var("add", Value::str("<function:add@func_add_0>"));
    state.write_register("%0", Value::Int(2));
    state.write_register("%1", Value::Int(3));

    let delta = decided(&engine, "%2 = call_function add %0 %1", &state);
    assert_eq!(delta.next_label.as_deref(), Some("func_add_0"));
    assert_eq!(delta.call_push.as_ref().map(|p| p.function_name.as_str()), Some("add"));
    assert_eq!(delta.var_writes.get("a"), Some(&Value::Int(2)));
    assert_eq!(delta.var_writes.get("b"), Some(&Value::Int(3)));

    let outcome = state.apply_delta(&delta);
    assert!(outcome.pushed);
    assert_eq!(state.depth(), 2);
    // parameters land in the callee frame
    assert_eq!(reg(&decided(&engine, "%0 = symbolic param:a", &state), "%0"), Value::Int(2));
    assert!(state.call_stack[0].local_vars.get("a").is_none());
}

#[test]
fn test_unresolved_function_declines() {
    let registry = registry_for(ADD);
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.store_var("notfn", Value::Int(1));
    assert!(declines(&engine, "%0 = call_function mystery 1", &state));
    assert!(declines(&engine, "%0 = call_function notfn", &state));
}

#[test]
fn test_builtins() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::List(vec![Value::Int(4), Value::Int(1), Value::Int(8)]));

    assert_eq!(reg(&decided(&engine, "%1 = call_function len %0", &state), "%1"), Value::Int(3));
    assert_eq!(reg(&decided(&engine, "%1 = call_function min %0", &state), "%1"), Value::Int(1));
    assert_eq!(reg(&decided(&engine, "%1 = call_function max 3 9 4", &state), "%1"), Value::Int(9));
    assert_eq!(reg(&decided(&engine, "%1 = call_function abs -5", &state), "%1"), Value::Int(5));
    assert_eq!(reg(&decided(&engine, "%1 = call_function int '42'", &state), "%1"), Value::Int(42));
    assert_eq!(reg(&decided(&engine, "%1 = call_function str 7", &state), "%1"), Value::str("7"));
    assert_eq!(reg(&decided(&engine, "%1 = call_function print %0", &state), "%1"), Value::Null);
    assert_eq!(
        reg(&decided(&engine, "%1 = call_function range 1 7 2", &state), "%1"),
        Value::List(vec![Value::Int(1), Value::Int(3), Value::Int(5)])
    );
}

#[test]
fn test_builtins_with_symbolic_arguments() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Symbolic(crate::vm::SymbolicValue::new("sym_0")));

    assert!(declines(&engine, "%1 = call_function abs %0", &state));
    assert!(declines(&engine, "%1 = call_function range %0", &state));
    assert!(declines(&engine, "%1 = call_function len %0", &state));
    assert_eq!(reg(&decided(&engine, "%1 = call_function print %0", &state), "%1"), Value::Null);
}

#[test]
fn test_array_constructor_and_len() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();

    let delta = decided(&engine, "%0 = call_function arrayOf 1 2 3", &state);
    assert_eq!(reg(&delta, "%0"), Value::str("arr_0"));
    state.apply_delta(&delta);
    assert_eq!(state.heap["arr_0"].type_hint.as_deref(), Some("array"));
    assert_eq!(state.heap["arr_0"].fields.get("2"), Some(&Value::Int(3)));

    assert_eq!(reg(&decided(&engine, "%1 = call_function len %0", &state), "%1"), Value::Int(3));
}

#[test]
fn test_class_instantiation_runs_constructor() {
    let registry = registry_for(POINT);
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.store_var("Point", Value::str("<class:Point@class_Point_0>"));

    let delta = decided(&engine, "%0 = call_function Point 4", &state);
    assert_eq!(reg(&delta, "%0"), Value::str("obj_0"));
    assert_eq!(delta.new_objects[0].type_hint.as_deref(), Some("Point"));
    let push = delta.call_push.as_ref().unwrap();
    assert_eq!(push.function_name, "__init__");
    assert!(push.constructor);
    assert_eq!(delta.next_label.as_deref(), Some("func___init___1"));
    assert_eq!(delta.var_writes.get("self"), Some(&Value::str("obj_0")));
    assert_eq!(delta.var_writes.get("x"), Some(&Value::Int(4)));
}

#[test]
fn test_class_without_constructor_only_allocates() {
    let registry = registry_for(POINT);
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.store_var("Bag", Value::str("<class:Bag@class_Bag_3>"));

    let delta = decided(&engine, "%0 = call_function Bag", &state);
    assert_eq!(reg(&delta, "%0"), Value::str("obj_0"));
    assert!(delta.call_push.is_none());
    assert!(delta.next_label.is_none());
}

#[test]
fn test_method_call_binds_receiver_first() {
    let registry = registry_for(POINT);
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.heap.insert("obj_0".into(), HeapObject::typed("Point"));
    state.heap.insert("obj_1".into(), HeapObject::default());
    state.write_register("%0", Value::str("obj_0"));
    state.write_register("%1", Value::str("obj_1"));

    let delta = decided(&engine, "%2 = call_method %0 scale 3", &state);
    assert_eq!(delta.next_label.as_deref(), Some("func_scale_2"));
    assert_eq!(delta.var_writes.get("self"), Some(&Value::str("obj_0")));
    assert_eq!(delta.var_writes.get("k"), Some(&Value::Int(3)));

    assert!(declines(&engine, "%2 = call_method %0 missing", &state));
    // receiver without a class
    assert!(declines(&engine, "%2 = call_method %1 scale 3", &state));
}

#[test]
fn test_method_call_through_function_field() {
    let registry = registry_for(ADD);
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    let mut obj = HeapObject::default();
    obj.fields.insert("cb".into(), Value::str("<function:add@func_add_0>"));
    state.heap.insert("obj_0".into(), obj);
    state.write_register("%0", Value::str("obj_0"));

    let delta = decided(&engine, "%1 = call_method %0 cb 1 2", &state);
    assert_eq!(delta.next_label.as_deref(), Some("func_add_0"));
    assert_eq!(delta.var_writes.get("a"), Some(&Value::Int(1)));
    assert_eq!(delta.var_writes.get("b"), Some(&Value::Int(2)));
}

#[test]
fn test_function_literal_in_call_frame_captures_environment() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();

    // outermost frame: plain reference
    let delta = decided(&engine, "%0 = const <function:inner@func_inner_3>", &state);
    assert_eq!(reg(&delta, "%0"), Value::str("<function:inner@func_inner_3>"));
    assert!(delta.new_closure.is_none());

    let mut frame = StackFrame::new("outer");
    frame.local_vars.insert("n".into(), Value::Int(1));
    state.call_stack.push(frame);

    let delta = decided(&engine, "%0 = const <function:inner@func_inner_3>", &state);
    assert_eq!(reg(&delta, "%0"), Value::str("<function:inner@func_inner_3#env_0>"));
    let closure = delta.new_closure.as_ref().unwrap();
    assert_eq!(closure.bindings.get("n"), Some(&Value::Int(1)));
    state.apply_delta(&delta);
    assert_eq!(state.current_frame().and_then(|f| f.owned_env.as_deref()), Some("env_0"));

    // the frame reuses the environment it already owns
    let delta = decided(&engine, "%1 = const <function:other@func_other_4>", &state);
    assert_eq!(reg(&delta, "%1"), Value::str("<function:other@func_other_4#env_0>"));
    assert!(delta.new_closure.is_none());
}
