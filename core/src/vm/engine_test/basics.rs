use super::*;

#[test]
fn test_parse_const_literals() {
    assert_eq!(parse_const("None"), Value::Null);
    assert_eq!(parse_const("null"), Value::Null);
    assert_eq!(parse_const("true"), Value::Bool(true));
    assert_eq!(parse_const("False"), Value::Bool(false));
    assert_eq!(parse_const("42"), Value::Int(42));
    assert_eq!(parse_const("-3"), Value::Int(-3));
    assert_eq!(parse_const("2.5"), Value::Float(2.5));
    assert_eq!(parse_const("'hi there'"), Value::str("hi there"));
    assert_eq!(parse_const("\"x\""), Value::str("x"));
    assert_eq!(parse_const("<function:f@func_f_0>"), Value::str("<function:f@func_f_0>"));
}

#[test]
fn test_const_writes_result_register() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let delta = decided(&engine, "%0 = const 42", &VmState::new());
    assert_eq!(reg(&delta, "%0"), Value::Int(42));
    assert!(delta.next_label.is_none());
}

#[test]
fn test_load_var_bound_and_unbound() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.store_var("x", Value::Int(3));

    assert_eq!(reg(&decided(&engine, "%0 = load_var x", &state), "%0"), Value::Int(3));

    let delta = decided(&engine, "%1 = load_var missing", &state);
    let sym = reg(&delta, "%1");
    assert_eq!(sym.as_symbolic().map(|s| s.name.as_str()), Some("sym_0"));
}

#[test]
fn test_load_var_searches_outer_frames() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.store_var("g", Value::Int(9));
    state.call_stack.push(StackFrame::new("f"));
    assert_eq!(reg(&decided(&engine, "%0 = load_var g", &state), "%0"), Value::Int(9));
}

#[test]
fn test_store_var_uses_register() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::str("hello"));
    let delta = decided(&engine, "store_var greeting %0", &state);
    assert_eq!(delta.var_writes.get("greeting"), Some(&Value::str("hello")));
}

#[test]
fn test_binop_concrete() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Int(6));
    state.write_register("%1", Value::Int(7));

    assert_eq!(reg(&decided(&engine, "%2 = binop * %0 %1", &state), "%2"), Value::Int(42));
    assert_eq!(reg(&decided(&engine, "%2 = binop + %0 1", &state), "%2"), Value::Int(7));
    assert_eq!(reg(&decided(&engine, "%2 = binop < %0 %1", &state), "%2"), Value::Bool(true));
    assert_eq!(reg(&decided(&engine, "%2 = binop === %0 6", &state), "%2"), Value::Bool(true));
}

#[test]
fn test_binop_division_semantics() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Int(-7));
    state.write_register("%1", Value::Int(2));

    assert_eq!(reg(&decided(&engine, "%2 = binop / %0 %1", &state), "%2"), Value::Float(-3.5));
    assert_eq!(reg(&decided(&engine, "%2 = binop // %0 %1", &state), "%2"), Value::Int(-4));
    assert_eq!(reg(&decided(&engine, "%2 = binop % %0 %1", &state), "%2"), Value::Int(1));
}

#[test]
fn test_binop_declines() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Int(1));
    state.write_register("%1", Value::Int(0));
    state.write_register("%2", Value::Symbolic(crate::vm::SymbolicValue::new("sym_0")));
    state.write_register("%3", Value::Int(i64::MAX));

    assert!(declines(&engine, "%9 = binop / %0 %1", &state));
    assert!(declines(&engine, "%9 = binop // %0 %1", &state));
    assert!(declines(&engine, "%9 = binop % %0 %1", &state));
    assert!(declines(&engine, "%9 = binop + %0 %2", &state));
    assert!(declines(&engine, "%9 = binop + %3 %0", &state));
    assert!(declines(&engine, "%9 = binop <=> %0 %1", &state));
    // unset register
    assert!(declines(&engine, "%9 = binop + %7 %0", &state));
}

#[test]
fn test_unop() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Int(5));
    state.write_register("%1", Value::Bool(true));

    assert_eq!(reg(&decided(&engine, "%2 = unop - %0", &state), "%2"), Value::Int(-5));
    assert_eq!(reg(&decided(&engine, "%2 = unop not %1", &state), "%2"), Value::Bool(false));
    assert_eq!(reg(&decided(&engine, "%2 = unop ! %0", &state), "%2"), Value::Bool(false));
    assert_eq!(reg(&decided(&engine, "%2 = unop ~ %0", &state), "%2"), Value::Int(-6));
}

#[test]
fn test_branches() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Int(1));
    state.write_register("%1", Value::str(""));

    let delta = decided(&engine, "branch done", &state);
    assert_eq!(delta.next_label.as_deref(), Some("done"));

    let delta = decided(&engine, "branch_if %0 yes,no", &state);
    assert_eq!(delta.next_label.as_deref(), Some("yes"));
    assert_eq!(delta.path_condition.as_deref(), Some("%0 is True"));

    let delta = decided(&engine, "branch_if %1 yes,no", &state);
    assert_eq!(delta.next_label.as_deref(), Some("no"));
    assert_eq!(delta.path_condition.as_deref(), Some("%1 is False"));
}

#[test]
fn test_symbolic_branch_declines() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let state = VmState::new();
    let delta = decided(&engine, "%0 = load_var unknown", &state);
    let mut state = state;
    state.apply_delta(&delta);
    assert!(declines(&engine, "branch_if %0 yes,no", &state));
}

#[test]
fn test_unknown_calls_and_throw_decline() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Int(1));
    assert!(declines(&engine, "%1 = call_unknown %0", &state));
    assert!(declines(&engine, "throw %0", &state));
    assert!(declines(&engine, "%1 = symbolic external_input", &state));
}

#[test]
fn test_return_packages_value() {
    let registry = FunctionRegistry::default();
    let engine = LocalEngine::new(&registry);
    let mut state = VmState::new();
    state.write_register("%0", Value::Int(7));

    let delta = decided(&engine, "return %0", &state);
    assert_eq!(delta.return_value, Some(Value::Int(7)));
    assert!(delta.call_pop);

    let delta = decided(&engine, "return", &state);
    assert_eq!(delta.return_value, Some(Value::Null));
}
