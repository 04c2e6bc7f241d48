use super::*;

#[test]
fn test_make_adder() {
    let outcome = run_symbolic(
        "
        branch end_make_adder_0
        func_make_adder_0:
        %0 = symbolic param:x
        store_var x %0
        branch end_adder_1
        func_adder_1:
        %1 = symbolic param:y
        store_var y %1
        %2 = load_var x
        %3 = load_var y
        %4 = binop + %2 %3
        return %4
        end_adder_1:
        %5 = const <function:adder@func_adder_1>
        store_var adder %5
        %6 = load_var adder
        return %6
        end_make_adder_0:
        %7 = const <function:make_adder@func_make_adder_0>
        store_var make_adder %7
        %8 = call_function make_adder 5
        store_var add5 %8
        %9 = call_function add5 3
        store_var result %9
        ",
    );
    assert_eq!(outcome.var("result"), Some(&Value::Int(8)));
    assert_eq!(outcome.var("add5"), Some(&Value::str("<function:adder@func_adder_1#env_0>")));
    assert_eq!(outcome.stats.closures_captured, 1);
    assert_eq!(outcome.stats.oracle_calls, 0);
}

const COUNTER: &str = "
    branch end_make_counter_0
    func_make_counter_0:
    %0 = const 0
    store_var count %0
    branch end_increment_1
    func_increment_1:
    %1 = load_var count
    %2 = const 1
    %3 = binop + %1 %2
    store_var count %3
    %4 = load_var count
    return %4
    end_increment_1:
    %5 = const <function:increment@func_increment_1>
    store_var increment %5
    %6 = load_var increment
    return %6
    end_make_counter_0:
    %7 = const <function:make_counter@func_make_counter_0>
    store_var make_counter %7
    %8 = call_function make_counter
    store_var c %8
    %9 = call_function c
    store_var first %9
    %10 = call_function c
    store_var second %10
    %11 = call_function make_counter
    store_var d %11
    %12 = call_function d
    store_var other %12
";

#[test]
fn test_counter_accumulates_and_factories_are_independent() {
    let outcome = run_symbolic(COUNTER);
    assert_eq!(outcome.var("first"), Some(&Value::Int(1)));
    assert_eq!(outcome.var("second"), Some(&Value::Int(2)));
    assert_eq!(outcome.var("other"), Some(&Value::Int(1)));
    assert_eq!(outcome.stats.closures_captured, 2);
    assert_eq!(outcome.state.closures["env_0"].bindings.get("count"), Some(&Value::Int(2)));
    assert_eq!(outcome.state.closures["env_1"].bindings.get("count"), Some(&Value::Int(1)));
}

#[test]
fn test_accumulator_with_captured_parameter() {
    let outcome = run_symbolic(
        "
        branch end_make_acc_0
        func_make_acc_0:
        %0 = symbolic param:total
        store_var total %0
        branch end_add_1
        func_add_1:
        %1 = symbolic param:n
        store_var n %1
        %2 = load_var total
        %3 = load_var n
        %4 = binop + %2 %3
        store_var total %4
        %5 = load_var total
        return %5
        end_add_1:
        %6 = const <function:add@func_add_1>
        return %6
        end_make_acc_0:
        %7 = const <function:make_acc@func_make_acc_0>
        store_var make_acc %7
        %8 = call_function make_acc 100
        store_var acc %8
        %9 = call_function acc 10
        store_var a %9
        %10 = call_function acc 20
        store_var b %10
        %11 = call_function acc 5
        store_var c %11
        ",
    );
    assert_eq!(outcome.var("a"), Some(&Value::Int(110)));
    assert_eq!(outcome.var("b"), Some(&Value::Int(130)));
    assert_eq!(outcome.var("c"), Some(&Value::Int(135)));
}

#[test]
fn test_multipliers_do_not_share_state() {
    let outcome = run_symbolic(
        "
        branch end_make_multiplier_0
        func_make_multiplier_0:
        %0 = symbolic param:k
        store_var k %0
        branch end_mul_1
        func_mul_1:
        %1 = symbolic param:x
        store_var x %1
        %2 = load_var x
        %3 = load_var k
        %4 = binop * %2 %3
        return %4
        end_mul_1:
        %5 = const <function:mul@func_mul_1>
        return %5
        end_make_multiplier_0:
        %6 = const <function:make_multiplier@func_make_multiplier_0>
        store_var make_multiplier %6
        %7 = call_function make_multiplier 2
        store_var double %7
        %8 = call_function make_multiplier 3
        store_var triple %8
        %9 = call_function double 5
        store_var ten %9
        %10 = call_function triple 5
        store_var fifteen %10
        ",
    );
    assert_eq!(outcome.var("ten"), Some(&Value::Int(10)));
    assert_eq!(outcome.var("fifteen"), Some(&Value::Int(15)));
    assert_eq!(outcome.stats.closures_captured, 2);
}

#[test]
fn test_enclosing_frame_sees_closure_writes() {
    let outcome = run_symbolic(
        "
        branch end_outer_0
        func_outer_0:
        %0 = const 0
        store_var count %0
        branch end_inc_1
        func_inc_1:
        %1 = load_var count
        %2 = const 1
        %3 = binop + %1 %2
        store_var count %3
        %4 = load_var count
        return %4
        end_inc_1:
        %5 = const <function:inc@func_inc_1>
        store_var inc %5
        %6 = call_function inc
        %7 = call_function inc
        %8 = load_var count
        return %8
        end_outer_0:
        %9 = const <function:outer@func_outer_0>
        store_var outer %9
        %10 = call_function outer
        store_var result %10
        ",
    );
    assert_eq!(outcome.var("result"), Some(&Value::Int(2)));
    assert_eq!(outcome.state.closures["env_0"].bindings.get("count"), Some(&Value::Int(2)));
    assert_eq!(outcome.stats.oracle_calls, 0);
}
