use super::*;

#[test]
fn test_recursive_factorial_runs_locally() {
    let outcome = run_symbolic(FACTORIAL);
    assert_eq!(outcome.var("result"), Some(&Value::Int(120)));
    assert_eq!(outcome.stats.oracle_calls, 0);
    assert_eq!(outcome.stats.closures_captured, 0);
    assert_eq!(outcome.halt, HaltReason::EndOfProgram);
    assert_eq!(outcome.state.depth(), 1);
    assert_eq!(outcome.stats.local_decisions, outcome.stats.steps - 1);
}

#[test]
fn test_empty_program_halts_immediately() {
    let outcome = run_symbolic("");
    assert_eq!(outcome.halt, HaltReason::Empty);
    assert_eq!(outcome.stats.steps, 0);
    assert_eq!(outcome.state, VmState::new());
}

#[test]
fn test_budget_exhaustion_is_not_an_error() {
    let (cfg, registry) = compile("loop_0:\nbranch loop_0");
    let options = RunOptions::default().with_max_steps(10);
    let outcome = execute(&cfg, &registry, &mut SymbolicOracle::new(), &options).unwrap();
    assert_eq!(outcome.halt, HaltReason::BudgetExhausted);
    assert_eq!(outcome.stats.steps, 10);
}

#[test]
fn test_top_level_return_halts() {
    let outcome = run_symbolic("%0 = const 3\nreturn %0\n%1 = const 4");
    assert_eq!(outcome.halt, HaltReason::Returned);
    assert_eq!(outcome.stats.steps, 2);
    assert_eq!(outcome.state.register("%1"), None);
}

#[test]
fn test_call_resumes_after_call_site() {
    let outcome = run_symbolic(
        "
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
        %6 = call_function add 2 3
        %7 = binop * %6 10
        store_var result %7
        ",
    );
    assert_eq!(outcome.var("result"), Some(&Value::Int(50)));
    assert_eq!(outcome.state.register("%6"), Some(&Value::Int(5)));
    // parameters stay in the callee frame
    assert_eq!(outcome.var("a"), None);
}

#[test]
fn test_class_constructor_and_method() {
    let outcome = run_symbolic(
        "
        branch end_class_Point_0
        class_Point_0:
        branch end___init___1
        func___init___1:
        %0 = symbolic param:self
        store_var self %0
        %1 = symbolic param:x
        store_var x %1
        %2 = load_var self
        %3 = load_var x
        store_field %2 x %3
        %4 = const None
        return %4
        end___init___1:
        %5 = const <function:__init__@func___init___1>
        store_var __init__ %5
        branch end_get_x_2
        func_get_x_2:
        %6 = symbolic param:self
        store_var self %6
        %7 = load_var self
        %8 = load_field %7 x
        return %8
        end_get_x_2:
        %9 = const <function:get_x@func_get_x_2>
        store_var get_x %9
        end_class_Point_0:
        %10 = const <class:Point@class_Point_0>
        store_var Point %10
        %11 = call_function Point 7
        store_var p %11
        %12 = load_var p
        %13 = call_method %12 get_x
        store_var result %13
        ",
    );
    // the constructor's None return does not clobber the object address
    assert_eq!(outcome.var("p"), Some(&Value::str("obj_0")));
    assert_eq!(outcome.var("result"), Some(&Value::Int(7)));
    assert_eq!(outcome.state.heap["obj_0"].type_hint.as_deref(), Some("Point"));
    assert_eq!(outcome.stats.oracle_calls, 0);
}

#[test]
fn test_undefined_field_reads_are_stable() {
    let outcome = run_symbolic(
        "
        %0 = new_object Config
        %1 = load_field %0 retries
        %2 = load_field %0 retries
        %3 = binop == %1 %2
        ",
    );
    assert!(outcome.state.register("%1").is_some_and(Value::is_symbolic));
    assert_eq!(outcome.state.register("%1"), outcome.state.register("%2"));
    assert_eq!(outcome.stats.final_heap_objects, 1);
}

#[test]
fn test_entry_resolution() {
    let (cfg, registry) = compile(FACTORIAL);
    assert_eq!(resolve_entry(&cfg, None).unwrap().as_deref(), cfg.entry());
    assert_eq!(resolve_entry(&cfg, Some("end_fact_0")).unwrap().as_deref(), Some("end_fact_0"));
    assert_eq!(resolve_entry(&cfg, Some("fact")).unwrap().as_deref(), Some("func_fact_0"));

    let err = execute(
        &cfg,
        &registry,
        &mut SymbolicOracle::new(),
        &RunOptions::default().with_entry("nope"),
    )
    .unwrap_err();
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::UnknownEntry { entry, available }) => {
            assert_eq!(entry, "nope");
            assert!(available.iter().any(|l| l == "func_fact_0"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_trace_snapshots() {
    let (cfg, registry) = compile("%0 = const 1\n%1 = binop + %0 1\nstore_var x %1");
    let options = RunOptions::default().with_trace(true);
    let outcome = execute(&cfg, &registry, &mut SymbolicOracle::new(), &options).unwrap();
    let trace = outcome.trace.as_ref().unwrap();

    assert_eq!(trace.initial_state, VmState::new());
    assert_eq!(trace.steps.len(), 3);
    assert_eq!(trace.steps[0].state.register("%1"), None);
    assert_eq!(trace.steps[1].state.register("%1"), Some(&Value::Int(2)));
    assert!(trace.steps.iter().all(|s| s.source == DecisionSource::Local));
    assert_eq!(trace.steps[2].offset, 2);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["halt"], "end_of_program");
    assert_eq!(json["trace"]["steps"][2]["source"], "local");
}

#[test]
fn test_parallel_runs_share_graph() {
    let (cfg, registry) = compile(FACTORIAL);
    let options = RunOptions::default().with_max_steps(1_000);
    let results: Vec<Option<Value>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let outcome = execute(&cfg, &registry, &mut SymbolicOracle::new(), &options).unwrap();
                    outcome.var("result").cloned()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(results.iter().all(|r| r == &Some(Value::Int(120))));
}
