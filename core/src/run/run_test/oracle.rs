use super::*;

const BRANCHY: &str = "
    %0 = load_var user_input
    branch_if %0 yes_1,no_2
    yes_1:
    %1 = const 1
    store_var r %1
    branch done_3
    no_2:
    %2 = const 2
    store_var r %2
    done_3:
";

#[test]
fn test_symbolic_branch_goes_to_oracle() {
    let outcome = run_symbolic(BRANCHY);
    assert_eq!(outcome.stats.oracle_calls, 1);
    assert_eq!(outcome.var("r"), Some(&Value::Int(1)));
    assert_eq!(outcome.state.path_conditions, vec!["assume sym_0 is True".to_string()]);
    assert_eq!(outcome.stats.final_symbolic_count, 1);
}

#[test]
fn test_replayed_decision_picks_other_side() {
    let (cfg, registry) = compile(BRANCHY);
    let mut oracle = ReplayOracle::new([r#"{"next_label": "no_2", "path_condition": "user_input is falsy"}"#]);
    let outcome = execute(&cfg, &registry, &mut oracle, &RunOptions::default().with_trace(true)).unwrap();

    assert_eq!(outcome.var("r"), Some(&Value::Int(2)));
    assert_eq!(outcome.state.path_conditions, vec!["user_input is falsy".to_string()]);
    let sources: Vec<DecisionSource> = outcome.trace.unwrap().steps.iter().map(|s| s.source).collect();
    assert_eq!(sources.iter().filter(|s| **s == DecisionSource::Oracle).count(), 1);
}

#[test]
fn test_oracle_failure_aborts_run() {
    let (cfg, registry) = compile(BRANCHY);
    let mut oracle = ReplayOracle::new(Vec::<String>::new());
    let err = execute(&cfg, &registry, &mut oracle, &RunOptions::default()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<OracleError>(),
        Some(&OracleError::ReplayExhausted { answered: 0 })
    );
    assert!(format!("{:#}", err).contains("branch_if"));
}

#[test]
fn test_unknown_call_becomes_symbolic() {
    let outcome = run_symbolic("%0 = call_function mystery 3\nstore_var x %0");
    let value = outcome.var("x").and_then(Value::as_symbolic).cloned().unwrap();
    assert_eq!(value.constraints, vec!["mystery(3)".to_string()]);
    assert_eq!(outcome.stats.oracle_calls, 1);
}

#[test]
fn test_return_without_target_halts() {
    let (cfg, registry) = compile("%0 = call_unknown f\n%1 = const 2\nreturn %1");
    let mut oracle = ReplayOracle::new([r#"{"register_writes": {"%0": 1}, "call_push": {"function_name": "f"}}"#]);
    let outcome = execute(&cfg, &registry, &mut oracle, &RunOptions::default()).unwrap();
    assert_eq!(outcome.halt, HaltReason::UnresolvableReturn);
    assert_eq!(outcome.state.depth(), 1);
}
