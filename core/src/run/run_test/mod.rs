pub(super) use crate::{
    cfg::{ControlFlowGraph, build_cfg},
    error::{ConfigError, OracleError},
    ir::parse_listing,
    oracle::{ReplayOracle, SymbolicOracle},
    registry::{FunctionRegistry, build_registry},
    run::{DecisionSource, HaltReason, RunOptions, RunOutcome, execute, resolve_entry},
    vm::{Value, VmState},
};

pub(super) fn compile(listing: &str) -> (ControlFlowGraph, FunctionRegistry) {
    let insts = parse_listing(listing).unwrap();
    let cfg = build_cfg(&insts);
    let registry = build_registry(&insts, &cfg);
    (cfg, registry)
}

pub(super) fn run_symbolic(listing: &str) -> RunOutcome {
    let (cfg, registry) = compile(listing);
    execute(&cfg, &registry, &mut SymbolicOracle::new(), &RunOptions::default().with_max_steps(1_000)).unwrap()
}

pub(super) const FACTORIAL: &str = "
    branch end_fact_0
    func_fact_0:
    %0 = symbolic param:n
    store_var n %0
    %1 = load_var n
    %2 = const 1
    %3 = binop <= %1 %2
    branch_if %3 if_true_1,if_end_2
    if_true_1:
    %4 = const 1
    return %4
    if_end_2:
    %5 = load_var n
    %6 = load_var n
    %7 = const 1
    %8 = binop - %6 %7
    %9 = call_function fact %8
    %10 = binop * %5 %9
    return %10
    end_fact_0:
    %11 = const <function:fact@func_fact_0>
    store_var fact %11
    %12 = const 5
    %13 = call_function fact %12
    store_var result %13
";

mod closures;
mod control;
mod oracle;
