pub(super) use crate::{
    cfg::build_cfg,
    ir::{Instruction, parse_listing},
    registry::{FunctionRegistry, build_registry},
    vm::{Decision, HeapObject, LocalEngine, StackFrame, StateDelta, Value, VmState, parse_const},
};

pub(super) fn inst(line: &str) -> Instruction {
    parse_listing(line).unwrap().remove(0)
}

pub(super) fn registry_for(listing: &str) -> FunctionRegistry {
    let insts = parse_listing(listing).unwrap();
    build_registry(&insts, &build_cfg(&insts))
}

pub(super) fn decided(engine: &LocalEngine<'_>, line: &str, state: &VmState) -> StateDelta {
    match engine.decide(&inst(line), state) {
        Decision::Decided(delta) => delta,
        Decision::Declined(reason) => panic!("`{}` declined: {}", line, reason),
    }
}

pub(super) fn declines(engine: &LocalEngine<'_>, line: &str, state: &VmState) -> bool {
    !engine.decide(&inst(line), state).is_decided()
}

pub(super) fn reg(delta: &StateDelta, name: &str) -> Value {
    delta.register_writes.get(name).cloned().unwrap_or_else(|| panic!("no write to {}", name))
}

mod basics;
mod calls;
mod heap;
