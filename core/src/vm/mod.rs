//! Symbolic VM subsystem
//!
//! Values, the heap/stack state, the delta that mutates it, and the local
//! engine that computes deltas for instructions whose operands are known.

mod builtins;
mod delta;
mod engine;
mod ops;
mod state;
mod value;

pub use builtins::{BUILTINS, BuiltinFn, Builtins};
pub use delta::{CallPush, HeapWrite, NewClosure, NewObject, StateDelta};
pub use engine::{Decision, Draft, LocalEngine, parse_const};
pub use ops::{BinOp, UnaryOp, loose_eq};
pub use state::{
    ARR_ADDR_PREFIX, ApplyOutcome, ClosureEnv, ENV_PREFIX, HeapObject, MAIN_FRAME_NAME, OBJ_ADDR_PREFIX,
    SYMBOL_PREFIX, StackFrame, VmState,
};
pub use value::{SYMBOLIC_MARKER, SymbolicValue, Value};

#[cfg(test)]
mod engine_test;
