pub mod cfg;
pub mod config;
pub mod error;
pub mod ir;
pub mod oracle;
pub mod program;
pub mod registry;
pub mod run;
pub mod util;

// Symbolic VM: values, heap/stack state, deltas and the local engine
pub mod vm;

pub use cfg::{BasicBlock, ControlFlowGraph, build_cfg};
pub use config::{OracleBackend, OracleConfig, RunConfig};
pub use error::{ConfigError, OracleError};
pub use ir::{Instruction, Opcode, Operand, SourceLocation};
pub use oracle::Oracle;
pub use program::Program;
pub use registry::{FunctionRegistry, build_registry};
pub use run::{ExecutionStats, HaltReason, RunOptions, RunOutcome, execute};
pub use vm::{StateDelta, SymbolicValue, Value, VmState};
