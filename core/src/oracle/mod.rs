//! Oracle protocol and backends
//!
//! An oracle decides the instructions the local engine declines. Every
//! backend speaks the same response format: one JSON object in the
//! `StateDelta` shape, validated by [`parse_response`].

mod command;
mod protocol;
mod replay;
mod symbolic;

use anyhow::Result;

pub use command::CommandOracle;
pub use protocol::{OracleRequest, PROTOCOL_PROMPT, StateSnapshot, parse_response};
pub use replay::ReplayOracle;
pub use symbolic::SymbolicOracle;

use crate::config::{OracleBackend, OracleConfig};
use crate::error::ConfigError;
use crate::ir::Instruction;
use crate::vm::{StateDelta, VmState};

pub trait Oracle {
    /// Decides one instruction. An error fails the step and the run.
    fn decide(&mut self, inst: &Instruction, state: &VmState) -> Result<StateDelta>;

    fn name(&self) -> &str;
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn decide(&mut self, inst: &Instruction, state: &VmState) -> Result<StateDelta> {
        (**self).decide(inst, state)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

pub fn build_oracle(config: &OracleConfig) -> Result<Box<dyn Oracle>> {
    let oracle: Box<dyn Oracle> = match config.backend {
        OracleBackend::Symbolic => Box::new(SymbolicOracle::new()),
        OracleBackend::Command => Box::new(CommandOracle::new(&config.command, config.timeout_ms, config.retries)?),
        OracleBackend::Replay => {
            let path = config.replay.as_ref().ok_or(ConfigError::MissingReplayFile)?;
            Box::new(ReplayOracle::from_file(path)?)
        }
    };
    tracing::debug!(target: "symir::oracle", backend = oracle.name(), "oracle ready");
    Ok(oracle)
}
