use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};

use super::Oracle;
use super::protocol::parse_response;
use crate::error::OracleError;
use crate::ir::Instruction;
use crate::vm::{StateDelta, VmState};

/// Answers from pre-recorded response texts, in order.
#[derive(Debug, Default)]
pub struct ReplayOracle {
    responses: VecDeque<String>,
    answered: usize,
}

impl ReplayOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            answered: 0,
        }
    }

    /// One JSON document per non-blank line.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading replay file {}", path.display()))?;
        Ok(Self::new(text.lines().map(str::trim).filter(|line| !line.is_empty())))
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

impl Oracle for ReplayOracle {
    fn decide(&mut self, inst: &Instruction, state: &VmState) -> Result<StateDelta> {
        let text = self.responses.pop_front().ok_or(OracleError::ReplayExhausted {
            answered: self.answered,
        })?;
        self.answered += 1;
        let delta = parse_response(&text, inst, state)
            .with_context(|| format!("replayed response #{}", self.answered))?;
        Ok(delta)
    }

    fn name(&self) -> &str {
        "replay"
    }
}
