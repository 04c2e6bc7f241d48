use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cfg::{ControlFlowGraph, build_cfg};
use crate::ir::{Instruction, parse_listing};
use crate::registry::{FunctionRegistry, build_registry};

/// A lowered program: the instruction list plus the language it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            language: None,
            instructions,
        }
    }

    /// Accepts a bare instruction array or `{"language": ..., "instructions": [...]}`.
    pub fn from_json(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text).context("program is not valid JSON")?;
        match json {
            serde_json::Value::Array(_) => Ok(Self::new(serde_json::from_value(json)?)),
            serde_json::Value::Object(_) => Ok(serde_json::from_value(json)?),
            other => bail!("expected an instruction array or program object, got {}", other),
        }
    }

    pub fn from_listing(text: &str) -> Result<Self> {
        parse_listing(text).map(Self::new)
    }

    /// Loads a JSON program document, or a textual listing when the file ends in `.ir`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading program {}", path.display()))?;
        let program = if path.extension().is_some_and(|ext| ext == "ir") {
            Self::from_listing(&text)
        } else {
            Self::from_json(&text)
        };
        let program = program.with_context(|| format!("parsing program {}", path.display()))?;
        tracing::debug!(
            target: "symir::program",
            path = %path.display(),
            instructions = program.instructions.len(),
            language = ?program.language,
            "program loaded"
        );
        Ok(program)
    }

    pub fn cfg(&self) -> ControlFlowGraph {
        build_cfg(&self.instructions)
    }

    pub fn registry(&self, cfg: &ControlFlowGraph) -> FunctionRegistry {
        build_registry(&self.instructions, cfg)
    }
}
