use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::util::format_float;

mod listing;
pub use listing::parse_listing;


/// Closed opcode set of the flattened three-address IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // Value producers
    Const,
    LoadVar,
    LoadField,
    LoadIndex,
    NewObject,
    NewArray,
    Binop,
    Unop,
    CallFunction,
    CallMethod,
    CallUnknown,
    // Value consumers / control flow
    StoreVar,
    StoreField,
    StoreIndex,
    BranchIf,
    Branch,
    Return,
    Throw,
    Symbolic,
    Label,
}

impl Opcode {
    pub const ALL: [Opcode; 20] = [
        Opcode::Const,
        Opcode::LoadVar,
        Opcode::LoadField,
        Opcode::LoadIndex,
        Opcode::NewObject,
        Opcode::NewArray,
        Opcode::Binop,
        Opcode::Unop,
        Opcode::CallFunction,
        Opcode::CallMethod,
        Opcode::CallUnknown,
        Opcode::StoreVar,
        Opcode::StoreField,
        Opcode::StoreIndex,
        Opcode::BranchIf,
        Opcode::Branch,
        Opcode::Return,
        Opcode::Throw,
        Opcode::Symbolic,
        Opcode::Label,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::Const => "CONST",
            Opcode::LoadVar => "LOAD_VAR",
            Opcode::LoadField => "LOAD_FIELD",
            Opcode::LoadIndex => "LOAD_INDEX",
            Opcode::NewObject => "NEW_OBJECT",
            Opcode::NewArray => "NEW_ARRAY",
            Opcode::Binop => "BINOP",
            Opcode::Unop => "UNOP",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::CallMethod => "CALL_METHOD",
            Opcode::CallUnknown => "CALL_UNKNOWN",
            Opcode::StoreVar => "STORE_VAR",
            Opcode::StoreField => "STORE_FIELD",
            Opcode::StoreIndex => "STORE_INDEX",
            Opcode::BranchIf => "BRANCH_IF",
            Opcode::Branch => "BRANCH",
            Opcode::Return => "RETURN",
            Opcode::Throw => "THROW",
            Opcode::Symbolic => "SYMBOLIC",
            Opcode::Label => "LABEL",
        }
    }

    /// Instructions after which a new basic block must start.
    pub fn ends_block(&self) -> bool {
        matches!(self, Opcode::Branch | Opcode::BranchIf | Opcode::Return | Opcode::Throw)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Opcode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == upper)
            .ok_or_else(|| anyhow!("unknown opcode '{}'", s))
    }
}

/// One operand slot: a register (`%3`), a literal, or an opcode-specific token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Operand {
    pub fn text(s: impl Into<String>) -> Self {
        Operand::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Operand::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_register(&self) -> bool {
        self.as_text().is_some_and(is_register)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Operand::Int(i) => f.write_str(itoa::Buffer::new().format(*i)),
            Operand::Float(x) => f.write_str(&format_float(*x)),
            Operand::Text(s) => f.write_str(s),
            Operand::Null => f.write_str("None"),
        }
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Text(s.to_string())
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Operand::Text(s)
    }
}

impl From<i64> for Operand {
    fn from(i: i64) -> Self {
        Operand::Int(i)
    }
}

pub fn is_register(s: &str) -> bool {
    s.starts_with('%')
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceLocation {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == SourceLocation::default()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return f.write_str("<unknown>");
        }
        write!(f, "{}:{}-{}:{}", self.start_line, self.start_col, self.end_line, self.end_col)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_reg: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<Operand>,
    /// Label name for LABEL, target for BRANCH, `"true,false"` for BRANCH_IF
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            result_reg: None,
            operands: Vec::new(),
            label: None,
            source_location: None,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::new(Opcode::Label).with_label(name)
    }

    pub fn with_result(mut self, reg: impl Into<String>) -> Self {
        self.result_reg = Some(reg.into());
        self
    }

    pub fn with_operands<I, O>(mut self, operands: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<Operand>,
    {
        self.operands = operands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.source_location = Some(location);
        self
    }

    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    pub fn operand_text(&self, index: usize) -> Option<&str> {
        self.operand(index).and_then(Operand::as_text)
    }

    /// Labels this instruction may transfer control to, in declaration order.
    pub fn targets(&self) -> Vec<&str> {
        match (self.opcode, self.label.as_deref()) {
            (Opcode::Branch, Some(label)) => vec![label.trim()],
            (Opcode::BranchIf, Some(pair)) => pair.split(',').map(str::trim).filter(|s| !s.is_empty()).collect(),
            _ => Vec::new(),
        }
    }

    /// `(true_label, false_label)` of a well-formed BRANCH_IF.
    pub fn branch_targets(&self) -> Option<(&str, &str)> {
        if self.opcode != Opcode::BranchIf {
            return None;
        }
        let (t, f) = self.label.as_deref()?.split_once(',')?;
        let (t, f) = (t.trim(), f.trim());
        if t.is_empty() || f.is_empty() || f.contains(',') {
            return None;
        }
        Some((t, f))
    }

    fn location(&self) -> Option<&SourceLocation> {
        self.source_location.as_ref().filter(|loc| !loc.is_unknown())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.opcode, &self.label) {
            (Opcode::Label, Some(label)) => write!(f, "{}:", label)?,
            _ => {
                if let Some(reg) = &self.result_reg {
                    write!(f, "{} = ", reg)?;
                }
                f.write_str(&self.opcode.as_str().to_ascii_lowercase())?;
                for op in &self.operands {
                    write!(f, " {}", op)?;
                }
                if let Some(label) = &self.label {
                    write!(f, " {}", label)?;
                }
            }
        }
        if let Some(loc) = self.location() {
            write!(f, "  # {}", loc)?;
        }
        Ok(())
    }
}

/// Frequency of each opcode in `instructions`.
pub fn count_opcodes(instructions: &[Instruction]) -> BTreeMap<Opcode, usize> {
    let mut counts = BTreeMap::new();
    for inst in instructions {
        *counts.entry(inst.opcode).or_insert(0) += 1;
    }
    counts
}

/// Instructions of one function, from its `func_<name>_N` label up to (excluding) `end_<name>_N`.
///
/// Returns an empty vector when no function of that name exists.
pub fn extract_function_instructions(instructions: &[Instruction], name: &str) -> Vec<Instruction> {
    let prefix = format!("{}{}_", crate::registry::FUNC_LABEL_PREFIX, name);
    let start = instructions.iter().position(|inst| {
        inst.opcode == Opcode::Label
            && inst
                .label
                .as_deref()
                .and_then(|l| l.strip_prefix(&prefix))
                .is_some_and(|suffix| suffix.chars().all(|c| c.is_ascii_digit()))
    });
    let Some(start) = start else {
        return Vec::new();
    };
    let Some(label) = instructions[start].label.as_deref() else {
        return Vec::new();
    };
    let end_label = format!("end_{}", &label[crate::registry::FUNC_LABEL_PREFIX.len()..]);
    let end = instructions[start..]
        .iter()
        .position(|inst| inst.opcode == Opcode::Label && inst.label.as_deref() == Some(end_label.as_str()))
        .map_or(instructions.len(), |off| start + off);
    instructions[start..end].to_vec()
}
