use anyhow::Result;

use super::Oracle;
use crate::error::OracleError;
use crate::ir::{Instruction, Opcode, Operand, is_register};
use crate::vm::{SYMBOL_PREFIX, StateDelta, SymbolicValue, Value, VmState, parse_const};

/// Offline oracle: every unknown result becomes a fresh symbolic value
/// constrained by the expression that produced it.
///
/// Symbolic branches take the true side and record the assumption.
#[derive(Debug, Default)]
pub struct SymbolicOracle;

impl SymbolicOracle {
    pub fn new() -> Self {
        Self
    }
}

/// Register operands show their current value; literals show as written.
fn show(state: &VmState, op: &Operand) -> String {
    match op {
        Operand::Text(s) if is_register(s) => state.register(s).map_or_else(|| s.clone(), Value::to_string),
        other => other.to_string(),
    }
}

fn value_of(state: &VmState, op: Option<&Operand>) -> Value {
    match op {
        Some(Operand::Text(s)) if is_register(s) => state.register(s).cloned().unwrap_or_default(),
        Some(Operand::Text(s)) => parse_const(s),
        Some(Operand::Bool(b)) => Value::Bool(*b),
        Some(Operand::Int(i)) => Value::Int(*i),
        Some(Operand::Float(x)) => Value::Float(*x),
        Some(Operand::Null) | None => Value::Null,
    }
}

fn describe(inst: &Instruction, state: &VmState) -> String {
    let args = |from: usize| -> String {
        inst.operands
            .iter()
            .skip(from)
            .map(|op| show(state, op))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let at = |i: usize| inst.operand(i).map(|op| show(state, op)).unwrap_or_default();
    match inst.opcode {
        Opcode::Binop => format!("{} {} {}", at(1), at(0), at(2)),
        Opcode::Unop => format!("{} {}", at(0), at(1)),
        Opcode::CallFunction | Opcode::CallUnknown => format!("{}({})", at(0), args(1)),
        Opcode::CallMethod => format!("{}.{}({})", at(0), at(1), args(2)),
        Opcode::LoadField | Opcode::LoadIndex => format!("{}[{}]", at(0), at(1)),
        Opcode::LoadVar => at(0),
        _ => inst.to_string(),
    }
}

impl Oracle for SymbolicOracle {
    fn decide(&mut self, inst: &Instruction, state: &VmState) -> Result<StateDelta> {
        let mut delta = StateDelta::default();
        let mut next = state.counter;
        let mut fresh = |constraint: String| {
            let sym = SymbolicValue::new(format!("{}{}", SYMBOL_PREFIX, next)).with_constraint(constraint);
            next += 1;
            sym
        };

        match inst.opcode {
            Opcode::BranchIf => {
                let (on_true, _) = inst
                    .branch_targets()
                    .ok_or_else(|| OracleError::contract(format!("malformed branch targets in `{}`", inst)))?;
                let cond = inst.operand(0).map(|op| show(state, op)).unwrap_or_default();
                delta.next_label = Some(on_true.to_string());
                delta.path_condition = Some(format!("assume {} is True", cond));
                delta.reasoning = format!("symbolic condition {}; taking {}", cond, on_true);
            }
            Opcode::Return | Opcode::Throw => {
                delta.return_value = Some(value_of(state, inst.operand(0)));
                delta.call_pop = true;
                delta.reasoning = format!("{} unwinds the frame", inst.opcode);
            }
            Opcode::StoreVar => {
                if let Some(name) = inst.operand_text(0) {
                    let value: Value = match inst.operand(1) {
                        Some(Operand::Text(reg)) if is_register(reg) && state.register(reg).is_none() => {
                            fresh(reg.clone()).into()
                        }
                        op => value_of(state, op),
                    };
                    delta.write_var(name, value);
                }
                delta.reasoning = "store of unknown value".to_string();
            }
            _ => {}
        }

        if let Some(reg) = &inst.result_reg {
            let sym = fresh(describe(inst, state));
            delta.reasoning = format!("{} -> symbolic {}", describe(inst, state), sym.name);
            delta.write_register(reg.clone(), sym);
        }
        Ok(delta)
    }

    fn name(&self) -> &str {
        "symbolic"
    }
}
