use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::OracleError;
use crate::ir::{Instruction, Opcode, Operand, is_register};
use crate::util::numeric_suffix;
use crate::vm::{HeapObject, SYMBOL_PREFIX, StateDelta, Value, VmState};

/// Standing instructions sent with every request of the `command` backend.
pub const PROTOCOL_PROMPT: &str = r#"You execute one instruction of a flattened intermediate representation against a symbolic machine state.

The request carries the instruction text, its opcode, raw operands and result register, the current values of every register operand (`resolved_operand_values`), and a compact state snapshot (variables visible from the current frame; the heap and the path conditions when non-empty).

Reply with exactly one JSON object describing the instruction's effects. Every field is optional:

{
  "register_writes": {"<reg>": <value>},
  "var_writes": {"<name>": <value>},
  "heap_writes": [{"obj_addr": "...", "field": "...", "value": <value>}],
  "new_objects": [{"addr": "...", "type_hint": "..."}],
  "next_label": "<label>",
  "call_push": {"function_name": "...", "return_label": "..."},
  "call_pop": false,
  "return_value": <value>,
  "path_condition": "<assumption>",
  "reasoning": "<short explanation>"
}

Unknown values are written as {"__symbolic__": true, "name": "sym_N", "type_hint": "...", "constraints": ["..."]}; an empty or missing name is assigned by the engine.

Rules:
- If the instruction has a result register, register_writes must contain it.
- Arithmetic on unknown operands yields a symbolic value whose constraint is the expression, e.g. "sym_0 * 4".
- Calls to functions you cannot evaluate yield a symbolic value constrained by the call, e.g. "factorial(5)".
- For branch_if the label field is "true_label,false_label": set next_label to the side you pick and record the assumption in path_condition.

Answer with the JSON object only."#;

/// Slice of the machine state shown to the oracle.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub local_vars: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub heap: BTreeMap<String, HeapObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path_conditions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest {
    pub instruction: String,
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub result_reg: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub resolved_operand_values: BTreeMap<String, Value>,
    pub state: StateSnapshot,
}

#[derive(Serialize)]
struct Envelope<'a> {
    instructions: &'a str,
    request: &'a OracleRequest,
}

impl OracleRequest {
    pub fn new(inst: &Instruction, state: &VmState) -> Self {
        let resolved_operand_values = inst
            .operands
            .iter()
            .filter_map(Operand::as_text)
            .filter(|op| is_register(op))
            .filter_map(|reg| Some((reg.to_string(), state.register(reg)?.clone())))
            .collect();
        Self {
            instruction: inst.to_string(),
            opcode: inst.opcode,
            operands: inst.operands.clone(),
            result_reg: inst.result_reg.clone(),
            resolved_operand_values,
            state: StateSnapshot {
                local_vars: state.visible_vars(),
                heap: state.heap.clone(),
                path_conditions: state.path_conditions.clone(),
            },
        }
    }

    /// The request wrapped with the standing protocol instructions, as written to an oracle process.
    pub fn envelope(&self) -> Result<String, OracleError> {
        let envelope = Envelope {
            instructions: PROTOCOL_PROMPT,
            request: self,
        };
        serde_json::to_string(&envelope).map_err(|e| OracleError::transport(format!("encoding request: {}", e)))
    }
}

/// Removes a surrounding ``` / ```json fence.
fn strip_fences(text: &str) -> &str {
    let mut text = text.trim();
    if text.starts_with("```") {
        text = text.split_once('\n').map_or("", |(_, rest)| rest);
    }
    if text.ends_with("```") {
        text = text.rsplit_once('\n').map_or("", |(head, _)| head);
    }
    text.trim()
}

/// Parses and validates one oracle response for `inst`.
///
/// Unnamed symbolic values get fresh names above the state's counter and above
/// any name the response itself uses.
pub fn parse_response(text: &str, inst: &Instruction, state: &VmState) -> Result<StateDelta, OracleError> {
    let body = strip_fences(text);
    let json: serde_json::Value = serde_json::from_str(body).map_err(|e| OracleError::malformed(e.to_string()))?;
    if !json.is_object() {
        return Err(OracleError::malformed(format!("expected a JSON object, got {}", json)));
    }
    let mut delta: StateDelta = serde_json::from_value(json).map_err(|e| OracleError::contract(e.to_string()))?;

    if let Some(reg) = &inst.result_reg {
        if !delta.register_writes.contains_key(reg) {
            return Err(OracleError::contract(format!("missing write to result register {}", reg)));
        }
    }
    if let Some(obj) = delta.new_objects.iter().find(|obj| obj.addr.is_empty()) {
        return Err(OracleError::contract(format!("new object without address ({:?})", obj.type_hint)));
    }

    let mut next = state.counter;
    for value in delta.written_values() {
        visit_symbolics(value, &mut |name| {
            if let Some(n) = numeric_suffix(name, SYMBOL_PREFIX) {
                next = next.max(n + 1);
            }
        });
    }
    for value in delta.written_values_mut() {
        name_symbolics(value, &mut next);
    }
    Ok(delta)
}

fn visit_symbolics(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::Symbolic(sym) => f(&sym.name),
        Value::List(items) => items.iter().for_each(|v| visit_symbolics(v, f)),
        Value::Map(map) => map.values().for_each(|v| visit_symbolics(v, f)),
        _ => {}
    }
}

fn name_symbolics(value: &mut Value, next: &mut u64) {
    match value {
        Value::Symbolic(sym) if sym.name.is_empty() => {
            sym.name = format!("{}{}", SYMBOL_PREFIX, next);
            *next += 1;
        }
        Value::List(items) => items.iter_mut().for_each(|v| name_symbolics(v, next)),
        Value::Map(map) => map.values_mut().for_each(|v| name_symbolics(v, next)),
        _ => {}
    }
}
