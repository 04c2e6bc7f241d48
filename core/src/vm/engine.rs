use super::builtins::{BUILTINS, Builtins};
use super::delta::{CallPush, NewClosure, StateDelta};
use super::ops::{BinOp, UnaryOp};
use super::state::{ARR_ADDR_PREFIX, ENV_PREFIX, HeapObject, OBJ_ADDR_PREFIX, SYMBOL_PREFIX, VmState};
use super::value::{SymbolicValue, Value};
use crate::ir::{Instruction, Opcode, Operand, is_register};
use crate::registry::{ClassRef, FuncRef, FunctionRegistry, PARAM_PREFIX};
use crate::util::index_key;

/// Outcome of trying to execute one instruction without the oracle.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Decided(StateDelta),
    /// The engine cannot compute the effect; the reason is for logs only
    Declined(String),
}

impl Decision {
    pub fn is_decided(&self) -> bool {
        matches!(self, Decision::Decided(_))
    }
}

type Step<T> = Result<T, String>;

/// A delta under construction plus a private supply of fresh identifiers.
///
/// Names start at the state's counter; they only become reserved once the
/// delta is applied, so a declined draft leaves no trace.
pub struct Draft<'a> {
    pub state: &'a VmState,
    pub delta: StateDelta,
    next_id: u64,
}

impl<'a> Draft<'a> {
    pub fn new(state: &'a VmState) -> Self {
        Self {
            state,
            delta: StateDelta::default(),
            next_id: state.counter,
        }
    }

    pub fn fresh_name(&mut self, prefix: &str) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("{}{}", prefix, id)
    }

    pub fn fresh_symbolic(&mut self) -> SymbolicValue {
        SymbolicValue::new(self.fresh_name(SYMBOL_PREFIX))
    }

    /// Allocates a heap object in the delta and returns its address.
    pub fn allocate(&mut self, prefix: &str, type_hint: Option<String>) -> String {
        let addr = self.fresh_name(prefix);
        self.delta.allocate(addr.clone(), type_hint);
        addr
    }

    pub fn finish(self, reasoning: impl Into<String>) -> StateDelta {
        let mut delta = self.delta;
        delta.reasoning = reasoning.into();
        delta
    }
}

/// Parses a CONST literal: `None`/`null`, booleans, integers, floats, quoted strings, else raw text.
pub fn parse_const(raw: &str) -> Value {
    match raw {
        "None" | "null" => return Value::Null,
        "True" | "true" => return Value::Bool(true),
        "False" | "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = raw.parse::<f64>() {
        return Value::Float(x);
    }
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0] {
        return Value::Str(raw[1..raw.len() - 1].to_string());
    }
    Value::Str(raw.to_string())
}

fn literal(op: &Operand) -> Value {
    match op {
        Operand::Bool(b) => Value::Bool(*b),
        Operand::Int(i) => Value::Int(*i),
        Operand::Float(x) => Value::Float(*x),
        Operand::Text(s) => parse_const(s),
        Operand::Null => Value::Null,
    }
}

/// Mechanical per-opcode execution over fully known operands.
///
/// Side-effect free: every effect, including memoized field reads and fresh
/// identifiers, is carried in the returned delta.
pub struct LocalEngine<'a> {
    registry: &'a FunctionRegistry,
    builtins: &'a Builtins,
}

impl<'a> LocalEngine<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self::with_builtins(registry, &BUILTINS)
    }

    pub fn with_builtins(registry: &'a FunctionRegistry, builtins: &'a Builtins) -> Self {
        Self { registry, builtins }
    }

    pub fn decide(&self, inst: &Instruction, state: &VmState) -> Decision {
        let mut draft = Draft::new(state);
        match self.step(inst, &mut draft) {
            Ok(reasoning) => Decision::Decided(draft.finish(reasoning)),
            Err(reason) => {
                tracing::trace!(target: "symir::engine", %inst, %reason, "declined");
                Decision::Declined(reason)
            }
        }
    }

    fn step(&self, inst: &Instruction, draft: &mut Draft<'_>) -> Step<String> {
        let state = draft.state;
        match inst.opcode {
            Opcode::Label => Ok(String::new()),
            Opcode::Const => {
                let value = inst.operand(0).map_or(Value::Null, literal);
                let value = self.close_over(value, draft);
                produce(inst, draft, value.clone());
                Ok(format!("constant {}", value))
            }
            Opcode::LoadVar => {
                let name = text(inst, 0)?;
                match state.lookup_var(name) {
                    Some(value) => {
                        produce(inst, draft, value.clone());
                        Ok(format!("load {}", name))
                    }
                    None => {
                        let sym = draft.fresh_symbolic();
                        let reasoning = format!("unbound variable {} -> symbolic {}", name, sym.name);
                        produce(inst, draft, sym);
                        Ok(reasoning)
                    }
                }
            }
            Opcode::StoreVar => {
                let name = text(inst, 0)?;
                let value = resolve(state, operand(inst, 1)?)?;
                draft.delta.write_var(name, value);
                Ok(format!("store {}", name))
            }
            Opcode::NewObject => {
                let type_hint = inst.operand(0).map(ToString::to_string);
                let addr = draft.allocate(OBJ_ADDR_PREFIX, type_hint);
                produce(inst, draft, Value::Str(addr.clone()));
                Ok(format!("new object {}", addr))
            }
            Opcode::NewArray => {
                let type_hint = inst.operand(0).map(ToString::to_string);
                let size = inst.operand(1).map(|op| resolve(state, op)).transpose()?;
                let addr = draft.allocate(ARR_ADDR_PREFIX, type_hint);
                if let Some(Value::Int(n)) = size {
                    draft.delta.write_heap(addr.clone(), "length", Value::Int(n));
                }
                produce(inst, draft, Value::Str(addr.clone()));
                Ok(format!("new array {}", addr))
            }
            Opcode::LoadField | Opcode::LoadIndex => self.load_member(inst, draft),
            Opcode::StoreField | Opcode::StoreIndex => {
                let (addr, _) = heap_object(state, operand(inst, 0)?)?;
                let key = member_key(state, inst.opcode, operand(inst, 1)?)?;
                let value = resolve(state, operand(inst, 2)?)?;
                draft.delta.write_heap(addr.clone(), key.clone(), value);
                Ok(format!("store {}[{}]", addr, key))
            }
            Opcode::Binop => {
                let op_text = text(inst, 0)?;
                let op = BinOp::parse(op_text).ok_or_else(|| format!("unknown operator {}", op_text))?;
                let l = concrete(state, operand(inst, 1)?)?;
                let r = concrete(state, operand(inst, 2)?)?;
                let value = op.eval(&l, &r).ok_or_else(|| format!("uncomputable {} {} {}", l, op, r))?;
                let reasoning = format!("{} {} {} = {}", l, op, r, value);
                produce(inst, draft, value);
                Ok(reasoning)
            }
            Opcode::Unop => {
                let op_text = text(inst, 0)?;
                let op = UnaryOp::parse(op_text).ok_or_else(|| format!("unknown operator {}", op_text))?;
                let x = concrete(state, operand(inst, 1)?)?;
                let value = op.eval(&x).ok_or_else(|| format!("uncomputable {} {}", op, x))?;
                let reasoning = format!("{} {} = {}", op, x, value);
                produce(inst, draft, value);
                Ok(reasoning)
            }
            Opcode::Branch => {
                draft.delta.next_label = inst.label.clone();
                Ok(format!("jump {}", inst.label.as_deref().unwrap_or("(fall through)")))
            }
            Opcode::BranchIf => {
                let (on_true, on_false) = inst.branch_targets().ok_or("malformed branch targets")?;
                let cond_op = operand(inst, 0)?;
                let cond = resolve(state, cond_op)?;
                let taken = cond.truthy().ok_or_else(|| format!("symbolic condition {}", cond))?;
                let target = if taken { on_true } else { on_false };
                draft.delta.next_label = Some(target.to_string());
                draft.delta.path_condition = Some(format!("{} is {}", cond_op, Value::Bool(taken)));
                Ok(format!("branch {} -> {}", cond, target))
            }
            Opcode::CallFunction => self.call_function(inst, draft),
            Opcode::CallMethod => self.call_method(inst, draft),
            Opcode::Return => {
                let value = match inst.operand(0) {
                    Some(op) => resolve(state, op)?,
                    None => Value::Null,
                };
                let reasoning = format!("return {}", value);
                draft.delta.return_value = Some(value);
                draft.delta.call_pop = true;
                Ok(reasoning)
            }
            Opcode::Symbolic => {
                let hint = text(inst, 0)?;
                let param = hint
                    .strip_prefix(PARAM_PREFIX)
                    .ok_or_else(|| format!("symbolic {}", hint))?;
                let value = state
                    .current_frame()
                    .and_then(|frame| frame.local_vars.get(param))
                    .ok_or_else(|| format!("unbound parameter {}", param))?
                    .clone();
                produce(inst, draft, value);
                Ok(format!("parameter {}", param))
            }
            Opcode::CallUnknown => Err("call through unknown target".to_string()),
            Opcode::Throw => Err("throw".to_string()),
        }
    }

    /// Tags a function literal evaluated inside a call with the frame's closure environment.
    fn close_over(&self, value: Value, draft: &mut Draft<'_>) -> Value {
        let state = draft.state;
        let Some(func) = value.as_str().and_then(FuncRef::parse) else {
            return value;
        };
        if func.env.is_some() || state.depth() <= 1 {
            return value;
        }
        let Some(frame) = state.current_frame() else {
            return value;
        };
        let env = match &frame.owned_env {
            Some(env) => env.clone(),
            None => {
                let id = draft.fresh_name(ENV_PREFIX);
                draft.delta.new_closure = Some(NewClosure {
                    id: id.clone(),
                    bindings: frame.local_vars.clone(),
                    parent: frame.closure_env.clone(),
                });
                id
            }
        };
        Value::Str(func.with_env(env).to_string())
    }

    fn load_member(&self, inst: &Instruction, draft: &mut Draft<'_>) -> Step<String> {
        let state = draft.state;
        let base = resolve(state, operand(inst, 0)?)?;
        let key_op = operand(inst, 1)?;

        if let Some(value) = index_value(&base, state, inst.opcode, key_op)? {
            produce(inst, draft, value);
            return Ok("index into value".to_string());
        }

        let (addr, obj) = heap_object(state, operand(inst, 0)?)?;
        let mut key = member_key(state, inst.opcode, key_op)?;
        if let (Opcode::LoadIndex, Ok(i)) = (inst.opcode, key.parse::<i64>()) {
            if let (true, Some(Value::Int(len))) = (i < 0, obj.fields.get("length")) {
                key = index_key(len + i);
            }
        }
        match obj.fields.get(&key) {
            Some(value) => {
                produce(inst, draft, value.clone());
                Ok(format!("load {}[{}]", addr, key))
            }
            None => {
                let sym = draft.fresh_symbolic().with_constraint(format!("{}[{}]", addr, key));
                draft.delta.write_heap(addr.clone(), key.clone(), sym.clone());
                let reasoning = format!("undefined {}[{}] -> symbolic {}", addr, key, sym.name);
                produce(inst, draft, sym);
                Ok(reasoning)
            }
        }
    }

    fn call_function(&self, inst: &Instruction, draft: &mut Draft<'_>) -> Step<String> {
        let state = draft.state;
        let name = text(inst, 0)?;
        let args = resolve_all(state, &inst.operands[1..])?;

        if let Some(builtin) = self.builtins.get(name) {
            if !Builtins::tolerates_symbolic(name) && args.iter().any(Value::contains_symbolic) {
                return Err(format!("builtin {} with symbolic arguments", name));
            }
            let value = builtin(&args, draft).ok_or_else(|| format!("builtin {} uncomputable", name))?;
            let reasoning = format!("builtin {} -> {}", name, value);
            produce(inst, draft, value);
            return Ok(reasoning);
        }

        let target = state
            .lookup_var(name)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("unresolved function {}", name))?;
        if let Some(func) = FuncRef::parse(target) {
            return self.dispatch(func, args, None, draft);
        }
        if let Some(class) = ClassRef::parse(target) {
            return self.construct(class, args, inst, draft);
        }
        Err(format!("{} is not callable", name))
    }

    fn call_method(&self, inst: &Instruction, draft: &mut Draft<'_>) -> Step<String> {
        let state = draft.state;
        let (addr, obj) = heap_object(state, operand(inst, 0)?)?;
        let method = text(inst, 1)?;
        let args = resolve_all(state, &inst.operands[2..])?;

        // function stored in a field: plain call, no receiver
        if let Some(func) = obj.fields.get(method).and_then(Value::as_str).and_then(FuncRef::parse) {
            return self.dispatch(func, args, None, draft);
        }
        let class = obj.type_hint.as_deref().ok_or_else(|| format!("{} has no class", addr))?;
        let label = self
            .registry
            .method(class, method)
            .ok_or_else(|| format!("unresolved method {}.{}", class, method))?;
        self.dispatch(FuncRef::new(method, label), args, Some(Value::Str(addr)), draft)
    }

    /// Binds arguments (receiver first) and requests a frame push at the function entry.
    fn dispatch(
        &self,
        func: FuncRef,
        args: Vec<Value>,
        receiver: Option<Value>,
        draft: &mut Draft<'_>,
    ) -> Step<String> {
        let params = self
            .registry
            .params(&func.label)
            .ok_or_else(|| format!("no function entry {}", func.label))?;
        for (param, value) in params.iter().zip(receiver.into_iter().chain(args)) {
            draft.delta.write_var(param.clone(), value);
        }
        let mut push = CallPush::new(func.name.clone());
        push.closure_env = func.env.clone();
        draft.delta.call_push = Some(push);
        draft.delta.next_label = Some(func.label.clone());
        Ok(format!("call {}", func))
    }

    fn construct(&self, class: ClassRef, args: Vec<Value>, inst: &Instruction, draft: &mut Draft<'_>) -> Step<String> {
        let addr = draft.allocate(OBJ_ADDR_PREFIX, Some(class.name.clone()));
        produce(inst, draft, Value::Str(addr.clone()));
        let Some((ctor_name, ctor_label)) = self.registry.constructor(&class.name) else {
            return Ok(format!("new {} -> {}", class.name, addr));
        };
        let params = self.registry.params(ctor_label).unwrap_or_default();
        let receiver = std::iter::once(Value::Str(addr.clone()));
        for (param, value) in params.iter().zip(receiver.chain(args)) {
            draft.delta.write_var(param.clone(), value);
        }
        let mut push = CallPush::new(ctor_name);
        push.constructor = true;
        draft.delta.call_push = Some(push);
        draft.delta.next_label = Some(ctor_label.to_string());
        Ok(format!("new {} -> {}, run {}", class.name, addr, ctor_name))
    }
}

fn produce(inst: &Instruction, draft: &mut Draft<'_>, value: impl Into<Value>) {
    if let Some(reg) = &inst.result_reg {
        draft.delta.write_register(reg.clone(), value);
    }
}

fn operand(inst: &Instruction, idx: usize) -> Step<&Operand> {
    inst.operand(idx)
        .ok_or_else(|| format!("{} missing operand {}", inst.opcode, idx))
}

fn text(inst: &Instruction, idx: usize) -> Step<&str> {
    inst.operand_text(idx)
        .ok_or_else(|| format!("{} operand {} is not a name", inst.opcode, idx))
}

/// Register operands read the current frame; anything else is a literal.
fn resolve(state: &VmState, op: &Operand) -> Step<Value> {
    match op {
        Operand::Text(s) if is_register(s) => state
            .register(s)
            .cloned()
            .ok_or_else(|| format!("register {} unset", s)),
        other => Ok(literal(other)),
    }
}

fn resolve_all(state: &VmState, ops: &[Operand]) -> Step<Vec<Value>> {
    ops.iter().map(|op| resolve(state, op)).collect()
}

fn concrete(state: &VmState, op: &Operand) -> Step<Value> {
    let value = resolve(state, op)?;
    if value.contains_symbolic() {
        return Err(format!("symbolic operand {}", value));
    }
    Ok(value)
}

fn heap_object<'s>(state: &'s VmState, op: &Operand) -> Step<(String, &'s HeapObject)> {
    let base = resolve(state, op)?;
    let addr = base.heap_addr().ok_or_else(|| format!("{} is not a heap reference", base))?;
    let obj = state
        .heap
        .get(addr)
        .ok_or_else(|| format!("{} is not a live heap object", addr))?;
    Ok((addr.to_string(), obj))
}

/// Field names are taken verbatim; indices must resolve to a concrete key.
fn member_key(state: &VmState, opcode: Opcode, op: &Operand) -> Step<String> {
    match op {
        Operand::Text(name) if !is_register(name) && matches!(opcode, Opcode::LoadField | Opcode::StoreField) => {
            Ok(name.clone())
        }
        other => {
            let key = concrete(state, other)?;
            key.field_key().ok_or_else(|| format!("{} is not a valid key", key))
        }
    }
}

/// Indexing a concrete list, string or map held directly in a register.
fn index_value(base: &Value, state: &VmState, opcode: Opcode, key_op: &Operand) -> Step<Option<Value>> {
    if opcode != Opcode::LoadIndex {
        return Ok(None);
    }
    let position = |len: usize, i: i64| -> Option<usize> {
        let i = if i < 0 { i + len as i64 } else { i };
        usize::try_from(i).ok().filter(|i| *i < len)
    };
    match base {
        Value::List(items) => {
            let i = concrete(state, key_op)?.as_int().ok_or("list index must be an integer")?;
            let idx = position(items.len(), i).ok_or("list index out of range")?;
            Ok(Some(items[idx].clone()))
        }
        Value::Str(s) if !state.heap.contains_key(s) => {
            let i = concrete(state, key_op)?.as_int().ok_or("string index must be an integer")?;
            let chars: Vec<char> = s.chars().collect();
            let idx = position(chars.len(), i).ok_or("string index out of range")?;
            Ok(Some(Value::Str(chars[idx].to_string())))
        }
        Value::Map(map) => {
            let key = concrete(state, key_op)?.field_key().ok_or("invalid map key")?;
            map.get(&key).cloned().map(Some).ok_or_else(|| format!("missing key {}", key))
        }
        _ => Ok(None),
    }
}
