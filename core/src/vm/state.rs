use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::delta::StateDelta;
use super::value::Value;
use crate::util::numeric_suffix;

pub const MAIN_FRAME_NAME: &str = "<main>";
pub const OBJ_ADDR_PREFIX: &str = "obj_";
pub const ARR_ADDR_PREFIX: &str = "arr_";
pub const SYMBOL_PREFIX: &str = "sym_";
pub const ENV_PREFIX: &str = "env_";

/// Prefixes sharing the state's identifier counter.
const COUNTED_PREFIXES: [&str; 4] = [SYMBOL_PREFIX, OBJ_ADDR_PREFIX, ARR_ADDR_PREFIX, ENV_PREFIX];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeapObject {
    #[serde(default)]
    pub type_hint: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl HeapObject {
    pub fn typed(type_hint: impl Into<String>) -> Self {
        Self {
            type_hint: Some(type_hint.into()),
            fields: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function_name: String,
    #[serde(default)]
    pub registers: BTreeMap<String, Value>,
    #[serde(default)]
    pub local_vars: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_reg: Option<String>,
    /// Environment this activation reads through (set for closure calls)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_env: Option<String>,
    /// Environment created by this activation; local stores write through to it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_env: Option<String>,
}

impl StackFrame {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            registers: BTreeMap::new(),
            local_vars: BTreeMap::new(),
            return_label: None,
            return_offset: None,
            result_reg: None,
            closure_env: None,
            owned_env: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosureEnv {
    #[serde(default)]
    pub bindings: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// What `apply_delta` did to the call stack.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub pushed: bool,
    pub popped: Option<StackFrame>,
}

/// Complete symbolic machine state. Owned by exactly one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmState {
    pub heap: BTreeMap<String, HeapObject>,
    pub call_stack: Vec<StackFrame>,
    pub path_conditions: Vec<String>,
    /// Shared by symbolic names, heap addresses and closure environments
    pub counter: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub closures: BTreeMap<String, ClosureEnv>,
}

impl Default for VmState {
    fn default() -> Self {
        Self::new()
    }
}

impl VmState {
    pub fn new() -> Self {
        Self {
            heap: BTreeMap::new(),
            call_stack: vec![StackFrame::new(MAIN_FRAME_NAME)],
            path_conditions: Vec::new(),
            counter: 0,
            closures: BTreeMap::new(),
        }
    }

    pub fn current_frame(&self) -> Option<&StackFrame> {
        self.call_stack.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.call_stack.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn register(&self, reg: &str) -> Option<&Value> {
        self.current_frame()?.registers.get(reg)
    }

    pub fn write_register(&mut self, reg: impl Into<String>, value: Value) {
        if let Some(frame) = self.current_frame_mut() {
            frame.registers.insert(reg.into(), value);
        }
    }

    /// Environments reachable from `start` through parent links, innermost first.
    pub fn env_chain<'a>(&'a self, start: Option<&'a str>) -> Vec<(&'a str, &'a ClosureEnv)> {
        let mut chain = Vec::new();
        let mut cursor = start;
        while let Some(id) = cursor {
            // a parent cycle can only come from a hand-written state
            if chain.len() > self.closures.len() {
                break;
            }
            let Some((key, env)) = self.closures.get_key_value(id) else {
                break;
            };
            chain.push((key.as_str(), env));
            cursor = env.parent.as_deref();
        }
        chain
    }

    /// The frame's owned environment is read first: closures it created write captured names there.
    fn lookup_in_frame<'a>(&'a self, frame: &'a StackFrame, name: &str) -> Option<&'a Value> {
        let owned = frame
            .owned_env
            .as_deref()
            .and_then(|id| self.closures.get(id))
            .and_then(|env| env.bindings.get(name));
        owned.or_else(|| frame.local_vars.get(name)).or_else(|| {
            self.env_chain(frame.closure_env.as_deref())
                .into_iter()
                .find_map(|(_, env)| env.bindings.get(name))
        })
    }

    /// Resolves a variable: each frame innermost-first, locals before its closure chain.
    pub fn lookup_var(&self, name: &str) -> Option<&Value> {
        self.call_stack
            .iter()
            .rev()
            .find_map(|frame| self.lookup_in_frame(frame, name))
    }

    /// Variables visible from the current frame: its closure chain, then locals, then its owned environment.
    pub fn visible_vars(&self) -> BTreeMap<String, Value> {
        let mut vars = BTreeMap::new();
        let Some(frame) = self.current_frame() else {
            return vars;
        };
        for (_, env) in self.env_chain(frame.closure_env.as_deref()).into_iter().rev() {
            vars.extend(env.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        vars.extend(frame.local_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(env) = frame.owned_env.as_deref().and_then(|id| self.closures.get(id)) {
            vars.extend(env.bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        vars
    }

    /// Stores a variable from the current frame, honoring closure environments.
    pub fn store_var(&mut self, name: &str, value: Value) {
        let Some(frame) = self.current_frame() else {
            return;
        };
        let is_local = frame.local_vars.contains_key(name);
        let owned = frame.owned_env.clone();
        let holder = if is_local {
            None
        } else {
            self.env_chain(frame.closure_env.as_deref())
                .into_iter()
                .find(|(_, env)| env.bindings.contains_key(name))
                .map(|(id, _)| id.to_string())
        };
        if let Some(env_id) = holder {
            if let Some(env) = self.closures.get_mut(&env_id) {
                env.bindings.insert(name.to_string(), value);
            }
            return;
        }
        if let Some(env) = owned.and_then(|id| self.closures.get_mut(&id)) {
            env.bindings.insert(name.to_string(), value.clone());
        }
        if let Some(frame) = self.current_frame_mut() {
            frame.local_vars.insert(name.to_string(), value);
        }
    }

    /// Applies one delta in the fixed order: objects, closure, registers, heap,
    /// path condition, push, variables, pop.
    pub fn apply_delta(&mut self, delta: &StateDelta) -> ApplyOutcome {
        for obj in &delta.new_objects {
            self.reserve(&obj.addr);
            let entry = self.heap.entry(obj.addr.clone()).or_default();
            if obj.type_hint.is_some() {
                entry.type_hint = obj.type_hint.clone();
            }
        }

        if let Some(closure) = &delta.new_closure {
            self.reserve(&closure.id);
            self.closures.insert(
                closure.id.clone(),
                ClosureEnv {
                    bindings: closure.bindings.clone(),
                    parent: closure.parent.clone(),
                },
            );
            if let Some(frame) = self.current_frame_mut() {
                frame.owned_env = Some(closure.id.clone());
            }
        }

        if let Some(frame) = self.current_frame_mut() {
            for (reg, value) in &delta.register_writes {
                frame.registers.insert(reg.clone(), value.clone());
            }
        }

        for hw in &delta.heap_writes {
            self.heap
                .entry(hw.obj_addr.clone())
                .or_default()
                .fields
                .insert(hw.field.clone(), hw.value.clone());
        }

        if let Some(cond) = &delta.path_condition {
            self.path_conditions.push(cond.clone());
        }

        let pushed = match &delta.call_push {
            Some(push) => {
                let mut frame = StackFrame::new(push.function_name.clone());
                frame.return_label = push.return_label.clone();
                frame.closure_env = push.closure_env.clone();
                self.call_stack.push(frame);
                true
            }
            None => false,
        };

        for (name, value) in &delta.var_writes {
            if pushed {
                // parameter bindings land in the new frame's locals
                if let Some(frame) = self.current_frame_mut() {
                    frame.local_vars.insert(name.clone(), value.clone());
                }
            } else {
                self.store_var(name, value.clone());
            }
        }

        let popped = if delta.call_pop && self.call_stack.len() > 1 {
            self.call_stack.pop()
        } else {
            None
        };

        let written: Vec<String> = delta.written_values().flat_map(symbolic_names).collect();
        for name in written {
            self.reserve(&name);
        }

        ApplyOutcome { pushed, popped }
    }

    /// Records where a just-pushed frame returns to.
    pub fn stamp_return(&mut self, label: &str, offset: usize, result_reg: Option<String>) {
        if let Some(frame) = self.current_frame_mut() {
            frame.return_label = Some(label.to_string());
            frame.return_offset = Some(offset);
            frame.result_reg = result_reg;
        }
    }

    /// Pops the current frame unless it is the outermost one.
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        if self.call_stack.len() > 1 { self.call_stack.pop() } else { None }
    }

    /// Keeps the counter ahead of any counted identifier seen in the state.
    fn reserve(&mut self, name: &str) {
        let next = COUNTED_PREFIXES.iter().find_map(|prefix| numeric_suffix(name, prefix));
        if let Some(n) = next {
            if n >= self.counter {
                self.counter = n + 1;
            }
        }
    }

    pub fn symbolic_values(&self) -> usize {
        let frames = self
            .call_stack
            .iter()
            .flat_map(|f| f.registers.values().chain(f.local_vars.values()));
        let heap = self.heap.values().flat_map(|o| o.fields.values());
        let envs = self.closures.values().flat_map(|e| e.bindings.values());
        frames.chain(heap).chain(envs).map(|v| symbolic_names(v).len()).sum()
    }
}

fn symbolic_names(value: &Value) -> Vec<String> {
    match value {
        Value::Symbolic(sym) => vec![sym.name.clone()],
        Value::List(items) => items.iter().flat_map(symbolic_names).collect(),
        Value::Map(map) => map.values().flat_map(symbolic_names).collect(),
        _ => Vec::new(),
    }
}
