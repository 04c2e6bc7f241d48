use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapWrite {
    pub obj_addr: String,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObject {
    pub addr: String,
    #[serde(default)]
    pub type_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPush {
    pub function_name: String,
    #[serde(default)]
    pub return_label: Option<String>,
    /// Closure environment the callee reads through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_env: Option<String>,
    /// Constructor dispatch: the caller's result register already holds the new object
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub constructor: bool,
}

impl CallPush {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            return_label: None,
            closure_env: None,
            constructor: false,
        }
    }
}

/// Closure environment created while evaluating a function literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClosure {
    pub id: String,
    #[serde(default)]
    pub bindings: BTreeMap<String, Value>,
    #[serde(default)]
    pub parent: Option<String>,
}

/// The only unit of VM state mutation, produced by the local engine or an oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDelta {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub register_writes: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub var_writes: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub heap_writes: Vec<HeapWrite>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_objects: Vec<NewObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_closure: Option<NewClosure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_push: Option<CallPush>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub call_pop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_condition: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
}

impl StateDelta {
    pub fn write_register(&mut self, reg: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.register_writes.insert(reg.into(), value.into());
        self
    }

    pub fn write_var(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.var_writes.insert(name.into(), value.into());
        self
    }

    pub fn write_heap(
        &mut self,
        addr: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.heap_writes.push(HeapWrite {
            obj_addr: addr.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn allocate(&mut self, addr: impl Into<String>, type_hint: Option<String>) -> &mut Self {
        self.new_objects.push(NewObject {
            addr: addr.into(),
            type_hint,
        });
        self
    }

    /// Every value the delta writes, for bookkeeping over fresh names.
    pub fn written_values(&self) -> impl Iterator<Item = &Value> {
        self.register_writes
            .values()
            .chain(self.var_writes.values())
            .chain(self.heap_writes.iter().map(|hw| &hw.value))
            .chain(self.return_value.iter())
            .chain(self.new_closure.iter().flat_map(|c| c.bindings.values()))
    }

    /// Every value in the delta, mutably; used to rename unnamed symbolics.
    pub fn written_values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.register_writes
            .values_mut()
            .chain(self.var_writes.values_mut())
            .chain(self.heap_writes.iter_mut().map(|hw| &mut hw.value))
            .chain(self.return_value.iter_mut())
            .chain(self.new_closure.iter_mut().flat_map(|c| c.bindings.values_mut()))
    }
}
