use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::util::{format_float, index_key};

/// Marker key of the wire encoding `{"__symbolic__": true, "name": ...}`.
pub const SYMBOLIC_MARKER: &str = "__symbolic__";

/// A value the engine cannot compute, described by name, type hint and constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolicValue {
    pub name: String,
    pub type_hint: Option<String>,
    pub constraints: Vec<String>,
}

impl SymbolicValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.type_hint = Some(hint.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }
}

/// Runtime value held in registers, variables and heap fields.
///
/// Heap references and function/class references are plain strings
/// (`obj_3`, `<function:f@func_f_0>`), matching the wire protocol.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Symbolic(SymbolicValue),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Value::Symbolic(_))
    }

    /// True when the value, or anything nested in it, is symbolic.
    pub fn contains_symbolic(&self) -> bool {
        match self {
            Value::Symbolic(_) => true,
            Value::List(items) => items.iter().any(Value::contains_symbolic),
            Value::Map(map) => map.values().any(Value::contains_symbolic),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_symbolic(&self) -> Option<&SymbolicValue> {
        match self {
            Value::Symbolic(s) => Some(s),
            _ => None,
        }
    }

    /// Candidate heap address: a plain string, or a `{"addr": ...}` record.
    pub fn heap_addr(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Map(map) => map.get("addr").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Source-language truthiness; `None` when the value is symbolic.
    pub fn truthy(&self) -> Option<bool> {
        Some(match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Symbolic(_) => return None,
        })
    }

    /// Key used for heap fields addressed by this value (`arr["0"]`, `obj["name"]`).
    pub fn field_key(&self) -> Option<String> {
        match self {
            Value::Int(i) => Some(index_key(*i)),
            Value::Str(s) => Some(s.clone()),
            Value::Bool(_) | Value::Float(_) | Value::Null => Some(self.to_string()),
            Value::List(_) | Value::Map(_) | Value::Symbolic(_) => None,
        }
    }

    /// Builds a value from decoded JSON, rehydrating symbolic records.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => {
                if map.get(SYMBOLIC_MARKER).and_then(serde_json::Value::as_bool) == Some(true) {
                    return Value::Symbolic(symbolic_from_json(map));
                }
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s),
            other => other.to_string(),
        }
    }
}

/// Missing names stay empty; the protocol layer assigns fresh ones on ingestion.
fn symbolic_from_json(mut map: serde_json::Map<String, serde_json::Value>) -> SymbolicValue {
    let text = |v: serde_json::Value| match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    let name = map.remove("name").map(text).unwrap_or_default();
    let type_hint = map.remove("type_hint").filter(|v| !v.is_null()).map(text);
    let constraints = match map.remove("constraints") {
        Some(serde_json::Value::Array(items)) => items.into_iter().map(text).collect(),
        Some(serde_json::Value::Null) | None => Vec::new(),
        Some(single) => vec![text(single)],
    };
    SymbolicValue {
        name,
        type_hint,
        constraints,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Value::Int(i) => f.write_str(&index_key(*i)),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("'{}': {}", k, v.repr())).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Symbolic(sym) => f.write_str(&sym.name),
        }
    }
}

impl Serialize for SymbolicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + self.type_hint.is_some() as usize + !self.constraints.is_empty() as usize;
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(SYMBOLIC_MARKER, &true)?;
        map.serialize_entry("name", &self.name)?;
        if let Some(hint) = &self.type_hint {
            map.serialize_entry("type_hint", hint)?;
        }
        if !self.constraints.is_empty() {
            map.serialize_entry("constraints", &self.constraints)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Symbolic(sym) => sym.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl<'de> Deserialize<'de> for SymbolicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Object(map) => Ok(symbolic_from_json(map)),
            other => Err(serde::de::Error::custom(format!("expected symbolic record, got {}", other))),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<SymbolicValue> for Value {
    fn from(sym: SymbolicValue) -> Self {
        Value::Symbolic(sym)
    }
}
