use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cfg::ControlFlowGraph;
use crate::ir::{Instruction, Opcode};

pub const PARAM_PREFIX: &str = "param:";
pub const FUNC_LABEL_PREFIX: &str = "func_";
pub const CLASS_LABEL_PREFIX: &str = "class_";
pub const END_CLASS_LABEL_PREFIX: &str = "end_class_";
pub const CONSTRUCTOR_NAMES: [&str; 2] = ["__init__", "constructor"];

static FUNC_REF_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<function:(\w+)@(\w+)(?:#(\w+))?>").ok());
static CLASS_REF_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<class:(\w+)@(\w+)>").ok());

/// `<function:name@label>`, optionally tagged with a closure environment (`#env_3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncRef {
    pub name: String,
    pub label: String,
    pub env: Option<String>,
}

impl FuncRef {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            env: None,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let caps = FUNC_REF_RE.as_ref()?.captures(text)?;
        Some(Self {
            name: caps[1].to_string(),
            label: caps[2].to_string(),
            env: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env {
            Some(env) => write!(f, "<function:{}@{}#{}>", self.name, self.label, env),
            None => write!(f, "<function:{}@{}>", self.name, self.label),
        }
    }
}

/// `<class:name@label>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub name: String,
    pub label: String,
}

impl ClassRef {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let caps = CLASS_REF_RE.as_ref()?.captures(text)?;
        Some(Self {
            name: caps[1].to_string(),
            label: caps[2].to_string(),
        })
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class:{}@{}>", self.name, self.label)
    }
}

/// Functions and classes discovered in a program. Built once, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionRegistry {
    /// function entry label -> ordered parameter names
    pub func_params: BTreeMap<String, Vec<String>>,
    /// class name -> method name -> function entry label
    pub class_methods: BTreeMap<String, BTreeMap<String, String>>,
    /// class name -> class body label
    pub classes: BTreeMap<String, String>,
}

impl FunctionRegistry {
    pub fn params(&self, func_label: &str) -> Option<&[String]> {
        self.func_params.get(func_label).map(Vec::as_slice)
    }

    pub fn method(&self, class: &str, method: &str) -> Option<&str> {
        self.class_methods.get(class)?.get(method).map(String::as_str)
    }

    /// `(method name, entry label)` of the class constructor, if it declares one.
    pub fn constructor(&self, class: &str) -> Option<(&'static str, &str)> {
        CONSTRUCTOR_NAMES
            .iter()
            .find_map(|name| self.method(class, name).map(|label| (*name, label)))
    }
}

/// Scans the graph for parameter lists and the listing for classes and their methods.
pub fn build_registry(instructions: &[Instruction], cfg: &ControlFlowGraph) -> FunctionRegistry {
    let mut registry = FunctionRegistry {
        func_params: scan_func_params(cfg),
        ..Default::default()
    };
    scan_classes(instructions, &mut registry);
    tracing::debug!(
        target: "symir::registry",
        functions = registry.func_params.len(),
        classes = registry.classes.len(),
        "registry built"
    );
    registry
}

fn scan_func_params(cfg: &ControlFlowGraph) -> BTreeMap<String, Vec<String>> {
    cfg.blocks()
        .iter()
        .filter(|block| block.label.starts_with(FUNC_LABEL_PREFIX))
        .map(|block| {
            let params = block
                .instructions
                .iter()
                .filter(|inst| inst.opcode == Opcode::Symbolic)
                .filter_map(|inst| inst.operand_text(0)?.strip_prefix(PARAM_PREFIX))
                .map(str::to_string)
                .collect();
            (block.label.clone(), params)
        })
        .collect()
}

fn const_text(inst: &Instruction) -> Option<&str> {
    if inst.opcode == Opcode::Const { inst.operand_text(0) } else { None }
}

fn scan_classes(instructions: &[Instruction], registry: &mut FunctionRegistry) {
    for class in instructions.iter().filter_map(const_text).filter_map(ClassRef::parse) {
        registry.classes.insert(class.name, class.label);
    }

    let mut current: Option<String> = None;
    for inst in instructions {
        if let (Opcode::Label, Some(label)) = (inst.opcode, inst.label.as_deref()) {
            if label.starts_with(END_CLASS_LABEL_PREFIX) {
                current = None;
            } else if label.starts_with(CLASS_LABEL_PREFIX) {
                if let Some((name, _)) = registry.classes.iter().find(|(_, body)| body.as_str() == label) {
                    registry.class_methods.entry(name.clone()).or_default();
                    current = Some(name.clone());
                }
            }
        }
        let Some(class) = current.as_deref() else {
            continue;
        };
        if let Some(method) = const_text(inst).and_then(FuncRef::parse) {
            registry
                .class_methods
                .entry(class.to_string())
                .or_default()
                .insert(method.name, method.label);
        }
    }
}
