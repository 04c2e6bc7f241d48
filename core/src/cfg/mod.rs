use std::collections::BTreeSet;
use std::fmt;

use crate::ir::{Instruction, Opcode};
use crate::util::{FastHashMap, fast_hash_map_with_capacity};

mod mermaid;
pub use mermaid::to_mermaid;


/// Prefix of labels synthesized for blocks that do not begin with a LABEL.
pub const SYNTHETIC_BLOCK_PREFIX: &str = "__block_";

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    /// Index of the block's first instruction in the original listing
    pub start: usize,
    pub instructions: Vec<Instruction>,
    pub successors: Vec<String>,
    pub predecessors: Vec<String>,
}

impl BasicBlock {
    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

/// Immutable graph of basic blocks in listing order.
///
/// Plain data, so one graph can back any number of concurrent runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    index: FastHashMap<String, usize>,
}

impl ControlFlowGraph {
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, label: &str) -> Option<&BasicBlock> {
        self.index.get(label).map(|&i| &self.blocks[i])
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Label of the first block; `None` for an empty program.
    pub fn entry(&self) -> Option<&str> {
        self.blocks.first().map(|b| b.label.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.blocks.iter().map(|b| b.successors.len()).sum()
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        let to_label = self.blocks[to].label.clone();
        let from_label = self.blocks[from].label.clone();
        if !self.blocks[from].successors.contains(&to_label) {
            self.blocks[from].successors.push(to_label);
        }
        if !self.blocks[to].predecessors.contains(&from_label) {
            self.blocks[to].predecessors.push(from_label);
        }
    }
}

/// Partitions `instructions` into basic blocks and wires the edges.
pub fn build_cfg(instructions: &[Instruction]) -> ControlFlowGraph {
    let mut starts = BTreeSet::new();
    if !instructions.is_empty() {
        starts.insert(0);
    }
    for (i, inst) in instructions.iter().enumerate() {
        if inst.opcode == Opcode::Label {
            starts.insert(i);
        } else if inst.opcode.ends_block() && i + 1 < instructions.len() {
            starts.insert(i + 1);
        }
    }

    let starts: Vec<usize> = starts.into_iter().collect();
    let mut cfg = ControlFlowGraph {
        blocks: Vec::with_capacity(starts.len()),
        index: fast_hash_map_with_capacity(starts.len()),
    };

    for (si, &start) in starts.iter().enumerate() {
        let end = starts.get(si + 1).copied().unwrap_or(instructions.len());
        let mut body = &instructions[start..end];
        let mut label = format!("{}{}", SYNTHETIC_BLOCK_PREFIX, start);
        if let Some(first) = body.first().filter(|inst| inst.opcode == Opcode::Label) {
            match first.label.as_deref() {
                Some(name) if !cfg.index.contains_key(name) => label = name.to_string(),
                Some(name) => {
                    tracing::warn!(
                        target: "symir::cfg",
                        duplicate = name,
                        start,
                        "duplicate label, block renamed to {}",
                        label
                    );
                }
                None => {}
            }
            body = &body[1..];
        }
        cfg.index.insert(label.clone(), cfg.blocks.len());
        cfg.blocks.push(BasicBlock {
            label,
            start,
            instructions: body.to_vec(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        });
    }

    for i in 0..cfg.blocks.len() {
        let next = (i + 1 < cfg.blocks.len()).then_some(i + 1);
        let Some(last) = cfg.blocks[i].last() else {
            if let Some(n) = next {
                cfg.add_edge(i, n);
            }
            continue;
        };
        match last.opcode {
            Opcode::Branch | Opcode::BranchIf => {
                let targets: Vec<usize> =
                    last.targets().into_iter().filter_map(|t| cfg.index.get(t).copied()).collect();
                for t in targets {
                    cfg.add_edge(i, t);
                }
            }
            Opcode::Return | Opcode::Throw => {}
            _ => {
                if let Some(n) = next {
                    cfg.add_edge(i, n);
                }
            }
        }
    }

    tracing::debug!(target: "symir::cfg", blocks = cfg.len(), edges = cfg.edge_count(), "built cfg");
    cfg
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(labels: &[String]) -> String {
            if labels.is_empty() { "(none)".to_string() } else { labels.join(", ") }
        }
        for block in &self.blocks {
            writeln!(
                f,
                "[{}]  preds={}  succs={}",
                block.label,
                list(&block.predecessors),
                list(&block.successors)
            )?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
