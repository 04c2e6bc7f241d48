use std::fmt::Write;

use super::{BasicBlock, ControlFlowGraph};
use crate::ir::{Instruction, Opcode};
use crate::registry::{CLASS_LABEL_PREFIX, END_CLASS_LABEL_PREFIX, FUNC_LABEL_PREFIX};

const MAX_INSTRUCTION_WIDTH: usize = 60;

fn escape(text: &str) -> String {
    text.replace('"', "#quot;").replace('<', "#lt;").replace('>', "#gt;")
}

fn node_id(label: &str) -> String {
    label.replace([' ', '-'], "_")
}

fn summary(inst: &Instruction) -> String {
    let raw = inst.to_string();
    if raw.chars().count() > MAX_INSTRUCTION_WIDTH {
        let cut: String = raw.chars().take(MAX_INSTRUCTION_WIDTH).collect();
        escape(&format!("{}...", cut))
    } else {
        escape(&raw)
    }
}

struct Subgraph {
    title: String,
    start: usize,
    end: usize,
}

/// `func_NAME_N .. end_NAME_N` and `class_NAME_N .. end_class_NAME_N` ranges, end-exclusive.
fn subgraphs(cfg: &ControlFlowGraph) -> Vec<Subgraph> {
    // the end label must come after its opening label
    let position_after = |start: usize, label: &str| {
        cfg.blocks()[start + 1..].iter().position(|b| b.label == label).map(|off| start + 1 + off)
    };
    let mut out = Vec::new();
    for (i, block) in cfg.blocks().iter().enumerate() {
        let label = block.label.as_str();
        let (title, end_label) = if let Some(suffix) = label.strip_prefix(FUNC_LABEL_PREFIX) {
            (format!("fn {}", suffix), format!("end_{}", suffix))
        } else if let Some(suffix) = label.strip_prefix(CLASS_LABEL_PREFIX) {
            (format!("class {}", suffix), format!("{}{}", END_CLASS_LABEL_PREFIX, suffix))
        } else {
            continue;
        };
        if let Some(end) = position_after(i, &end_label) {
            out.push(Subgraph { title, start: i, end });
        }
    }
    out
}

fn render_node(out: &mut String, block: &BasicBlock, indent: &str) {
    let body = if block.instructions.is_empty() {
        "(empty)".to_string()
    } else {
        block.instructions.iter().map(summary).collect::<Vec<_>>().join("<br/>")
    };
    let _ = writeln!(
        out,
        "{}{}[\"<b>{}</b><br/>{}\"]",
        indent,
        node_id(&block.label),
        escape(&block.label),
        body
    );
}

/// Renders the graph as a Mermaid `flowchart TD` diagram.
pub fn to_mermaid(cfg: &ControlFlowGraph) -> String {
    let mut out = String::from("flowchart TD\n");
    let groups = subgraphs(cfg);
    let grouped = |i: usize| groups.iter().any(|g| (g.start..g.end).contains(&i));

    for (i, block) in cfg.blocks().iter().enumerate() {
        if !grouped(i) {
            render_node(&mut out, block, "    ");
        }
    }
    for group in &groups {
        let _ = writeln!(out, "    subgraph {}[\"{}\"]", node_id(&group.title), escape(&group.title));
        for block in &cfg.blocks()[group.start..group.end] {
            render_node(&mut out, block, "        ");
        }
        out.push_str("    end\n");
    }

    for block in cfg.blocks() {
        let src = node_id(&block.label);
        let two_way = block.last().is_some_and(|inst| inst.opcode == Opcode::BranchIf) && block.successors.len() == 2;
        if two_way {
            let _ = writeln!(out, "    {} -->|\"T\"| {}", src, node_id(&block.successors[0]));
            let _ = writeln!(out, "    {} -->|\"F\"| {}", src, node_id(&block.successors[1]));
        } else {
            for succ in &block.successors {
                let _ = writeln!(out, "    {} --> {}", src, node_id(succ));
            }
        }
    }

    if let Some(entry) = cfg.entry() {
        let _ = writeln!(out, "    style {} fill:#28a745,color:#fff", node_id(entry));
    }
    out
}
