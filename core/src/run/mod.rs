//! Orchestrator
//!
//! Walks the control-flow graph one instruction at a time. Each step is
//! decided by the local engine or, when it declines, by the oracle; the
//! resulting delta is applied and control advances.

use std::fmt;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::cfg::ControlFlowGraph;
use crate::error::ConfigError;
use crate::ir::{Instruction, Opcode};
use crate::oracle::Oracle;
use crate::registry::FunctionRegistry;
use crate::vm::{Decision, LocalEngine, StackFrame, StateDelta, Value, VmState};

pub const DEFAULT_MAX_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Block label, or a fragment of one; defaults to the graph entry
    pub entry: Option<String>,
    pub max_steps: usize,
    pub trace: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            entry: None,
            max_steps: DEFAULT_MAX_STEPS,
            trace: false,
        }
    }
}

impl RunOptions {
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// The graph has no blocks
    Empty,
    /// Return or throw from the outermost frame
    Returned,
    /// Fell off a block without successors
    EndOfProgram,
    BudgetExhausted,
    /// A nested frame returned without a usable return label
    UnresolvableReturn,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HaltReason::Empty => "empty program",
            HaltReason::Returned => "returned",
            HaltReason::EndOfProgram => "end of program",
            HaltReason::BudgetExhausted => "step budget exhausted",
            HaltReason::UnresolvableReturn => "unresolvable return",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub steps: usize,
    pub oracle_calls: usize,
    pub local_decisions: usize,
    pub final_heap_objects: usize,
    pub final_symbolic_count: u64,
    pub closures_captured: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Local,
    Oracle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step_index: usize,
    pub block_label: String,
    pub offset: usize,
    pub instruction: Instruction,
    pub delta: StateDelta,
    pub source: DecisionSource,
    /// State after the step, owned by this entry
    pub state: VmState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub initial_state: VmState,
    pub steps: Vec<TraceStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub state: VmState,
    pub stats: ExecutionStats,
    pub halt: HaltReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExecutionTrace>,
}

impl RunOutcome {
    /// Variable as seen from the final frame.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.state.lookup_var(name)
    }
}

/// Exact label first, then the first block (in graph order) whose label contains `entry`.
pub fn resolve_entry(cfg: &ControlFlowGraph, entry: Option<&str>) -> Result<Option<String>> {
    let Some(default) = cfg.entry() else {
        return Ok(None);
    };
    let Some(entry) = entry else {
        return Ok(Some(default.to_string()));
    };
    if cfg.contains(entry) {
        return Ok(Some(entry.to_string()));
    }
    match cfg.labels().find(|label| label.contains(entry)) {
        Some(label) => Ok(Some(label.to_string())),
        None => Err(ConfigError::UnknownEntry {
            entry: entry.to_string(),
            available: cfg.labels().map(str::to_string).collect(),
        }
        .into()),
    }
}

enum Flow {
    Goto(String, usize),
    Halt(HaltReason),
}

/// Control after a return or throw. `popped` is the frame the delta already removed.
fn unwind(
    state: &mut VmState,
    cfg: &ControlFlowGraph,
    delta: &StateDelta,
    popped: Option<StackFrame>,
    depth_before: usize,
) -> Flow {
    if depth_before <= 1 {
        return Flow::Halt(HaltReason::Returned);
    }
    let Some(frame) = popped.or_else(|| state.pop_frame()) else {
        return Flow::Halt(HaltReason::Returned);
    };
    if let (Some(reg), Some(value)) = (&frame.result_reg, &delta.return_value) {
        state.write_register(reg.clone(), value.clone());
    }
    match frame.return_label.as_deref().filter(|label| cfg.contains(label)) {
        Some(label) => Flow::Goto(label.to_string(), frame.return_offset.unwrap_or(0)),
        None => {
            tracing::warn!(
                target: "symir::run",
                function = %frame.function_name,
                return_label = ?frame.return_label,
                "no return target; halting"
            );
            Flow::Halt(HaltReason::UnresolvableReturn)
        }
    }
}

/// Runs the program from the resolved entry until it halts or the step budget runs out.
///
/// Oracle failures abort the run; budget exhaustion and unresolvable returns
/// are reported through [`RunOutcome::halt`].
pub fn execute(
    cfg: &ControlFlowGraph,
    registry: &FunctionRegistry,
    oracle: &mut dyn Oracle,
    options: &RunOptions,
) -> Result<RunOutcome> {
    let mut state = VmState::new();
    let mut trace = options.trace.then(|| ExecutionTrace {
        initial_state: state.clone(),
        steps: Vec::new(),
    });
    let mut stats = ExecutionStats::default();

    let Some(entry) = resolve_entry(cfg, options.entry.as_deref())? else {
        tracing::debug!(target: "symir::run", "empty program");
        return Ok(RunOutcome {
            state,
            stats,
            halt: HaltReason::Empty,
            trace,
        });
    };

    let engine = LocalEngine::new(registry);
    let mut label = entry;
    let mut offset = 0usize;
    let mut halt = HaltReason::BudgetExhausted;
    tracing::debug!(
        target: "symir::run",
        entry = %label,
        max_steps = options.max_steps,
        oracle = oracle.name(),
        "run started"
    );

    for step in 0..options.max_steps {
        stats.steps = step + 1;
        let block = cfg.block(&label).ok_or_else(|| anyhow!("block '{}' is not in the graph", label))?;

        let Some(inst) = block.instructions.get(offset) else {
            match block.successors.first() {
                Some(next) => {
                    label = next.clone();
                    offset = 0;
                    continue;
                }
                None => {
                    halt = HaltReason::EndOfProgram;
                    break;
                }
            }
        };
        if inst.opcode == Opcode::Label {
            offset += 1;
            continue;
        }

        let (delta, source) = match engine.decide(inst, &state) {
            Decision::Decided(delta) => {
                stats.local_decisions += 1;
                (delta, DecisionSource::Local)
            }
            Decision::Declined(reason) => {
                stats.oracle_calls += 1;
                tracing::debug!(target: "symir::run", step, %inst, %reason, "declined locally; asking oracle");
                let delta = oracle
                    .decide(inst, &state)
                    .with_context(|| format!("step {} at {}:{} `{}`", step, label, offset, inst))?;
                (delta, DecisionSource::Oracle)
            }
        };
        tracing::debug!(
            target: "symir::run",
            step,
            block = %label,
            offset,
            %inst,
            ?source,
            reasoning = %delta.reasoning,
            "step"
        );

        let depth_before = state.depth();
        let outcome = state.apply_delta(&delta);
        if outcome.pushed && delta.next_label.is_some() {
            // a constructor's result register already holds the new object
            let constructor = delta.call_push.as_ref().is_some_and(|push| push.constructor);
            let result_reg = if constructor { None } else { inst.result_reg.clone() };
            state.stamp_return(&label, offset + 1, result_reg);
        }

        let flow = if matches!(inst.opcode, Opcode::Return | Opcode::Throw) {
            unwind(&mut state, cfg, &delta, outcome.popped, depth_before)
        } else {
            match delta.next_label.as_deref().filter(|next| cfg.contains(next)) {
                Some(next) => Flow::Goto(next.to_string(), 0),
                None => Flow::Goto(label.clone(), offset + 1),
            }
        };

        if let Some(trace) = trace.as_mut() {
            trace.steps.push(TraceStep {
                step_index: step,
                block_label: label.clone(),
                offset,
                instruction: inst.clone(),
                delta,
                source,
                state: state.clone(),
            });
        }

        match flow {
            Flow::Goto(next, at) => {
                label = next;
                offset = at;
            }
            Flow::Halt(reason) => {
                halt = reason;
                break;
            }
        }
    }

    stats.final_heap_objects = state.heap.len();
    stats.final_symbolic_count = state.counter;
    stats.closures_captured = state.closures.len();
    tracing::info!(
        target: "symir::run",
        steps = stats.steps,
        oracle_calls = stats.oracle_calls,
        %halt,
        "run finished"
    );
    Ok(RunOutcome {
        state,
        stats,
        halt,
        trace,
    })
}

#[cfg(test)]
mod run_test;
