use std::path::PathBuf;
use std::sync::Once;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "symir::run=info,symir::oracle=info,symir_core=info,symir_cli=info";

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use symir_core::cfg::to_mermaid;
use symir_core::ir::{count_opcodes, extract_function_instructions};
use symir_core::oracle::build_oracle;
use symir_core::{ControlFlowGraph, OracleBackend, Program, RunConfig, RunOutcome, build_cfg, execute};


#[derive(Debug, Parser)]
#[command(
    name = "symir",
    author,
    version,
    about = "Oracle-assisted symbolic execution over a flattened IR",
    long_about = "Loads a lowered program (a JSON instruction document, or a textual listing ending in .ir), \
builds its control-flow graph and steps it with the local engine, asking an oracle whenever an \
instruction cannot be decided mechanically.\n\nSet SYMIR_LOG=1 (or a filter expression) to log to stderr."
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the instruction listing
    Ir {
        /// Program file (.json or .ir)
        file: PathBuf,
    },
    /// Print the control-flow graph
    Cfg {
        file: PathBuf,
        /// Emit a Mermaid flowchart instead of the text listing
        #[arg(long)]
        mermaid: bool,
        /// Only the graph of this function's body
        #[arg(long, value_name = "NAME")]
        function: Option<String>,
    },
    /// Opcode histogram and block/function/class counts
    Stats { file: PathBuf },
    /// Execute the program
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    file: PathBuf,
    /// Entry block label, or a fragment of one
    #[arg(long)]
    entry: Option<String>,
    #[arg(long, value_name = "N")]
    max_steps: Option<usize>,
    /// Oracle backend: symbolic, command or replay
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend)]
    oracle: Option<OracleBackend>,
    /// Oracle program and its arguments, one flag per word (implies --oracle command)
    #[arg(long = "oracle-cmd", value_name = "ARG", allow_hyphen_values = true)]
    oracle_cmd: Vec<String>,
    /// Recorded oracle responses, one JSON object per line (implies --oracle replay)
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,
    /// Run config (.toml, .yaml/.yml or .json); flags override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Record per-step snapshots
    #[arg(long)]
    trace: bool,
    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

fn parse_backend(raw: &str) -> Result<OracleBackend, String> {
    raw.parse::<OracleBackend>().map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("SYMIR_LOG") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Config file (if any) with the command-line flags layered on top.
fn resolve_run_config(args: &RunArgs) -> anyhow::Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(entry) = &args.entry {
        config.entry = Some(entry.clone());
    }
    if let Some(max_steps) = args.max_steps {
        config.max_steps = max_steps;
    }
    if !args.oracle_cmd.is_empty() {
        config.oracle.command = args.oracle_cmd.clone();
        config.oracle.backend = OracleBackend::Command;
    }
    if let Some(replay) = &args.replay {
        config.oracle.replay = Some(replay.clone());
        config.oracle.backend = OracleBackend::Replay;
    }
    if let Some(backend) = args.oracle {
        config.oracle.backend = backend;
    }
    config.trace |= args.trace;
    Ok(config)
}

fn render_cfg(cfg: &ControlFlowGraph) -> String {
    format!("{}{} blocks, {} edges\n", cfg, cfg.len(), cfg.edge_count())
}

fn render_stats(program: &Program) -> String {
    let cfg = program.cfg();
    let registry = program.registry(&cfg);
    let mut out = String::new();
    if let Some(language) = &program.language {
        out.push_str(&format!("language: {}\n", language));
    }
    out.push_str(&format!("instructions: {}\n", program.instructions.len()));
    out.push_str(&format!("blocks: {}\n", cfg.len()));
    out.push_str(&format!("edges: {}\n", cfg.edge_count()));
    out.push_str(&format!("functions: {}\n", registry.func_params.len()));
    out.push_str(&format!("classes: {}\n", registry.classes.len()));
    out.push_str("opcodes:\n");
    for (opcode, count) in count_opcodes(&program.instructions) {
        out.push_str(&format!("  {:<16} {}\n", opcode.as_str(), count));
    }
    out
}

fn render_outcome(outcome: &RunOutcome) -> String {
    let stats = &outcome.stats;
    let mut out = String::new();
    out.push_str(&format!("halt: {}\n", outcome.halt));
    out.push_str(&format!(
        "steps: {} (local {}, oracle {})\n",
        stats.steps, stats.local_decisions, stats.oracle_calls
    ));
    out.push_str(&format!(
        "heap objects: {}, closures: {}, symbols: {}\n",
        stats.final_heap_objects, stats.closures_captured, stats.final_symbolic_count
    ));
    let vars = outcome.state.visible_vars();
    if !vars.is_empty() {
        out.push_str("variables:\n");
        for (name, value) in &vars {
            out.push_str(&format!("  {} = {}\n", name, value));
        }
    }
    if !outcome.state.path_conditions.is_empty() {
        out.push_str("path conditions:\n");
        for cond in &outcome.state.path_conditions {
            out.push_str(&format!("  {}\n", cond));
        }
    }
    if let Some(trace) = &outcome.trace {
        out.push_str("trace:\n");
        for step in &trace.steps {
            out.push_str(&format!(
                "  #{:<4} {}:{:<3} [{:?}] {}\n",
                step.step_index, step.block_label, step.offset, step.source, step.instruction
            ));
        }
    }
    out
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs { command } = CliArgs::parse();

    match command {
        Commands::Ir { file } => {
            let program = Program::load(&file)?;
            for inst in &program.instructions {
                println!("{}", inst);
            }
        }
        Commands::Cfg {
            file,
            mermaid,
            function,
        } => {
            let program = Program::load(&file)?;
            let cfg = match function.as_deref() {
                Some(name) => {
                    let body = extract_function_instructions(&program.instructions, name);
                    if body.is_empty() {
                        bail!("no function named '{}' in {}", name, file.display());
                    }
                    build_cfg(&body)
                }
                None => program.cfg(),
            };
            if mermaid {
                print!("{}", to_mermaid(&cfg));
            } else {
                print!("{}", render_cfg(&cfg));
            }
        }
        Commands::Stats { file } => {
            let program = Program::load(&file)?;
            print!("{}", render_stats(&program));
        }
        Commands::Run(args) => {
            let config = resolve_run_config(&args)?;
            let program = Program::load(&args.file)?;
            let cfg = program.cfg();
            let registry = program.registry(&cfg);
            let mut oracle = build_oracle(&config.oracle)?;
            let outcome = execute(&cfg, &registry, oracle.as_mut(), &config.run_options())
                .with_context(|| format!("running {}", args.file.display()))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", render_outcome(&outcome));
            }
        }
    }

    Ok(())
}
