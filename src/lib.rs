//! Gatehouse: intent-gated tool orchestration for code-generating agents.
//!
//! Gatehouse sits between an agent and its workspace. The agent never writes
//! files directly; it calls tools, and every model request it makes passes a
//! gate that refuses to dispatch until the agent has selected a declared
//! intent.
//!
//! # The Loop
//!
//! 1. The operator declares intents in `.orchestration/active_intents.yaml`
//! 2. The agent calls `select_active_intent` and receives an `<intent_context>`
//! 3. Model requests carrying that context pass the gate; others are blocked
//! 4. Edits are staged with `stage_patch`, reviewed with `diff_staged_change`,
//!    and applied all-or-none with `approve_patch`
//! 5. Every consequential action is recorded under `.orchestration/intents_traces/`
//!
//! # Examples
//!
//! ```bash
//! gatehouse tools
//! gatehouse invoke select_active_intent --args '{"intent_id":"INT-001"}'
//! gatehouse invoke stage_patch --args '{"patch":[{"path":"a/b.txt","content":"X"}]}'
//! echo '{"prompt":"fix INT-001"}' | gatehouse gate
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: registry, gate, intents, trace ledger, dispatch, orchestrator
//! - [`plugins`]: the built-in tools

pub mod core;
pub mod plugins;

use crate::core::error::GatehouseError;
use crate::core::gatekeeper::RequestPayload;
use crate::core::orchestrator::Orchestrator;
use crate::core::registry::ToolResult;
use crate::core::store::{self, Workspace};
use crate::core::{intents, logging};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "gatehouse",
    version = env!("CARGO_PKG_VERSION"),
    about = "Intent-gated tool orchestration for code-generating agents"
)]
struct Cli {
    /// Workspace root. Defaults to $GATEHOUSE_WORKSPACE, then the nearest
    /// ancestor containing `.orchestration/`, then the current directory.
    #[clap(long, global = true)]
    workspace: Option<PathBuf>,
    /// Raise diagnostic logging to debug.
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered tools.
    Tools {
        /// Print the tool schema as JSON.
        #[clap(long)]
        json: bool,
    },
    /// Invoke one tool and print its result.
    Invoke {
        tool: String,
        /// Tool arguments as a JSON object.
        #[clap(long)]
        args: Option<String>,
    },
    /// Run the pre-dispatch chain over a request payload.
    Gate {
        /// JSON payload file. Reads stdin when omitted.
        #[clap(long)]
        payload: Option<PathBuf>,
    },
    /// List active intents.
    Intents,
    /// Print version.
    Version,
}

pub fn run() -> Result<(), GatehouseError> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Command::Version = cli.command {
        println!("v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let current_dir = std::env::current_dir()?;
    let root = store::discover_root(cli.workspace, &current_dir);
    let workspace = Workspace::open(root)?;
    let orchestrator = Orchestrator::new(workspace)?;

    match cli.command {
        Command::Version => Ok(()),
        Command::Tools { json } => run_tools(&orchestrator, json),
        Command::Invoke { tool, args } => run_invoke(&orchestrator, &tool, args.as_deref()),
        Command::Gate { payload } => run_gate(&orchestrator, payload),
        Command::Intents => run_intents(&orchestrator),
    }
}

fn run_tools(orchestrator: &Orchestrator, json: bool) -> Result<(), GatehouseError> {
    if json {
        println!("{}", serde_json::to_string_pretty(&plugins::schema())?);
        return Ok(());
    }
    for registration in orchestrator.registry().registrations() {
        println!(
            "  {} {}",
            registration.name.bright_cyan().bold(),
            registration.description.dimmed()
        );
    }
    Ok(())
}

fn run_invoke(
    orchestrator: &Orchestrator,
    tool: &str,
    args: Option<&str>,
) -> Result<(), GatehouseError> {
    let args: Option<Value> = args.map(serde_json::from_str).transpose()?;
    let result = orchestrator.invoke(tool, args);
    println!("{}", serde_json::to_string_pretty(&result)?);
    match result {
        ToolResult::Success(_) => Ok(()),
        ToolResult::Failure(message) => Err(GatehouseError::ValidationError(format!(
            "{} failed: {}",
            tool, message
        ))),
    }
}

fn run_gate(orchestrator: &Orchestrator, payload: Option<PathBuf>) -> Result<(), GatehouseError> {
    let raw = match payload {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let mut request: RequestPayload = serde_json::from_str(&raw)?;

    match orchestrator.run_gate(&mut request) {
        Ok(()) => {
            eprintln!("{} request gated", "✓".bright_green());
            println!("{}", serde_json::to_string_pretty(&request)?);
            Ok(())
        }
        Err(blocked) => {
            eprintln!(
                "{} blocked by {}: {}",
                "✗".bright_red(),
                blocked.hook.bright_yellow(),
                blocked.reason
            );
            Err(GatehouseError::GateBlocked(blocked.reason))
        }
    }
}

fn run_intents(orchestrator: &Orchestrator) -> Result<(), GatehouseError> {
    let ws = orchestrator.workspace();
    let active = intents::load_active_intents(ws)?;
    if active.is_empty() {
        println!(
            "{} no active intents in {}",
            "⚠".bright_yellow(),
            ws.intents_file_display()
        );
        return Ok(());
    }
    for intent in &active {
        println!(
            "  {} {} {}",
            intent.id.bright_green().bold(),
            intent.name,
            format!("[{}]", intent.status).dimmed()
        );
    }
    Ok(())
}
