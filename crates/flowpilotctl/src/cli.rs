//! Command-line surface: `serve` (the engine-adjacent HTTP routes), plus
//! local `workflow`/`trigger` commands that exercise the scheduler and
//! dispatcher inline without a listening server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "flowpilotctl", version, about = "FlowPilot workflow execution engine CLI", long_about = None)]
pub struct Cli {
    /// Directory holding the JSON-backed store snapshots; created if absent.
    #[arg(long, global = true, default_value = "./flowpilot-data", env = "FLOWPILOT_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Optional YAML config file overlaying `EngineConfig` defaults.
    #[arg(long, global = true, env = "FLOWPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bind the engine-adjacent HTTP routes (execute/read/cancel/retry/webhook).
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Workflow definition commands: validate a file, or submit+run it inline.
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    /// Fire a trigger directly, bypassing the cron scanner/webhook HTTP path.
    #[command(subcommand)]
    Trigger(TriggerCommand),
    /// Generate shell completions for this CLI.
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkflowCommand {
    /// Parse a workflow definition file and run graph validation against it.
    Validate {
        /// Path to a YAML or JSON workflow definition.
        file: PathBuf,
    },
    /// Submit a workflow definition file for execution and wait for it to finish.
    Run {
        file: PathBuf,
        /// JSON object merged into the execution's input.
        #[arg(long, default_value = "{}")]
        input: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum TriggerCommand {
    /// Fire the named trigger on an already-stored workflow.
    Fire {
        #[arg(long)]
        workflow_id: uuid::Uuid,
        #[arg(long)]
        trigger_name: String,
        #[arg(long, default_value = "{}")]
        input: String,
    },
}
