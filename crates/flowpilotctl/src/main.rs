mod cli;
mod commands;
mod stores;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, TriggerCommand, WorkflowCommand};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?)).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => commands::serve::run(&bind, &cli.data_dir, cli.config.as_deref()).await,
        Commands::Workflow(WorkflowCommand::Validate { file }) => commands::workflow::validate(&file).await,
        Commands::Workflow(WorkflowCommand::Run { file, input }) => {
            commands::workflow::run(&file, &input, &cli.data_dir, cli.config.as_deref()).await
        }
        Commands::Trigger(TriggerCommand::Fire { workflow_id, trigger_name, input }) => {
            commands::trigger::fire(workflow_id, &trigger_name, &input, &cli.data_dir, cli.config.as_deref()).await
        }
        Commands::Completion { shell } => commands::completion::execute(shell),
    }
}
