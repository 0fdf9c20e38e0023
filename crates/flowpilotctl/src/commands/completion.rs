//! Shell completion generation.
//!
//! - flowpilotctl completion bash  > /etc/bash_completion.d/flowpilotctl
//! - flowpilotctl completion zsh   > ~/.zsh/completion/_flowpilotctl
//! - flowpilotctl completion fish  > ~/.config/fish/completions/flowpilotctl.fish

use std::io;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::Cli;

pub fn execute(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
