//! CLI interface for gitscribe.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod generate;
pub mod status;

/// gitscribe: AI-written commit messages for your pending changes.
#[derive(Parser)]
#[command(name = "gitscribe")]
#[command(about = "Streams an AI-generated commit message for your pending git changes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Generates a commit message and writes it to .git/COMMIT_EDITMSG.
    Generate(generate::GenerateCommand),
    /// Shows whether generation is available in this directory.
    Status(status::StatusCommand),
}

/// Exit status for a command that failed with `err`.
///
/// Interrupted runs use 130, the shell convention for SIGINT.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.is::<generate::GenerationCancelled>() {
        130
    } else {
        1
    }
}

impl Cli {
    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Generate(cmd) => cmd.execute().await,
            Commands::Status(cmd) => cmd.execute(),
        }
    }
}
