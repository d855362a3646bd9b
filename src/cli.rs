use clap::{Args, Parser, Subcommand};

use crate::{
    config::DEFAULT_CONFIG_FILE,
    content::{ContentKind, Target},
    output::OutputMode,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file to use
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// How to print per-task results
    #[arg(long = "output", value_enum, default_value_t = OutputMode::Table)]
    pub output: OutputMode,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Delete refresh tasks and record them in the ledger
    Pause(OperationArgs),
    /// Recreate refresh tasks recorded in the ledger
    Unpause(OperationArgs),
}

#[derive(Args)]
pub struct OperationArgs {
    /// Kind of content to operate on
    #[arg(value_enum)]
    pub kind: ContentKind,

    /// Content name, takes precedence over --id
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Content id
    #[arg(long = "id")]
    pub id: Option<String>,

    /// Leave datasources upstream of a workbook untouched
    #[arg(long = "no-upstream")]
    pub no_upstream: bool,
}

impl OperationArgs {
    pub fn target(&self) -> Target {
        Target {
            name: self.name.clone(),
            id: self.id.clone(),
        }
    }
}
