use clap::Parser;
use std::process;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod client;
mod config;
mod content;
mod error;
mod inventory;
mod ledger;
mod manager;
mod outcome;
mod output;
mod session;
mod upstream;

#[cfg(test)]
mod test_utils;

use cli::{Cli, Command, OperationArgs};
use client::RestClient;
use config::load_config;
use content::ContentKind;
use error::Result;
use ledger::Ledger;
use manager::RefreshManager;
use output::{OutputMode, render_batch, render_schedule};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match run_refresh_pause(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "refresh_pause=debug"
    } else {
        "refresh_pause=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_refresh_pause(args: Cli) -> Result<()> {
    let config = load_config(&args.config)?;

    let mut client = RestClient::new(config.server)?;
    client.sign_in().await?;
    info!("signed in");

    let mut manager = RefreshManager::new(client, Ledger::new(config.data_dir));
    let result = dispatch(&mut manager, &args.command, args.output).await;

    let mut client = manager.into_session();
    if let Err(e) = client.sign_out().await {
        warn!("sign out failed: {}", e);
    }

    println!("{}", result?);
    Ok(())
}

async fn dispatch(
    manager: &mut RefreshManager<RestClient>,
    command: &Command,
    mode: OutputMode,
) -> Result<String> {
    let (args, pause) = match command {
        Command::Pause(args) => (args, true),
        Command::Unpause(args) => (args, false),
    };
    let target = args.target();
    let include_upstream = !args.no_upstream;

    match (args.kind, pause) {
        (ContentKind::Workbook, true) => {
            render_batch(&manager.pause_workbook(&target, include_upstream).await?, mode)
        }
        (ContentKind::Workbook, false) => render_batch(
            &manager.unpause_workbook(&target, include_upstream).await?,
            mode,
        ),
        (ContentKind::Datasource, true) => {
            render_batch(&manager.pause_datasource(&target).await?, mode)
        }
        (ContentKind::Datasource, false) => {
            render_batch(&manager.unpause_datasource(&target).await?, mode)
        }
        (ContentKind::Schedule, true) => {
            let response = manager.pause_schedule(&target).await?;
            render_schedule(&schedule_label(args), &response, mode)
        }
        (ContentKind::Schedule, false) => {
            let response = manager.unpause_schedule(&target).await?;
            render_schedule(&schedule_label(args), &response, mode)
        }
    }
}

fn schedule_label(args: &OperationArgs) -> String {
    args.name
        .clone()
        .or_else(|| args.id.clone())
        .unwrap_or_default()
}
