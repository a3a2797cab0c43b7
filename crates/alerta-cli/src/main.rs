//! Alerta360 CLI - report incidents from the terminal and sync them when online

mod cli;
mod commands;
mod error;
mod notifier;

use clap::Parser;

use alerta_core::config::ClientConfig;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::common::AppContext;
use crate::commands::completions::run_completions;
use crate::commands::list::run_list;
use crate::commands::report::run_report;
use crate::commands::show::run_show;
use crate::commands::sync::{
    run_sync_force, run_sync_now, run_sync_reset, run_sync_retry, run_sync_stats, run_sync_watch,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: tracing_subscriber::filter::Directive = "alerta=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = ClientConfig::load()?;
    let db_path = cli.db_path.clone().unwrap_or_else(|| config.db_path());
    let app = AppContext::open(config, &db_path).await?;

    match cli.command {
        Commands::Report(args) => run_report(args, &app).await?,
        Commands::List { district, json } => run_list(district.as_deref(), json, &app).await?,
        Commands::Show { id, json } => run_show(&id, json, &app).await?,
        Commands::Sync { command } => match command {
            SyncCommands::Now => run_sync_now(&app).await?,
            SyncCommands::Stats { json } => run_sync_stats(json, &app).await?,
            SyncCommands::Retry => run_sync_retry(&app).await?,
            SyncCommands::Force { id } => run_sync_force(&id, &app).await?,
            SyncCommands::Watch { interval_hours } => run_sync_watch(interval_hours, &app).await?,
            SyncCommands::Reset => run_sync_reset(&app).await?,
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
