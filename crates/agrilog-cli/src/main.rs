//! AgriLog CLI - field logging and sync from the terminal
//!
//! Records work on the farm while offline and syncs it whenever the remote
//! store is reachable.

mod app;
mod cli;
mod commands;
mod error;


use agrilog_core::config::default_config_path;
use agrilog_core::AppConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::cli::{Cli, Commands};
use crate::commands::alert::run_alert;
use crate::commands::device::run_device;
use crate::commands::diagnosis::run_diagnosis;
use crate::commands::harvest::run_harvest;
use crate::commands::log::run_log;
use crate::commands::plant::run_plant;
use crate::commands::stats::run_stats;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        if let CliError::Core(agrilog_core::Error::Database(_) | agrilog_core::Error::LibSql(_)) =
            &error
        {
            eprintln!("The local store could not be opened; re-run the command to retry.");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.log_level);

    if matches!(cli.command, Commands::Watch) {
        return run_watch(config).await;
    }

    let app = App::open(config).await?;
    let log = &app.field_log;
    match cli.command {
        Commands::Device => run_device(log).await?,
        Commands::Log { command } => run_log(log, command).await?,
        Commands::Harvest { command } => run_harvest(log, command).await?,
        Commands::Plant { command } => run_plant(log, command).await?,
        Commands::Alert { command } => run_alert(log, command).await?,
        Commands::Diagnosis { command } => run_diagnosis(log, command).await?,
        Commands::Stats { month, json } => run_stats(&app.store, month, json).await?,
        Commands::Sync => run_sync(&app).await?,
        Commands::Watch => {}
    }

    Ok(())
}

/// Config file, then `AGRILOG_*` variables, then command-line flags.
fn load_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = AppConfig::load_with_env(&path)?;
    if let Some(db_path) = &cli.db_path {
        config.database_path.clone_from(db_path);
    }
    Ok(config)
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
