//! runlog CLI - log runs from the terminal, sync them when online
//!
//! Everything is saved locally first; signed-in profiles push to and pull
//! from the runs service.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod session_store;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::GlobalOptions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "runlog=warn,runlog_core=warn";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = GlobalOptions {
        db_path: cli.db_path,
        profile: cli.profile,
        offline: cli.offline,
    };

    match cli.command {
        Commands::Add {
            distance,
            time,
            date,
        } => run_add(distance, time, date.as_deref(), &options).await,
        Commands::List { limit, json } => run_list(limit, json, &options).await,
        Commands::Delete { id } => run_delete(&id, &options).await,
        Commands::Sync => run_sync(&options).await,
        Commands::Status => run_status(&options).await,
        Commands::Auth { command } => run_auth(command, &options).await,
        Commands::Config { command } => run_config(command, &options),
    }
}
