use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "runlog")]
#[command(about = "Log runs offline and sync them when you can")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name (API endpoint and signed-in session)
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Never contact the server
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log a run
    #[command(alias = "new")]
    Add {
        /// Distance in kilometres
        #[arg(short, long)]
        distance: f64,
        /// Duration in minutes
        #[arg(short, long)]
        time: f64,
        /// When the run happened: RFC 3339 or YYYY-MM-DD (defaults to now)
        #[arg(long)]
        date: Option<String>,
    },
    /// List logged runs, newest first
    #[command(alias = "ls")]
    List {
        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a run
    #[command(alias = "rm")]
    Delete {
        /// Run ID or unique ID prefix
        id: String,
    },
    /// Send pending deletes, download remote runs, upload local ones
    Sync,
    /// Show local sync state
    Status,
    /// Sign in or out of the runs service
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in, then sync
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account, then sync
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Forget the stored session
    Logout,
    /// Show who is signed in
    Status,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Runs API base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// Per-request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
        /// Keep the current active profile
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile configuration
    Show,
}
