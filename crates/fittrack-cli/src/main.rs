//! fittrack - a command-line client for the fittrack health tracker.
//!
//! Log health metrics, meals and fitness goals, and review them on a
//! dashboard, against a fittrack API server.

mod commands;
mod render;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fittrack_core::{ApiClient, Config, SessionManager};

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "fittrack.log";

/// fittrack - personal health and fitness tracking
#[derive(Parser, Debug)]
#[command(name = "fittrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with username and password
    Login {
        /// Username (defaults to FITTRACK_USERNAME or the last one used)
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },

    /// Sign out and forget the stored token
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Show metrics, meals and goals
    Dashboard,

    /// Manage health metrics
    Metric {
        #[command(subcommand)]
        command: MetricCommands,
    },

    /// Manage meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },

    /// Manage fitness goals
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum MetricCommands {
    /// Record a reading (at least one of weight, steps, heart rate)
    Add {
        #[arg(short, long)]
        weight: Option<String>,
        #[arg(short, long)]
        steps: Option<String>,
        #[arg(long)]
        heart_rate: Option<String>,
        /// When it was taken, e.g. 2024-03-04T08:30 (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Delete a reading
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum MealCommands {
    /// Log a meal
    Add {
        name: String,
        #[arg(short, long)]
        calories: String,
        /// When it was eaten, e.g. 2024-03-04T12:30 (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Delete a meal
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum GoalCommands {
    /// Add a goal
    Add { text: String },
    /// Mark a goal completed, or reopen it
    Toggle { id: i64 },
    /// Delete a goal
    Delete { id: i64 },
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, filtered by `RUST_LOG` or the verbosity flag, and to a
/// daily rolling file when a log directory is available.
fn init_tracing(verbose: u8, log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let _log_guard = init_tracing(cli.verbose, config.cache_dir().ok());
    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!(api_url = %config.api_url(), "fittrack starting");

    let store = config.token_store()?;
    let api = ApiClient::new(config.api_url(), store)?;
    let session = Arc::new(SessionManager::new(api));

    // Restore any stored session before running the command
    session.start().await;

    let mut config = config;
    commands::run(cli.command, &mut config, session).await
}
