use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use voiceplan_core::env_config::env_non_empty;
use voiceplan_storage::DEFAULT_USER_ROLE;

mod commands;

const DEFAULT_API_URL: &str = "https://api.openai.com";

#[derive(Parser)]
#[command(name = "voiceplan")]
#[command(about = "Voice-driven project planning service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        #[arg(short, long, default_value = "8080", env = "VOICEPLAN_PORT")]
        port: u16,
        #[arg(short = 'H', long, default_value = "127.0.0.1", env = "VOICEPLAN_HOST")]
        host: String,
    },
    /// Apply PostgreSQL migrations
    Migrate,
    /// Check storage connectivity with a session round trip
    SmokeTest,
    /// Create or update a user
    ProvisionUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        organization: Uuid,
        #[arg(long, default_value = DEFAULT_USER_ROLE)]
        role: String,
    },
    /// Re-commit shadow-committed sessions in production mode
    Backfill {
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Validate a plan JSON file and print the report
    Validate {
        file: std::path::PathBuf,
        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,
    },
    /// Redact PII from stdin and write the result to stdout
    Redact,
}

pub(crate) fn get_api_key() -> Result<String> {
    env_non_empty("VOICEPLAN_API_KEY").context("VOICEPLAN_API_KEY environment variable must be set")
}

pub(crate) fn get_base_url() -> String {
    env_non_empty("VOICEPLAN_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_owned())
}

pub(crate) fn get_database_url() -> Option<String> {
    env_non_empty("DATABASE_URL")
}

pub(crate) fn require_database_url() -> Result<String> {
    get_database_url().context("DATABASE_URL environment variable must be set")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // stdout carries command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(port, host).await,
        Commands::Migrate => commands::migrate::run().await,
        Commands::SmokeTest => commands::smoke_test::run().await,
        Commands::ProvisionUser { email, organization, role } => {
            commands::provision_user::run(&email, organization, &role).await
        },
        Commands::Backfill { limit } => commands::backfill::run(limit).await,
        Commands::Validate { file, strict } => commands::validate::run(&file, strict),
        Commands::Redact => commands::redact::run(),
    }
}
