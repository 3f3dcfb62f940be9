//! Colloquy CLI
//!
//! Main entry point for the colloquy command-line tool: tenant management,
//! document ingestion, session management, and question answering against
//! the tenant's knowledge base.

mod commands;

use clap::{Parser, Subcommand};
use colloquy_core::{config::AppConfig, logging, AppResult};
use commands::{AskCommand, IngestCommand, SessionCommand, TenantCommand};
use std::path::PathBuf;

/// Colloquy - tenant-scoped retrieval-augmented answering
#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(about = "Tenant-scoped retrieval-augmented answering", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the SQLite database file
    #[arg(short, long, global = true, env = "COLLOQUY_DATABASE")]
    database: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "COLLOQUY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, openai, gemini)
    #[arg(short, long, global = true, env = "COLLOQUY_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "COLLOQUY_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question against a tenant's knowledge base
    Ask(AskCommand),

    /// Ingest a document into a tenant's knowledge base
    Ingest(IngestCommand),

    /// Manage chat sessions
    Session(SessionCommand),

    /// Manage tenants
    Tenant(TenantCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(path) = cli.config.clone() {
        config = config.merge_file(path)?;
    }
    let config = config.with_overrides(
        cli.database,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Colloquy starting");
    tracing::debug!("Database: {:?}", config.database);
    tracing::debug!("Provider: {}", config.provider);

    config.ensure_data_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Ingest(_) => "ingest",
        Commands::Session(_) => "session",
        Commands::Tenant(_) => "tenant",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Session(cmd) => cmd.execute(&config).await,
        Commands::Tenant(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
