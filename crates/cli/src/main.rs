//! vecquery CLI
//!
//! Main entry point for the vecquery command-line tool.
//! Embeds a small article corpus into a vector index and queries it, either
//! as a one-shot batch run or from an interactive shell.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    DeleteCommand, InitCommand, RunCommand, SearchCommand, SetupEnvCommand, ShellCommand,
    StatsCommand,
};
use std::path::PathBuf;
use std::process::ExitCode;
use vecquery_core::{config::AppConfig, logging, AppResult, ConfigOverrides};

/// vecquery - semantic search over a fixed article corpus
#[derive(Parser, Debug)]
#[command(name = "vecquery")]
#[command(about = "Embed articles into a vector index and query them", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "VECQUERY_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "VECQUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output (NO_COLOR=1 and the like count as set)
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    no_color: bool,

    /// Index name
    #[arg(short, long, global = true, env = "VECQUERY_INDEX")]
    index: Option<String>,

    /// Embedding provider (openai, mock)
    #[arg(long, global = true, env = "VECQUERY_EMBEDDING_PROVIDER")]
    embedding_provider: Option<String>,

    /// Vector store (pinecone, memory)
    #[arg(long, global = true, env = "VECQUERY_STORE")]
    store: Option<String>,

    /// Run without remote services: lexical mock embeddings and an in-memory
    /// store that lives for one process (run and shell only)
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index the articles, run one query and offer to delete the index
    Run(RunCommand),

    /// Interactive search session
    Shell(ShellCommand),

    /// Create the index and insert the articles if it is empty
    Init(InitCommand),

    /// Query the index
    Search(SearchCommand),

    /// Delete the index
    Delete(DeleteCommand),

    /// Show index statistics
    Stats(StatsCommand),

    /// Write API keys to the workspace .env file
    SetupEnv(SetupEnvCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> AppResult<()> {
    // Load base configuration (defaults, .env, config file, environment)
    let config = AppConfig::load(cli.workspace, cli.config)?;

    // Apply CLI overrides
    let config = config.with_overrides(ConfigOverrides {
        index_name: cli.index,
        embedding_provider: cli.embedding_provider,
        store: cli.store,
        log_level: cli.log_level,
        verbose: cli.verbose,
        no_color: cli.no_color,
        offline: cli.offline,
    });

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    // Log startup
    tracing::info!("vecquery starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Embedding provider: {}", config.embedding.provider);
    tracing::debug!("Vector store: {}", config.index.store);

    // Emit command span
    let command_name = match &cli.command {
        Commands::Run(_) => "run",
        Commands::Shell(_) => "shell",
        Commands::Init(_) => "init",
        Commands::Search(_) => "search",
        Commands::Delete(_) => "delete",
        Commands::Stats(_) => "stats",
        Commands::SetupEnv(_) => "setup-env",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Run(cmd) => cmd.execute(&config).await,
        Commands::Shell(cmd) => cmd.execute(&config).await,
        Commands::Init(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Delete(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::SetupEnv(cmd) => cmd.execute(&config),
    };

    // Log completion
    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
