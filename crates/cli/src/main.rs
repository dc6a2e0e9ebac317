//! Harness CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the HTTP/SSE gateway
//! - `run`    : Run one prompt in this process
//! - `status` : Show the effective configuration

use clap::{Parser, Subcommand};
use harness_config::{AppConfig, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "harness",
    about = "Harness: a streaming tool-using agent loop",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single prompt and print the agent's progress
    Run {
        #[arg(short, long)]
        message: String,
    },

    /// Show the effective configuration
    Status,
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Run { message } => commands::run::run(config, message).await?,
        Commands::Status => commands::status::run(&config),
    }

    Ok(())
}
