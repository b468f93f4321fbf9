//! groupclaw CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Connect to the bridge and answer in the whitelisted group (default)
//! - `doctor`  — Diagnose configuration and reachability
//! - `onboard` — Write a default config file

use clap::{Parser, Subcommand};

mod commands;
mod pairing;

#[derive(Parser)]
#[command(
    name = "groupclaw",
    about = "groupclaw — a persona that answers in one WhatsApp group",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the bridge and start answering
    Run,

    /// Diagnose configuration and reachability
    Doctor,

    /// Write a default config file
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
