//! Verdant CLI — the main entry point.
//!
//! Commands:
//! - `serve` — Start the HTTP API server
//! - `chat`  — Send a single message through the pipeline from the terminal

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "verdant",
    about = "Verdant — a truthful AI mentoring backend",
    version,
    author
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
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message through the pipeline and print the reply
    Chat {
        /// The message text
        message: String,

        /// User id to chat as
        #[arg(short, long, default_value = "local")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { message, user } => commands::chat::run(&message, &user).await?,
    }

    Ok(())
}
