//! docchat CLI — the main entry point.
//!
//! Commands:
//! - `init`   — Write a default config file
//! - `serve`  — Start the HTTP gateway
//! - `ask`    — Ask one question, optionally over files or web pages
//! - `chat`   — Interactive streaming chat

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "docchat",
    about = "docchat — conversational question answering over your documents and the web",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DOCCHAT_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single question
    Ask {
        /// The question
        query: String,

        /// Continue an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        /// Text files or web page URLs to ingest into the session first
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Print the answer token by token
        #[arg(long)]
        stream: bool,
    },

    /// Chat interactively, streaming each answer
    Chat {
        /// Continue an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        /// Text files or web page URLs to ingest into the session first
        #[arg(short, long = "file")]
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    // Interactive commands keep stdout for answers
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask {
            query,
            session,
            files,
            stream,
        } => commands::ask::run(query, session, files, stream).await?,
        Commands::Chat { session, files } => commands::chat::run(session, files).await?,
    }

    Ok(())
}
