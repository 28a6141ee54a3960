use clap::{Parser, Subcommand};
use std::process;

use tracelens::cmd;

#[derive(Parser)]
#[command(name = "tracelens")]
#[command(version = "0.1.0")]
#[command(about = "Serve transformer internals for visualization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// List models available on disk
    #[command(alias = "ls")]
    List,
    /// Tokenize text with a model's tokenizer
    Tokenize {
        model: String,
        text: String,
    },
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => cmd::serve().await,
        Commands::List => cmd::list().await,
        Commands::Tokenize { model, text } => cmd::tokenize(&model, &text).await,
        Commands::Version => cmd::version().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
