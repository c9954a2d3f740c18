//! # E-Cris CLI (`ecris`)
//!
//! Builds the reference-document index and answers crisis-management
//! questions from the command line or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! ecris --config ./config/ecris.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ecris build` | Load, chunk and embed the documents into a fresh index |
//! | `ecris build --append <files>` | Add documents to the existing index |
//! | `ecris ask "<question>"` | Answer a question (RAG with model fallback) |
//! | `ecris retrieve "<query>"` | Show the chunks retrieval would use |
//! | `ecris stats` | Index summary |
//! | `ecris sources` | List the configured document set |
//! | `ecris crisis <subsidiary> <count>` | Apply the crisis threshold policy |
//! | `ecris serve` | Start the HTTP API |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ecris::progress::ProgressMode;
use ecris::{assistant, config, crisis, ingest, retrieve, server, sources, stats};

/// E-Cris — retrieval-augmented crisis-management assistant.
#[derive(Parser)]
#[command(
    name = "ecris",
    about = "E-Cris — retrieval-augmented crisis-management assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ecris.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the configured documents.
    ///
    /// The new index replaces the old one only after it is complete.
    Build {
        /// Append these files to the existing index instead of rebuilding.
        #[arg(long, num_args = 1..)]
        append: Vec<PathBuf>,

        /// Progress on stderr: human, json, or off. Default: human when
        /// stderr is a terminal, otherwise off.
        #[arg(long, value_parser = ["human", "json", "off"])]
        progress: Option<String>,
    },

    /// Answer a question.
    Ask {
        question: String,
    },

    /// Retrieve the chunks most similar to a query.
    Retrieve {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Show index statistics.
    Stats,

    /// List the configured document set.
    Sources,

    /// Assess a subsidiary's negative-comment count against the crisis policy.
    Crisis {
        subsidiary: String,
        negative_comments: usize,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { append, progress } => {
            let mode = progress
                .as_deref()
                .and_then(ProgressMode::parse)
                .unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_build(&cfg, append, mode).await?;
        }
        Commands::Ask { question } => {
            assistant::run_ask(&cfg, &question).await?;
        }
        Commands::Retrieve {
            query,
            top_k,
            threshold,
        } => {
            retrieve::run_retrieve(&cfg, &query, top_k, threshold).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Crisis {
            subsidiary,
            negative_comments,
        } => {
            crisis::run_crisis(&cfg, &subsidiary, negative_comments)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
