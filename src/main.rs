//! # docqa CLI (`dqa`)
//!
//! The `dqa` binary drives the document question-answering pipeline:
//! database initialization, directory ingestion, question answering, and
//! cache inspection.
//!
//! ## Usage
//!
//! ```bash
//! dqa --config ./config/dqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqa init` | Create the SQLite database and run schema migrations |
//! | `dqa ingest` | Scan the input directory and ingest new or changed files |
//! | `dqa ask "<question>"` | Retrieve context and answer a question |
//! | `dqa status` | Show cache and index counts |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{answer, config, db, embedding, index, ingest, migrate, retrieve, store};

/// docqa CLI — local-first document question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dqa",
    about = "docqa — local-first document question answering",
    version,
    long_about = "docqa ingests documents from a directory, chunks and embeds them into a \
    SQLite-backed vector index keyed by content fingerprint, and answers questions by retrieving \
    the most similar chunks and asking a local chat model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running
    /// it multiple times is safe.
    Init,

    /// Ingest the configured input directory.
    ///
    /// Scans for eligible files, skips unchanged ones by content
    /// fingerprint, and converts, chunks, and embeds the rest.
    Ingest {
        /// Show what would be processed without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question from the ingested documents.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (defaults to config value).
        #[arg(long)]
        k: Option<usize>,

        /// Print the assembled context instead of asking the chat model.
        #[arg(long)]
        context_only: bool,
    },

    /// Show cache and index counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pool = db::connect(&cfg.db.path).await?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dry_run, limit } => {
            migrate::run_migrations(&pool).await?;
            let provider = embedding::create_provider(&cfg.embedding)?;
            let summary = ingest::run_ingest(&cfg, &pool, provider, limit, dry_run).await?;

            if dry_run {
                println!(
                    "Dry run: {} file(s) would be processed, {} skipped.",
                    summary.processed, summary.skipped
                );
            } else {
                println!(
                    "Ingestion complete: {} processed, {} skipped, {} failed.",
                    summary.processed,
                    summary.skipped,
                    summary.failed.len()
                );
            }
            for failure in &summary.failed {
                println!("  failed ({}): {} - {}", failure.kind, failure.path, failure.message);
            }
        }
        Commands::Ask {
            question,
            k,
            context_only,
        } => {
            migrate::run_migrations(&pool).await?;
            let provider = embedding::create_provider(&cfg.embedding)?;
            let k = k.unwrap_or(cfg.retrieval.top_k);
            let ctx = retrieve::retrieve(&pool, provider.as_ref(), &cfg, &question, k).await?;
            let block = retrieve::assemble_context(
                &ctx,
                cfg.retrieval.context_chars_per_chunk,
                cfg.retrieval.max_context_chars,
            );

            if context_only {
                if block.is_empty() {
                    println!("No matching context found.");
                } else {
                    println!("{}", block);
                }
                return Ok(());
            }

            let chat = answer::create_chat_provider(&cfg.chat)?;
            let reply = answer::answer(chat.as_ref(), &ctx, &block).await?;
            println!("{}", reply);
        }
        Commands::Status => {
            migrate::run_migrations(&pool).await?;
            let files = store::count_current(&pool).await?;
            let chunks = index::count(&pool).await?;
            println!("Database: {}", cfg.db.path.display());
            println!("  cached files: {}", files);
            println!("  indexed chunks: {}", chunks);
        }
    }

    Ok(())
}
