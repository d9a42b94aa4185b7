//! # Lucentsave CLI (`lsv`)
//!
//! ## Usage
//!
//! ```bash
//! lsv --config ./config/lsv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lsv init` | Create the SQLite database and run schema migrations |
//! | `lsv serve` | Start the HTTP server |
//! | `lsv embed pending` | Embed documents that have no embedding yet |
//! | `lsv rescrape` | Re-extract documents whose body is empty |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lucentsave::{config, embed_cmd, logging, migrate, rescrape, server};

/// Lucentsave: save articles now, find them by meaning later.
#[derive(Parser)]
#[command(name = "lsv", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lsv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it again on an existing database is safe.
    Init,

    /// Start the HTTP server.
    ///
    /// Requires LUCENTSAVE_TOKEN_SECRET (at least 32 bytes).
    Serve,

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Re-extract documents whose body is empty.
    Rescrape,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed documents that have no embedding, one at a time.
    Pending {
        /// Maximum number of documents to embed in this run.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(cfg.logging.format)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => {
                embed_cmd::run_embed_pending(&cfg, limit).await?;
            }
        },
        Commands::Rescrape => {
            rescrape::run_rescrape(&cfg).await?;
        }
    }

    Ok(())
}
