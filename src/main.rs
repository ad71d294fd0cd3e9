//! # RAG Harness CLI (`ragd`)
//!
//! The `ragd` binary runs the HTTP server and exposes the pipeline and
//! context administration from the command line.
//!
//! ## Usage
//!
//! ```bash
//! ragd --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragd serve` | Start the HTTP server |
//! | `ragd seed` | Index the sample corpus |
//! | `ragd search "<query>"` | Print ranked search hits |
//! | `ragd ask "<query>"` | Run the RAG pipeline and print the answer |
//! | `ragd agent "<query>"` | Answer with the search-tool agent |
//! | `ragd context list` | List context documents |
//! | `ragd context add` | Add a context document |
//! | `ragd context update <id>` | Partially update a document |
//! | `ragd context delete <id>` | Delete a document |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_harness::app::Services;
use rag_harness::{commands, config, logging, server};

/// RAG Harness: keyword retrieval over Elasticsearch feeding a local
/// Ollama model.
#[derive(Parser)]
#[command(
    name = "ragd",
    about = "RAG Harness: retrieval-augmented generation over Elasticsearch and Ollama",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Seeds the sample corpus first when `[seed].on_startup` is set.
    Serve,

    /// Index the sample corpus.
    Seed,

    /// Search the corpus and print ranked hits.
    Search {
        query: String,
    },

    /// Run the RAG pipeline for a query.
    Ask {
        query: String,

        /// Model to use instead of `[model].default_model`.
        #[arg(long)]
        model: Option<String>,

        /// Print fragments as the model produces them.
        #[arg(long)]
        stream: bool,
    },

    /// Answer a query with the search-tool agent.
    Agent {
        query: String,

        /// Model to use instead of `[model].default_model`.
        #[arg(long)]
        model: Option<String>,

        /// Stream the model's answer to the bare query, without tool use.
        #[arg(long)]
        stream: bool,
    },

    /// Manage context documents.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
}

#[derive(Subcommand)]
enum ContextAction {
    /// List documents in the configured index.
    List,
    /// Add a document.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Change a document's title and/or content.
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete a document.
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    let services = || Services::from_config(&cfg);
    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Seed => commands::run_seed(&services()?, cfg.seed.mode).await?,
        Commands::Search { query } => commands::run_search(&services()?, &query).await?,
        Commands::Ask {
            query,
            model,
            stream,
        } => commands::run_ask(&services()?, &query, model, stream).await?,
        Commands::Agent {
            query,
            model,
            stream,
        } => commands::run_agent(&services()?, &query, model, stream).await?,
        Commands::Context { action } => {
            let services = services()?;
            match action {
                ContextAction::List => commands::run_context_list(&services).await?,
                ContextAction::Add { title, content } => {
                    commands::run_context_add(&services, &title, &content).await?
                }
                ContextAction::Update { id, title, content } => {
                    commands::run_context_update(&services, &id, title, content).await?
                }
                ContextAction::Delete { id } => {
                    commands::run_context_delete(&services, &id).await?
                }
            }
        }
    }

    Ok(())
}
