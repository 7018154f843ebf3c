//! # Memory Harness CLI (`memh`)
//!
//! Serves a directory of Markdown notes to the editor UI and answers
//! queries against it from the command line.
//!
//! ## Usage
//!
//! ```bash
//! memh --config ./config/memh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `memh serve` | Start the HTTP/WebSocket server with the file watcher |
//! | `memh index` | Crawl the workspace and print index statistics |
//! | `memh search "<query>"` | Literal, BM25, or semantic search |
//! | `memh tags` | List tags with document counts |
//! | `memh backlinks <path>` | Show documents linking to a path |
//! | `memh embed pending` | Embed documents lacking a valid vector |
//! | `memh embed stats` | Embedding cache coverage |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use memory_harness::config;
use memory_harness::models::SearchResults;
use memory_harness::server;
use memory_harness::workspace::Workspace;

/// Memory Harness: a local Markdown workspace with live sync and search.
#[derive(Parser)]
#[command(name = "memh", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/memh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server.
    Serve,

    /// Crawl the workspace and report what was indexed.
    Index,

    /// Search the workspace.
    Search {
        query: String,

        #[arg(long, value_enum, default_value_t = SearchMode::Literal)]
        mode: SearchMode,

        /// Maximum results for vector search.
        #[arg(long, short = 'k')]
        limit: Option<usize>,
    },

    /// List tags and how many documents carry each.
    Tags,

    /// Show documents that link to PATH.
    Backlinks { path: String },

    /// Manage the embedding cache.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchMode {
    Literal,
    Bm25,
    Vector,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed documents that have no valid cached vector.
    Pending {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show cache coverage.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await,
        command => run_offline(command, cfg).await,
    }
}

/// Commands that crawl the workspace once and exit, without the watcher.
async fn run_offline(command: Commands, cfg: config::Config) -> anyhow::Result<()> {
    if matches!(command, Commands::Serve) {
        anyhow::bail!("serve runs the long-lived server, not a one-shot command");
    }
    let workspace = Workspace::open(cfg).await?;
    let started = std::time::Instant::now();
    let report = workspace.reindex().await?;

    match command {
        Commands::Serve => {}
        Commands::Index => {
            let stats = workspace.stats().await?;
            println!(
                "Indexed {} documents ({} failed) in {} ms at {}",
                report.indexed,
                report.failed,
                started.elapsed().as_millis(),
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  terms: {}  tags: {}  links: {}",
                stats.index.terms, stats.index.tags, stats.index.links
            );
        }
        Commands::Search { query, mode, limit } => {
            let results = match mode {
                SearchMode::Literal => workspace.search_literal(&query),
                SearchMode::Bm25 => workspace.search_bm25(&query),
                SearchMode::Vector => workspace.search_vector(&query, limit).await?,
            };
            print_results(&results);
        }
        Commands::Tags => {
            for tag in workspace.tags() {
                println!("{:>5}  #{}", tag.count, tag.name);
            }
        }
        Commands::Backlinks { path } => {
            let links = workspace.backlinks(&path)?;
            if links.is_empty() {
                println!("No backlinks to {}", path);
            }
            for link in links {
                println!("{}:{}  {}", link.path, link.line, link.context);
            }
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => {
                let report = workspace.backfill(limit).await?;
                println!(
                    "Embedded {}, failed {}, skipped {}",
                    report.embedded, report.failed, report.skipped
                );
            }
            EmbedAction::Stats => {
                let stats = workspace.stats().await?.embeddings;
                println!("Model:    {}", stats.model);
                println!("Enabled:  {}", stats.enabled);
                println!(
                    "Cached:   {}/{} ({:.1}%)",
                    stats.cached_count, stats.total_count, stats.coverage_percent
                );
                println!("Size:     {} bytes", stats.cache_size_bytes);
            }
        },
    }

    Ok(())
}

fn print_results(results: &SearchResults) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    match results {
        SearchResults::Literal(hits) => {
            for hit in hits {
                for m in &hit.matches {
                    println!("{}:{}: {}", hit.path, m.line, m.text);
                }
            }
        }
        SearchResults::Ranked(hits) => {
            for hit in hits {
                println!("{:>8.3}  {}", hit.score, hit.path);
            }
        }
        SearchResults::Semantic(hits) => {
            for hit in hits {
                println!("{:>3}  {}  {}", hit.score, hit.path, hit.snippet);
            }
        }
    }
}
