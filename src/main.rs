//! # filesearch-sync CLI (`fss`)
//!
//! ## Usage
//!
//! ```bash
//! fss [--config ./fss.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fss sync local` | Upload new/changed files from `local.root` |
//! | `fss sync object` | Upload new/changed objects under `object.docs_prefix` |
//! | `fss status <source>` | Show the store name and tracked files |
//! | `fss ask "<question>"` | One-shot grounded query |
//! | `fss serve` | Start the HTTP query endpoint |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); summaries go to stdout.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use filesearch_sync::config::{self, Config};
use filesearch_sync::connector_fs::LocalSource;
use filesearch_sync::connector_s3::{ObjectSource, S3Client};
use filesearch_sync::gemini::GeminiClient;
use filesearch_sync::ingest::{print_report, run_sync, SyncContext};
use filesearch_sync::query::QueryService;
use filesearch_sync::server::{run_server, HandleLocation};
use filesearch_sync::state::{LocalStateStore, ObjectStateStore};
use filesearch_sync::store_handle::load_handle;
use filesearch_sync::tracker::{self, ChangeTracker};
use filesearch_sync::traits::{DocumentSource, ObjectStorage, StateStore};
use filesearch_sync::uploader::RetryPolicy;

/// Incremental indexer and grounded query service for a Gemini File Search store.
#[derive(Parser)]
#[command(name = "fss", version)]
struct Cli {
    /// Optional TOML configuration file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Which document source (and matching state location) to use.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    /// Files under `local.root`; state in `local.state_dir`.
    Local,
    /// Objects under `object.docs_prefix`; state under `object.config_prefix`.
    Object,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload new and changed documents into the store.
    ///
    /// Creates the store on first run. Files that fail are reported and
    /// retried on the next run.
    Sync {
        source: SourceKind,

        /// Show what would be uploaded without touching the store or state.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the store name and the files recorded as indexed.
    Status { source: SourceKind },

    /// Ask a question against the store and print answer and citations.
    Ask {
        query: String,

        /// Where to read the store name from.
        #[arg(long, value_enum, default_value = "local")]
        source: SourceKind,
    },

    /// Start the HTTP query endpoint (`POST /ask`).
    Serve {
        /// Where to read the store name from.
        #[arg(long, value_enum, default_value = "local")]
        source: SourceKind,
    },
}

/// Source and state for the chosen backend.
struct Backend {
    source: Arc<dyn DocumentSource>,
    state: Arc<dyn StateStore>,
}

fn backend(cfg: &Config, kind: SourceKind) -> anyhow::Result<Backend> {
    Ok(match kind {
        SourceKind::Local => Backend {
            source: Arc::new(LocalSource::new(cfg.local.clone())),
            state: Arc::new(LocalStateStore::new(cfg.local.state_dir.clone())),
        },
        SourceKind::Object => {
            let storage: Arc<dyn ObjectStorage> = Arc::new(S3Client::from_env(&cfg.object)?);
            Backend {
                source: Arc::new(ObjectSource::new(storage.clone(), &cfg.object)?),
                state: Arc::new(ObjectStateStore::new(storage, &cfg.object)),
            }
        }
    })
}

async fn query_service(cfg: &Config, kind: SourceKind) -> anyhow::Result<QueryService> {
    let backend = backend(cfg, kind)?;
    let handle = load_handle(backend.state.as_ref()).await?;
    Ok(QueryService::new(
        Arc::new(GeminiClient::from_config(cfg)?),
        handle,
        cfg.api.model.clone(),
        Duration::from_secs(cfg.api.query_timeout_secs),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .ok();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { source, dry_run } => {
            let backend = backend(&cfg, source)?;
            let ctx = SyncContext {
                source: backend.source,
                state: backend.state,
                store: Arc::new(GeminiClient::from_config(&cfg)?),
                policy: RetryPolicy::from(&cfg.upload),
                store_display_name: cfg.api.store_display_name.clone(),
            };
            let report = run_sync(&ctx, dry_run).await?;
            print_report(ctx.source.label(), &report);
        }
        Commands::Status { source } => {
            let backend = backend(&cfg, source)?;
            let handle = load_handle(backend.state.as_ref()).await?;
            let state = ChangeTracker::new(backend.state.clone()).load().await?;

            println!("status {}", backend.source.label());
            println!("  store: {}", handle.as_deref().unwrap_or("<not created>"));
            println!("  indexed files: {}", state.len());
            for record in tracker::records(&state) {
                let short: String = record.hash.chars().take(12).collect();
                println!("    {}  {}", short, record.id);
            }
        }
        Commands::Ask { query, source } => {
            let service = query_service(&cfg, source).await?;
            let answer = service.ask(&query).await?;
            println!("{}", answer.answer);
            if !answer.citations.is_empty() {
                println!();
                println!("citations:");
                for (i, citation) in answer.citations.iter().enumerate() {
                    println!("  [{}] {}: \"{}\"", i + 1, citation.title, citation.snippet);
                }
            }
        }
        Commands::Serve { source } => {
            let service = query_service(&cfg, source).await?;
            let location = match source {
                SourceKind::Local => None,
                SourceKind::Object => Some(HandleLocation {
                    bucket: cfg.object.bucket.clone(),
                    store_name_blob: cfg.object.store_name_key(),
                }),
            };
            run_server(&cfg.server.bind, Arc::new(service), location).await?;
        }
    }

    Ok(())
}
