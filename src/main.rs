//! # filing-rag CLI
//!
//! The `filing-rag` binary builds per-company index collections from annual
//! securities filings and generates retrieval-grounded summaries.
//!
//! ## Usage
//!
//! ```bash
//! filing-rag --config ./config/filing-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `filing-rag init` | Create the SQLite database and run schema migrations |
//! | `filing-rag companies` | List configured companies and their resolved filings |
//! | `filing-rag index build <code\|all>` | Chunk and embed filings (idempotent unless `--force`) |
//! | `filing-rag index status [code]` | Show index collections |
//! | `filing-rag index drop <code>` | Remove a company's collection |
//! | `filing-rag search <code> "<query>"` | Retrieval only: print ranked passages |
//! | `filing-rag summarize <code\|all>` | Retrieve, assemble and generate summaries |
//! | `filing-rag completions <shell>` | Print shell completions |
//!
//! `index build` and `summarize` print a per-company run report and exit
//! with status 1 if any company failed or was cancelled.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::builder::RangedU64ValueParser;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use filing_rag::pipeline::{run_pipeline, RunMode, SummarizeOptions};
use filing_rag::progress::ProgressMode;
use filing_rag::{config, db, filings, migrate, retriever, sqlite_store, status};

/// filing-rag: retrieval-grounded summaries of annual securities filings.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/filing-rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "filing-rag",
    about = "Retrieval-grounded summaries of annual securities filings",
    version,
    long_about = "filing-rag splits each company's filing into overlapping passages, embeds them \
    into a per-company index collection, retrieves the passages most relevant to a set of topic \
    queries and generates one summary grounded in that context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/filing-rag.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Emit log records as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the collections, passages and
    /// build_locks tables. Running it again is safe.
    Init,

    /// List configured companies and the filing resolved for each.
    Companies,

    /// Build, inspect and remove index collections.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Retrieve the passages most similar to a query.
    Search {
        /// Company code.
        code: String,

        /// The query text.
        query: String,

        /// Number of passages to return (defaults to `retrieval.top_k`).
        #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        k: Option<usize>,
    },

    /// Generate retrieval-grounded summaries.
    ///
    /// Runs chunk, index (reused unless `--force-reindex`), retrieve,
    /// assemble and generate for each company and writes
    /// `<output.dir>/<code>.summary.json`.
    Summarize {
        /// Company code, or `all`.
        target: String,

        /// Rebuild the index even if one exists.
        #[arg(long)]
        force_reindex: bool,

        /// Topic query; repeat for several. Defaults to `retrieval.queries`.
        #[arg(long = "query")]
        queries: Vec<String>,

        /// Passages retrieved per query (defaults to `retrieval.top_k`).
        #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        top_k: Option<usize>,

        /// Generate but do not write any artifacts.
        #[arg(long)]
        no_save: bool,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

/// Index management subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Chunk and embed filings into index collections.
    ///
    /// A company that already has a collection is left untouched unless
    /// `--force` is given.
    Build {
        /// Company code, or `all`.
        target: String,

        /// Rebuild even if a collection exists.
        #[arg(long)]
        force: bool,
    },

    /// Show index collections.
    Status {
        /// Limit to one company code.
        code: Option<String>,
    },

    /// Remove a company's index collection.
    Drop {
        /// Company code.
        code: String,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("filing_rag=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "filing-rag", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted: finishing the current company, skipping the rest.");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let mode = match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Companies => {
            filings::list_companies(&cfg)?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Search { code, query, k } => {
            retriever::run_search(&cfg, &code, &query, k).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Index { action } => match action {
            IndexAction::Build { target, force } => (target, RunMode::Build { force }),
            IndexAction::Status { code } => {
                let pool = db::open(&cfg).await?;
                let store = sqlite_store::SqliteStore::new(pool.clone());
                status::run_status(&cfg, &store, code.as_deref()).await?;
                pool.close().await;
                return Ok(ExitCode::SUCCESS);
            }
            IndexAction::Drop { code } => {
                let pool = db::open(&cfg).await?;
                let store = sqlite_store::SqliteStore::new(pool.clone());
                status::run_drop(&store, &code).await?;
                pool.close().await;
                return Ok(ExitCode::SUCCESS);
            }
        },
        Commands::Summarize {
            target,
            force_reindex,
            queries,
            top_k,
            no_save,
        } => (
            target,
            RunMode::Summarize(SummarizeOptions {
                force_reindex,
                queries,
                top_k,
                save: !no_save,
            }),
        ),
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    };

    let (target, mode) = mode;
    let report = run_pipeline(&cfg, &target, &mode, progress.as_ref(), &cancel).await?;
    print!("{}", report.render_table());

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
