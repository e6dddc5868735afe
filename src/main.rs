//! # simcheck CLI
//!
//! The `simcheck` binary is the primary interface for building a corpus,
//! analyzing submissions, reading persisted reports and starting the HTTP
//! API.
//!
//! ## Usage
//!
//! ```bash
//! simcheck --config ./config/simcheck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `simcheck init` | Create the SQLite database and schema |
//! | `simcheck ingest <file>` | Add or replace one corpus document |
//! | `simcheck ingest-dir <dir>` | Load every matching file under a directory |
//! | `simcheck remove <id>` | Remove a corpus document |
//! | `simcheck analyze <file>` | Analyze a submission and persist the report |
//! | `simcheck report <run-id>` | Print a persisted report |
//! | `simcheck history` | List past runs, newest first |
//! | `simcheck stats` | Corpus and report statistics |
//! | `simcheck verify` | Rebuild and verify the fingerprint index |
//! | `simcheck serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Load published sources
//! simcheck ingest-dir ./corpus/journals --origin academic --author library
//!
//! # Check an essay against web and academic sources only
//! simcheck analyze essay.txt --id essay-7 --author s-1042 --scope external,academic
//!
//! # Machine-readable output
//! simcheck analyze essay.txt --id essay-7 --author s-1042 --json
//!
//! # The ten most recent high-risk runs
//! simcheck history --risk high --limit 10
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use simcheck::analyze::{self, AnalyzeArgs};
use simcheck::config;
use simcheck::engine::open_engine;
use simcheck::progress::ProgressMode;
use simcheck::{get, history, ingest, migrate, server, stats};
use simcheck_core::{CorpusScope, HistoryFilter, OriginTag, RiskTier};

/// simcheck: document similarity detection with explainable reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/simcheck.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "simcheck",
    about = "simcheck: document similarity detection with explainable plagiarism reports",
    version,
    long_about = "simcheck fingerprints documents into an inverted index over internal, web and \
    academic sources, aligns every candidate source span by span, and produces reports with an \
    overall similarity percentage, a risk tier, a self-plagiarism flag and ranked matched passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/simcheck.toml")]
    config: PathBuf,

    /// Progress output on stderr: off, human or json. Defaults to human on
    /// a terminal and off otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Add or replace one corpus document.
    ///
    /// Unchanged documents (same body and metadata) are skipped.
    Ingest {
        /// UTF-8 text file to ingest.
        file: PathBuf,

        /// Document id. Defaults to the file name.
        #[arg(long)]
        id: Option<String>,

        /// Author of the document.
        #[arg(long)]
        author: String,

        /// Origin tag: internal, external or academic.
        #[arg(long)]
        origin: OriginTag,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Ingest every matching file under a directory.
    ///
    /// Include and exclude globs come from `[corpus_dir]`. Document ids are
    /// paths relative to the directory.
    IngestDir {
        dir: PathBuf,

        /// Origin tag applied to every file.
        #[arg(long)]
        origin: OriginTag,

        /// Author applied to every file.
        #[arg(long, default_value = "unknown")]
        author: String,
    },

    /// Remove a corpus document.
    Remove {
        id: String,
    },

    /// Analyze a submission against the corpus and persist the report.
    Analyze {
        /// UTF-8 text file to analyze.
        file: PathBuf,

        /// Document id. Defaults to the file name.
        #[arg(long)]
        id: Option<String>,

        /// Author of the submission.
        #[arg(long)]
        author: String,

        /// Origins to compare against: `all` or a list such as
        /// `external,academic`.
        #[arg(long, default_value = "all")]
        scope: CorpusScope,

        #[arg(long)]
        title: Option<String>,

        /// Add the submission to the internal corpus after the run.
        #[arg(long)]
        register: bool,

        /// Print the report record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a persisted report.
    Report {
        run_id: String,

        #[arg(long)]
        json: bool,
    },

    /// List past analysis runs, newest first.
    History {
        /// Only runs in this risk tier: low, medium or high.
        #[arg(long)]
        risk: Option<RiskTier>,

        /// Case-insensitive match on title, author or document id.
        #[arg(long)]
        search: Option<String>,

        /// Maximum number of runs to list.
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show corpus and report statistics.
    Stats,

    /// Rebuild the fingerprint index from stored documents and verify it.
    Verify,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("simcheck=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            id,
            author,
            origin,
            title,
            url,
        } => {
            ingest::run_ingest(&cfg, &file, id, &author, origin, title, url, progress).await?;
        }
        Commands::IngestDir {
            dir,
            origin,
            author,
        } => {
            ingest::run_ingest_dir(&cfg, &dir, origin, &author, progress).await?;
        }
        Commands::Remove { id } => {
            ingest::run_remove(&cfg, &id).await?;
        }
        Commands::Analyze {
            file,
            id,
            author,
            scope,
            title,
            register,
            json,
        } => {
            let args = AnalyzeArgs {
                id,
                author,
                scope,
                title,
                register,
                json,
            };
            analyze::run_analyze(&cfg, &file, args, progress).await?;
        }
        Commands::Report { run_id, json } => {
            get::run_report(&cfg, &run_id, json).await?;
        }
        Commands::History {
            risk,
            search,
            limit,
            json,
        } => {
            let filter = HistoryFilter {
                risk,
                search,
                limit,
            };
            history::run_history(&cfg, &filter, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Verify => {
            let engine = open_engine(&cfg, ProgressMode::Off.reporter()).await?;
            let stats = engine.verify().await?;
            engine.close().await?;
            println!("verify");
            println!("  documents:     {}", stats.documents);
            println!("  fingerprints:  {}", stats.distinct_fingerprints);
            println!("  postings:      {}", stats.postings);
            println!("ok");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
