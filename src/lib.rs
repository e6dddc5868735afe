//! # simcheck
//!
//! Document similarity detection and explainable plagiarism reports.
//!
//! A submission is tokenized, shingled and fingerprinted, matched against
//! an inverted index over an internal, web and academic corpus, aligned
//! span by span with every candidate source, and scored into a report: an
//! overall similarity percentage, a risk tier, a self-plagiarism flag and
//! a ranked list of sources with the passages that match.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ corpus dir  │──▶│ Engine                   │──▶│  SQLite  │
//! │ CLI / HTTP  │   │ index ▸ match ▸ align    │   │ corpus + │
//! └─────────────┘   │ ▸ score ▸ report         │   │ reports  │
//!                   └────────────┬─────────────┘   └──────────┘
//!                      ┌─────────┴─────────┐
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │(simcheck)│       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! The algorithms live in the runtime-free `simcheck-core` crate; this
//! crate adds concurrency, persistence and the outer surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! simcheck init
//! simcheck ingest-dir ./corpus/academic --origin academic
//! simcheck analyze essay.txt --id essay-7 --author s-1042 --register
//! simcheck report <run-id>
//! simcheck serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`engine`] | Concurrent analysis engine |
//! | [`corpus_dir`] | Directory loader for corpus files |
//! | [`ingest`] | Corpus ingestion commands |
//! | [`analyze`] | The `analyze` command |
//! | [`get`] | Report retrieval and rendering |
//! | [`history`] | Report history listing |
//! | [`stats`] | Corpus and report statistics |
//! | [`server`] | HTTP API |
//! | [`sqlite_store`] | SQLite [`CorpusStore`](simcheck_core::CorpusStore) |
//! | [`progress`] | Run progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod config;
pub mod corpus_dir;
pub mod db;
pub mod engine;
pub mod get;
pub mod history;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod server;
pub mod sqlite_store;
pub mod stats;
