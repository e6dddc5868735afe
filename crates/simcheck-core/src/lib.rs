//! # simcheck Core
//!
//! Shared, runtime-free logic for simcheck: data models, tokenizer,
//! shingle fingerprint index, candidate matching, alignment, scoring,
//! report assembly, and the corpus store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. The concurrent engine, persistence and
//! frontends live in the `simcheck` app crate.
//!
//! ## Pipeline
//!
//! ```text
//! raw text ─▶ tokenize ─▶ shingle ─▶ index lookup ─▶ candidates
//!                                                        │
//!             report ◀── score ◀── align (per candidate) ◀┘
//! ```

pub mod align;
pub mod analysis;
pub mod candidate;
pub mod error;
pub mod index;
pub mod models;
pub mod report;
pub mod score;
pub mod shingle;
pub mod store;
pub mod tokenize;

pub use analysis::{AnalysisParams, PreparedQuery};
pub use error::AnalysisError;
pub use index::{DocumentEntry, FingerprintIndex, IndexStats, IngestOutcome};
pub use models::{CorpusDocument, CorpusScope, OriginTag, RiskTier, RunStage, StoredDocument};
pub use report::AnalysisReport;
pub use store::{CorpusStore, HistoryFilter, ReportRecord, ReportSummary};
