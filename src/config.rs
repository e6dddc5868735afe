//! TOML configuration.
//!
//! Every section except `[db]` is optional; missing keys fall back to the
//! defaults below. [`load_config`] validates the combination and
//! [`Config::analysis_params`] projects it onto the core pipeline's
//! parameter bundle.
//!
//! ```toml
//! [db]
//! path = "./data/simcheck.sqlite"
//!
//! [shingling]
//! k = 5
//! # e.g. 4 keeps only the minimum fingerprint of every 4 shingles. Shrinks
//! # the index; matches shorter than winnow_window + k - 1 tokens may be missed.
//! winnow_window = 0
//!
//! [matching]
//! min_shared_shingles = 4
//! min_shared_ratio = 0.01
//! max_candidates = 50
//!
//! [alignment]
//! merge_gap = 2
//!
//! [scoring]
//! low_max = 15
//! medium_max = 30
//! self_plagiarism_min_coverage = 0.05
//!
//! [report]
//! max_excerpt_chars = 600
//! # max_spans_per_source = 20
//!
//! [engine]
//! concurrency = 4
//! run_timeout_secs = 60
//! max_document_bytes = 10485760
//!
//! [server]
//! bind = "127.0.0.1:7341"
//!
//! [corpus_dir]
//! include_globs = ["**/*.txt", "**/*.md"]
//! exclude_globs = []
//! follow_symlinks = false
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use simcheck_core::align::AlignParams;
use simcheck_core::candidate::MatchParams;
use simcheck_core::report::ReportParams;
use simcheck_core::score::ScoringPolicy;
use simcheck_core::shingle::ShingleParams;
use simcheck_core::AnalysisParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub shingling: ShinglingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub corpus_dir: CorpusDirConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShinglingConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    /// `0` or `1` disables winnowing.
    #[serde(default)]
    pub winnow_window: usize,
}

impl Default for ShinglingConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            winnow_window: 0,
        }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_min_shared")]
    pub min_shared_shingles: usize,
    #[serde(default = "default_min_ratio")]
    pub min_shared_ratio: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_shared_shingles: default_min_shared(),
            min_shared_ratio: default_min_ratio(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_min_shared() -> usize {
    4
}
fn default_min_ratio() -> f64 {
    0.01
}
fn default_max_candidates() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlignmentConfig {
    #[serde(default = "default_merge_gap")]
    pub merge_gap: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            merge_gap: default_merge_gap(),
        }
    }
}

fn default_merge_gap() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_low_max")]
    pub low_max: u8,
    #[serde(default = "default_medium_max")]
    pub medium_max: u8,
    #[serde(default = "default_self_coverage")]
    pub self_plagiarism_min_coverage: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            low_max: default_low_max(),
            medium_max: default_medium_max(),
            self_plagiarism_min_coverage: default_self_coverage(),
        }
    }
}

fn default_low_max() -> u8 {
    15
}
fn default_medium_max() -> u8 {
    30
}
fn default_self_coverage() -> f64 {
    0.05
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default)]
    pub max_spans_per_source: Option<usize>,
    #[serde(default = "default_max_excerpt_chars")]
    pub max_excerpt_chars: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_spans_per_source: None,
            max_excerpt_chars: default_max_excerpt_chars(),
        }
    }
}

fn default_max_excerpt_chars() -> usize {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Candidate alignments running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Budget for one analysis run; `0` fails every run with a timeout.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Largest accepted document body.
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            run_timeout_secs: default_run_timeout_secs(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

impl EngineConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_run_timeout_secs() -> u64 {
    60
}
fn default_max_document_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusDirConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for CorpusDirConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string(), "**/*.md".to_string()]
}

impl Config {
    /// Defaults with the database at `./data/simcheck.sqlite`.
    pub fn minimal() -> Self {
        Self::with_db_path("./data/simcheck.sqlite")
    }

    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            shingling: ShinglingConfig::default(),
            matching: MatchingConfig::default(),
            alignment: AlignmentConfig::default(),
            scoring: ScoringConfig::default(),
            report: ReportConfig::default(),
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
            corpus_dir: CorpusDirConfig::default(),
        }
    }

    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            shingle: ShingleParams {
                k: self.shingling.k,
                window: self.shingling.winnow_window,
            },
            matching: MatchParams {
                min_shared: self.matching.min_shared_shingles,
                min_ratio: self.matching.min_shared_ratio,
                max_candidates: self.matching.max_candidates,
            },
            alignment: AlignParams {
                merge_gap: self.alignment.merge_gap,
            },
            scoring: ScoringPolicy {
                low_max: self.scoring.low_max,
                medium_max: self.scoring.medium_max,
                self_plagiarism_min_coverage: self.scoring.self_plagiarism_min_coverage,
            },
            report: ReportParams {
                max_spans_per_source: self.report.max_spans_per_source,
                max_excerpt_chars: self.report.max_excerpt_chars,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis_params()
            .validate()
            .context("invalid analysis settings")?;

        if self.engine.concurrency == 0 {
            anyhow::bail!("engine.concurrency must be >= 1");
        }
        if self.engine.max_document_bytes == 0 {
            anyhow::bail!("engine.max_document_bytes must be > 0");
        }
        if self.corpus_dir.include_globs.is_empty() {
            anyhow::bail!("corpus_dir.include_globs must not be empty");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
