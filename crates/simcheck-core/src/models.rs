//! Core data models used throughout simcheck.
//!
//! These types describe corpus documents, the scope an analysis runs
//! against, and the classification vocabulary shared with the report UI.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Where a corpus document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginTag {
    /// Prior submissions to this institution.
    Internal,
    /// Web snippets.
    External,
    /// Published academic sources.
    Academic,
}

impl OriginTag {
    pub const ALL: [OriginTag; 3] = [OriginTag::Internal, OriginTag::External, OriginTag::Academic];

    pub fn as_str(&self) -> &'static str {
        match self {
            OriginTag::Internal => "internal",
            OriginTag::External => "external",
            OriginTag::Academic => "academic",
        }
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OriginTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(OriginTag::Internal),
            "external" => Ok(OriginTag::External),
            "academic" => Ok(OriginTag::Academic),
            other => Err(format!(
                "unknown origin tag '{}'. Use internal, external, or academic.",
                other
            )),
        }
    }
}

/// The set of origin tags that participate in an analysis.
///
/// An empty scope is rejected by the engine; use [`CorpusScope::all`]
/// for an unrestricted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusScope {
    origins: BTreeSet<OriginTag>,
}

impl CorpusScope {
    pub fn all() -> Self {
        Self {
            origins: OriginTag::ALL.into_iter().collect(),
        }
    }

    pub fn only(origins: impl IntoIterator<Item = OriginTag>) -> Self {
        Self {
            origins: origins.into_iter().collect(),
        }
    }

    /// Every origin except the given ones, e.g. a first-pass external check
    /// that skips the internal base.
    pub fn excluding(excluded: impl IntoIterator<Item = OriginTag>) -> Self {
        let excluded: BTreeSet<OriginTag> = excluded.into_iter().collect();
        Self {
            origins: OriginTag::ALL
                .into_iter()
                .filter(|o| !excluded.contains(o))
                .collect(),
        }
    }

    pub fn includes(&self, origin: OriginTag) -> bool {
        self.origins.contains(&origin)
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn origins(&self) -> impl Iterator<Item = OriginTag> + '_ {
        self.origins.iter().copied()
    }
}

impl Default for CorpusScope {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for CorpusScope {
    type Err = String;

    /// Parses `"all"` or a comma-separated list such as `"external,academic"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let origins = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(OriginTag::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if origins.is_empty() {
            return Err("corpus scope must name at least one origin".to_string());
        }
        Ok(Self { origins })
    }
}

/// A corpus document as submitted for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub document_id: String,
    pub raw_text: String,
    pub author_id: String,
    pub origin: OriginTag,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A corpus document as persisted by a [`CorpusStore`](crate::store::CorpusStore).
///
/// The body is the extracted plain text; excerpts are cut from it using
/// the byte offsets retained by the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub author_id: String,
    pub origin: OriginTag,
    pub title: Option<String>,
    pub url: Option<String>,
    pub body: String,
    /// Unix seconds.
    pub ingested_at: i64,
    /// SHA-256 of `body`, hex encoded.
    pub content_hash: String,
}

impl StoredDocument {
    pub fn from_corpus(doc: CorpusDocument, ingested_at: i64) -> Self {
        let content_hash = content_hash(&doc.raw_text);
        Self {
            id: doc.document_id,
            author_id: doc.author_id,
            origin: doc.origin,
            title: doc.title,
            url: doc.url,
            body: doc.raw_text,
            ingested_at,
            content_hash,
        }
    }
}

/// SHA-256 of a document body, hex encoded.
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Discrete risk classification of an overall similarity percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(format!("unknown risk tier: {}", other)),
        }
    }
}

/// Stage of a single analysis run.
///
/// `Pending → Tokenizing → Matching → Aligning → Scoring → Completed`,
/// with `Failed` reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Pending,
    Tokenizing,
    Matching,
    Aligning,
    Scoring,
    Completed,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Pending => "pending",
            RunStage::Tokenizing => "tokenizing",
            RunStage::Matching => "matching",
            RunStage::Aligning => "aligning",
            RunStage::Scoring => "scoring",
            RunStage::Completed => "completed",
            RunStage::Failed => "failed",
        }
    }

    /// Status shown by the dashboard and history pages.
    pub fn ui_status(&self) -> &'static str {
        match self {
            RunStage::Pending => "pending",
            RunStage::Tokenizing | RunStage::Matching | RunStage::Aligning | RunStage::Scoring => {
                "processing"
            }
            RunStage::Completed => "completed",
            RunStage::Failed => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Completed | RunStage::Failed)
    }

    /// The stage that follows this one on the success path.
    pub fn next(&self) -> RunStage {
        match self {
            RunStage::Pending => RunStage::Tokenizing,
            RunStage::Tokenizing => RunStage::Matching,
            RunStage::Matching => RunStage::Aligning,
            RunStage::Aligning => RunStage::Scoring,
            RunStage::Scoring => RunStage::Completed,
            RunStage::Completed => RunStage::Completed,
            RunStage::Failed => RunStage::Failed,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(v: u8) -> RunStage {
        match v {
            0 => RunStage::Pending,
            1 => RunStage::Tokenizing,
            2 => RunStage::Matching,
            3 => RunStage::Aligning,
            4 => RunStage::Scoring,
            5 => RunStage::Completed,
            _ => RunStage::Failed,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe holder for the current stage of a run, readable from
/// timeout and progress handlers while workers advance it.
#[derive(Debug)]
pub struct StageCell(std::sync::atomic::AtomicU8);

impl StageCell {
    pub fn new(stage: RunStage) -> Self {
        Self(std::sync::atomic::AtomicU8::new(stage.to_u8()))
    }

    pub fn get(&self) -> RunStage {
        RunStage::from_u8(self.0.load(std::sync::atomic::Ordering::SeqCst))
    }

    pub fn set(&self, stage: RunStage) {
        self.0
            .store(stage.to_u8(), std::sync::atomic::Ordering::SeqCst);
    }
}
