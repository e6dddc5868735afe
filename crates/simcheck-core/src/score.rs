//! Scoring and risk classification.
//!
//! Coverage is measured in query tokens. A source's coverage is the union
//! of its span intervals; the overall coverage is the union across all
//! sources, so a token matched by several sources counts once.
//!
//! | Similarity      | Risk     |
//! |-----------------|----------|
//! | `≤ low_max`     | `low`    |
//! | `≤ medium_max`  | `medium` |
//! | otherwise       | `high`   |

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::align::MatchSpan;
use crate::error::AnalysisError;
use crate::index::DocumentEntry;
use crate::models::RiskTier;

/// Risk thresholds and the self-plagiarism rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub low_max: u8,
    pub medium_max: u8,
    /// Minimum coverage of a same-author source to flag self-plagiarism.
    pub self_plagiarism_min_coverage: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            low_max: 15,
            medium_max: 30,
            self_plagiarism_min_coverage: 0.05,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.low_max > self.medium_max || self.medium_max > 100 {
            return Err(AnalysisError::InvalidParams(format!(
                "risk thresholds must satisfy low_max <= medium_max <= 100 (got {} / {})",
                self.low_max, self.medium_max
            )));
        }
        if !(0.0..=1.0).contains(&self.self_plagiarism_min_coverage) {
            return Err(AnalysisError::InvalidParams(format!(
                "self_plagiarism_min_coverage must be within 0..=1, got {}",
                self.self_plagiarism_min_coverage
            )));
        }
        Ok(())
    }

    pub fn classify(&self, similarity: u8) -> RiskTier {
        if similarity <= self.low_max {
            RiskTier::Low
        } else if similarity <= self.medium_max {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    pub fn is_self_plagiarism(&self, same_author: bool, coverage: f64) -> bool {
        same_author && coverage >= self.self_plagiarism_min_coverage
    }
}

/// Size of the union of half-open intervals.
pub fn covered_tokens<I>(intervals: I) -> usize
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut sorted: Vec<(usize, usize)> = intervals.into_iter().filter(|(s, e)| s < e).collect();
    sorted.sort_unstable();

    let mut total = 0usize;
    let mut current: Option<(usize, usize)> = None;
    for (start, end) in sorted {
        match current {
            Some((cs, ce)) if start <= ce => current = Some((cs, ce.max(end))),
            Some((cs, ce)) => {
                total += ce - cs;
                current = Some((start, end));
            }
            None => current = Some((start, end)),
        }
    }
    if let Some((cs, ce)) = current {
        total += ce - cs;
    }
    total
}

pub fn coverage_ratio(matched: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    }
}

/// `round(ratio × 100)` clamped to `0..=100`.
pub fn to_percent(ratio: f64) -> u8 {
    if !ratio.is_finite() {
        return 0;
    }
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// All aligned spans between the query and one source, with its scores.
#[derive(Debug, Clone)]
pub struct SourceMatch {
    pub entry: Arc<DocumentEntry>,
    /// Body of the source, used to cut excerpts.
    pub text: String,
    /// Shared fingerprint count from the candidate matcher.
    pub shared: usize,
    pub spans: Vec<MatchSpan>,
    pub matched_tokens: usize,
    pub coverage: f64,
    pub similarity: u8,
    pub same_author: bool,
}

impl SourceMatch {
    pub fn new(
        entry: Arc<DocumentEntry>,
        text: String,
        shared: usize,
        mut spans: Vec<MatchSpan>,
        query_author: &str,
        query_tokens: usize,
    ) -> Self {
        spans.sort_by_key(|s| s.query_start);
        let matched_tokens = covered_tokens(spans.iter().map(|s| (s.query_start, s.query_end)));
        let coverage = coverage_ratio(matched_tokens, query_tokens);
        let same_author = entry.author_id == query_author;
        Self {
            entry,
            text,
            shared,
            spans,
            matched_tokens,
            coverage,
            similarity: to_percent(coverage),
            same_author,
        }
    }
}

/// Aggregate scores of a whole analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallScore {
    pub matched_tokens: usize,
    pub coverage: f64,
    pub similarity: u8,
    pub risk: RiskTier,
    pub self_plagiarism: bool,
}

pub fn score_overall(sources: &[SourceMatch], query_tokens: usize, policy: &ScoringPolicy) -> OverallScore {
    let matched_tokens = covered_tokens(
        sources
            .iter()
            .flat_map(|m| m.spans.iter().map(|s| (s.query_start, s.query_end))),
    );
    let coverage = coverage_ratio(matched_tokens, query_tokens);
    let similarity = to_percent(coverage);
    let self_plagiarism = sources
        .iter()
        .filter(|m| m.matched_tokens > 0)
        .any(|m| policy.is_self_plagiarism(m.same_author, m.coverage));
    OverallScore {
        matched_tokens,
        coverage,
        similarity,
        risk: policy.classify(similarity),
        self_plagiarism,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_counts_overlap_once() {
        assert_eq!(covered_tokens([(0, 5), (3, 8), (10, 12)]), 10);
        assert_eq!(covered_tokens([(0, 5), (5, 8)]), 8);
        assert_eq!(covered_tokens([(4, 4)]), 0);
        assert_eq!(covered_tokens(Vec::<(usize, usize)>::new()), 0);
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(to_percent(0.5), 50);
        assert_eq!(to_percent(0.156), 16);
        assert_eq!(to_percent(0.154), 15);
        assert_eq!(to_percent(1.7), 100);
        assert_eq!(to_percent(-0.2), 0);
        assert_eq!(to_percent(f64::NAN), 0);
    }

    #[test]
    fn risk_tiers_follow_thresholds() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.classify(0), RiskTier::Low);
        assert_eq!(policy.classify(15), RiskTier::Low);
        assert_eq!(policy.classify(16), RiskTier::Medium);
        assert_eq!(policy.classify(30), RiskTier::Medium);
        assert_eq!(policy.classify(31), RiskTier::High);
        assert_eq!(policy.classify(100), RiskTier::High);
    }

    #[test]
    fn self_plagiarism_needs_author_and_coverage() {
        let policy = ScoringPolicy::default();
        assert!(policy.is_self_plagiarism(true, 0.4));
        assert!(!policy.is_self_plagiarism(false, 0.4));
        assert!(!policy.is_self_plagiarism(true, 0.01));
    }

    #[test]
    fn invalid_policy_rejected() {
        let policy = ScoringPolicy {
            low_max: 40,
            medium_max: 30,
            ..ScoringPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(ScoringPolicy::default().validate().is_ok());
    }
}
