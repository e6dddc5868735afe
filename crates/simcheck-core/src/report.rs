//! Report assembly.
//!
//! Turns scored [`SourceMatch`]es into the ranked, explainable structure
//! the review UI renders: one card per source with the passage pair of
//! its longest span, plus every span with verbatim excerpts from both
//! documents.
//!
//! The report holds no timestamps or run ids, so serializing it twice for
//! the same query and corpus state yields identical bytes. Run metadata
//! lives in [`ReportRecord`](crate::store::ReportRecord).

use serde::{Deserialize, Serialize};

use crate::align::MatchSpan;
use crate::error::AnalysisError;
use crate::models::{OriginTag, RiskTier};
use crate::score::{OverallScore, SourceMatch};

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportParams {
    /// Spans listed per source; `None` lists all of them.
    pub max_spans_per_source: Option<usize>,
    /// Excerpts longer than this many characters are trimmed.
    pub max_excerpt_chars: usize,
}

impl Default for ReportParams {
    fn default() -> Self {
        Self {
            max_spans_per_source: None,
            max_excerpt_chars: 600,
        }
    }
}

impl ReportParams {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.max_excerpt_chars < 2 {
            return Err(AnalysisError::InvalidParams(
                "max_excerpt_chars must be >= 2".to_string(),
            ));
        }
        if self.max_spans_per_source == Some(0) {
            return Err(AnalysisError::InvalidParams(
                "max_spans_per_source must be >= 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// One aligned passage with excerpts from both documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSpan {
    pub query_start: usize,
    pub query_end: usize,
    pub source_start: usize,
    pub source_end: usize,
    pub exact: bool,
    pub query_excerpt: String,
    pub source_excerpt: String,
}

/// A matched source as shown on a report card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub id: String,
    pub title: Option<String>,
    pub origin: OriginTag,
    pub url: Option<String>,
    /// Integer percentage of the query covered by this source.
    pub similarity: u8,
    pub coverage: f64,
    pub matched_tokens: usize,
    pub shared_fingerprints: usize,
    pub same_author: bool,
    /// Query side of the longest span.
    pub matched_text: String,
    /// Source side of the longest span.
    pub original_text: String,
    pub spans: Vec<ReportSpan>,
    /// Spans found, before `max_spans_per_source` was applied.
    pub total_spans: usize,
}

/// Final result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub document_id: String,
    /// Content-derived version of the corpus the run was computed against.
    pub corpus_version: u64,
    pub query_tokens: usize,
    pub matched_tokens: usize,
    pub coverage: f64,
    pub similarity: u8,
    pub risk: RiskTier,
    pub self_plagiarism: bool,
    /// Total spans across all sources.
    pub match_count: usize,
    pub sources: Vec<SourceReport>,
}

/// Cut `text[start..end]` and trim it to `max_chars` characters.
///
/// Trims at the last sentence terminator that fits; otherwise cuts at a
/// character boundary and appends `…`.
pub fn excerpt(text: &str, start: usize, end: usize, max_chars: usize) -> String {
    let slice = match text.get(start..end) {
        Some(s) => s.trim(),
        None => return String::new(),
    };
    if slice.chars().count() <= max_chars {
        return slice.to_string();
    }

    let cut = slice
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(slice.len());
    let prefix = &slice[..cut];

    let mut boundary: Option<usize> = None;
    let mut chars = slice.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let after = i + c.len_utf8();
        if after > cut {
            break;
        }
        let terminator = matches!(c, '.' | '!' | '?' | '…' | '。');
        let followed_by_space = chars.peek().map(|&(_, n)| n.is_whitespace()).unwrap_or(true);
        if terminator && followed_by_space {
            boundary = Some(after);
        }
    }

    match boundary {
        Some(b) => prefix[..b].to_string(),
        None => {
            let keep = prefix
                .char_indices()
                .nth(max_chars - 1)
                .map(|(i, _)| i)
                .unwrap_or(prefix.len());
            let mut out = prefix[..keep].trim_end().to_string();
            out.push(ELLIPSIS);
            out
        }
    }
}

/// Build the final report from scored source matches.
///
/// Sources with no matched tokens are dropped. The rest are ranked by
/// similarity, then matched tokens (both descending), then id.
pub fn assemble(
    document_id: &str,
    corpus_version: u64,
    query_text: &str,
    query_tokens: usize,
    overall: &OverallScore,
    mut matches: Vec<SourceMatch>,
    params: &ReportParams,
) -> AnalysisReport {
    matches.retain(|m| m.matched_tokens > 0);
    matches.sort_by(|a, b| {
        b.similarity
            .cmp(&a.similarity)
            .then_with(|| b.matched_tokens.cmp(&a.matched_tokens))
            .then_with(|| a.entry.id.cmp(&b.entry.id))
    });

    let match_count = matches.iter().map(|m| m.spans.len()).sum();
    let sources = matches
        .iter()
        .map(|m| source_report(query_text, m, params))
        .collect();

    AnalysisReport {
        document_id: document_id.to_string(),
        corpus_version,
        query_tokens,
        matched_tokens: overall.matched_tokens,
        coverage: overall.coverage,
        similarity: overall.similarity,
        risk: overall.risk,
        self_plagiarism: overall.self_plagiarism,
        match_count,
        sources,
    }
}

fn source_report(query_text: &str, m: &SourceMatch, params: &ReportParams) -> SourceReport {
    let max_chars = params.max_excerpt_chars;
    let span_excerpts = |s: &MatchSpan| {
        (
            excerpt(query_text, s.query_bytes.0, s.query_bytes.1, max_chars),
            excerpt(&m.text, s.source_bytes.0, s.source_bytes.1, max_chars),
        )
    };

    // Longest span, earliest on ties.
    let longest = m
        .spans
        .iter()
        .fold(None, |best: Option<&MatchSpan>, s| match best {
            Some(b) if b.query_len() >= s.query_len() => Some(b),
            _ => Some(s),
        });
    let (matched_text, original_text) = longest.map(&span_excerpts).unwrap_or_default();

    let limit = params.max_spans_per_source.unwrap_or(usize::MAX);
    let spans = m
        .spans
        .iter()
        .take(limit)
        .map(|s| {
            let (query_excerpt, source_excerpt) = span_excerpts(s);
            ReportSpan {
                query_start: s.query_start,
                query_end: s.query_end,
                source_start: s.source_start,
                source_end: s.source_end,
                exact: s.exact,
                query_excerpt,
                source_excerpt,
            }
        })
        .collect();

    SourceReport {
        id: m.entry.id.clone(),
        title: m.entry.title.clone(),
        origin: m.entry.origin,
        url: m.entry.url.clone(),
        similarity: m.similarity,
        coverage: m.coverage,
        matched_tokens: m.matched_tokens,
        shared_fingerprints: m.shared,
        same_author: m.same_author,
        matched_text,
        original_text,
        spans,
        total_spans: m.spans.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_excerpt_is_verbatim() {
        let text = "Some text here.";
        assert_eq!(excerpt(text, 0, text.len(), 600), "Some text here.");
        assert_eq!(excerpt(text, 5, 9, 600), "text");
    }

    #[test]
    fn long_excerpt_trims_at_sentence() {
        let text = "First sentence. Second sentence goes on and on.";
        assert_eq!(excerpt(text, 0, text.len(), 25), "First sentence.");
    }

    #[test]
    fn decimal_point_is_not_a_boundary() {
        let text = "Rate 3.5 is applied to every single account";
        let out = excerpt(text, 0, text.len(), 12);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), 12);
    }

    #[test]
    fn long_excerpt_without_boundary_gets_ellipsis() {
        let text = "ááááááááááááááááááááá";
        let out = excerpt(text, 0, text.len(), 5);
        assert_eq!(out, "áááá…");
    }

    #[test]
    fn out_of_range_excerpt_is_empty() {
        assert_eq!(excerpt("abc", 2, 10, 600), "");
    }

    #[test]
    fn invalid_params_rejected() {
        let params = ReportParams {
            max_spans_per_source: Some(0),
            max_excerpt_chars: 600,
        };
        assert!(params.validate().is_err());
        assert!(ReportParams::default().validate().is_ok());
    }
}
