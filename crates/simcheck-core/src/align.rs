//! Alignment engine.
//!
//! Refines a candidate into concrete [`MatchSpan`]s by walking the query's
//! shingle sequence and greedily extending runs of matching shingles in
//! the source. A run may skip up to `merge_gap` shingles on either side,
//! which tolerates small edits and inserted citations without breaking
//! the passage in two.
//!
//! Shingle runs are converted to token ranges (`[first, last + k)`), then
//! ranges that overlap or sit within `merge_gap` tokens of each other in
//! both documents, in the same order, are merged. Ranges that overlap in
//! the query but point at different parts of the source stay separate,
//! with the later one clipped to start where the earlier one ends. The
//! result is sorted and non-overlapping in query-token space, and every
//! source range covers only text that was actually aligned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AnalysisError;
use crate::tokenize::TokenStream;

/// Source occurrences examined when opening a new span.
const MAX_START_OCCURRENCES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignParams {
    /// Maximum gap (in shingles while extending, in tokens while merging)
    /// bridged inside one span.
    pub merge_gap: usize,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self { merge_gap: 2 }
    }
}

/// An aligned passage between the query and one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    /// Query token range `[query_start, query_end)`.
    pub query_start: usize,
    pub query_end: usize,
    /// Source token range `[source_start, source_end)`.
    pub source_start: usize,
    pub source_end: usize,
    /// Byte range of the passage in the query text.
    pub query_bytes: (usize, usize),
    /// Byte range of the passage in the source text.
    pub source_bytes: (usize, usize),
    /// Every shingle matched contiguously in both documents.
    pub exact: bool,
}

impl MatchSpan {
    pub fn query_len(&self) -> usize {
        self.query_end - self.query_start
    }
}

/// A span in token space, before byte offsets are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub query_start: usize,
    pub query_end: usize,
    pub source_start: usize,
    pub source_end: usize,
    pub exact: bool,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    q_first: usize,
    q_last: usize,
    s_first: usize,
    s_last: usize,
    exact: bool,
}

impl Run {
    fn into_tokens(self, k: usize) -> TokenSpan {
        TokenSpan {
            query_start: self.q_first,
            query_end: self.q_last + k,
            source_start: self.s_first,
            source_end: self.s_last + k,
            exact: self.exact,
        }
    }
}

/// Number of consecutive equal shingles starting at `q[qi]` / `s[si]`.
fn exact_run(q: &[u64], s: &[u64], qi: usize, si: usize) -> usize {
    q[qi..]
        .iter()
        .zip(&s[si..])
        .take_while(|(a, b)| a == b)
        .count()
}

/// Align two shingle sequences and return merged token spans.
pub fn align_shingles(
    query: &[u64],
    source: &[u64],
    k: usize,
    params: &AlignParams,
) -> Vec<TokenSpan> {
    if query.is_empty() || source.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut occurrences: HashMap<u64, Vec<usize>> = HashMap::new();
    for (pos, &hash) in source.iter().enumerate() {
        occurrences.entry(hash).or_default().push(pos);
    }

    let reach = params.merge_gap + 1;
    let mut runs: Vec<Run> = Vec::new();
    let mut open: Option<Run> = None;

    for (qpos, hash) in query.iter().enumerate() {
        let occ = match occurrences.get(hash) {
            Some(v) => v,
            None => continue,
        };

        if let Some(run) = open.as_mut() {
            if qpos - run.q_last <= reach {
                let next = occ.partition_point(|&s| s <= run.s_last);
                if let Some(&spos) = occ.get(next) {
                    if spos - run.s_last <= reach {
                        if qpos - run.q_last != 1 || spos - run.s_last != 1 {
                            run.exact = false;
                        }
                        run.q_last = qpos;
                        run.s_last = spos;
                        continue;
                    }
                }
            }
        }
        if let Some(run) = open.take() {
            runs.push(run);
        }

        let mut best_start = occ[0];
        let mut best_len = 0usize;
        for &spos in occ.iter().take(MAX_START_OCCURRENCES) {
            let len = exact_run(query, source, qpos, spos);
            if len > best_len {
                best_len = len;
                best_start = spos;
            }
        }
        open = Some(Run {
            q_first: qpos,
            q_last: qpos,
            s_first: best_start,
            s_last: best_start,
            exact: true,
        });
    }
    if let Some(run) = open {
        runs.push(run);
    }

    let spans: Vec<TokenSpan> = runs.into_iter().map(|r| r.into_tokens(k)).collect();
    merge_spans(spans, params.merge_gap)
}

/// Merge spans that continue each other in both documents.
///
/// Two spans merge when the later one starts within `merge_gap` tokens of
/// the earlier one's end in the query and, at or after the earlier one's
/// source start, within `merge_gap` tokens of its source end. A span that
/// overlaps its predecessor in the query without continuing it in the
/// source is clipped to begin at the predecessor's query end, or dropped
/// when nothing is left.
pub fn merge_spans(mut spans: Vec<TokenSpan>, merge_gap: usize) -> Vec<TokenSpan> {
    spans.sort_by_key(|s| (s.query_start, s.query_end));
    let mut merged: Vec<TokenSpan> = Vec::with_capacity(spans.len());
    for mut span in spans {
        if let Some(last) = merged.last_mut() {
            let query_close = span.query_start <= last.query_end + merge_gap;
            let source_close = span.source_start >= last.source_start
                && span.source_start <= last.source_end + merge_gap;
            if query_close && source_close {
                last.query_end = last.query_end.max(span.query_end);
                last.source_end = last.source_end.max(span.source_end);
                last.exact = false;
                continue;
            }
            if span.query_start < last.query_end {
                let cut = last.query_end - span.query_start;
                if span.query_end <= last.query_end || span.source_start + cut >= span.source_end {
                    continue;
                }
                span.query_start += cut;
                span.source_start += cut;
            }
        }
        merged.push(span);
    }
    merged
}

/// Attach byte ranges from both token streams.
pub fn to_match_spans(
    spans: &[TokenSpan],
    query: &TokenStream,
    source: &TokenStream,
) -> Result<Vec<MatchSpan>, AnalysisError> {
    spans
        .iter()
        .map(|s| {
            let query_bytes = query.byte_range(s.query_start, s.query_end).ok_or_else(|| {
                AnalysisError::IndexCorruption {
                    detail: format!(
                        "query span [{}, {}) outside {} tokens",
                        s.query_start,
                        s.query_end,
                        query.len()
                    ),
                }
            })?;
            let source_bytes = source.byte_range(s.source_start, s.source_end).ok_or_else(|| {
                AnalysisError::IndexCorruption {
                    detail: format!(
                        "source span [{}, {}) outside {} tokens",
                        s.source_start,
                        s.source_end,
                        source.len()
                    ),
                }
            })?;
            Ok(MatchSpan {
                query_start: s.query_start,
                query_end: s.query_end,
                source_start: s.source_start,
                source_end: s.source_end,
                query_bytes,
                source_bytes,
                exact: s.exact,
            })
        })
        .collect()
}
