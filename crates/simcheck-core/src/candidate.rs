//! Candidate matcher.
//!
//! Tallies, per corpus document, how many distinct query fingerprints it
//! shares with the query and keeps the documents that clear both the
//! absolute and the relative threshold. Only candidates go on to the
//! (much more expensive) alignment step.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::AnalysisError;
use crate::index::{DocSlot, DocumentEntry, FingerprintIndex};
use crate::models::CorpusScope;

/// Thresholds for promoting a corpus document to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Minimum number of shared fingerprints.
    pub min_shared: usize,
    /// Minimum shared fingerprints as a fraction of the query's fingerprints.
    pub min_ratio: f64,
    /// At most this many candidates are aligned.
    pub max_candidates: usize,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            min_shared: 4,
            min_ratio: 0.01,
            max_candidates: 50,
        }
    }
}

impl MatchParams {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(0.0..=1.0).contains(&self.min_ratio) {
            return Err(AnalysisError::InvalidParams(format!(
                "min_shared_ratio must be within 0..=1, got {}",
                self.min_ratio
            )));
        }
        if self.max_candidates == 0 {
            return Err(AnalysisError::InvalidParams(
                "max_candidates must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A corpus document worth aligning, with its shared fingerprint count.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entry: Arc<DocumentEntry>,
    pub shared: usize,
}

/// Find candidate sources for a query's fingerprints.
///
/// Documents outside `scope` and the document with id `query_id` are
/// ignored. Results are ranked by shared count descending, then id
/// ascending, and truncated to `max_candidates`.
pub fn find_candidates(
    index: &FingerprintIndex,
    query_id: &str,
    query_fingerprints: &[(u64, usize)],
    scope: &CorpusScope,
    params: &MatchParams,
) -> Result<Vec<Candidate>, AnalysisError> {
    let distinct: HashSet<u64> = query_fingerprints.iter().map(|&(h, _)| h).collect();
    if distinct.is_empty() {
        return Ok(Vec::new());
    }

    let mut tally: HashMap<DocSlot, usize> = HashMap::new();
    for hash in &distinct {
        let mut last: Option<DocSlot> = None;
        // Postings are ordered by slot, so repeats of one document are adjacent.
        for posting in index.lookup(*hash) {
            if last == Some(posting.slot) {
                continue;
            }
            last = Some(posting.slot);
            *tally.entry(posting.slot).or_default() += 1;
        }
    }

    let threshold = params.min_ratio * distinct.len() as f64;
    let mut candidates: Vec<Candidate> = Vec::new();
    for (slot, shared) in tally {
        let entry = index
            .entry(slot)
            .ok_or_else(|| AnalysisError::IndexCorruption {
                detail: format!("posting references missing document slot {:?}", slot),
            })?;
        if entry.id == query_id || !scope.includes(entry.origin) {
            continue;
        }
        if shared < params.min_shared || (shared as f64) < threshold {
            continue;
        }
        candidates.push(Candidate {
            entry: Arc::clone(entry),
            shared,
        });
    }

    candidates.sort_by(|a, b| {
        b.shared
            .cmp(&a.shared)
            .then_with(|| a.entry.id.cmp(&b.entry.id))
    });
    candidates.truncate(params.max_candidates);
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OriginTag, StoredDocument};
    use crate::shingle::ShingleParams;

    fn add(index: &mut FingerprintIndex, id: &str, origin: OriginTag, body: &str) {
        let doc = StoredDocument {
            id: id.to_string(),
            author_id: "a".to_string(),
            origin,
            title: None,
            url: None,
            body: body.to_string(),
            ingested_at: 0,
            content_hash: String::new(),
        };
        let entry = DocumentEntry::prepare(&doc, index.params()).unwrap();
        index.ingest(entry).unwrap();
    }

    fn query(index: &FingerprintIndex, body: &str) -> Vec<(u64, usize)> {
        let doc = StoredDocument {
            id: "q".to_string(),
            author_id: "a".to_string(),
            origin: OriginTag::Internal,
            title: None,
            url: None,
            body: body.to_string(),
            ingested_at: 0,
            content_hash: String::new(),
        };
        DocumentEntry::prepare(&doc, index.params()).unwrap().fingerprints
    }

    fn loose() -> MatchParams {
        MatchParams {
            min_shared: 1,
            min_ratio: 0.0,
            max_candidates: 10,
        }
    }

    #[test]
    fn ranks_by_shared_then_id() {
        let mut index = FingerprintIndex::new(ShingleParams { k: 2, window: 0 }).unwrap();
        add(&mut index, "b", OriginTag::External, "one two three four");
        add(&mut index, "a", OriginTag::External, "one two three four");
        add(&mut index, "c", OriginTag::Academic, "one two nine ten");
        let fps = query(&index, "one two three four five");

        let found = find_candidates(&index, "q", &fps, &CorpusScope::all(), &loose()).unwrap();
        let ids: Vec<(&str, usize)> = found.iter().map(|c| (c.entry.id.as_str(), c.shared)).collect();
        assert_eq!(ids, vec![("a", 3), ("b", 3), ("c", 1)]);
    }

    #[test]
    fn repeated_source_occurrences_count_once() {
        let mut index = FingerprintIndex::new(ShingleParams { k: 2, window: 0 }).unwrap();
        add(&mut index, "rep", OriginTag::External, "x y x y x y x y");
        let fps = query(&index, "x y");
        let found = find_candidates(&index, "q", &fps, &CorpusScope::all(), &loose()).unwrap();
        assert_eq!(found[0].shared, 1);
    }

    #[test]
    fn thresholds_filter() {
        let mut index = FingerprintIndex::new(ShingleParams { k: 2, window: 0 }).unwrap();
        add(&mut index, "weak", OriginTag::External, "one two");
        add(&mut index, "strong", OriginTag::External, "one two three four five six");
        let fps = query(&index, "one two three four five six");

        let params = MatchParams {
            min_shared: 2,
            ..loose()
        };
        let found = find_candidates(&index, "q", &fps, &CorpusScope::all(), &params).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entry.id, "strong");

        let params = MatchParams {
            min_shared: 1,
            min_ratio: 0.5,
            max_candidates: 10,
        };
        let found = find_candidates(&index, "q", &fps, &CorpusScope::all(), &params).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn scope_and_self_are_excluded() {
        let mut index = FingerprintIndex::new(ShingleParams { k: 2, window: 0 }).unwrap();
        add(&mut index, "q", OriginTag::Internal, "alpha beta gamma");
        add(&mut index, "prior", OriginTag::Internal, "alpha beta gamma");
        add(&mut index, "web", OriginTag::External, "alpha beta gamma");
        let fps = query(&index, "alpha beta gamma");

        let scope = CorpusScope::only([OriginTag::External]);
        let found = find_candidates(&index, "q", &fps, &scope, &loose()).unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["web"]);

        let found = find_candidates(&index, "q", &fps, &CorpusScope::all(), &loose()).unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["prior", "web"]);
    }

    #[test]
    fn truncates_to_max_candidates() {
        let mut index = FingerprintIndex::new(ShingleParams { k: 2, window: 0 }).unwrap();
        for i in 0..5 {
            add(&mut index, &format!("d{}", i), OriginTag::Academic, "red green blue");
        }
        let fps = query(&index, "red green blue");
        let params = MatchParams {
            max_candidates: 2,
            ..loose()
        };
        let found = find_candidates(&index, "q", &fps, &CorpusScope::all(), &params).unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d1"]);
    }

    #[test]
    fn invalid_ratio_rejected() {
        let params = MatchParams {
            min_ratio: 1.5,
            ..MatchParams::default()
        };
        assert!(params.validate().is_err());
    }
}
