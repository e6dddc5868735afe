//! Sequential analysis pipeline.
//!
//! Composes the tokenizer, candidate matcher, alignment engine, scorer and
//! report assembler over a [`FingerprintIndex`]. The app crate's engine
//! runs the same steps concurrently with cancellation and a time budget;
//! both share [`prepare_query`], [`align_candidate`] and [`finish`] so
//! their reports are identical.

use serde::{Deserialize, Serialize};

use crate::align::{align_shingles, to_match_spans, AlignParams};
use crate::candidate::{find_candidates, Candidate, MatchParams};
use crate::error::AnalysisError;
use crate::index::FingerprintIndex;
use crate::models::CorpusScope;
use crate::report::{assemble, AnalysisReport, ReportParams};
use crate::score::{score_overall, ScoringPolicy, SourceMatch};
use crate::shingle::{shingle_hashes, ShingleParams};
use crate::tokenize::{tokenize, TokenStream};

/// Every tunable of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub shingle: ShingleParams,
    pub matching: MatchParams,
    pub alignment: AlignParams,
    pub scoring: ScoringPolicy,
    pub report: ReportParams,
}

impl AnalysisParams {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.shingle.validate()?;
        self.matching.validate()?;
        self.scoring.validate()?;
        self.report.validate()?;
        Ok(())
    }
}

/// A tokenized and shingled submission.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub document_id: String,
    pub author_id: String,
    pub text: String,
    pub tokens: TokenStream,
    pub shingles: Vec<u64>,
    pub fingerprints: Vec<(u64, usize)>,
}

/// Tokenize and shingle a submission. Fails with `EmptyDocument` when
/// normalization leaves no tokens.
pub fn prepare_query(
    document_id: &str,
    author_id: &str,
    text: String,
    params: &ShingleParams,
) -> Result<PreparedQuery, AnalysisError> {
    params.validate()?;
    let tokens = tokenize(&text);
    if tokens.is_empty() {
        return Err(AnalysisError::EmptyDocument {
            document_id: document_id.to_string(),
        });
    }
    let shingles = shingle_hashes(&tokens.hashes(), params.k);
    let fingerprints = params.fingerprints(&shingles);
    Ok(PreparedQuery {
        document_id: document_id.to_string(),
        author_id: author_id.to_string(),
        text,
        tokens,
        shingles,
        fingerprints,
    })
}

/// Same as [`prepare_query`] for raw bytes, failing with `Encoding` on
/// invalid UTF-8.
pub fn prepare_query_bytes(
    document_id: &str,
    author_id: &str,
    bytes: Vec<u8>,
    params: &ShingleParams,
) -> Result<PreparedQuery, AnalysisError> {
    let text = String::from_utf8(bytes).map_err(|e| AnalysisError::Encoding {
        document_id: document_id.to_string(),
        offset: e.utf8_error().valid_up_to(),
    })?;
    prepare_query(document_id, author_id, text, params)
}

/// Align one candidate against the query and score it.
pub fn align_candidate(
    query: &PreparedQuery,
    candidate: &Candidate,
    source_text: String,
    params: &AnalysisParams,
) -> Result<SourceMatch, AnalysisError> {
    let spans = align_shingles(
        &query.shingles,
        &candidate.entry.shingles,
        params.shingle.k,
        &params.alignment,
    );
    let spans = to_match_spans(&spans, &query.tokens, &candidate.entry.tokens)?;
    Ok(SourceMatch::new(
        candidate.entry.clone(),
        source_text,
        candidate.shared,
        spans,
        &query.author_id,
        query.tokens.len(),
    ))
}

/// Score the aligned sources and assemble the report.
pub fn finish(
    query: &PreparedQuery,
    corpus_version: u64,
    mut matches: Vec<SourceMatch>,
    params: &AnalysisParams,
) -> AnalysisReport {
    matches.sort_by(|a, b| a.entry.id.cmp(&b.entry.id));
    let overall = score_overall(&matches, query.tokens.len(), &params.scoring);
    assemble(
        &query.document_id,
        corpus_version,
        &query.text,
        query.tokens.len(),
        &overall,
        matches,
        &params.report,
    )
}

/// Run the whole pipeline on the calling thread.
///
/// `source_text` returns the body of a corpus document by id; a candidate
/// whose body is unavailable is skipped.
pub fn analyze<F>(
    index: &FingerprintIndex,
    query: &PreparedQuery,
    scope: &CorpusScope,
    params: &AnalysisParams,
    mut source_text: F,
) -> Result<AnalysisReport, AnalysisError>
where
    F: FnMut(&str) -> Option<String>,
{
    params.validate()?;
    if scope.is_empty() {
        return Err(AnalysisError::InvalidParams(
            "corpus scope must include at least one origin".to_string(),
        ));
    }
    if index.params() != params.shingle {
        return Err(AnalysisError::InvalidParams(
            "index and query use different shingle parameters".to_string(),
        ));
    }

    let candidates = find_candidates(
        index,
        &query.document_id,
        &query.fingerprints,
        scope,
        &params.matching,
    )?;

    let mut matches = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let text = match source_text(&candidate.entry.id) {
            Some(t) => t,
            None => continue,
        };
        matches.push(align_candidate(query, candidate, text, params)?);
    }

    Ok(finish(query, index.version(), matches, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DocumentEntry;
    use crate::models::{OriginTag, RiskTier, StoredDocument};
    use std::collections::HashMap;

    struct Corpus {
        index: FingerprintIndex,
        bodies: HashMap<String, String>,
        params: AnalysisParams,
    }

    impl Corpus {
        fn new(params: AnalysisParams) -> Self {
            Self {
                index: FingerprintIndex::new(params.shingle).unwrap(),
                bodies: HashMap::new(),
                params,
            }
        }

        fn add(&mut self, id: &str, author: &str, origin: OriginTag, body: &str) {
            let doc = StoredDocument {
                id: id.to_string(),
                author_id: author.to_string(),
                origin,
                title: Some(format!("Title of {}", id)),
                url: None,
                body: body.to_string(),
                ingested_at: 0,
                content_hash: String::new(),
            };
            let entry = DocumentEntry::prepare(&doc, self.params.shingle).unwrap();
            self.index.ingest(entry).unwrap();
            self.bodies.insert(id.to_string(), body.to_string());
        }

        fn run(&self, author: &str, text: &str) -> AnalysisReport {
            self.run_scoped(author, text, &CorpusScope::all())
        }

        fn run_scoped(&self, author: &str, text: &str, scope: &CorpusScope) -> AnalysisReport {
            let query = prepare_query("query", author, text.to_string(), &self.params.shingle).unwrap();
            analyze(&self.index, &query, scope, &self.params, |id| {
                self.bodies.get(id).cloned()
            })
            .unwrap()
        }
    }

    fn small_params() -> AnalysisParams {
        AnalysisParams {
            shingle: ShingleParams { k: 2, window: 0 },
            matching: MatchParams {
                min_shared: 1,
                min_ratio: 0.0,
                max_candidates: 50,
            },
            alignment: AlignParams { merge_gap: 0 },
            ..AnalysisParams::default()
        }
    }

    const ESSAY: &str = "Renewable energy adoption depends on storage costs. \
        Battery prices fell sharply over the last decade. \
        Grid operators now schedule solar output with far more confidence. \
        Policy incentives remain uneven across regions.";

    #[test]
    fn half_shared_scenario() {
        let mut corpus = Corpus::new(small_params());
        corpus.add("src", "other", OriginTag::External, "A B C X Y Z");
        let report = corpus.run("me", "A B C D E F");

        assert_eq!(report.sources.len(), 1);
        let source = &report.sources[0];
        assert_eq!(source.spans.len(), 1);
        let span = &source.spans[0];
        assert_eq!((span.query_start, span.query_end), (0, 3));
        assert!(span.exact);
        assert_eq!(span.query_excerpt, "A B C");
        assert_eq!(report.coverage, 0.5);
        assert_eq!(report.similarity, 50);
        assert_eq!(report.risk, RiskTier::High);
        assert!(!report.self_plagiarism);

        let mut lenient = small_params();
        lenient.scoring.medium_max = 50;
        let mut corpus = Corpus::new(lenient);
        corpus.add("src", "other", OriginTag::External, "A B C X Y Z");
        assert_eq!(corpus.run("me", "A B C D E F").risk, RiskTier::Medium);
    }

    #[test]
    fn identical_document_scores_full() {
        let mut corpus = Corpus::new(AnalysisParams::default());
        corpus.add("paper", "someone", OriginTag::Academic, ESSAY);
        let report = corpus.run("student", ESSAY);

        assert_eq!(report.similarity, 100);
        assert_eq!(report.sources.len(), 1);
        let source = &report.sources[0];
        assert_eq!(source.spans.len(), 1);
        assert_eq!(source.spans[0].query_start, 0);
        assert_eq!(source.spans[0].query_end, report.query_tokens);
        // The closing terminator is not part of any token.
        assert_eq!(source.matched_text, ESSAY.trim_end_matches('.'));
        assert_eq!(source.original_text, source.matched_text);
        assert_eq!(source.title.as_deref(), Some("Title of paper"));
    }

    #[test]
    fn empty_query_is_rejected() {
        let err = prepare_query("q", "a", "  ?! ".to_string(), &ShingleParams::default()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::EmptyDocument {
                document_id: "q".to_string()
            }
        );
    }

    #[test]
    fn invalid_bytes_are_rejected() {
        let err = prepare_query_bytes("q", "a", vec![b'o', b'k', 0xC3], &ShingleParams::default())
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Encoding {
                document_id: "q".to_string(),
                offset: 2
            }
        );
    }

    #[test]
    fn shared_author_flags_self_plagiarism() {
        let mut corpus = Corpus::new(small_params());
        corpus.add("old", "me", OriginTag::Internal, "a b c d");
        let report = corpus.run("me", "a b c d e f g h i j");
        assert_eq!(report.similarity, 40);
        assert!(report.sources[0].same_author);
        assert!(report.self_plagiarism);

        let report = corpus.run("someone-else", "a b c d e f g h i j");
        assert!(!report.self_plagiarism);
    }

    #[test]
    fn overlapping_sources_are_not_double_counted() {
        let mut corpus = Corpus::new(small_params());
        corpus.add("s1", "x", OriginTag::External, "a b c d e");
        corpus.add("s2", "y", OriginTag::Academic, "c d e f g");
        let report = corpus.run("me", "a b c d e f g h i j");

        let per_source: usize = report.sources.iter().map(|s| s.matched_tokens).sum();
        assert_eq!(per_source, 10);
        assert_eq!(report.matched_tokens, 7);
        assert!(report.matched_tokens < per_source);
        assert_eq!(report.similarity, 70);
    }

    #[test]
    fn sources_rank_by_similarity_then_id() {
        let mut corpus = Corpus::new(small_params());
        corpus.add("b-small", "x", OriginTag::External, "h i j");
        corpus.add("a-small", "x", OriginTag::External, "h i j");
        corpus.add("z-large", "x", OriginTag::Academic, "a b c d e");
        let report = corpus.run("me", "a b c d e f g h i j");
        let ids: Vec<&str> = report.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["z-large", "a-small", "b-small"]);
    }

    #[test]
    fn scope_limits_sources() {
        let mut corpus = Corpus::new(small_params());
        corpus.add("web", "x", OriginTag::External, "a b c d");
        corpus.add("prior", "x", OriginTag::Internal, "g h i j");
        let report = corpus.run_scoped(
            "me",
            "a b c d e f g h i j",
            &CorpusScope::excluding([OriginTag::Internal]),
        );
        let ids: Vec<&str> = report.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["web"]);
        assert_eq!(report.similarity, 40);
    }

    #[test]
    fn report_is_deterministic() {
        let mut corpus = Corpus::new(small_params());
        corpus.add("s1", "x", OriginTag::External, "a b c d e");
        corpus.add("s2", "y", OriginTag::Academic, "c d e f g");
        let first = serde_json::to_string(&corpus.run("me", "a b c d e f g h")).unwrap();
        let second = serde_json::to_string(&corpus.run("me", "a b c d e f g h")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn adding_matching_text_never_lowers_similarity() {
        let mut corpus = Corpus::new(small_params());
        let query = "a b c d e f g h i j k l";
        corpus.add("s1", "x", OriginTag::External, "a b c");
        let before = corpus.run("me", query).similarity;
        corpus.add("s2", "x", OriginTag::External, "f g h i");
        let middle = corpus.run("me", query).similarity;
        corpus.add("s3", "x", OriginTag::External, "b c d e f");
        let after = corpus.run("me", query).similarity;
        assert!(before <= middle);
        assert!(middle <= after);
    }

    #[test]
    fn unavailable_source_text_is_skipped() {
        let mut corpus = Corpus::new(small_params());
        corpus.add("gone", "x", OriginTag::External, "a b c d");
        let query = prepare_query("q", "me", "a b c d".to_string(), &corpus.params.shingle).unwrap();
        let report = analyze(&corpus.index, &query, &CorpusScope::all(), &corpus.params, |_| None).unwrap();
        assert!(report.sources.is_empty());
        assert_eq!(report.similarity, 0);
        assert_eq!(report.risk, RiskTier::Low);
    }

    #[test]
    fn span_cap_keeps_total_count() {
        let mut params = small_params();
        params.report.max_spans_per_source = Some(1);
        let mut corpus = Corpus::new(params);
        corpus.add("s", "x", OriginTag::External, "a b zz zz zz e f");
        let report = corpus.run("me", "a b c d e f");
        let source = &report.sources[0];
        assert_eq!(source.total_spans, 2);
        assert_eq!(source.spans.len(), 1);
        assert_eq!(report.match_count, 2);
    }

    #[test]
    fn empty_scope_rejected() {
        let corpus = Corpus::new(small_params());
        let query = prepare_query("q", "me", "a b c".to_string(), &corpus.params.shingle).unwrap();
        let err = analyze(
            &corpus.index,
            &query,
            &CorpusScope::only([]),
            &corpus.params,
            |_| None,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidParams(_)));
    }
}
