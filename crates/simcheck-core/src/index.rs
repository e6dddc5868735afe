//! Inverted fingerprint index over the corpus.
//!
//! Maps each fingerprint hash to the ordered postings `(document slot,
//! shingle offset)` where it occurs. Every selected fingerprint of every
//! ingested document appears exactly once. Re-ingesting a document id
//! first removes its previous postings, so ingestion is idempotent.
//!
//! The index is a plain owned value; the app crate wraps it in a lock
//! and decides when it is mutated. Documents are held as `Arc`s so an
//! analysis can keep aligning against a snapshot while the index moves on.
//!
//! The corpus version is derived from content: a wrapping sum of one
//! sha256-based digest per indexed document, mixed with the shingle
//! parameters. Two indexes holding the same documents report the same
//! version no matter how many ingestions and removals led there.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::AnalysisError;
use crate::models::{OriginTag, StoredDocument};
use crate::shingle::{shingle_hashes, ShingleParams};
use crate::tokenize::{tokenize, TokenStream};

/// A tokenized, shingled corpus document ready for the index.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub id: String,
    pub author_id: String,
    pub origin: OriginTag,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Content hash of the body the tokens were computed from.
    pub content_hash: String,
    pub tokens: TokenStream,
    /// Every shingle hash, in token order.
    pub shingles: Vec<u64>,
    /// The `(hash, shingle offset)` pairs selected for indexing.
    pub fingerprints: Vec<(u64, usize)>,
    /// Parameters the shingles were computed with.
    pub params: ShingleParams,
}

impl DocumentEntry {
    /// Digest of everything about this document that can reach a report.
    fn state_digest(&self) -> u64 {
        let mut hasher = Sha256::new();
        for field in [
            self.id.as_str(),
            self.author_id.as_str(),
            self.origin.as_str(),
            self.title.as_deref().unwrap_or(""),
            self.url.as_deref().unwrap_or(""),
            self.content_hash.as_str(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        digest_to_u64(&hasher.finalize())
    }
}

fn digest_to_u64(digest: &[u8]) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

fn params_digest(params: ShingleParams) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update((params.k as u64).to_le_bytes());
    hasher.update((params.window as u64).to_le_bytes());
    digest_to_u64(&hasher.finalize())
}

impl DocumentEntry {
    /// Tokenize and shingle a stored document. Runs without touching the
    /// index so callers can do it outside any lock.
    pub fn prepare(doc: &StoredDocument, params: ShingleParams) -> Result<Self, AnalysisError> {
        params.validate()?;
        let tokens = tokenize(&doc.body);
        if tokens.is_empty() {
            return Err(AnalysisError::EmptyDocument {
                document_id: doc.id.clone(),
            });
        }
        let shingles = shingle_hashes(&tokens.hashes(), params.k);
        let fingerprints = params.fingerprints(&shingles);
        Ok(Self {
            id: doc.id.clone(),
            author_id: doc.author_id.clone(),
            origin: doc.origin,
            title: doc.title.clone(),
            url: doc.url.clone(),
            content_hash: doc.content_hash.clone(),
            tokens,
            shingles,
            fingerprints,
            params,
        })
    }
}

/// Internal handle of an indexed document version.
///
/// Slots are never reused; a re-ingested document gets a fresh slot so
/// postings lists stay sorted by appending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocSlot(u32);

/// One occurrence of a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Posting {
    pub slot: DocSlot,
    /// Shingle offset in the document (equal to its first token index).
    pub offset: u32,
}

/// What an ingestion changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub document_id: String,
    /// A previous version with the same id was replaced.
    pub replaced: bool,
    pub tokens: usize,
    pub shingles: usize,
    pub fingerprints: usize,
    /// Corpus version after the ingestion.
    pub corpus_version: u64,
}

/// Size and composition of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub distinct_fingerprints: usize,
    pub postings: usize,
    pub by_origin: BTreeMap<OriginTag, usize>,
    pub k: usize,
    pub winnow_window: usize,
    pub corpus_version: u64,
}

/// Inverted index from fingerprint hash to postings.
#[derive(Debug)]
pub struct FingerprintIndex {
    params: ShingleParams,
    /// Wrapping sum of the state digests of all indexed documents.
    state_sum: u64,
    next_slot: u32,
    postings: HashMap<u64, Vec<Posting>>,
    entries: HashMap<DocSlot, Arc<DocumentEntry>>,
    slots: HashMap<String, DocSlot>,
}

impl FingerprintIndex {
    pub fn new(params: ShingleParams) -> Result<Self, AnalysisError> {
        params.validate()?;
        Ok(Self {
            params,
            state_sum: 0,
            next_slot: 0,
            postings: HashMap::new(),
            entries: HashMap::new(),
            slots: HashMap::new(),
        })
    }

    pub fn params(&self) -> ShingleParams {
        self.params
    }

    /// Content-derived version of the indexed corpus.
    ///
    /// Unchanged by re-ingesting an identical document; equal across
    /// reopens of the same stored corpus.
    pub fn version(&self) -> u64 {
        self.state_sum.wrapping_add(params_digest(self.params))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.slots.contains_key(document_id)
    }

    /// Add a document, replacing any previous version with the same id.
    pub fn ingest(&mut self, entry: DocumentEntry) -> Result<IngestOutcome, AnalysisError> {
        if entry.params != self.params {
            return Err(AnalysisError::InvalidParams(format!(
                "document {} was shingled with k={} window={}, index uses k={} window={}",
                entry.id, entry.params.k, entry.params.window, self.params.k, self.params.window
            )));
        }

        let slot = DocSlot(self.next_slot);
        let next = self
            .next_slot
            .checked_add(1)
            .ok_or_else(|| AnalysisError::IndexCorruption {
                detail: "document slot space exhausted; rebuild the index".to_string(),
            })?;

        let replaced = self.remove_postings(&entry.id);
        self.next_slot = next;

        for &(hash, offset) in &entry.fingerprints {
            self.postings.entry(hash).or_default().push(Posting {
                slot,
                offset: offset as u32,
            });
        }

        self.state_sum = self.state_sum.wrapping_add(entry.state_digest());
        let document_id = entry.id.clone();
        let tokens = entry.tokens.len();
        let shingles = entry.shingles.len();
        let fingerprints = entry.fingerprints.len();

        self.slots.insert(entry.id.clone(), slot);
        self.entries.insert(slot, Arc::new(entry));
        Ok(IngestOutcome {
            document_id,
            replaced,
            tokens,
            shingles,
            fingerprints,
            corpus_version: self.version(),
        })
    }

    /// Remove a document and all its postings. Returns whether it existed.
    pub fn remove(&mut self, document_id: &str) -> bool {
        self.remove_postings(document_id)
    }

    fn remove_postings(&mut self, document_id: &str) -> bool {
        let slot = match self.slots.remove(document_id) {
            Some(s) => s,
            None => return false,
        };
        if let Some(entry) = self.entries.remove(&slot) {
            self.state_sum = self.state_sum.wrapping_sub(entry.state_digest());
            for &(hash, _) in &entry.fingerprints {
                if let Some(list) = self.postings.get_mut(&hash) {
                    list.retain(|p| p.slot != slot);
                    if list.is_empty() {
                        self.postings.remove(&hash);
                    }
                }
            }
        }
        true
    }

    /// Postings for a fingerprint hash, ordered by `(slot, offset)`.
    pub fn lookup(&self, hash: u64) -> &[Posting] {
        self.postings
            .get(&hash)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entry(&self, slot: DocSlot) -> Option<&Arc<DocumentEntry>> {
        self.entries.get(&slot)
    }

    pub fn entry_by_id(&self, document_id: &str) -> Option<&Arc<DocumentEntry>> {
        self.slots
            .get(document_id)
            .and_then(|slot| self.entries.get(slot))
    }

    /// Ids of all indexed documents, sorted.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every posting as `(hash, document id, offset)`, sorted. Two indexes
    /// holding the same documents produce identical occurrence lists.
    pub fn occurrences(&self) -> Vec<(u64, String, u32)> {
        let mut out: Vec<(u64, String, u32)> = Vec::new();
        for (&hash, list) in &self.postings {
            for p in list {
                let id = self
                    .entries
                    .get(&p.slot)
                    .map(|e| e.id.clone())
                    .unwrap_or_default();
                out.push((hash, id, p.offset));
            }
        }
        out.sort();
        out
    }

    pub fn stats(&self) -> IndexStats {
        let mut by_origin: BTreeMap<OriginTag, usize> = BTreeMap::new();
        for entry in self.entries.values() {
            *by_origin.entry(entry.origin).or_default() += 1;
        }
        IndexStats {
            documents: self.slots.len(),
            distinct_fingerprints: self.postings.len(),
            postings: self.postings.values().map(Vec::len).sum(),
            by_origin,
            k: self.params.k,
            winnow_window: self.params.window,
            corpus_version: self.version(),
        }
    }

    /// Check postings against the documents they reference.
    ///
    /// Recomputes each document's fingerprints from its tokens and checks
    /// every occurrence is posted exactly once, that postings lists are
    /// strictly ordered, and that no posting references a missing slot.
    pub fn verify(&self) -> Result<IndexStats, AnalysisError> {
        let corrupt = |detail: String| AnalysisError::IndexCorruption { detail };

        if self.entries.len() != self.slots.len() {
            return Err(corrupt(format!(
                "{} documents registered but {} entries stored",
                self.slots.len(),
                self.entries.len()
            )));
        }

        for (id, slot) in &self.slots {
            let entry = self
                .entries
                .get(slot)
                .ok_or_else(|| corrupt(format!("document {} has no stored entry", id)))?;
            if &entry.id != id {
                return Err(corrupt(format!(
                    "slot for {} holds document {}",
                    id, entry.id
                )));
            }

            let shingles = shingle_hashes(&entry.tokens.hashes(), self.params.k);
            if shingles != entry.shingles {
                return Err(corrupt(format!("shingles of {} do not match its tokens", id)));
            }
            if self.params.fingerprints(&shingles) != entry.fingerprints {
                return Err(corrupt(format!(
                    "fingerprints of {} do not match its shingles",
                    id
                )));
            }

            for &(hash, offset) in &entry.fingerprints {
                let posting = Posting {
                    slot: *slot,
                    offset: offset as u32,
                };
                if self.lookup(hash).binary_search(&posting).is_err() {
                    return Err(corrupt(format!(
                        "missing posting for {} at offset {}",
                        id, offset
                    )));
                }
            }
        }

        let mut total = 0usize;
        for (hash, list) in &self.postings {
            if list.is_empty() {
                return Err(corrupt(format!("empty postings list for {:016x}", hash)));
            }
            if !list.windows(2).all(|w| w[0] < w[1]) {
                return Err(corrupt(format!(
                    "postings for {:016x} are unordered or duplicated",
                    hash
                )));
            }
            if let Some(p) = list.iter().find(|p| !self.entries.contains_key(&p.slot)) {
                return Err(corrupt(format!(
                    "posting for {:016x} references removed slot {}",
                    hash, p.slot.0
                )));
            }
            total += list.len();
        }

        let expected: usize = self.entries.values().map(|e| e.fingerprints.len()).sum();
        if total != expected {
            return Err(corrupt(format!(
                "{} postings stored but documents select {} fingerprints",
                total, expected
            )));
        }

        Ok(self.stats())
    }
}
