//! Shingling and winnowing.
//!
//! A shingle is a window of `k` consecutive tokens. Shingles are hashed
//! with a Rabin–Karp rolling hash over per-token FNV-1a hashes, so moving
//! the window one token costs O(1) regardless of `k`.
//!
//! Winnowing (window `w ≥ 2`) keeps only the minimum hash of every `w`
//! consecutive shingles. Any match of at least `w + k - 1` tokens is still
//! guaranteed to share a selected fingerprint; shorter matches may be
//! missed. With `w ≤ 1` every shingle is a fingerprint.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::AnalysisError;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;
const ROLLING_BASE: u64 = 911382323;

/// Shingle size and winnowing window for one index build.
///
/// Changing either value changes which fingerprints exist, so an index
/// built with one setting cannot be queried with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShingleParams {
    /// Tokens per shingle.
    pub k: usize,
    /// Winnowing window in shingles; `0` or `1` disables winnowing.
    pub window: usize,
}

impl Default for ShingleParams {
    fn default() -> Self {
        Self { k: 5, window: 0 }
    }
}

impl ShingleParams {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.k == 0 {
            return Err(AnalysisError::InvalidParams(
                "shingle size k must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn winnowing(&self) -> bool {
        self.window > 1
    }

    /// Fingerprints to index (or look up) for a shingle sequence.
    pub fn fingerprints(&self, shingles: &[u64]) -> Vec<(u64, usize)> {
        if self.winnowing() {
            winnow(shingles, self.window)
        } else {
            shingles.iter().copied().enumerate().map(|(i, h)| (h, i)).collect()
        }
    }
}

/// FNV-1a 64 of a token's text.
pub fn token_hash(text: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in text.as_bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Rolling hashes of every `k`-token window: `N - k + 1` values, or none
/// when there are fewer than `k` tokens.
pub fn shingle_hashes(token_hashes: &[u64], k: usize) -> Vec<u64> {
    if k == 0 || token_hashes.len() < k {
        return Vec::new();
    }

    let mut pow = 1u64;
    for _ in 1..k {
        pow = pow.wrapping_mul(ROLLING_BASE);
    }

    let mut hash = 0u64;
    for &t in &token_hashes[..k] {
        hash = hash.wrapping_mul(ROLLING_BASE).wrapping_add(t);
    }

    let mut out = Vec::with_capacity(token_hashes.len() - k + 1);
    out.push(hash);
    for i in 1..=(token_hashes.len() - k) {
        let outgoing = token_hashes[i - 1];
        let incoming = token_hashes[i + k - 1];
        hash = hash
            .wrapping_sub(outgoing.wrapping_mul(pow))
            .wrapping_mul(ROLLING_BASE)
            .wrapping_add(incoming);
        out.push(hash);
    }
    out
}

/// Select the rightmost minimum hash of every `window` consecutive
/// shingles, skipping repeated selections of the same position.
///
/// Sequences shorter than the window yield their single rightmost minimum.
pub fn winnow(shingles: &[u64], window: usize) -> Vec<(u64, usize)> {
    if shingles.is_empty() || window == 0 {
        return Vec::new();
    }
    if shingles.len() < window {
        let mut best = 0usize;
        for (i, &h) in shingles.iter().enumerate() {
            if h <= shingles[best] {
                best = i;
            }
        }
        return vec![(shingles[best], best)];
    }

    let mut out: Vec<(u64, usize)> = Vec::new();
    let mut deque: VecDeque<(usize, u64)> = VecDeque::new();

    for (i, &hash) in shingles.iter().enumerate() {
        while let Some(&(idx, _)) = deque.front() {
            if idx + window <= i {
                deque.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(_, h)) = deque.back() {
            if hash <= h {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back((i, hash));

        if i + 1 >= window {
            if let Some(&(min_idx, min_hash)) = deque.front() {
                if out.last().map(|&(_, idx)| idx) != Some(min_idx) {
                    out.push((min_hash, min_idx));
                }
            }
        }
    }

    out
}
