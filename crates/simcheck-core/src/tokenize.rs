//! Tokenizer and normalizer.
//!
//! Turns extracted plain text into an ordered stream of normalized word
//! tokens. Each token keeps the byte range it occupied in the original
//! text so aligned spans can be cut back out verbatim for excerpts.
//!
//! # Rules
//!
//! 1. Input must be valid UTF-8 ([`tokenize_bytes`] reports the offset of
//!    the first invalid sequence).
//! 2. A word is a run of characters whose NFKC form contains an
//!    alphanumeric character (combining marks stay attached to the word).
//! 3. Apostrophes between two word characters are dropped and join the
//!    word (`don't` → `dont`); `.` and `,` between two digits join the
//!    number and are kept in it (`3.5` stays `3.5`, distinct from `35`).
//! 4. Words are NFKC-normalized and lowercased.
//! 5. All other punctuation and whitespace only separates words. Sentence
//!    terminators (`.` `!` `?` `…` and compatibility forms) mark the
//!    preceding token with `sentence_end`; they are never tokens.
//!
//! The same input always yields the same stream, which keeps shingle
//! fingerprints reproducible across runs and processes.

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::AnalysisError;
use crate::shingle::token_hash;

/// A normalized word and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// NFKC + lowercase text; apostrophes removed, decimal marks kept.
    pub text: String,
    /// Byte offset of the first character in the original text.
    pub start: usize,
    /// Byte offset one past the last character in the original text.
    pub end: usize,
    /// A sentence terminator follows this token.
    pub sentence_end: bool,
}

/// Ordered tokens of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// Original byte range covered by tokens `[start, end)`.
    ///
    /// Returns `None` for an empty or out-of-range token range.
    pub fn byte_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if start >= end || end > self.tokens.len() {
            return None;
        }
        Some((self.tokens[start].start, self.tokens[end - 1].end))
    }

    /// 64-bit hash of every token, in order.
    pub fn hashes(&self) -> Vec<u64> {
        self.tokens.iter().map(|t| token_hash(&t.text)).collect()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.text.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Apostrophe,
    DecimalMark,
    Terminator,
    Separator,
}

const APOSTROPHES: [char; 4] = ['\'', '\u{2019}', '\u{02BC}', '\u{FF07}'];

fn classify(c: char) -> CharClass {
    if c.is_alphanumeric() || is_combining_mark(c) {
        return CharClass::Word;
    }
    if APOSTROPHES.contains(&c) {
        return CharClass::Apostrophe;
    }
    if c == '.' || c == ',' {
        // '.' is both a terminator and a decimal mark; context decides.
        return CharClass::DecimalMark;
    }
    let normalized: String = std::iter::once(c).nfkc().collect();
    if normalized.chars().any(char::is_alphanumeric) {
        return CharClass::Word;
    }
    if normalized
        .chars()
        .any(|n| matches!(n, '.' | '!' | '?' | '\u{3002}' | '\u{061F}'))
    {
        return CharClass::Terminator;
    }
    CharClass::Separator
}

fn is_digit_like(c: char) -> bool {
    c.is_numeric()
}

/// Tokenize raw bytes, failing with [`AnalysisError::Encoding`] on invalid UTF-8.
pub fn tokenize_bytes(document_id: &str, bytes: &[u8]) -> Result<TokenStream, AnalysisError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(tokenize(text)),
        Err(e) => Err(AnalysisError::Encoding {
            document_id: document_id.to_string(),
            offset: e.valid_up_to(),
        }),
    }
}

/// Tokenize already-decoded text.
pub fn tokenize(text: &str) -> TokenStream {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut word_start: Option<usize> = None;

    for i in 0..chars.len() {
        let (pos, c) = chars[i];
        let class = classify(c);

        if class == CharClass::Word {
            if word_start.is_none() {
                word_start = Some(pos);
            }
            continue;
        }

        if word_start.is_some() && joins_word(&chars, i, class) {
            continue;
        }

        if let Some(start) = word_start.take() {
            push_token(&mut tokens, text, start, pos);
        }

        let terminates = class == CharClass::Terminator || (class == CharClass::DecimalMark && c == '.');
        if terminates {
            if let Some(last) = tokens.last_mut() {
                last.sentence_end = true;
            }
        }
    }

    if let Some(start) = word_start {
        push_token(&mut tokens, text, start, text.len());
    }

    TokenStream { tokens }
}

/// Whether the joiner at `chars[i]` sits inside a word and should be dropped.
fn joins_word(chars: &[(usize, char)], i: usize, class: CharClass) -> bool {
    if i == 0 {
        return false;
    }
    let prev = chars[i - 1].1;
    let next = match chars.get(i + 1) {
        Some(&(_, n)) => n,
        None => return false,
    };
    match class {
        CharClass::Apostrophe => classify(prev) == CharClass::Word && classify(next) == CharClass::Word,
        CharClass::DecimalMark => is_digit_like(prev) && is_digit_like(next),
        _ => false,
    }
}

fn push_token(tokens: &mut Vec<Token>, text: &str, start: usize, end: usize) {
    let folded: Vec<char> = text[start..end]
        .nfkc()
        .flat_map(char::to_lowercase)
        .collect();
    let mut normalized = String::with_capacity(folded.len());
    for (i, &ch) in folded.iter().enumerate() {
        let decimal = (ch == '.' || ch == ',')
            && i > 0
            && is_digit_like(folded[i - 1])
            && folded.get(i + 1).is_some_and(|&n| is_digit_like(n));
        if ch.is_alphanumeric() || is_combining_mark(ch) || decimal {
            normalized.push(ch);
        }
    }
    if normalized.is_empty() {
        return;
    }
    tokens.push(Token {
        text: normalized,
        start,
        end,
        sentence_end: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(stream: &TokenStream) -> Vec<&str> {
        stream.texts().collect()
    }

    #[test]
    fn lowercases_and_strips_punctuation() {
        let stream = tokenize("Hello, World!  The (quick) brown-fox.");
        assert_eq!(
            texts(&stream),
            vec!["hello", "world", "the", "quick", "brown", "fox"]
        );
    }

    #[test]
    fn offsets_point_into_original_text() {
        let text = "  Análise   Económica; do Sector.";
        let stream = tokenize(text);
        assert_eq!(texts(&stream), vec!["análise", "económica", "do", "sector"]);
        for token in stream.tokens() {
            let original = &text[token.start..token.end];
            assert_eq!(original.to_lowercase(), token.text);
        }
        assert_eq!(stream.byte_range(0, 2), Some((2, text.find(';').unwrap())));
    }

    #[test]
    fn nfkc_folds_compatibility_forms() {
        let fullwidth = tokenize("ＡＢＣ ﬁle");
        assert_eq!(texts(&fullwidth), vec!["abc", "file"]);

        let decomposed = tokenize("cafe\u{301}");
        let composed = tokenize("café");
        assert_eq!(texts(&decomposed), texts(&composed));
    }

    #[test]
    fn joiners_inside_words() {
        let stream = tokenize("Don't pay 3.5 or 1,000 — it's 'quoted'.");
        assert_eq!(
            texts(&stream),
            vec!["dont", "pay", "3.5", "or", "1,000", "its", "quoted"]
        );
    }

    #[test]
    fn decimal_marks_keep_numbers_distinct() {
        assert_ne!(tokenize("3.5").hashes(), tokenize("35").hashes());
        assert_ne!(tokenize("1,000").hashes(), tokenize("1000").hashes());
        assert_eq!(texts(&tokenize("v2.0.1 build")), vec!["v2.0.1", "build"]);
        // Marks outside digits still separate words.
        assert_eq!(texts(&tokenize("one,two 3. four")), vec!["one", "two", "3", "four"]);
    }

    #[test]
    fn sentence_terminators_mark_boundaries() {
        let stream = tokenize("First sentence. Second one! Third? no… yes");
        let ends: Vec<bool> = stream.tokens().iter().map(|t| t.sentence_end).collect();
        assert_eq!(
            ends,
            vec![false, true, false, true, true, true, false]
        );
        assert_eq!(stream.len(), 7);
    }

    #[test]
    fn decimal_point_is_not_a_terminator() {
        let stream = tokenize("rate 3.5 percent");
        assert!(stream.tokens().iter().all(|t| !t.sentence_end));
    }

    #[test]
    fn invalid_utf8_reports_offset() {
        let bytes = b"valid prefix \xff\xfe tail";
        let err = tokenize_bytes("doc-1", bytes).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Encoding {
                document_id: "doc-1".to_string(),
                offset: 13
            }
        );
    }

    #[test]
    fn empty_and_punctuation_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ... !!! ,,, ").is_empty());
    }

    #[test]
    fn deterministic_hashes() {
        let text = "The same input always yields the same tokens.";
        assert_eq!(tokenize(text).hashes(), tokenize(text).hashes());
        assert_eq!(tokenize(text), tokenize(text));
    }

    #[test]
    fn byte_range_rejects_empty_ranges() {
        let stream = tokenize("a b c");
        assert_eq!(stream.byte_range(1, 1), None);
        assert_eq!(stream.byte_range(0, 4), None);
        assert_eq!(stream.byte_range(0, 3), Some((0, 5)));
    }
}
