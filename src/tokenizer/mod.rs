//! Whole-word tokenizer over a [`Vocabulary`].
//!
//! This is deliberately naive: lower-case, split on ASCII whitespace runs, look up
//! each word as one token. There is no subword fallback, so any word the table does
//! not contain becomes `<unk>`. The model assets are paired with this exact scheme.

pub mod vocab;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

pub use vocab::{VocabPolicy, Vocabulary, EOS_TOKEN, PAD_TOKEN, UNK_TOKEN};

pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 512;
pub const PAD_ID: i32 = 0;

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\n\x0B\x0C\r]+").expect("whitespace"));

/// Fixed-width id buffer; always exactly `max_len` ids, zero-padded at the tail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSequence {
    ids: Vec<i32>,
    used: usize,
}

impl TokenSequence {
    pub fn ids(&self) -> &[i32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of leading positions filled from the input (the rest is padding).
    pub fn used(&self) -> usize {
        self.used
    }

    /// Serializes ids as 4-byte native-endian integers, the layout the runtime reads.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.ids.len() * 4);
        for id in &self.ids {
            buf.extend_from_slice(&id.to_ne_bytes());
        }
        buf
    }
}

#[derive(Clone, Debug)]
pub struct Tokenizer {
    vocab: Arc<Vocabulary>,
    max_len: usize,
}

impl Tokenizer {
    pub fn new(vocab: Arc<Vocabulary>, max_len: usize) -> Self {
        Self { vocab, max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn tokenize(&self, text: &str) -> TokenSequence {
        let lowered = text.to_lowercase();
        let mut ids = vec![PAD_ID; self.max_len];
        let mut used = 0usize;
        for (slot, word) in ids.iter_mut().zip(split_words(&lowered)) {
            *slot = self.vocab.id_or_unk(word);
            used += 1;
        }
        TokenSequence { ids, used }
    }
}

/// Splits on whitespace runs. A leading separator produces an empty first word,
/// trailing empty words are dropped, and text without any separator (including the
/// empty string) is a single word.
pub fn split_words(text: &str) -> Vec<&str> {
    if !WHITESPACE_RE.is_match(text) {
        return vec![text];
    }
    let mut words: Vec<&str> = WHITESPACE_RE.split(text).collect();
    while words.last().is_some_and(|w| w.is_empty()) {
        words.pop();
    }
    words
}
