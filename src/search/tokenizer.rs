//! Dictionary-based word segmentation for the lexical index.
//!
//! jieba handles CJK runs (no whitespace between words) and passes Latin
//! words through, so one tokenizer serves mixed-language corpora. Tokens are
//! lowercased; pure whitespace / punctuation tokens are dropped.

use jieba_rs::Jieba;
use std::sync::Arc;
use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

/// Name the tokenizer is registered under in the tantivy index.
pub const TOKENIZER_NAME: &str = "jieba_lower";

/// Segment `text` into `(byte_from, byte_to, lowercased term)` triples.
pub fn segment(jieba: &Jieba, text: &str) -> Vec<(usize, usize, String)> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    for word in jieba.cut(text, true) {
        let from = offset;
        offset += word.len();
        if !word.chars().any(char::is_alphanumeric) {
            continue;
        }
        out.push((from, offset, word.to_lowercase()));
    }
    out
}

/// Query-side helper: just the terms.
pub fn tokenize(jieba: &Jieba, text: &str) -> Vec<String> {
    segment(jieba, text).into_iter().map(|(_, _, t)| t).collect()
}

#[derive(Clone)]
pub struct JiebaTokenizer {
    jieba: Arc<Jieba>,
}

impl JiebaTokenizer {
    pub fn new(jieba: Arc<Jieba>) -> Self {
        Self { jieba }
    }
}

pub struct JiebaTokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl Tokenizer for JiebaTokenizer {
    type TokenStream<'a> = JiebaTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> JiebaTokenStream {
        let tokens = segment(&self.jieba, text)
            .into_iter()
            .enumerate()
            .map(|(position, (offset_from, offset_to, text))| Token {
                offset_from,
                offset_to,
                position,
                text,
                position_length: 1,
            })
            .collect();
        JiebaTokenStream { tokens, index: 0 }
    }
}

impl TokenStream for JiebaTokenStream {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.index - 1]
    }
}
