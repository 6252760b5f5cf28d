// ============================================================
// Layer 4 — Character Atomizer
// ============================================================
// Maps every distinct character of the corpus to a token id and
// back. Ids are assigned in sorted character order, so the same
// corpus text always produces the same vocabulary.
//
//   "int a;" → vocab [' ', ';', 'a', 'i', 'n', 't']
//            → ids   [3, 4, 5, 0, 2, 1]

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};

use crate::domain::error::CacheError;

#[derive(Debug, Clone, PartialEq)]
pub struct Atomizer {
    symbols: Vec<char>,
    index:   HashMap<char, u32>,
}

impl Atomizer {
    /// Build the vocabulary from every character in `text`.
    pub fn from_text(text: &str) -> Self {
        let symbols: Vec<char> = text.chars().collect::<BTreeSet<_>>().into_iter().collect();
        let index = symbols
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i as u32))
            .collect();
        Self { symbols, index }
    }

    pub fn vocab_size(&self) -> usize {
        self.symbols.len()
    }

    pub fn id_of(&self, symbol: char) -> Option<u32> {
        self.index.get(&symbol).copied()
    }

    /// Encode text, failing on the first character outside the vocabulary.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        text.chars()
            .map(|c| {
                self.id_of(c).ok_or_else(|| {
                    CacheError::invalid_request(format!(
                        "symbol {c:?} is not in the corpus vocabulary"
                    ))
                    .into()
                })
            })
            .collect()
    }

    /// Encode a string that must be exactly one symbol.
    pub fn encode_symbol(&self, symbol: &str) -> Result<u32> {
        let mut chars = symbol.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(self.encode(&c.to_string())?[0]),
            _ => Err(CacheError::invalid_request(format!(
                "{symbol:?} is not a single vocabulary symbol"
            ))
            .into()),
        }
    }

    /// Ids outside the vocabulary are skipped.
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter_map(|&id| self.symbols.get(id as usize))
            .collect()
    }
}
