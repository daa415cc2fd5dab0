// Copyright 2025 Folio Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Packed trigrams and the in-memory inverted index used to prune
//! substring queries down to candidate blocks.
//!
//! The index is a necessary-but-not-sufficient filter: a block surviving
//! [`TrigramIndex::query`] may still not contain the query (trigram
//! co-occurrence is weaker than contiguity), so callers re-verify every
//! candidate with a literal scan. There are no false negatives for queries
//! of length 3 or more that fit the indexing window.

use std::collections::HashMap;
use std::fmt::{self, Display};

use crate::types::BlockId;

/// Minimum query length the index can prune on.
pub const MIN_INDEXED_LEN: usize = 3;

/// Three consecutive bytes packed big-endian into the low 24 bits of a
/// `u32`. The packing is injective and order-preserving, so trigrams can be
/// compared and hashed directly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Trigram(u32);

impl Trigram {
    pub fn new(b0: u8, b1: u8, b2: u8) -> Self {
        Trigram((b0 as u32) << 16 | (b1 as u32) << 8 | b2 as u32)
    }

    pub fn bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }
}

impl fmt::Debug for Trigram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trigram({})", self.bytes().escape_ascii())
    }
}

impl Display for Trigram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bytes().escape_ascii())
    }
}

/// All consecutive 3-byte windows of `text`, in order. Empty for inputs
/// shorter than 3 bytes.
pub fn trigrams(text: &[u8]) -> impl Iterator<Item = Trigram> + '_ {
    text.windows(3).map(|w| Trigram::new(w[0], w[1], w[2]))
}

/// In-memory inverted index from trigram to the sorted set of block ids
/// whose indexing window contains that trigram.
#[derive(Debug, Default)]
pub struct TrigramIndex {
    grams: HashMap<Trigram, Vec<BlockId>>,
    docs_added: u64,
}

impl TrigramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct trigrams currently indexed.
    pub fn gram_count(&self) -> usize {
        self.grams.len()
    }

    /// Number of documents added so far.
    pub fn doc_count(&self) -> u64 {
        self.docs_added
    }

    /// Insert every trigram of `text` into the posting list for `id`.
    /// Posting lists stay sorted and deduplicated.
    pub fn add_with_id(&mut self, text: &[u8], id: BlockId) {
        self.docs_added += 1;
        for gram in trigrams(text) {
            let list = self.grams.entry(gram).or_default();
            match list.binary_search(&id) {
                Ok(_) => {}
                Err(pos) => list.insert(pos, id),
            }
        }
    }

    /// Candidate block ids for a literal query, in ascending order.
    ///
    /// Returns `None` when the query is shorter than three bytes -- the
    /// index cannot help and the caller must fall back to a full scan. If
    /// any trigram of the query is absent from the index the result is
    /// `Some(empty)`: no block can contain the query.
    pub fn query(&self, text: &[u8]) -> Option<Vec<BlockId>> {
        if text.len() < MIN_INDEXED_LEN {
            return None;
        }
        let mut grams: Vec<Trigram> = trigrams(text).collect();
        grams.sort_unstable();
        grams.dedup();

        let mut lists: Vec<&Vec<BlockId>> = Vec::with_capacity(grams.len());
        for gram in &grams {
            match self.grams.get(gram) {
                Some(list) => lists.push(list),
                None => {
                    log::debug!("trigram {} not indexed, query cannot match", gram);
                    return Some(Vec::new());
                }
            }
        }
        // Intersect smallest-first so the working set only shrinks.
        lists.sort_by_key(|l| l.len());
        let mut result: Vec<BlockId> = lists[0].clone();
        for list in &lists[1..] {
            if result.is_empty() {
                break;
            }
            result = intersect_sorted(&result, list);
        }
        Some(result)
    }

    /// Drop trigrams whose posting list covers more than fraction `freq` of
    /// all added documents. A space/selectivity trade-off: near-universal
    /// trigrams prune nothing. Returns how many were removed.
    pub fn remove_trigrams_above_frequency(&mut self, freq: f64) -> usize {
        if self.docs_added == 0 {
            return 0;
        }
        let docs = self.docs_added as f64;
        let before = self.grams.len();
        self.grams.retain(|_, list| (list.len() as f64) / docs <= freq);
        let removed = before - self.grams.len();
        if removed > 0 {
            log::info!("removed {} trigrams with frequency > {:.2}%", removed, freq * 100.0);
        }
        removed
    }
}

fn intersect_sorted(left: &[BlockId], right: &[BlockId]) -> Vec<BlockId> {
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut j = 0usize;
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(left[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
