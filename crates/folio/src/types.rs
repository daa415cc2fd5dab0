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

//! Shared data model: blocks, block-offset coordinates, visible lines and
//! the events the pipeline emits.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::sync::Arc;

/// Dense block identifier, assigned in source order starting at 0.
pub type BlockId = u32;

/// Identifier of a line subscription on a [`crate::wrap::LineWrapper`].
pub type SubscriptionId = u64;

/// An immutable slice of the input stream. Every block except the last has
/// exactly the configured block size; blocks are produced once and never
/// mutated.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub bytes: Arc<[u8]>,
    /// Number of newline bytes inside `bytes`.
    pub newlines: u32,
}

impl Block {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {{ id {}, {} bytes, {} newlines }}",
            self.id,
            self.bytes.len(),
            self.newlines
        )
    }
}

/// A position in the logical stream: a byte offset inside one block.
///
/// The derived ordering is lexicographic on `(block, offset)`, which is the
/// total order of the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockLoc {
    pub block: BlockId,
    pub offset: u32,
}

impl Display for BlockLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} offset {}", self.block, self.offset)
    }
}

/// A contiguous byte range in the logical stream, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: BlockLoc,
    pub end: BlockLoc,
}

impl BlockRange {
    /// A range is well-formed when `start <= end`. Bounds against the set
    /// of existing blocks are checked by the block reader.
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    /// Block ids the range touches, in ascending order.
    pub fn blocks(&self) -> std::ops::RangeInclusive<BlockId> {
        self.start.block..=self.end.block
    }
}

impl Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.start, self.end)
    }
}

/// Running progress of the read of the input source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStatus {
    pub bytes_read: u64,
    pub newlines: u64,
    pub blocks: u32,
    /// `None` while the total size is unknown (e.g. a pipe); `Some(0)` once
    /// the source has been read completely.
    pub remaining: Option<u64>,
}

impl Display for ReadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read {} bytes, {} newlines, {} blocks, ",
            self.bytes_read, self.newlines, self.blocks
        )?;
        match self.remaining {
            Some(n) => write!(f, "{} remain", n),
            None => write!(f, "unknown remain"),
        }
    }
}

/// Emitted by the block reader after each block, and once more at end of
/// stream. `block` is `None` only for a terminal event whose remainder
/// buffer was empty.
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub block: Option<Block>,
    pub status: ReadStatus,
}

impl Display for BlockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(block) = &self.block {
            write!(f, "{}; ", block)?;
        }
        write!(f, "{}", self.status)
    }
}

/// A wrapped line as produced by the generator, before numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    pub loc: BlockRange,
    pub ends_with_separator: bool,
}

/// A width-wrapped display line. `loc` addresses the underlying bytes,
/// including the separator when `ends_with_separator` is set; the wrapper
/// stores no byte copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleLine {
    /// Dense 0-based number in emission order.
    pub number: u32,
    pub loc: BlockRange,
    /// True when the line was terminated by the separator, false when it
    /// was truncated by width wrapping.
    pub ends_with_separator: bool,
}

impl Display for VisibleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] loc {}, ends with separator {}",
            self.number, self.loc, self.ends_with_separator
        )
    }
}

/// Observed on the wrapper's observer channel after each numbered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapEvent {
    pub total_lines: u64,
}

/// A position in display-line coordinates: a byte offset inside the payload
/// of one visible line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineOffset {
    pub line: u32,
    pub offset: u32,
}

impl Display for LineOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} offset {}", self.line, self.offset)
    }
}

/// An inclusive range in display-line coordinates; how search results are
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineOffsetRange {
    pub from: LineOffset,
    pub to: LineOffset,
}

impl Display for LineOffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {{ {} }} to {{ {} }}", self.from, self.to)
    }
}

/// A verified search candidate: the query occurs in this block's indexing
/// window, first at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMatch {
    pub block: BlockId,
    pub offset: u32,
}

/// Progress or completion of a substring search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStatus {
    pub query: String,
    pub complete: bool,
    pub results: Vec<LineOffsetRange>,
}

impl Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {:?}", self.query)?;
        if self.complete {
            write!(f, " -- complete")?;
        }
        write!(f, "; {} results", self.results.len())?;
        if let Some(first) = self.results.first() {
            write!(f, ", first {}", first)?;
        }
        Ok(())
    }
}

/// What the driver delivers to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A freshly available line in the watched viewport.
    Line { number: u32, bytes: Vec<u8> },
    /// Progress or completion of a search.
    Search(SearchStatus),
}
