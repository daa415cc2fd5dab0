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

//! Streaming pager core.
//!
//! folio turns a byte source (a file of known size, or an unbounded pipe)
//! into a navigable sequence of width-wrapped display lines while the source
//! is still being read. Four services cooperate, each a single-threaded
//! owner loop connected by channels:
//!
//! - [`reader::BlockReader`] slices the input into fixed-size blocks,
//!   maintains a trigram index over them and answers byte/line/search
//!   queries over whatever has been read so far.
//! - [`trigram::TrigramIndex`] prunes substring queries down to candidate
//!   blocks without scanning the whole stream.
//! - [`wrap::LineWrapper`] converts the block stream into numbered visible
//!   lines for one terminal width and serves line subscriptions.
//! - [`driver::Driver`] ties the above together for a viewport-holding
//!   consumer: it rebuilds the wrapper on resize (backfilling already-read
//!   blocks) and composes index and wrapper results into search answers.

pub mod driver;
pub mod error;
pub mod reader;
pub mod trigram;
pub mod types;
pub mod wrap;

pub use crate::driver::{Driver, MIN_QUERY_LEN};
pub use crate::error::{Error, Result};
pub use crate::reader::{BlockReader, ReaderConfig, ReaderRun};
pub use crate::trigram::{trigrams, Trigram, TrigramIndex};
pub use crate::types::{
    Block, BlockEvent, BlockId, BlockLoc, BlockMatch, BlockRange, Event, LineOffset,
    LineOffsetRange, ReadStatus, SearchStatus, SubscriptionId, VisibleLine,
};
pub use crate::wrap::{LineWrapper, WrapperRun};

/// Convenience for the common case: a driver over a file on disk.
///
/// The file length is stamped into the reader configuration so that read
/// progress can report remaining bytes.
pub fn file_driver(
    path: impl AsRef<std::path::Path>,
    block_size: usize,
    index_next_bytes: usize,
    separator: Vec<u8>,
) -> Result<(Driver, tokio::sync::mpsc::Receiver<Event>)> {
    let file = std::fs::File::open(path.as_ref())?;
    let size = file.metadata()?.len();
    let config =
        ReaderConfig::new(Box::new(file), block_size, index_next_bytes).with_total_size(size);
    let (reader, run) = BlockReader::new(config)?;
    Driver::new(reader, run, separator)
}

#[doc(hidden)]
pub mod test_helpers;
