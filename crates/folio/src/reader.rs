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

//! The block reader: the one component that touches the raw byte source.
//!
//! A dedicated producer thread performs the blocking reads and forwards
//! chunks to a single-threaded owner loop. The owner slices the stream
//! into fixed-size blocks, feeds the trigram index (each block indexed
//! together with the first `index_next_bytes` of its successor so that
//! boundary-straddling substrings stay discoverable), publishes a
//! [`BlockEvent`] per block, and answers random-access queries over
//! everything read so far.

use std::collections::VecDeque;
use std::io::Read;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::trigram::TrigramIndex;
use crate::types::{Block, BlockEvent, BlockId, BlockLoc, BlockMatch, BlockRange, ReadStatus};

/// Capacity of the request channel feeding the owner loop.
const REQUEST_QUEUE: usize = 16;

/// Configuration of a [`BlockReader`].
pub struct ReaderConfig {
    /// The byte source. Reads may be short and may block.
    pub input: Box<dyn Read + Send>,
    /// Total size of the source, when known up front (a regular file).
    pub total_size: Option<u64>,
    /// Size of every block except possibly the last.
    pub block_size: usize,
    /// How many bytes of the following block are appended to a block's
    /// indexing window. Must satisfy `0 < index_next_bytes < block_size`;
    /// queries up to `index_next_bytes + 1` bytes long never lose a match
    /// to a block boundary.
    pub index_next_bytes: usize,
}

impl ReaderConfig {
    pub fn new(input: Box<dyn Read + Send>, block_size: usize, index_next_bytes: usize) -> Self {
        ReaderConfig { input, total_size: None, block_size, index_next_bytes }
    }

    /// Derive the overlap from the longest query the caller wants to
    /// support: a window of `max_query - 1` extra bytes.
    pub fn for_max_query(input: Box<dyn Read + Send>, block_size: usize, max_query: usize) -> Self {
        ReaderConfig::new(input, block_size, max_query.saturating_sub(1))
    }

    pub fn with_total_size(mut self, size: u64) -> Self {
        self.total_size = Some(size);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::InvalidConfiguration("block_size must be positive".into()));
        }
        if self.index_next_bytes == 0 || self.index_next_bytes >= self.block_size {
            return Err(Error::InvalidConfiguration(format!(
                "index_next_bytes {} must be > 0 and < block_size {}",
                self.index_next_bytes, self.block_size
            )));
        }
        Ok(())
    }
}

enum Request {
    GetBlock { id: BlockId, reply: oneshot::Sender<Result<Block>> },
    GetBlockRange { from: BlockId, to: BlockId, reply: oneshot::Sender<Result<Vec<Block>>> },
    GetBytes { range: BlockRange, reply: oneshot::Sender<Result<Vec<u8>>> },
    BlockIdsContaining { query: Vec<u8>, reply: oneshot::Sender<Result<Vec<BlockMatch>>> },
    GetLine { index: u64, reply: oneshot::Sender<Result<BlockRange>> },
    Stop { reply: oneshot::Sender<()> },
}

/// Cloneable handle to a running block reader. All operations are served by
/// the owner loop through a request channel; there is no shared state.
#[derive(Clone)]
pub struct BlockReader {
    req_tx: mpsc::Sender<Request>,
}

impl BlockReader {
    /// Validate `config` and build the handle plus the owner loop to spawn.
    pub fn new(config: ReaderConfig) -> Result<(BlockReader, ReaderRun)> {
        config.validate()?;
        let (req_tx, req_rx) = mpsc::channel(REQUEST_QUEUE);
        Ok((BlockReader { req_tx }, ReaderRun { config, req_rx }))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.req_tx
            .send(make(reply))
            .await
            .map_err(|_| Error::stopped("block reader"))?;
        rx.await.map_err(|_| Error::stopped("block reader"))
    }

    /// The block with the given id, or `OutOfRange`.
    pub async fn get_block(&self, id: BlockId) -> Result<Block> {
        self.request(|reply| Request::GetBlock { id, reply }).await?
    }

    /// Blocks `from..=to`, or `InvalidRange` if unordered or out of bounds.
    pub async fn get_block_range(&self, from: BlockId, to: BlockId) -> Result<Vec<Block>> {
        self.request(|reply| Request::GetBlockRange { from, to, reply }).await?
    }

    /// The concatenated payload of an inclusive block-offset range.
    pub async fn get_bytes(&self, range: BlockRange) -> Result<Vec<u8>> {
        self.request(|reply| Request::GetBytes { range, reply }).await?
    }

    /// Blocks whose indexing window contains `query`, each verified by a
    /// literal scan, with the offset of the first occurrence.
    pub async fn block_ids_containing(&self, query: &[u8]) -> Result<Vec<BlockMatch>> {
        let query = query.to_vec();
        self.request(|reply| Request::BlockIdsContaining { query, reply }).await?
    }

    /// The block-offset range bounding the `index`-th newline-terminated
    /// line of the raw (unwrapped) stream.
    pub async fn get_line(&self, index: u64) -> Result<BlockRange> {
        self.request(|reply| Request::GetLine { index, reply }).await?
    }

    /// Signal shutdown and wait for the owner loop to exit. Stopping an
    /// already-stopped reader is a no-op.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.req_tx.send(Request::Stop { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// The not-yet-running owner loop of a [`BlockReader`].
pub struct ReaderRun {
    config: ReaderConfig,
    req_rx: mpsc::Receiver<Request>,
}

impl ReaderRun {
    /// Run until the source closes and `stop` is requested. Emits one
    /// `Ok(BlockEvent)` per block and a terminal event once the source is
    /// exhausted; a failed read emits one `Err` and aborts the loop.
    pub async fn run(self, events_tx: mpsc::Sender<std::result::Result<BlockEvent, Error>>) {
        let ReaderRun { config, mut req_rx } = self;
        let block_size = config.block_size;
        let next = config.index_next_bytes;

        // Producer thread: blocking reads, forwarded as chunks. A producer
        // stuck in `read` past the owner's exit is released the next time
        // the source yields (its send then fails).
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(1);
        let mut input = config.input;
        std::thread::spawn(move || {
            let mut buf = vec![0u8; block_size + next];
            loop {
                match input.read(&mut buf) {
                    Ok(0) => return,
                    Ok(n) => {
                        if chunk_tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = chunk_tx.blocking_send(Err(e));
                        return;
                    }
                }
            }
        });

        let mut state = ReaderState::new(block_size, next, config.total_size);
        let mut outbox: VecDeque<std::result::Result<BlockEvent, Error>> = VecDeque::new();
        let mut events_open = true;
        let mut source_open = true;
        let mut fatal = false;

        loop {
            tokio::select! {
                // Flush queued events before accepting more input, so the
                // bounded event channel backpressures reading without ever
                // blocking query service.
                permit = events_tx.reserve(), if events_open && !outbox.is_empty() => {
                    match permit {
                        Ok(permit) => {
                            permit.send(outbox.pop_front().expect("outbox checked non-empty"));
                            if fatal && outbox.is_empty() {
                                break;
                            }
                        }
                        Err(_) => {
                            events_open = false;
                            outbox.clear();
                            if fatal {
                                break;
                            }
                        }
                    }
                }
                chunk = chunk_rx.recv(), if source_open && outbox.is_empty() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            let events = state.ingest(&bytes);
                            if events_open {
                                outbox.extend(events.into_iter().map(Ok));
                            }
                        }
                        Some(Err(e)) => {
                            log::error!("source read failed: {}", e);
                            source_open = false;
                            fatal = true;
                            if events_open {
                                outbox.push_back(Err(Error::Source(e)));
                            } else {
                                break;
                            }
                        }
                        None => {
                            source_open = false;
                            let event = state.finish();
                            if events_open {
                                outbox.push_back(Ok(event));
                            }
                        }
                    }
                }
                req = req_rx.recv() => {
                    match req {
                        Some(Request::Stop { reply }) => {
                            let _ = reply.send(());
                            break;
                        }
                        Some(req) => state.handle(req),
                        None => break,
                    }
                }
            }
        }
        log::debug!("block reader loop exiting after {} blocks", state.status.blocks);
    }
}

/// State owned exclusively by the reader loop.
struct ReaderState {
    block_size: usize,
    index_next_bytes: usize,
    blocks: Vec<Block>,
    index: TrigramIndex,
    /// Unassembled tail of the stream.
    pending: Vec<u8>,
    /// Absolute offset of every newline byte seen so far.
    newline_offsets: Vec<u64>,
    status: ReadStatus,
    source_done: bool,
}

impl ReaderState {
    fn new(block_size: usize, index_next_bytes: usize, total_size: Option<u64>) -> Self {
        ReaderState {
            block_size,
            index_next_bytes,
            blocks: Vec::new(),
            index: TrigramIndex::new(),
            pending: Vec::new(),
            newline_offsets: Vec::new(),
            status: ReadStatus { bytes_read: 0, newlines: 0, blocks: 0, remaining: total_size },
            source_done: false,
        }
    }

    /// Append a chunk and slice out every block that is complete enough to
    /// index (its overlap window must be fully present).
    fn ingest(&mut self, bytes: &[u8]) -> Vec<BlockEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while self.pending.len() >= self.block_size + self.index_next_bytes {
            let payload = self.pending[..self.block_size].to_vec();
            let overlap = self.pending[self.block_size..self.block_size + self.index_next_bytes].to_vec();
            self.pending.drain(..self.block_size);
            events.push(self.push_block(payload, &overlap));
        }
        events
    }

    /// End of stream: flush the remainder. The tail may still hold more
    /// than one block's worth (the overlap requirement withheld slicing),
    /// so full blocks are cut first and the short remainder goes last.
    fn finish(&mut self) -> BlockEvent {
        self.source_done = true;
        self.status.remaining = Some(0);
        let mut last = None;
        while self.pending.len() > self.block_size {
            let payload = self.pending[..self.block_size].to_vec();
            let avail = (self.pending.len() - self.block_size).min(self.index_next_bytes);
            let overlap = self.pending[self.block_size..self.block_size + avail].to_vec();
            self.pending.drain(..self.block_size);
            last = Some(self.push_block(payload, &overlap));
        }
        if !self.pending.is_empty() {
            let payload = std::mem::take(&mut self.pending);
            last = Some(self.push_block(payload, &[]));
        }
        // An empty remainder still yields a terminal event so consumers
        // learn the stream is complete.
        last.unwrap_or(BlockEvent { block: None, status: self.status.clone() })
    }

    fn push_block(&mut self, payload: Vec<u8>, overlap: &[u8]) -> BlockEvent {
        let id = self.blocks.len() as BlockId;
        let base = self.status.bytes_read;
        let mut newlines = 0u32;
        for (i, b) in payload.iter().enumerate() {
            if *b == b'\n' {
                newlines += 1;
                self.newline_offsets.push(base + i as u64);
            }
        }

        let mut window = Vec::with_capacity(payload.len() + overlap.len());
        window.extend_from_slice(&payload);
        window.extend_from_slice(overlap);
        self.index.add_with_id(&window, id);

        self.status.bytes_read += payload.len() as u64;
        if let Some(remaining) = &mut self.status.remaining {
            *remaining = remaining.saturating_sub(payload.len() as u64);
        }
        self.status.newlines += newlines as u64;
        self.status.blocks += 1;

        let block = Block { id, bytes: payload.into(), newlines };
        log::debug!("indexed {}", block);
        self.blocks.push(block.clone());
        BlockEvent { block: Some(block), status: self.status.clone() }
    }

    fn handle(&mut self, req: Request) {
        match req {
            Request::GetBlock { id, reply } => {
                let _ = reply.send(self.get_block(id));
            }
            Request::GetBlockRange { from, to, reply } => {
                let _ = reply.send(self.get_block_range(from, to));
            }
            Request::GetBytes { range, reply } => {
                let _ = reply.send(self.get_bytes(range));
            }
            Request::BlockIdsContaining { query, reply } => {
                let _ = reply.send(self.block_ids_containing(&query));
            }
            Request::GetLine { index, reply } => {
                let _ = reply.send(self.get_line(index));
            }
            Request::Stop { .. } => unreachable!("stop handled by the loop"),
        }
    }

    fn get_block(&self, id: BlockId) -> Result<Block> {
        self.blocks
            .get(id as usize)
            .cloned()
            .ok_or_else(|| Error::OutOfRange(format!("invalid block id {}", id)))
    }

    fn get_block_range(&self, from: BlockId, to: BlockId) -> Result<Vec<Block>> {
        if from > to {
            return Err(Error::InvalidRange(format!("block range {}..{} is unordered", from, to)));
        }
        if (to as usize) >= self.blocks.len() {
            return Err(Error::InvalidRange(format!(
                "block range {}..{} exceeds {} blocks",
                from,
                to,
                self.blocks.len()
            )));
        }
        Ok(self.blocks[from as usize..=to as usize].to_vec())
    }

    fn get_bytes(&self, range: BlockRange) -> Result<Vec<u8>> {
        if !range.is_ordered() {
            return Err(Error::InvalidRange(format!("{} is unordered", range)));
        }
        if (range.end.block as usize) >= self.blocks.len() {
            return Err(Error::OutOfRange(format!(
                "{} ends past the {} blocks read so far",
                range,
                self.blocks.len()
            )));
        }
        let mut out = Vec::new();
        for id in range.blocks() {
            let block = &self.blocks[id as usize];
            let from = if id == range.start.block { range.start.offset as usize } else { 0 };
            let to = if id == range.end.block {
                range.end.offset as usize
            } else {
                block.len() - 1
            };
            if from >= block.len() || to >= block.len() {
                return Err(Error::InvalidRange(format!(
                    "{} addresses outside block {} of {} bytes",
                    range,
                    id,
                    block.len()
                )));
            }
            out.extend_from_slice(&block.bytes[from..=to]);
        }
        Ok(out)
    }

    /// The index narrows the search to candidate blocks; every candidate is
    /// then re-verified by scanning its bytes together with the overlap
    /// that was indexed with it.
    fn block_ids_containing(&self, query: &[u8]) -> Result<Vec<BlockMatch>> {
        if query.is_empty() {
            return Err(Error::InvalidRange("empty query".into()));
        }
        let candidates = match self.index.query(query) {
            Some(ids) => ids,
            // Too short for the index: scan everything.
            None => (0..self.blocks.len() as BlockId).collect(),
        };
        let mut matches = Vec::new();
        for id in candidates {
            let block = &self.blocks[id as usize];
            let mut window = Vec::with_capacity(block.len() + self.index_next_bytes);
            window.extend_from_slice(&block.bytes);
            window.extend_from_slice(self.overlap_after(id));
            if let Some(offset) = find(&window, query) {
                matches.push(BlockMatch { block: id, offset: offset as u32 });
            }
        }
        Ok(matches)
    }

    /// The bytes that followed block `id` in its indexing window: the next
    /// block's prefix, or -- for the newest block -- the unassembled tail.
    fn overlap_after(&self, id: BlockId) -> &[u8] {
        let next = id as usize + 1;
        if next < self.blocks.len() {
            let block = &self.blocks[next];
            &block.bytes[..self.index_next_bytes.min(block.len())]
        } else {
            &self.pending[..self.index_next_bytes.min(self.pending.len())]
        }
    }

    fn get_line(&self, index: u64) -> Result<BlockRange> {
        let terminated = self.newline_offsets.len() as u64;
        if index < terminated {
            let start = if index == 0 { 0 } else { self.newline_offsets[index as usize - 1] + 1 };
            let end = self.newline_offsets[index as usize];
            return Ok(self.abs_range(start, end));
        }
        // After EOF, an unterminated tail counts as one final line.
        if self.source_done && index == terminated {
            let start = self.newline_offsets.last().map(|o| o + 1).unwrap_or(0);
            if start < self.status.bytes_read {
                return Ok(self.abs_range(start, self.status.bytes_read - 1));
            }
        }
        Err(Error::OutOfRange(format!(
            "line {} not available ({} lines read)",
            index, terminated
        )))
    }

    /// Blocks are uniform except the last, so absolute offsets map to
    /// block-offset coordinates by division.
    fn abs_loc(&self, abs: u64) -> BlockLoc {
        BlockLoc {
            block: (abs / self.block_size as u64) as BlockId,
            offset: (abs % self.block_size as u64) as u32,
        }
    }

    fn abs_range(&self, start: u64, end: u64) -> BlockRange {
        BlockRange { start: self.abs_loc(start), end: self.abs_loc(end) }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
