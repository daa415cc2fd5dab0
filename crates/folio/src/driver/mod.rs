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

//! The driver: the viewport-facing front of the pipeline.
//!
//! It owns the block reader and at most one wrapper *session* -- a line
//! wrapper bound to one width plus the task feeding it blocks. Resizing
//! tears the session down and builds a new one that first backfills every
//! block the old session had seen (in the same order), then resumes the
//! live block-event stream; line numbering therefore restarts from 0
//! reproducibly. The block-event receiver is owned by whichever session is
//! alive and is handed back when it stops, so no two sessions ever race on
//! the stream.

mod search;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::reader::{BlockReader, ReaderRun};
use crate::types::{BlockEvent, BlockId, Event, SearchStatus, SubscriptionId, WrapEvent};
use crate::wrap::LineWrapper;

/// Queries shorter than this are rejected outright; the trigram index
/// cannot prune them.
pub const MIN_QUERY_LEN: usize = 3;

/// Capacity of the outbound event channel to the consumer.
const EVENT_QUEUE: usize = 16;

/// The viewport: which slice of the line space the consumer is watching.
struct EventFilter {
    sub_id: SubscriptionId,
    done_rx: oneshot::Receiver<()>,
}

/// What a stopped session hands back.
struct SessionEnd {
    /// Highest block id forwarded to the wrapper, whether from backfill or
    /// the live stream. The next session replays `0..=last_block` first.
    last_block: Option<BlockId>,
    /// Whether the block stream already ended. A successor session must
    /// close its wrapper's block input right after backfill, or trailing
    /// unterminated lines would never flush.
    eof: bool,
    events: mpsc::Receiver<std::result::Result<BlockEvent, Error>>,
}

/// A line wrapper bound to one width, plus the feed task keeping it
/// supplied with blocks.
struct WrapSession {
    width: u32,
    wrapper: LineWrapper,
    quit_tx: oneshot::Sender<()>,
    done_rx: oneshot::Receiver<SessionEnd>,
}

impl WrapSession {
    fn start(
        width: u32,
        separator: Vec<u8>,
        reader: BlockReader,
        events: mpsc::Receiver<std::result::Result<BlockEvent, Error>>,
        backfill_to: Option<BlockId>,
        eof: bool,
        total_lines: Arc<AtomicU64>,
    ) -> Result<WrapSession> {
        let (wrapper, run) = LineWrapper::new(width, separator)?;

        let (wrap_tx, mut wrap_rx) = mpsc::unbounded_channel::<WrapEvent>();
        tokio::spawn(async move {
            while let Some(event) = wrap_rx.recv().await {
                total_lines.store(event.total_lines, Ordering::Relaxed);
            }
        });

        let (block_tx, block_rx) = mpsc::channel(1);
        tokio::spawn(run.run(block_rx, Some(wrap_tx)));

        let (quit_tx, quit_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(session_feed(reader, events, backfill_to, eof, block_tx, quit_rx, done_tx));

        Ok(WrapSession { width, wrapper, quit_tx, done_rx })
    }

    /// Tear the session down: stop the feed, stop the wrapper, and recover
    /// the block-event receiver together with the last block id seen.
    async fn stop(self) -> Result<SessionEnd> {
        let _ = self.quit_tx.send(());
        self.wrapper.stop().await;
        self.done_rx.await.map_err(|_| Error::stopped("wrapper session"))
    }
}

/// The session's feed task: backfill already-read blocks, then forward the
/// live stream until end of input or cancellation.
async fn session_feed(
    reader: BlockReader,
    mut events: mpsc::Receiver<std::result::Result<BlockEvent, Error>>,
    backfill_to: Option<BlockId>,
    eof_at_start: bool,
    block_tx: mpsc::Sender<crate::types::Block>,
    mut quit_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<SessionEnd>,
) {
    let mut last_block = backfill_to;
    let mut eof = eof_at_start;
    let mut block_tx = Some(block_tx);

    if let Some(to) = backfill_to {
        log::debug!("backfilling blocks 0..={}", to);
        match reader.get_block_range(0, to).await {
            Ok(blocks) => {
                let tx = block_tx.clone().expect("feed starts with a block sender");
                for block in blocks {
                    // Stay responsive to cancellation between sends; the
                    // block channel is bounded and the wrapper may lag.
                    tokio::select! {
                        _ = &mut quit_rx => {
                            let _ = done_tx.send(SessionEnd { last_block, eof, events });
                            return;
                        }
                        sent = tx.send(block) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => log::error!("backfill to {} failed: {}", to, e),
        }
    }
    if eof_at_start {
        // The stream ended before this session existed; closing the feed
        // right after backfill lets the generator flush its leftover.
        drop(block_tx.take());
    }

    loop {
        tokio::select! {
            _ = &mut quit_rx => break,
            event = events.recv(), if block_tx.is_some() => match event {
                Some(Ok(event)) => {
                    let mut closed = false;
                    if let Some(block) = event.block {
                        last_block = Some(block.id);
                        if let Some(tx) = &block_tx {
                            closed = tx.send(block).await.is_err();
                        }
                    }
                    if event.status.remaining == Some(0) {
                        log::debug!("end of input, closing the block feed");
                        eof = true;
                        closed = true;
                    }
                    if closed {
                        drop(block_tx.take());
                    }
                }
                Some(Err(e)) => {
                    // Fatal source error: the stream is over. The wrapper
                    // keeps serving whatever was wrapped so far.
                    log::error!("block stream failed: {}", e);
                    eof = true;
                    drop(block_tx.take());
                }
                None => {
                    eof = true;
                    drop(block_tx.take());
                }
            },
        }
    }

    drop(block_tx.take());
    let _ = done_tx.send(SessionEnd { last_block, eof, events });
}

/// The pipeline front door. See the module docs for the session model.
pub struct Driver {
    reader: BlockReader,
    reader_run: Option<ReaderRun>,
    separator: Vec<u8>,
    event_tx: Option<mpsc::Sender<Event>>,
    /// Held between `run()` and the first session; afterwards owned by the
    /// live session.
    block_events: Option<mpsc::Receiver<std::result::Result<BlockEvent, Error>>>,
    session: Option<WrapSession>,
    filter: Option<EventFilter>,
    total_lines: Arc<AtomicU64>,
}

impl Driver {
    /// Build a driver over a not-yet-started reader. The returned receiver
    /// is the consumer's event stream; the consumer must keep draining it.
    pub fn new(
        reader: BlockReader,
        reader_run: ReaderRun,
        separator: Vec<u8>,
    ) -> Result<(Driver, mpsc::Receiver<Event>)> {
        if separator.is_empty() {
            return Err(Error::InvalidConfiguration("line separator must be non-empty".into()));
        }
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        Ok((
            Driver {
                reader,
                reader_run: Some(reader_run),
                separator,
                event_tx: Some(event_tx),
                block_events: None,
                session: None,
                filter: None,
                total_lines: Arc::new(AtomicU64::new(0)),
            },
            event_rx,
        ))
    }

    /// Start the block reader. Block events buffer (capacity 1, the reader
    /// waits) until the first `resize_window` creates a session to consume
    /// them.
    pub fn run(&mut self) -> Result<()> {
        let run = self
            .reader_run
            .take()
            .ok_or_else(|| Error::PreconditionViolated("run() was already called".into()))?;
        let (events_tx, events_rx) = mpsc::channel(1);
        tokio::spawn(run.run(events_tx));
        self.block_events = Some(events_rx);
        Ok(())
    }

    /// Rebuild the wrapper for a new width. A no-op when the width is
    /// unchanged; otherwise any active watch is cancelled, the old session
    /// is torn down, and the new one backfills before going live.
    pub async fn resize_window(&mut self, width: u32) -> Result<()> {
        if width == 0 {
            return Err(Error::InvalidConfiguration("width must be positive".into()));
        }
        if self.session.as_ref().map(|s| s.width) == Some(width) {
            return Ok(());
        }
        self.close_filter().await?;

        let (events, backfill_to, eof) = match self.session.take() {
            Some(session) => {
                log::debug!("stopping wrapper session of width {}", session.width);
                let end = session.stop().await?;
                (end.events, end.last_block, end.eof)
            }
            None => {
                let events = self.block_events.take().ok_or_else(|| {
                    Error::PreconditionViolated("resize_window() requires run() first".into())
                })?;
                (events, None, false)
            }
        };
        self.session = Some(WrapSession::start(
            width,
            self.separator.clone(),
            self.reader.clone(),
            events,
            backfill_to,
            eof,
            self.total_lines.clone(),
        )?);
        Ok(())
    }

    /// Watch the viewport `[top, top + height - 1]`. Any previous watch is
    /// cancelled; each line in the window is materialized through the
    /// reader and delivered as [`Event::Line`].
    pub async fn watch_lines(&mut self, top: u32, height: u32) -> Result<()> {
        if height == 0 {
            return Err(Error::InvalidRange("viewport height must be at least 1".into()));
        }
        self.close_filter().await?;
        let session = self.session.as_ref().ok_or_else(|| {
            Error::PreconditionViolated("watch_lines() requires resize_window() first".into())
        })?;
        let event_tx = self
            .event_tx
            .clone()
            .ok_or_else(|| Error::PreconditionViolated("driver is stopped".into()))?;

        let last = top.saturating_add(height - 1);
        // Buffer about a window's worth so the wrapper never stalls on a
        // momentarily busy consumer.
        let capacity = (height as usize).clamp(1, 1024);
        let (sink, mut line_rx) = mpsc::channel(capacity);
        let sub_id = session.wrapper.subscribe_lines(top, Some(last), sink).await?;

        let reader = self.reader.clone();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if line.number < top || line.number > last {
                    continue;
                }
                match reader.get_bytes(line.loc).await {
                    Ok(bytes) => {
                        if event_tx.send(Event::Line { number: line.number, bytes }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::error!("get_bytes({}) failed: {}", line.loc, e),
                }
            }
            let _ = done_tx.send(());
        });
        self.filter = Some(EventFilter { sub_id, done_rx });
        Ok(())
    }

    /// Run a substring search over everything read so far. Progress and
    /// results arrive as [`Event::Search`] on the event stream.
    pub async fn search(&mut self, query: &str) -> Result<()> {
        let session = self.session.as_ref().ok_or_else(|| {
            Error::PreconditionViolated("search() requires resize_window() first".into())
        })?;
        if query.len() < MIN_QUERY_LEN {
            return Err(Error::QueryTooShort { length: query.len(), min: MIN_QUERY_LEN });
        }
        let event_tx = self
            .event_tx
            .clone()
            .ok_or_else(|| Error::PreconditionViolated("driver is stopped".into()))?;

        let reader = self.reader.clone();
        let wrapper = session.wrapper.clone();
        let query = query.to_string();
        tokio::spawn(async move {
            let started = SearchStatus { query: query.clone(), complete: false, results: Vec::new() };
            if event_tx.send(Event::Search(started)).await.is_err() {
                return;
            }
            let results = match search::run_search(&reader, &wrapper, query.as_bytes()).await {
                Ok(results) => results,
                Err(e) => {
                    log::error!("search {:?} failed: {}", query, e);
                    Vec::new()
                }
            };
            let done = SearchStatus { query, complete: true, results };
            let _ = event_tx.send(Event::Search(done)).await;
        });
        Ok(())
    }

    /// The latest total-lines figure reported by the current wrapper
    /// session (0 before any line has been wrapped).
    pub fn total_lines(&self) -> u64 {
        self.total_lines.load(Ordering::Relaxed)
    }

    /// Shut the pipeline down: cancel the watch, stop the wrapper session,
    /// stop the reader, close the outbound event stream.
    pub async fn stop(&mut self) {
        if let Err(e) = self.close_filter().await {
            log::warn!("cancelling the viewport subscription failed: {}", e);
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session.stop().await {
                log::warn!("stopping the wrapper session failed: {}", e);
            }
        }
        self.reader.stop().await;
        self.block_events = None;
        self.event_tx = None;
    }

    async fn close_filter(&mut self) -> Result<()> {
        let Some(filter) = self.filter.take() else {
            return Ok(());
        };
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        session.wrapper.cancel_subscription(filter.sub_id).await?;
        // The drainer sees its sink close and signals back.
        let _ = filter.done_rx.await;
        Ok(())
    }
}
