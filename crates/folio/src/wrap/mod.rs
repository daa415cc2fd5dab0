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

//! The line wrapper: numbers the generator's output for one terminal
//! width, maintains the block-to-lines mapping and serves line
//! subscriptions.
//!
//! A wrapper instance is bound to a single width for its whole life; on a
//! window resize the driver tears the instance down and builds a fresh one
//! (see [`crate::driver`]). Line numbers are assigned by the owner loop,
//! never by the generator, so numbering stays monotonic while
//! subscriptions come and go.

mod generate;

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::types::{Block, BlockId, LineSpan, SubscriptionId, VisibleLine, WrapEvent};

/// Capacity of the request channel feeding the owner loop.
const REQUEST_QUEUE: usize = 16;

struct Subscription {
    from: u32,
    /// `None` subscribes to every line from `from` onward.
    to: Option<u32>,
    sink: mpsc::Sender<VisibleLine>,
}

impl Subscription {
    fn wants(&self, number: u32) -> bool {
        number >= self.from && self.to.map_or(true, |to| number <= to)
    }
}

enum Request {
    LineCount { reply: oneshot::Sender<u64> },
    Subscribe {
        from: u32,
        to: Option<u32>,
        sink: mpsc::Sender<VisibleLine>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Cancel { id: SubscriptionId, reply: oneshot::Sender<Result<()>> },
    LinesInBlock { block: BlockId, reply: oneshot::Sender<Vec<VisibleLine>> },
    Stop { reply: oneshot::Sender<()> },
}

/// Cloneable handle to a running line wrapper.
#[derive(Clone)]
pub struct LineWrapper {
    req_tx: mpsc::Sender<Request>,
}

impl LineWrapper {
    /// Validate the configuration and build the handle plus the owner loop
    /// to spawn.
    pub fn new(width: u32, separator: Vec<u8>) -> Result<(LineWrapper, WrapperRun)> {
        if width == 0 {
            return Err(Error::InvalidConfiguration("width must be positive".into()));
        }
        if separator.is_empty() {
            return Err(Error::InvalidConfiguration("line separator must be non-empty".into()));
        }
        let (req_tx, req_rx) = mpsc::channel(REQUEST_QUEUE);
        Ok((LineWrapper { req_tx }, WrapperRun { width, separator, req_rx }))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.req_tx
            .send(make(reply))
            .await
            .map_err(|_| Error::stopped("line wrapper"))?;
        rx.await.map_err(|_| Error::stopped("line wrapper"))
    }

    /// How many lines have been numbered so far.
    pub async fn line_count(&self) -> Result<u64> {
        self.request(|reply| Request::LineCount { reply }).await
    }

    /// Subscribe `sink` to lines numbered `from..=to` (`to = None` for an
    /// unbounded tail). The id is assigned and returned before any already
    /// materialized lines are replayed into the sink, so callers can file
    /// the id away immediately.
    pub async fn subscribe_lines(
        &self,
        from: u32,
        to: Option<u32>,
        sink: mpsc::Sender<VisibleLine>,
    ) -> Result<SubscriptionId> {
        if let Some(to) = to {
            if from > to {
                return Err(Error::InvalidRange(format!(
                    "subscription from {} to {} is unordered",
                    from, to
                )));
            }
        }
        self.request(|reply| Request::Subscribe { from, to, sink, reply }).await
    }

    /// Close the subscription's sink and forget it.
    pub async fn cancel_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.request(|reply| Request::Cancel { id, reply }).await?
    }

    /// The visible lines whose location intersects the given block, in
    /// ascending number order. Empty for blocks with no wrapped lines yet.
    pub async fn lines_in_block(&self, block: BlockId) -> Result<Vec<VisibleLine>> {
        self.request(|reply| Request::LinesInBlock { block, reply }).await
    }

    /// Stop the owner loop and wait for it to exit. The block input channel
    /// must already be closed so the generator can drain.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.req_tx.send(Request::Stop { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// The not-yet-running owner loop of a [`LineWrapper`].
pub struct WrapperRun {
    width: u32,
    separator: Vec<u8>,
    req_rx: mpsc::Receiver<Request>,
}

impl WrapperRun {
    /// Run until `stop` is requested, consuming blocks from `block_rx`.
    /// Every numbered line is reported on `wrap_tx` (when given) as a
    /// [`WrapEvent`] carrying the new total.
    pub async fn run(
        self,
        block_rx: mpsc::Receiver<Block>,
        wrap_tx: Option<mpsc::UnboundedSender<WrapEvent>>,
    ) {
        let WrapperRun { width, separator, mut req_rx } = self;
        let (line_tx, mut line_rx) = mpsc::channel::<LineSpan>(1);
        let generator = tokio::spawn(generate::generate_lines(separator, width, block_rx, line_tx));

        let mut lines: Vec<VisibleLine> = Vec::new();
        let mut block_to_lines: HashMap<BlockId, Vec<u32>> = HashMap::new();
        let mut subs: HashMap<SubscriptionId, Subscription> = HashMap::new();
        let mut next_sub_id: SubscriptionId = 0;
        let mut lines_open = true;

        loop {
            tokio::select! {
                span = line_rx.recv(), if lines_open => match span {
                    Some(span) => {
                        let number = lines.len() as u32;
                        let line = VisibleLine {
                            number,
                            loc: span.loc,
                            ends_with_separator: span.ends_with_separator,
                        };
                        for block in line.loc.blocks() {
                            block_to_lines.entry(block).or_default().push(number);
                        }
                        lines.push(line.clone());

                        let mut gone = Vec::new();
                        for (id, sub) in subs.iter() {
                            if !sub.wants(number) {
                                continue;
                            }
                            if sub.sink.send(line.clone()).await.is_err() {
                                gone.push(*id);
                            }
                        }
                        for id in gone {
                            subs.remove(&id);
                        }
                        if let Some(tx) = &wrap_tx {
                            let _ = tx.send(WrapEvent { total_lines: lines.len() as u64 });
                        }
                    }
                    None => lines_open = false,
                },
                req = req_rx.recv() => match req {
                    Some(Request::LineCount { reply }) => {
                        let _ = reply.send(lines.len() as u64);
                    }
                    Some(Request::Subscribe { from, to, sink, reply }) => {
                        let id = next_sub_id;
                        next_sub_id += 1;
                        // Reply before replaying: the caller may register
                        // the id before consuming the sink.
                        let _ = reply.send(id);
                        let sub = Subscription { from, to, sink };
                        let mut alive = true;
                        for line in lines.iter().skip(from as usize) {
                            if !sub.wants(line.number) {
                                break;
                            }
                            if sub.sink.send(line.clone()).await.is_err() {
                                alive = false;
                                break;
                            }
                        }
                        if alive {
                            subs.insert(id, sub);
                        }
                    }
                    Some(Request::Cancel { id, reply }) => {
                        let result = match subs.remove(&id) {
                            Some(_) => Ok(()),
                            None => Err(Error::SubscriptionUnknown(id)),
                        };
                        let _ = reply.send(result);
                    }
                    Some(Request::LinesInBlock { block, reply }) => {
                        let found = block_to_lines
                            .get(&block)
                            .map(|numbers| {
                                numbers.iter().map(|n| lines[*n as usize].clone()).collect()
                            })
                            .unwrap_or_default();
                        let _ = reply.send(found);
                    }
                    Some(Request::Stop { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    None => break,
                },
            }
        }

        // Drain whatever the generator still has; the block input is closed
        // by contract, so this terminates.
        drop(subs);
        while line_rx.recv().await.is_some() {}
        let _ = generator.await;
        log::debug!("line wrapper loop exiting with {} lines", lines.len());
    }
}
