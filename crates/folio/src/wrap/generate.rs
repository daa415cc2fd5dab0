//! The visible-line generator: a single pass over the block stream that
//! cuts separator-terminated, width-wrapped line spans.
//!
//! Only byte ranges are emitted; payloads stay in the blocks and are
//! fetched on demand. Positions are tracked with an absolute byte cursor
//! and mapped back to `(block, offset)` through a sliding window of the
//! recently seen blocks, so emitted locations are always in-bounds even
//! when a line begins in a previous block's leftover.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::types::{Block, BlockLoc, BlockRange, LineSpan};

/// A recently seen block: id, absolute offset of its first byte, length.
#[derive(Debug, Clone, Copy)]
struct BlockExtent {
    id: u32,
    start: u64,
    len: u64,
}

/// Consume `block_rx` until it closes, sending one [`LineSpan`] per wrapped
/// line to `line_tx`. Returns early if the receiver goes away.
pub(crate) async fn generate_lines(
    separator: Vec<u8>,
    width: u32,
    mut block_rx: mpsc::Receiver<Block>,
    line_tx: mpsc::Sender<LineSpan>,
) {
    let width = width as usize;
    let mut window: VecDeque<BlockExtent> = VecDeque::new();
    let mut next_abs: u64 = 0;
    let mut leftover: Vec<u8> = Vec::new();
    let mut leftover_abs: u64 = 0;

    while let Some(block) = block_rx.recv().await {
        let block_abs = next_abs;
        window.push_back(BlockExtent { id: block.id, start: block_abs, len: block.len() as u64 });
        next_abs += block.len() as u64;

        // Everything before the leftover (or, lacking one, this block) is
        // fully emitted and can be dropped from the window.
        let keep_from = if leftover.is_empty() { block_abs } else { leftover_abs };
        while let Some(front) = window.front() {
            if front.start + front.len <= keep_from {
                window.pop_front();
            } else {
                break;
            }
        }

        let base_abs = if leftover.is_empty() { block_abs } else { leftover_abs };
        let mut combined = std::mem::take(&mut leftover);
        combined.extend_from_slice(&block.bytes);

        let ends_with_sep = combined.ends_with(&separator);
        let mut segments = split_on(&combined, &separator);
        if ends_with_sep {
            // The trailing empty segment after the final separator.
            segments.pop();
        }

        let mut pos = 0usize;
        let total = segments.len();
        for (i, segment) in segments.into_iter().enumerate() {
            let last = i + 1 == total;
            let mut seg_pos = pos;
            let mut seg_len = segment.len();
            while seg_len >= width {
                let span = span_for(
                    &window,
                    base_abs + seg_pos as u64,
                    base_abs + (seg_pos + width - 1) as u64,
                    false,
                );
                if line_tx.send(span).await.is_err() {
                    return;
                }
                seg_pos += width;
                seg_len -= width;
            }
            if !last || ends_with_sep {
                // The remainder plus its separator, possibly empty payload.
                let end = seg_pos + seg_len + separator.len() - 1;
                let span = span_for(
                    &window,
                    base_abs + seg_pos as u64,
                    base_abs + end as u64,
                    true,
                );
                if line_tx.send(span).await.is_err() {
                    return;
                }
                pos = end + 1;
            } else {
                leftover = combined[seg_pos..].to_vec();
                leftover_abs = base_abs + seg_pos as u64;
            }
        }
        if leftover.is_empty() {
            // Nothing carried; remember where the next line would begin.
            leftover_abs = next_abs;
        }
    }

    if !leftover.is_empty() {
        let span = span_for(
            &window,
            leftover_abs,
            leftover_abs + leftover.len() as u64 - 1,
            false,
        );
        let _ = line_tx.send(span).await;
    }
    log::debug!("line generator done at offset {}", next_abs);
}

fn span_for(window: &VecDeque<BlockExtent>, from: u64, to: u64, ends_with_separator: bool) -> LineSpan {
    LineSpan {
        loc: BlockRange { start: loc_for(window, from), end: loc_for(window, to) },
        ends_with_separator,
    }
}

fn loc_for(window: &VecDeque<BlockExtent>, abs: u64) -> BlockLoc {
    for extent in window {
        if abs >= extent.start && abs < extent.start + extent.len {
            return BlockLoc { block: extent.id, offset: (abs - extent.start) as u32 };
        }
    }
    // The generator only asks about offsets inside blocks it has seen.
    unreachable!("absolute offset {} outside the block window", abs)
}

/// Split on every occurrence of `sep`, like the separator-split of a text
/// buffer: `"a\nb"` yields `["a", "b"]`, a trailing separator yields a
/// final empty segment.
fn split_on<'a>(data: &'a [u8], sep: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i + sep.len() <= data.len() {
        if &data[i..i + sep.len()] == sep {
            parts.push(&data[start..i]);
            i += sep.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&data[start..]);
    parts
}
