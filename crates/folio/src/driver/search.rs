//! Search composition: block candidates from the reader, line candidates
//! from the wrapper, literal occurrence scan in display-line coordinates.

use std::collections::HashSet;

use crate::error::Result;
use crate::reader::BlockReader;
use crate::types::{LineOffset, LineOffsetRange, VisibleLine};
use crate::wrap::LineWrapper;

/// Find every occurrence of `query` in the wrapped view of the stream.
///
/// The reader narrows the search to blocks whose indexing window provably
/// contains the query; the wrapper maps those blocks to visible lines. A
/// match that starts in block `b` may run into `b + 1`, so that block's
/// lines join the candidate set too. Occurrences are located in the
/// concatenated line payloads and reported as line/offset ranges.
pub(crate) async fn run_search(
    reader: &BlockReader,
    wrapper: &LineWrapper,
    query: &[u8],
) -> Result<Vec<LineOffsetRange>> {
    let candidates = reader.block_ids_containing(query).await?;
    log::debug!("query matched {} candidate blocks", candidates.len());

    let mut results = Vec::new();
    let mut seen_ranges: HashSet<LineOffsetRange> = HashSet::new();
    for candidate in candidates {
        let mut lines: Vec<VisibleLine> = Vec::new();
        let mut seen_numbers = HashSet::new();
        for block in [candidate.block, candidate.block + 1] {
            for line in wrapper.lines_in_block(block).await? {
                if seen_numbers.insert(line.number) {
                    lines.push(line);
                }
            }
        }
        lines.sort_by_key(|line| line.number);

        let mut payloads = Vec::with_capacity(lines.len());
        for line in &lines {
            payloads.push((line.number, reader.get_bytes(line.loc).await?));
        }

        for found in ranges_for_query(&payloads, query) {
            // The same occurrence can resurface via the next block's
            // candidate; results are deduplicated by value.
            if seen_ranges.insert(found) {
                results.push(found);
            }
        }
    }
    Ok(results)
}

/// Locate every non-overlapping occurrence of `query` in the concatenation
/// of the given line payloads, mapping byte positions back to line/offset
/// coordinates through a parallel per-byte table.
pub(crate) fn ranges_for_query(lines: &[(u32, Vec<u8>)], query: &[u8]) -> Vec<LineOffsetRange> {
    if query.is_empty() {
        return Vec::new();
    }
    let mut combined = Vec::new();
    let mut coords: Vec<LineOffset> = Vec::new();
    for (number, bytes) in lines {
        combined.extend_from_slice(bytes);
        for offset in 0..bytes.len() {
            coords.push(LineOffset { line: *number, offset: offset as u32 });
        }
    }

    let mut found = Vec::new();
    let mut at = 0usize;
    while at + query.len() <= combined.len() {
        if &combined[at..at + query.len()] == query {
            found.push(LineOffsetRange { from: coords[at], to: coords[at + query.len() - 1] });
            at += query.len();
        } else {
            at += 1;
        }
    }
    found
}
