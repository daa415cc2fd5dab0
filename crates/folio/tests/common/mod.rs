//! Shared builders and assertions for the integration tests.
#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;

use tokio::sync::mpsc;

use folio::{Block, BlockReader, Driver, Event, ReaderConfig, ReaderRun};

/// A reader over an in-memory buffer of known size.
pub fn reader_pair(input: &[u8], block_size: usize, n: usize) -> (BlockReader, ReaderRun) {
    let config = ReaderConfig::new(Box::new(Cursor::new(input.to_vec())), block_size, n)
        .with_total_size(input.len() as u64);
    BlockReader::new(config).expect("valid reader config")
}

/// A driver over an in-memory buffer, newline-separated.
pub fn driver_for(input: &[u8], block_size: usize, n: usize) -> (Driver, mpsc::Receiver<Event>) {
    let (reader, run) = reader_pair(input, block_size, n);
    Driver::new(reader, run, b"\n".to_vec()).expect("valid driver config")
}

/// Wait for `count` line events, ignoring search events on the way.
pub async fn collect_lines(events: &mut mpsc::Receiver<Event>, count: usize) -> Vec<String> {
    let mut got = Vec::new();
    while got.len() < count {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(Event::Line { bytes, .. })) => {
                got.push(String::from_utf8_lossy(&bytes).into_owned());
            }
            Ok(Some(_)) => {}
            Ok(None) => panic!("event stream closed after {} of {} lines", got.len(), count),
            Err(_) => panic!("timed out waiting for line {} of {}", got.len(), count),
        }
    }
    got
}

/// Like `collect_lines` but also returning the line numbers.
pub async fn collect_numbered(
    events: &mut mpsc::Receiver<Event>,
    count: usize,
) -> Vec<(u32, String)> {
    let mut got = Vec::new();
    while got.len() < count {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(Event::Line { number, bytes })) => {
                got.push((number, String::from_utf8_lossy(&bytes).into_owned()));
            }
            Ok(Some(_)) => {}
            Ok(None) => panic!("event stream closed after {} of {} lines", got.len(), count),
            Err(_) => panic!("timed out waiting for line {} of {}", got.len(), count),
        }
    }
    got
}

/// Wait for the next terminal search status.
pub async fn wait_search_complete(events: &mut mpsc::Receiver<Event>) -> folio::SearchStatus {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(Event::Search(status))) if status.complete => return status,
            Ok(Some(_)) => {}
            Ok(None) => panic!("event stream closed while waiting for search"),
            Err(_) => panic!("timed out waiting for search completion"),
        }
    }
}

/// Give the pipeline a beat, then assert nothing is queued for delivery.
pub async fn assert_no_events(events: &mut mpsc::Receiver<Event>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(event) = events.try_recv() {
        panic!("expected no queued events, got {:?}", event);
    }
}

/// Block the test until the wrapped total stabilizes at `expected`.
pub async fn wait_total_lines(driver: &Driver, expected: u64) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if driver.total_lines() == expected {
            return;
        }
        if std::time::Instant::now() > deadline {
            panic!("total_lines stuck at {} (want {})", driver.total_lines(), expected);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Build a block by hand for wrapper-level tests.
pub fn block(id: u32, bytes: &[u8]) -> Block {
    let newlines = bytes.iter().filter(|b| **b == b'\n').count() as u32;
    Block { id, bytes: bytes.into(), newlines }
}

/// Straight-line reference implementation of separator splitting plus
/// width wrapping, used as the oracle for round-trip properties.
pub fn reference_wrap(input: &[u8], width: usize, sep: &[u8]) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut wrap_segment = |seg: &[u8], terminated: bool| {
        let mut rest = seg;
        while rest.len() >= width {
            lines.push(rest[..width].to_vec());
            rest = &rest[width..];
        }
        if terminated {
            let mut line = rest.to_vec();
            line.extend_from_slice(sep);
            lines.push(line);
        } else if !rest.is_empty() {
            lines.push(rest.to_vec());
        }
    };

    let mut start = 0usize;
    let mut i = 0usize;
    while i + sep.len() <= input.len() {
        if &input[i..i + sep.len()] == sep {
            wrap_segment(&input[start..i], true);
            i += sep.len();
            start = i;
        } else {
            i += 1;
        }
    }
    wrap_segment(&input[start..], false);
    lines
}
