//! Helpers for exercising the pipeline against a slow or piecewise source.
//! Test-only; not part of the public API.

use std::io::Read;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Create a pipe whose read half implements [`std::io::Read`]: writes on
/// the [`PipeWriter`] become short reads on the [`PipeSource`], and
/// dropping the writer is end-of-stream. Stands in for a console pipe.
pub fn pipe() -> (PipeWriter, PipeSource) {
    let (tx, rx) = channel();
    (PipeWriter { tx }, PipeSource { rx, buffer: Vec::new(), pos: 0 })
}

pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl PipeWriter {
    /// Queue `bytes` for the reader. Panics if the reader is gone, which
    /// in tests means the pipeline died early.
    pub fn write(&self, bytes: &[u8]) {
        self.tx.send(bytes.to_vec()).expect("pipe reader dropped");
    }

    /// Close the stream: the reader sees end-of-input once the queue
    /// drains.
    pub fn close(self) {}
}

pub struct PipeSource {
    rx: Receiver<Vec<u8>>,
    buffer: Vec<u8>,
    pos: usize,
}

impl Read for PipeSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.buffer.len() {
            match self.rx.recv() {
                Ok(bytes) => {
                    self.buffer = bytes;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
            if self.buffer.is_empty() {
                return self.read(buf);
            }
        }
        let n = buf.len().min(self.buffer.len() - self.pos);
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// A source that yields some bytes and then fails, for exercising the
/// fatal-error path.
pub struct FailingSource {
    bytes: Vec<u8>,
    pos: usize,
}

impl FailingSource {
    pub fn new(bytes: &[u8]) -> Self {
        FailingSource { bytes: bytes.to_vec(), pos: 0 }
    }
}

impl Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.bytes.len() {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "source torn down"));
        }
        let n = buf.len().min(self.bytes.len() - self.pos);
        buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
