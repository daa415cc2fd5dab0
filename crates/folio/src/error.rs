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

use std::error::Error as StdError;
use std::fmt::{self, Display};

use crate::types::SubscriptionId;

/// Typed errors returned by the pager pipeline.
#[derive(Debug)]
pub enum Error {
    /// Bad `block_size`, `index_next_bytes`, width or separator.
    InvalidConfiguration(String),
    /// A block id, line index or range beyond what has been read.
    OutOfRange(String),
    /// A malformed block-offset range or `[from, to]` pair.
    InvalidRange(String),
    /// Search query shorter than the minimum of 3 bytes.
    QueryTooShort { length: usize, min: usize },
    /// An operation invoked before its prerequisites (e.g. `watch_lines`
    /// before any `resize_window`), or against a stopped service.
    PreconditionViolated(String),
    /// Cancel of a subscription id that does not exist.
    SubscriptionUnknown(SubscriptionId),
    /// Unrecoverable I/O on the input source.
    Source(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfiguration(s) => write!(f, "invalid configuration: {}", s),
            Error::OutOfRange(s) => write!(f, "out of range: {}", s),
            Error::InvalidRange(s) => write!(f, "invalid range: {}", s),
            Error::QueryTooShort { length, min } => {
                write!(f, "query of {} bytes is shorter than minimum {}", length, min)
            }
            Error::PreconditionViolated(s) => write!(f, "precondition violated: {}", s),
            Error::SubscriptionUnknown(id) => write!(f, "unknown subscription id {}", id),
            Error::Source(e) => write!(f, "source error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Source(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Source(e)
    }
}

impl Error {
    /// Shorthand for the "the owner loop is gone" failure mode shared by
    /// every service handle.
    pub(crate) fn stopped(what: &str) -> Self {
        Error::PreconditionViolated(format!("{} is not running", what))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_the_offending_value() {
        let e = Error::QueryTooShort { length: 2, min: 3 };
        assert_eq!(e.to_string(), "query of 2 bytes is shorter than minimum 3");
        let e = Error::SubscriptionUnknown(7);
        assert!(e.to_string().contains('7'));
    }

    #[test]
    fn io_errors_convert_to_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let e: Error = io.into();
        assert!(matches!(e, Error::Source(_)));
        assert!(e.source().is_some());
    }
}
