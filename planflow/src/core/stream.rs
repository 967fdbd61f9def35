//! Lazy NDJSON decoding of agent stdout.
//!
//! [`EventStream`] pulls one line at a time from any [`BufRead`] and yields
//! decoded [`Event`]s. Lines that do not decode to a JSON object are skipped
//! and kept as [`DecodeFault`]s for the caller to report; blank lines are
//! skipped without a trace. The stream never aborts on bad input.

use std::io::BufRead;

use serde_json::Value;

use super::event::{Event, excerpt};

/// Characters of the offending line kept in a [`DecodeFault`].
pub const FAULT_EXCERPT_CHARS: usize = 80;

/// A non-blank line that could not be decoded into an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFault {
    /// 1-indexed line number within the stream (blank lines count).
    pub line_number: usize,
    /// Truncated copy of the line content.
    pub excerpt: String,
    pub error: String,
}

/// Iterator over the events of one agent invocation's output.
#[derive(Debug)]
pub struct EventStream<R> {
    reader: R,
    line_number: usize,
    decoded: usize,
    faults: Vec<DecodeFault>,
    read_error: Option<String>,
    finished: bool,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            decoded: 0,
            faults: Vec::new(),
            read_error: None,
            finished: false,
        }
    }

    /// Faults recorded so far, in line order.
    pub fn faults(&self) -> &[DecodeFault] {
        &self.faults
    }

    /// Number of events yielded so far.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Set when the underlying reader failed; the stream ends at that point.
    pub fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let mut buf = Vec::new();
        while !self.finished {
            buf.clear();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    self.line_number += 1;
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match decode_line(line) {
                        Ok(event) => {
                            self.decoded += 1;
                            return Some(event);
                        }
                        Err(error) => self.faults.push(DecodeFault {
                            line_number: self.line_number,
                            excerpt: excerpt(line, FAULT_EXCERPT_CHARS),
                            error,
                        }),
                    }
                }
                Err(err) => {
                    self.read_error = Some(err.to_string());
                    self.finished = true;
                }
            }
        }
        None
    }
}

/// Decode a single trimmed, non-blank line.
pub fn decode_line(line: &str) -> Result<Event, String> {
    let value: Value = serde_json::from_str(line).map_err(|err| err.to_string())?;
    Event::try_from(value)
}
