use super::P1Error;
use log::warn;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Longest normal DSMR line is 178 characters including `\r\n`.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 250;

/// Fixed capacity storage for one telegram line including its terminator.
#[derive(Debug)]
pub struct LineBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Replaces the content with `line`, or empties the buffer and fails if
    /// `line` does not fit.
    pub fn fill(&mut self, line: &[u8]) -> Result<(), P1Error> {
        self.data.clear();
        if line.len() > self.capacity {
            return Err(P1Error::LineTooLong { len: line.len(), max: self.capacity });
        }
        self.data.extend_from_slice(line);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, PartialEq)]
pub enum LineEvent {
    /// A complete line including its `\n` (missing only at end of stream)
    Line(Vec<u8>),
    /// A line longer than the limit was dropped; carries its length
    Overflow(usize),
}

/// Splits a byte stream into lines without buffering more than `max_len`
/// bytes per line.
pub struct LineReader<R> {
    inner: R,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self { inner, max_len }
    }

    /// Returns `Ok(None)` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Result<Option<LineEvent>, P1Error> {
        let mut line = Vec::new();
        let mut total = 0;
        let mut overflow = false;

        loop {
            let available = self.inner.fill_buf().await?;

            if available.is_empty() {
                if overflow {
                    return Ok(Some(LineEvent::Overflow(total)));
                }
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(LineEvent::Line(line)));
            }

            let (used, complete) = match available.iter().position(|&c| c == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };

            total += used;
            if !overflow {
                if line.len() + used > self.max_len {
                    overflow = true;
                    line.clear();
                } else {
                    line.extend_from_slice(&available[..used]);
                }
            }
            self.inner.consume(used);

            if complete {
                if overflow {
                    warn!("Dropped a line of {} bytes, the limit is {}", total, self.max_len);
                    return Ok(Some(LineEvent::Overflow(total)));
                }
                return Ok(Some(LineEvent::Line(line)));
            }
        }
    }
}

/// Splits an already received chunk of telegram text into lines.
///
/// The last line gets a `\n` appended if it has none, so a telegram posted
/// without trailing newline still checks out.
pub fn split_lines(payload: &[u8], max_len: usize) -> Vec<LineEvent> {
    let mut events = Vec::new();

    for chunk in payload.split_inclusive(|&c| c == b'\n') {
        let mut line = chunk.to_vec();
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }

        if line.len() > max_len {
            events.push(LineEvent::Overflow(line.len()));
        } else {
            events.push(LineEvent::Line(line));
        }
    }

    events
}
