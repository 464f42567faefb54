//! Incremental message deframer.
//!
//! Recovers discrete JSON documents from a stream of arbitrary-sized byte
//! chunks: HTTP body frames, SSE data payloads, or anything else that
//! delivers a message split at unpredictable boundaries. Documents are
//! located by brace/bracket balance tracking that skips quoted-string
//! content and escape sequences, so the same byte sequence yields the same
//! documents no matter how it is chunked. Only object and array documents
//! are valid at the top level; the protocol never puts a bare scalar on the
//! wire.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// Default ceiling for a single message, matching the server's body limit
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1 MiB

/// Observable state of the deframer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeframeState {
    /// No buffered input and nothing ready
    Empty,
    /// A partial message is buffered
    Accumulating,
    /// At least one decoded document is ready via `next()`
    Complete,
    /// A framing failure occurred; the deframer is dead
    Errored,
    /// Input finished cleanly and all documents were consumed
    Ended,
}

/// Framing failures. `Errored` is terminal: the error is sticky and later
/// `feed` calls leave the buffer untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeframeError {
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("malformed message framing: {0}")]
    Malformed(String),

    #[error("input ended with an incomplete message")]
    TruncatedInput,

    #[error("fed after end of input")]
    AfterEnd,
}

#[derive(Debug, Default)]
struct ScanState {
    /// Next buffer offset to examine
    pos: usize,
    /// Offset of the current document's opening bracket, if one was seen
    start: Option<usize>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ScanState {
    fn reset(&mut self) {
        *self = ScanState::default();
    }
}

/// Incremental JSON document deframer
#[derive(Debug)]
pub struct MessageDeframer {
    max_message_size: usize,
    buf: BytesMut,
    scan: ScanState,
    ready: VecDeque<Value>,
    state: DeframeState,
    error: Option<DeframeError>,
    finished: bool,
}

impl Default for MessageDeframer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl MessageDeframer {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            buf: BytesMut::new(),
            scan: ScanState::default(),
            ready: VecDeque::new(),
            state: DeframeState::Empty,
            error: None,
            finished: false,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn state(&self) -> DeframeState {
        self.state
    }

    /// Append a chunk and scan for complete documents
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), DeframeError> {
        if self.state == DeframeState::Errored {
            return Err(self.sticky_error());
        }
        if self.finished {
            return self.fail(DeframeError::AfterEnd);
        }

        self.buf.extend_from_slice(chunk);
        self.scan_buffer()?;
        self.update_state();
        Ok(())
    }

    /// Signal end of input. Dangling partial content is a framing error;
    /// an empty buffer is a clean end.
    pub fn finish(&mut self) -> Result<(), DeframeError> {
        if self.state == DeframeState::Errored {
            return Err(self.sticky_error());
        }
        if self.scan.start.is_some() {
            return self.fail(DeframeError::TruncatedInput);
        }
        self.finished = true;
        self.update_state();
        Ok(())
    }

    /// Pop the oldest complete document, if any
    pub fn next(&mut self) -> Option<Value> {
        let value = self.ready.pop_front();
        self.update_state();
        value
    }

    /// Number of decoded documents waiting to be consumed
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    fn sticky_error(&self) -> DeframeError {
        self.error
            .clone()
            .unwrap_or(DeframeError::Malformed("deframer errored".to_string()))
    }

    fn fail(&mut self, error: DeframeError) -> Result<(), DeframeError> {
        self.state = DeframeState::Errored;
        self.error = Some(error.clone());
        Err(error)
    }

    fn scan_buffer(&mut self) -> Result<(), DeframeError> {
        loop {
            let mut end: Option<usize> = None;

            while self.scan.pos < self.buf.len() {
                let byte = self.buf[self.scan.pos];

                let Some(start) = self.scan.start else {
                    if byte.is_ascii_whitespace() {
                        self.scan.pos += 1;
                        continue;
                    }
                    if byte == b'{' || byte == b'[' {
                        self.scan.start = Some(self.scan.pos);
                        self.scan.depth = 1;
                        self.scan.in_string = false;
                        self.scan.escaped = false;
                        self.scan.pos += 1;
                        continue;
                    }
                    return self.fail(DeframeError::Malformed(format!(
                        "unexpected byte 0x{:02x} between messages",
                        byte
                    )));
                };

                if self.scan.in_string {
                    if self.scan.escaped {
                        self.scan.escaped = false;
                    } else if byte == b'\\' {
                        self.scan.escaped = true;
                    } else if byte == b'"' {
                        self.scan.in_string = false;
                    }
                } else {
                    match byte {
                        b'"' => self.scan.in_string = true,
                        b'{' | b'[' => self.scan.depth += 1,
                        b'}' | b']' => {
                            self.scan.depth -= 1;
                            if self.scan.depth == 0 {
                                end = Some(self.scan.pos + 1);
                            }
                        }
                        _ => {}
                    }
                }
                self.scan.pos += 1;

                if end.is_some() {
                    break;
                }
                if self.scan.pos - start > self.max_message_size {
                    return self.fail(DeframeError::MessageTooLarge {
                        size: self.scan.pos - start,
                        limit: self.max_message_size,
                    });
                }
            }

            let Some(end) = end else {
                // No boundary yet; drop a whitespace-only buffer so idle
                // keepalive padding cannot accumulate
                if self.scan.start.is_none() {
                    self.buf.clear();
                    self.scan.reset();
                }
                return Ok(());
            };

            let start = self.scan.start.take().unwrap_or(0);
            let span = end - start;
            if span > self.max_message_size {
                return self.fail(DeframeError::MessageTooLarge {
                    size: span,
                    limit: self.max_message_size,
                });
            }

            match serde_json::from_slice::<Value>(&self.buf[start..end]) {
                Ok(value) => {
                    trace!(bytes = span, "deframed message");
                    self.ready.push_back(value);
                }
                Err(e) => {
                    return self.fail(DeframeError::Malformed(format!(
                        "invalid JSON document: {}",
                        e
                    )));
                }
            }

            self.buf.advance(end);
            self.scan.reset();
        }
    }

    fn update_state(&mut self) {
        if self.state == DeframeState::Errored {
            return;
        }
        self.state = if !self.ready.is_empty() {
            DeframeState::Complete
        } else if self.finished {
            DeframeState::Ended
        } else if self.scan.start.is_some() {
            DeframeState::Accumulating
        } else {
            DeframeState::Empty
        };
    }
}
