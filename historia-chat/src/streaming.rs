//! Incremental decoding of the chat-completions token stream.
//!
//! The body is a sequence of newline-separated lines; meaningful ones look like
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```
//!
//! Transport chunks carry no meaning: a line, or a single UTF-8 character, may
//! be split across any number of them. [`StreamDecoder`] buffers raw bytes and
//! only looks at a line once its `\n` has arrived. `0x0A` never appears inside
//! a multi-byte UTF-8 sequence, so a complete line is always a complete run of
//! characters.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::transport::ByteStream;
use crate::types::{DecodedEvent, WireEvent};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Bytes received but not yet terminated by a newline.
///
/// Consumed lines are only skipped over by `start`; the buffer is compacted
/// once per [`push`](Self::push), so a chunk holding many lines is split in
/// linear time.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
    /// Offset of the first byte not yet returned as part of a line.
    start: usize,
    /// `pending[start..scanned]` is known to contain no newline.
    scanned: usize,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.pending.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.pending.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its terminator.
    fn next_line(&mut self) -> Option<String> {
        let from = self.scanned.max(self.start);
        let Some(offset) = self.pending[from..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.pending.len();
            return None;
        };
        let end = from + offset;
        let line = String::from_utf8_lossy(&self.pending[self.start..end]).into_owned();
        self.start = end + 1;
        self.scanned = self.start;
        Some(line)
    }

    /// Whatever is left once the input has ended.
    fn take_rest(&mut self) -> Option<String> {
        let rest = &self.pending[self.start..];
        let line = (!rest.is_empty()).then(|| String::from_utf8_lossy(rest).into_owned());
        self.pending.clear();
        self.start = 0;
        self.scanned = 0;
        line
    }
}

/// Sans-IO decoder turning arbitrarily split chunks into [`DecodedEvent`]s.
///
/// After the first [`DecodedEvent::Terminator`] or [`DecodedEvent::Error`] the
/// decoder is finished: buffered and future input is ignored.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: LineBuffer,
    finished: bool,
}

impl StreamDecoder {
    /// A fresh decoder with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminator or error has been produced.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one transport chunk and return the events its complete lines yield.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.buffer.push(chunk);
        while let Some(line) = self.buffer.next_line() {
            if self.process_line(&line, &mut events) {
                break;
            }
        }
        events
    }

    /// Signal end of input. A final line without a trailing newline is still
    /// decoded.
    pub fn finish(&mut self) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        if let Some(rest) = self.buffer.take_rest() {
            self.process_line(&rest, &mut events);
        }
        self.finished = true;
        events
    }

    /// Decode one line into `events`. Returns `true` once the stream is over.
    fn process_line(&mut self, line: &str, events: &mut Vec<DecodedEvent>) -> bool {
        for event in decode_line(line) {
            let terminal = matches!(event, DecodedEvent::Terminator | DecodedEvent::Error(_));
            events.push(event);
            if terminal {
                self.finished = true;
                return true;
            }
        }
        false
    }
}

/// Decode a single line. Padding, comments and malformed payloads yield nothing.
fn decode_line(line: &str) -> Vec<DecodedEvent> {
    let line = line.trim();
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return vec![];
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return vec![DecodedEvent::Terminator];
    }

    let event: WireEvent = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, payload_len = payload.len(), "skipping malformed stream line");
            return vec![];
        }
    };

    let mut events = Vec::new();
    let choice = event.choices.as_ref().and_then(|c| c.first());

    let content = choice
        .and_then(|c| c.delta.as_ref())
        .and_then(|d| d.content.as_deref())
        .or(event.content.as_deref());
    if let Some(text) = content
        && !text.is_empty()
    {
        events.push(DecodedEvent::TextDelta(text.to_string()));
    }

    if let Some(error) = &event.error {
        let msg = error
            .message()
            .unwrap_or_else(|| "unknown streaming error".to_string());
        events.push(DecodedEvent::Error(msg));
    } else if choice.and_then(|c| c.finish_reason.as_deref()) == Some("stop") {
        events.push(DecodedEvent::Terminator);
    }

    events
}

/// Drive a [`StreamDecoder`] over `body`, yielding text fragments in order.
///
/// `body` is owned by the returned stream and dropped exactly once: when the
/// stream ends for any reason or when the consumer drops it. Firing `cancel`
/// drops the body and ends the stream without an error item.
pub(crate) fn decode_stream(
    body: ByteStream,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = Result<String, ChatError>> + Send + 'static {
    async_stream::stream! {
        let mut decoder = StreamDecoder::new();
        let mut body = body;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("completion stream cancelled by caller");
                    break;
                }
                chunk = body.next() => chunk,
            };

            let events = match next {
                Some(Ok(chunk)) => decoder.feed(&chunk),
                Some(Err(e)) => {
                    yield Err(e);
                    break;
                }
                None => {
                    tracing::debug!("completion stream ended without terminator");
                    decoder.finish()
                }
            };

            for event in events {
                match event {
                    DecodedEvent::TextDelta(text) => yield Ok(text),
                    DecodedEvent::Terminator => {
                        tracing::debug!("completion stream terminated");
                    }
                    DecodedEvent::Error(msg) => {
                        tracing::debug!(error = %msg, "upstream reported an error mid-stream");
                        yield Err(ChatError::Upstream(msg));
                    }
                }
            }

            if decoder.is_finished() {
                break;
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
