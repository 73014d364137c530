//! Stream normalization shared by every adapter.
//!
//! Backends answer with SSE, JSON lines or a single JSON body.  This module
//! turns a streamed body into payloads, one per SSE event or JSON line, and
//! wraps each
//! adapter's chunk producer in [`guarded`], which enforces the caller-facing
//! contract: faults become one warning chunk and the stream never ends
//! without yielding something.

use std::pin::Pin;
use std::time::Duration;

use async_stream::{stream, try_stream};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{error, trace};

use crate::error::{AgentflowError, Result};
use crate::types::Platform;

/// Prefix marking a chunk as a status message rather than backend text.
pub const WARNING_MARKER: &str = "⚠️";

/// Lazy, single-pass sequence of text chunks.
pub type TextStream<'a> = Pin<Box<dyn Stream<Item = String> + Send + 'a>>;

/// Format a warning chunk.
pub fn warning(message: impl std::fmt::Display) -> String {
    format!("{WARNING_MARKER} {message}")
}

// ---------------------------------------------------------------------------
// Façade guard
// ---------------------------------------------------------------------------

/// Wrap a fallible chunk producer into the caller-facing [`TextStream`].
///
/// - empty chunks are dropped;
/// - the first error is logged, yielded as a warning chunk, and ends the
///   stream;
/// - a producer that finishes without yielding anything gets a single
///   "no response" warning.
pub fn guarded<'a, S>(platform: Platform, inner: S) -> TextStream<'a>
where
    S: Stream<Item = Result<String>> + Send + 'a,
{
    Box::pin(stream! {
        let mut yielded = false;
        let mut inner = Box::pin(inner);

        while let Some(item) = inner.next().await {
            match item {
                Ok(chunk) if chunk.is_empty() => {}
                Ok(chunk) => {
                    yielded = true;
                    yield chunk;
                }
                Err(e) => {
                    error!(platform = %platform, error = %e, "agent stream failed");
                    yielded = true;
                    yield error_chunk(&e);
                    break;
                }
            }
        }

        if !yielded {
            yield warning(format!("No response received from {platform}."));
        }
    })
}

fn error_chunk(err: &AgentflowError) -> String {
    match err {
        AgentflowError::MissingConfig { .. } => warning(err),
        other => warning(format!("Error: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

/// What an adapter makes of one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Nothing to emit.
    Skip,
    /// Emit this text and keep reading.
    Text(String),
    /// The backend signalled the end of the answer.
    Done,
    /// Emit this (warning) text and stop.
    Fail(String),
}

/// How a streamed body is cut into payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `text/event-stream`: the `data:` lines of one event are joined with
    /// `\n` and delivered when the blank line closes the event.
    EventStream,
    /// One payload per non-blank line.  A `data:` prefix is tolerated.
    JsonLines,
}

/// Read a streamed body and feed every payload to `decode`.
///
/// Blank payloads are skipped and `[DONE]` ends the stream before `decode`
/// sees it.  `read_timeout` bounds each individual read, not the whole
/// stream.
pub fn decode_frames(
    response: reqwest::Response,
    framing: Framing,
    read_timeout: Duration,
    decode: fn(&str) -> Frame,
) -> impl Stream<Item = Result<String>> + Send {
    try_stream! {
        let mut body = Box::pin(response.bytes_stream());
        let mut lines = LineBuffer::default();
        let mut payloads = Payloads::new(framing);

        'read: loop {
            let next = tokio::time::timeout(read_timeout, body.next())
                .await
                .map_err(|_| AgentflowError::Timeout { seconds: read_timeout.as_secs() })?;

            let (batch, finished) = match next {
                Some(chunk) => (lines.push(&chunk?), false),
                None => (lines.finish().into_iter().collect::<Vec<_>>(), true),
            };

            let mut ready: Vec<String> = batch
                .iter()
                .filter_map(|line| payloads.push_line(line))
                .collect();
            if finished {
                ready.extend(payloads.finish());
            }

            for payload in ready {
                let frame = match payload.trim() {
                    "" => Frame::Skip,
                    "[DONE]" => Frame::Done,
                    data => decode(data),
                };
                match frame {
                    Frame::Skip => {}
                    Frame::Text(text) => {
                        yield text;
                    }
                    Frame::Done => {
                        trace!("stream end marker received");
                        break 'read;
                    }
                    Frame::Fail(text) => {
                        yield text;
                        break 'read;
                    }
                }
            }

            if finished {
                break;
            }
        }
    }
}

/// Splits a byte stream into lines.
///
/// Works on bytes so that a multi-byte character split across two network
/// chunks is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches('\r').to_owned()
}

// ---------------------------------------------------------------------------
// Payload assembly
// ---------------------------------------------------------------------------

/// Turns body lines into payloads according to a [`Framing`].
#[derive(Debug)]
pub struct Payloads {
    framing: Framing,
    data: Vec<String>,
}

impl Payloads {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            data: Vec::new(),
        }
    }

    /// Feed one line; returns a payload once one is complete.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        match self.framing {
            Framing::JsonLines => json_line_payload(line).map(str::to_owned),
            Framing::EventStream => self.push_event_line(line),
        }
    }

    /// Deliver an event left open when the body ended.
    pub fn finish(&mut self) -> Option<String> {
        self.dispatch()
    }

    fn push_event_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        if field == "data" {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_owned());
        } else {
            trace!(field, "ignoring SSE field");
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }
}

/// Payload of one JSON-lines body line, or `None` for blank lines,
/// comments and SSE fields other than `data`.
fn json_line_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        return Some(data.trim());
    }
    if ["event:", "id:", "retry:"].iter().any(|p| line.starts_with(p)) {
        return None;
    }
    Some(line)
}

// ---------------------------------------------------------------------------
// JSON field helpers
// ---------------------------------------------------------------------------

/// Return the first present, non-empty field of `value`, in `fields` order.
///
/// Strings are returned as-is; other non-null values are rendered as JSON.
pub fn pick_text(value: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match value.get(field)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Null | Value::Bool(false) => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    })
}
