//! Frame decoder for the chat stream wire format
//!
//! The service's framing is only loosely SSE: some deployments send
//! `data: {json}` records, some send `data: <plain text>`, and some dump
//! raw text with no framing at all. The decoder accepts all three without
//! knowing in advance which one is in use, and surfaces each accepted
//! delta immediately so partial text reaches the renderer with low latency.

use serde::Deserialize;

/// Record prefix for event-stream style lines
const DATA_PREFIX: &str = "data: ";

/// End-of-stream sentinel some backends emit. It is a no-op continuation:
/// termination is driven by the transport closing the body, not by the
/// sentinel, because the observed framing is not conformant SSE.
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Incremental text to append to the accumulated response
    Text(String),
    /// The service declared this the authoritative full text; it replaces
    /// everything accumulated so far rather than appending
    FullReplace(String),
    /// The underlying stream is exhausted
    End,
}

/// Structured record carried inside a `data: ` line. All keys are optional;
/// payloads that are valid JSON but not a mapping fail to decode here and
/// fall through to the literal-text path.
#[derive(Debug, Deserialize)]
struct FrameRecord {
    chunk: Option<String>,
    content: Option<String>,
    full_response: Option<String>,
}

/// Incremental decoder: feed arbitrarily-chunked bytes, get ordered deltas.
///
/// Chunk boundaries are not aligned to logical records. Byte-to-text
/// decoding state is carried across calls so a multi-byte character split
/// across chunks is never corrupted; line framing is per-chunk, matching
/// the observed transport behavior.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence from the last chunk
    utf8_carry: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one transport chunk, emitting zero or more deltas in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamDelta> {
        let text = self.decode_utf8(chunk);
        if text.is_empty() {
            return Vec::new();
        }
        decode_chunk_text(&text)
    }

    /// Signal stream exhaustion. Any dangling incomplete UTF-8 tail is
    /// dropped; a truncated character carries no renderable text.
    pub fn finish(mut self) -> Vec<StreamDelta> {
        if !self.utf8_carry.is_empty() {
            tracing::debug!(
                bytes = self.utf8_carry.len(),
                "dropping incomplete UTF-8 tail at end of stream"
            );
            self.utf8_carry.clear();
        }
        vec![StreamDelta::End]
    }

    /// Decode bytes to text, buffering an incomplete trailing sequence.
    /// Invalid bytes mid-chunk become U+FFFD without disturbing the carry.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.utf8_carry);
        data.extend_from_slice(chunk);

        let mut out = String::with_capacity(data.len());
        loop {
            match std::str::from_utf8(&data) {
                Ok(text) => {
                    out.push_str(text);
                    data.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(std::str::from_utf8(&data[..valid]).unwrap_or_default());
                    match err.error_len() {
                        // Truly invalid sequence: replace and keep going
                        Some(skip) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            data.drain(..valid + skip);
                        }
                        // Incomplete sequence at the end: carry it over
                        None => {
                            data.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        self.utf8_carry = data;
        out
    }
}

/// Decode the text of one chunk into deltas.
fn decode_chunk_text(chunk: &str) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();

    // Raw fallback: no `data:` marker anywhere means a non-conformant
    // transport that just streams text. The whole chunk is one literal
    // delta. Note this keys off the chunk, not the line, so a structured
    // record whose text field happens to contain "data:" still takes the
    // line path below; that ambiguity is inherited from the wire contract.
    if !chunk.contains("data:") {
        if chunk.lines().any(|line| !line.trim().is_empty()) {
            deltas.push(StreamDelta::Text(chunk.to_owned()));
        }
        return deltas;
    }

    for line in chunk.lines() {
        // Blank lines and undecorated lines in a data-bearing chunk carry
        // no payload.
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        if payload == DONE_SENTINEL {
            continue;
        }
        match serde_json::from_str::<FrameRecord>(payload) {
            Ok(record) => {
                if let Some(text) = record.chunk.or(record.content) {
                    deltas.push(StreamDelta::Text(text));
                }
                // full_response is authoritative even when a delta key was
                // also present in the same record.
                if let Some(full) = record.full_response {
                    deltas.push(StreamDelta::FullReplace(full));
                }
            }
            // Not structured data: the payload itself is the text
            Err(_) => deltas.push(StreamDelta::Text(payload.to_owned())),
        }
    }
    deltas
}
