//! Newline framing and message classification for the stdio protocol.

use serde_json::Value as JsonValue;

/// Most recent output kept for error reports.
pub const TRANSCRIPT_TAIL: usize = 64 * 1024;

/// Accumulates output chunks and hands back complete lines.
///
/// A chunk may end mid-line (or mid UTF-8 sequence); the tail is kept until
/// the next newline or [`LineBuffer::finish`].
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    seen: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.seen.extend_from_slice(chunk);
        if self.seen.len() > TRANSCRIPT_TAIL {
            let excess = self.seen.len() - TRANSCRIPT_TAIL;
            self.seen.drain(..excess);
        }
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Flush the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(decode_line(&tail))
    }

    /// The last [`TRANSCRIPT_TAIL`] bytes received, for error reports.
    pub fn transcript(&self) -> String {
        String::from_utf8_lossy(&self.seen).into_owned()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let s = String::from_utf8_lossy(bytes);
    let s: &str = &s;
    s.strip_suffix('\r').unwrap_or(s).to_string()
}

/// What a single line from the child turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `{ "type": "initialized" }`
    Initialized,
    /// Any message carrying a `content` array.
    Response(JsonValue),
    /// Valid JSON we do not act on.
    Other,
    /// Not JSON at all.
    Noise,
}

pub fn classify(line: &str) -> Inbound {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Inbound::Noise;
    }
    let Ok(msg) = serde_json::from_str::<JsonValue>(trimmed) else {
        return Inbound::Noise;
    };
    if msg.get("content").is_some_and(JsonValue::is_array) {
        Inbound::Response(msg)
    } else if msg.get("type").and_then(JsonValue::as_str) == Some("initialized") {
        Inbound::Initialized
    } else {
        Inbound::Other
    }
}
