//! Incremental Server-Sent-Events decoder for chat-completion streams.
//!
//! Network reads split the event stream at arbitrary byte offsets: a
//! multi-byte character, a line, or a whole JSON record can straddle two
//! chunks. `StreamDecoder` carries the undecodable remainder between calls
//! and re-parses it once more bytes arrive, so callers just feed chunks in
//! arrival order and collect deltas.
//!
//! One instance per stream. The decoder is a sequential state machine —
//! feeding it from two places concurrently would interleave the carry-over
//! buffer and corrupt the output.

use serde::Deserialize;

/// Literal sentinel the upstream sends as its final data record.
const DONE_SENTINEL: &str = "[DONE]";

/// Prefix marking a data record per the SSE wire format.
const DATA_PREFIX: &str = "data: ";

/// An event produced while decoding the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental fragment of the assistant's message. Concatenating
    /// all deltas in emission order yields the full message text.
    Delta(String),
    /// The terminal sentinel. Nothing after this is ever emitted.
    Done,
}

/// Wire shape of one upstream chunk record (the fields we read of it).
#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of processing one complete line.
enum LineOutcome {
    Delta(String),
    Done,
    /// Comment, heartbeat, non-data line, or a record without content.
    Ignore,
    /// `data: ` line whose payload did not parse — likely split across
    /// network reads; wait for more bytes.
    Incomplete,
}

/// Incremental SSE decoder with carry-over across chunk boundaries.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence from the last chunk.
    partial_utf8: Vec<u8>,
    /// Decoded text not yet consumed as complete lines. When a data line
    /// fails to parse it is pushed back here (with its newline) and retried
    /// on the next feed — only the most recent unparsed line, never more.
    buf: String,
    /// Set once the terminal sentinel is seen; the decoder stays terminated.
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed the next chunk of bytes, in arrival order, and collect any
    /// events that became complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        self.decode_utf8(chunk);
        self.drain_lines(false)
    }

    /// Signal true end-of-stream: flush whatever is still buffered through
    /// the per-line rules one last time. With no more bytes coming there is
    /// no push-back — an unparseable trailing fragment is dropped, since
    /// nothing can ever complete it.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        // A dangling partial UTF-8 sequence can no longer complete either.
        if !self.partial_utf8.is_empty() {
            let bytes = std::mem::take(&mut self.partial_utf8);
            self.buf.push_str(&String::from_utf8_lossy(&bytes));
        }
        let mut events = self.drain_lines(true);

        // Trailing line without a newline terminator.
        if !self.done && !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            match self.handle_line(&line) {
                LineOutcome::Delta(text) => events.push(StreamEvent::Delta(text)),
                LineOutcome::Done => {
                    self.done = true;
                    events.push(StreamEvent::Done);
                }
                LineOutcome::Ignore | LineOutcome::Incomplete => {
                    tracing::debug!(len = line.len(), "Discarding trailing fragment at stream end");
                }
            }
        }
        events
    }

    /// Append a chunk to the carry-over bytes and decode as much valid
    /// UTF-8 as possible, keeping an incomplete trailing sequence for the
    /// next call instead of corrupting it.
    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.partial_utf8.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.partial_utf8);
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buf.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    // `valid` is valid UTF-8 by construction; lossy is a no-op.
                    self.buf.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            self.buf.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[bad..];
                        }
                        None => {
                            self.partial_utf8 = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Process every complete line currently buffered. `at_end` disables
    /// the push-back-and-wait path.
    fn drain_lines(&mut self, at_end: bool) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        while let Some(nl) = self.buf.find('\n') {
            let mut line: String = self.buf.drain(..=nl).collect();
            line.pop(); // the '\n'
            if line.ends_with('\r') {
                line.pop();
            }

            match self.handle_line(&line) {
                LineOutcome::Delta(text) => events.push(StreamEvent::Delta(text)),
                LineOutcome::Done => {
                    self.done = true;
                    self.buf.clear();
                    self.partial_utf8.clear();
                    events.push(StreamEvent::Done);
                    return events;
                }
                LineOutcome::Ignore => {}
                LineOutcome::Incomplete => {
                    if at_end {
                        tracing::debug!(len = line.len(), "Dropping unparseable record at stream end");
                        continue;
                    }
                    // Push the line back, newline restored, and halt until
                    // the next chunk extends it.
                    line.push('\n');
                    self.buf.insert_str(0, &line);
                    return events;
                }
            }
        }
        events
    }

    fn handle_line(&self, line: &str) -> LineOutcome {
        if line.is_empty() || line.starts_with(':') {
            return LineOutcome::Ignore;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return LineOutcome::Ignore;
        };
        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            return LineOutcome::Done;
        }
        match serde_json::from_str::<ChunkRecord>(payload) {
            Ok(record) => {
                let content = record
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content);
                match content {
                    Some(text) if !text.is_empty() => LineOutcome::Delta(text),
                    _ => LineOutcome::Ignore,
                }
            }
            Err(_) => LineOutcome::Incomplete,
        }
    }
}
