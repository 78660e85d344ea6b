// src/correction/sse.rs
// Newline-delimited `data:` event records decoded from raw response bytes

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::utils::truncate;

/// Terminal sentinel sent as the last record of a completion stream
const DONE_SENTINEL: &str = "[DONE]";

/// Buffers partial chunks and yields complete records.
///
/// Bytes are only decoded once a full line is available, so a multi-byte
/// character split across chunks survives intact. The buffer is capped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Maximum buffer size (1MB) for a line that never terminates
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Push a chunk and return every record completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        // the buffered tail holds no newline, so only the new bytes need scanning
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut line_start = 0;
        for (offset, byte) in self.buffer[scan_from..].iter().enumerate() {
            if *byte == b'\n' {
                let line_end = scan_from + offset;
                if let Some(frame) = SseFrame::from_line(&self.buffer[line_start..line_end]) {
                    frames.push(frame);
                }
                line_start = line_end + 1;
            }
        }
        if line_start > 0 {
            self.buffer.drain(..line_start);
        }

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            warn!(
                "SSE buffer exceeded {}KB without a line break, discarding",
                Self::MAX_BUFFER_SIZE / 1024
            );
            self.buffer.clear();
        }

        frames
    }

    /// Flush a final record that arrived without a trailing newline
    pub fn finish(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.buffer);
        SseFrame::from_line(&line)
    }

    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// One `data:` record
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    /// Payload without the `data:` marker
    pub data: String,
}

impl SseFrame {
    /// Parse a raw line; anything but a non-empty `data:` line is ignored
    fn from_line(line: &[u8]) -> Option<Self> {
        let line = String::from_utf8_lossy(line);
        let data = line.trim().strip_prefix("data:")?.trim_start();
        if data.is_empty() {
            return None;
        }
        Some(Self {
            data: data.to_string(),
        })
    }

    pub fn is_done(&self) -> bool {
        self.data == DONE_SENTINEL
    }

    /// Parse the payload as JSON, `None` when it is malformed
    pub fn try_parse<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.data).ok()
    }

    pub fn preview(&self) -> String {
        truncate(&self.data, 200)
    }
}
