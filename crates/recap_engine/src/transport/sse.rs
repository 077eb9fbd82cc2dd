use crate::TransportError;

/// Longest line the decoder buffers while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental decoder for a `text/event-stream` body.
///
/// Yields one frame per dispatched event (`data:` lines joined with `\n`).
/// Lines that carry no SSE field are frames on their own, which lets the same
/// decoder read a plain newline-delimited progress log.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame completed by it. Fails once a
    /// single line grows past [`MAX_LINE_BYTES`] without a newline.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, TransportError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        if self.buffer.len() > MAX_LINE_BYTES {
            let pending = self.buffer.len();
            self.buffer.clear();
            return Err(TransportError::InvalidResponse(format!(
                "stream line exceeds {MAX_LINE_BYTES} bytes ({pending} pending)"
            )));
        }
        Ok(frames)
    }

    /// Flushes a trailing line and any undispatched event at end of stream.
    pub fn finish(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            if let Some(frame) = self.line(rest.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }
        if let Some(frame) = self.dispatch() {
            frames.push(frame);
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                self.data.push(value.to_string());
                None
            }
            "event" | "id" | "retry" => None,
            _ if line.trim().is_empty() => None,
            _ => Some(line.trim().to_string()),
        }
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let frame = self.data.join("\n");
        self.data.clear();
        Some(frame)
    }
}
