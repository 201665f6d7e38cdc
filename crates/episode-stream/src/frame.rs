use serde::Serialize;

const DEFAULT_EVENT_NAME: &str = "message";

/// One blank-line-delimited block of the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    /// Value of the `event:` line, or `message` when the block has none.
    pub event_name: String,
    /// Concatenated values of every `data:` line in the block.
    pub data: String,
}

impl RawFrame {
    /// Creates a frame from an event name and its data.
    pub fn new(event_name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            data: data.into(),
        }
    }
}

/// Splits decoded text into frames, keeping any unterminated tail for the
/// next call.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: String,
    // Offset up to which `buf` is known to hold no boundary.
    scanned: usize,
}

impl FrameParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and returns every frame completed by it, in order.
    pub fn push(&mut self, text: &str) -> Vec<RawFrame> {
        self.buf.push_str(text);
        let mut frames = Vec::new();
        while let Some((block_end, boundary_end)) = find_boundary(&self.buf, self.scanned) {
            if let Some(frame) = parse_block(&self.buf[..block_end]) {
                frames.push(frame);
            }
            self.buf.drain(..boundary_end);
            self.scanned = 0;
        }
        // A boundary may start in the last two bytes and finish in the next push.
        self.scanned = self.buf.len().saturating_sub(2);
        frames
    }

    /// Text received but not yet terminated by a blank line.
    pub fn pending(&self) -> &str {
        &self.buf
    }
}

/// Finds the first blank line at or after `from`.
///
/// Returns the end of the block preceding it and the end of the boundary.
/// A newline is `\n`, optionally preceded by `\r`.
fn find_boundary(buf: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = buf.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            if bytes.get(j) == Some(&b'\r') {
                j += 1;
            }
            if bytes.get(j) == Some(&b'\n') {
                return Some((i, j + 1));
            }
        }
        i += 1;
    }
    None
}

fn parse_block(block: &str) -> Option<RawFrame> {
    let mut event_name: Option<&str> = None;
    let mut data = String::new();
    for line in block.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push_str(rest.trim());
        }
    }
    let event_name = event_name.filter(|name| !name.is_empty());
    if event_name.is_none() && data.is_empty() {
        return None;
    }
    Some(RawFrame::new(
        event_name.unwrap_or(DEFAULT_EVENT_NAME),
        data,
    ))
}
