use aieditor_core::AiError;
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};

/// One server-sent event. `data` joins multiple `data:` lines with `\n`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: Option<String>,
    pub id: Option<String>,
}

/// Upper bound on one incomplete frame.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Incremental splitter for `text/event-stream` bodies. Holds at most one
/// incomplete frame between pushes, capped at `limit` bytes.
///
/// Frames end at a blank line written as `\n\n` or `\r\n\r\n`; bare `\r`
/// line endings are not supported.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    limit: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame, or `None` until more bytes arrive.
    pub fn next_frame(&mut self) -> Result<Option<SseFrame>, AiError> {
        let Some((end, sep)) = find_event_boundary(&self.buf) else {
            if self.buf.len() > self.limit {
                return Err(AiError::Decode(format!(
                    "event exceeds {} bytes without a blank line",
                    self.limit
                )));
            }
            return Ok(None);
        };
        let block = self.buf.split_to(end);
        self.buf.advance(sep);
        let text = std::str::from_utf8(&block).map_err(|e| AiError::Decode(e.to_string()))?;
        Ok(Some(parse_block(text)))
    }
}

/// Earliest blank line, as `(offset, separator length)`.
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = twoway::find_bytes(buf, b"\r\n\r\n").map(|p| (p, 4));
    let lf = twoway::find_bytes(buf, b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(block: &str) -> SseFrame {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();
    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => frame.event = Some(value.to_string()),
            "id" => frame.id = Some(value.to_string()),
            _ => {}
        }
    }
    if !data_lines.is_empty() {
        frame.data = Some(data_lines.join("\n"));
    }
    frame
}

/// Frames of a streaming response body, in wire order. Ends after the first
/// transport or decode error.
pub fn frame_stream(response: reqwest::Response) -> impl Stream<Item = Result<SseFrame, AiError>> {
    async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut decoder = FrameDecoder::new();
        'outer: while let Some(chunk) = body.next().await {
            match chunk {
                Ok(b) => {
                    decoder.push(&b);
                    loop {
                        match decoder.next_frame() {
                            Ok(Some(frame)) => yield Ok(frame),
                            Ok(None) => break,
                            Err(e) => {
                                yield Err(e);
                                break 'outer;
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Err(AiError::Transport(e.to_string()));
                    break 'outer;
                }
            }
        }
    }
}
