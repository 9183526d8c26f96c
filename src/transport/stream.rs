use crate::decode::DONE_SENTINEL;
use serde_json::Value;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Frame text for the envelope decoder. Legacy producers put the
    /// discriminator in the SSE `event:` field; it is copied into `type` when
    /// the data object does not carry one.
    pub fn into_envelope_text(self) -> String {
        let Some(event) = self.event.filter(|name| name != "message") else {
            return self.data;
        };
        match serde_json::from_str::<Value>(&self.data) {
            Ok(Value::Object(mut object)) if !object.contains_key("type") => {
                object.insert("type".to_string(), Value::String(event));
                Value::Object(object).to_string()
            }
            _ => self.data,
        }
    }
}

/// Incremental `text/event-stream` parser. Chunks may split events, lines
/// and UTF-8 sequences at arbitrary byte offsets.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some((end, separator_len)) = find_event_boundary(&self.buffer[start..]) {
            let event_end = start + end;
            let event_text = String::from_utf8_lossy(&self.buffer[start..event_end]).into_owned();
            if let Some(frame) = parse_event_block(&event_text) {
                frames.push(frame);
            }
            start = event_end + separator_len;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }

    /// Bytes of an incomplete trailing event, if any.
    pub fn flush(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }
}

fn find_event_boundary(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index..].starts_with(b"\r\n\r\n") {
            return Some((index, 4));
        }
        if bytes[index..].starts_with(b"\n\n") || bytes[index..].starts_with(b"\r\r") {
            return Some((index, 2));
        }
        index += 1;
    }
    None
}

fn parse_event_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.split(['\n', '\r']) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    let data = data_lines.join("\n");
    if data.trim() == DONE_SENTINEL {
        return None;
    }
    Some(SseFrame { event, data })
}
