//! Incremental `text/event-stream` decoder.
//!
//! Bytes go in as they arrive off the wire, in chunks of any size; complete
//! events come out. Lines may end in `\n`, `\r\n` or a bare `\r`, and a
//! chunk boundary may fall anywhere, including inside a UTF-8 sequence or
//! between the `\r` and `\n` of one line ending.

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if the event had one.
    pub event: Option<String>,
    /// All `data:` lines of the event joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream so far.
    pub id: Option<String>,
}

impl SseEvent {
    /// Event type; unnamed events are `message`.
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// The previous chunk ended on `\r`; a leading `\n` belongs to it.
    skip_lf: bool,
    event: Option<String>,
    data: Vec<String>,
    last_event_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every event it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut start = 0;

        for i in 0..self.buffer.len() {
            let byte = self.buffer[i];
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    start = i + 1;
                    continue;
                }
            }
            if byte == b'\n' || byte == b'\r' {
                let line = String::from_utf8_lossy(&self.buffer[start..i]).into_owned();
                self.skip_lf = byte == b'\r';
                self.handle_line(&line, &mut out);
                start = i + 1;
            }
        }

        self.buffer.drain(..start);
        out
    }

    /// End of input: decode an unterminated last line and flush the event
    /// it belongs to, even though no blank line closed it.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.handle_line(&line, &mut out);
        }
        self.skip_lf = false;
        self.dispatch(&mut out);
        out
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_owned()),
            // `retry` and unknown fields are ignored.
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<SseEvent>) {
        let event = self.event.take();
        if self.data.is_empty() {
            return;
        }
        let data = self.data.join("\n");
        self.data.clear();
        out.push(SseEvent {
            event,
            data,
            id: self.last_event_id.clone(),
        });
    }
}
