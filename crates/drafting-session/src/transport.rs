/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Payload delivered to a plain message listener.
    ///
    /// Named events other than `message` and frames without data carry no
    /// snapshot.
    pub fn message_payload(&self) -> Option<&str> {
        match self.event.as_deref() {
            None | Some("message") => {}
            Some(_) => return None,
        }
        if self.data.trim().is_empty() {
            return None;
        }
        Some(&self.data)
    }
}

/// Line-oriented decoder for a `text/event-stream` body.
///
/// Lines may end in `\n` or `\r\n`; a blank line dispatches the fields
/// gathered since the previous one. `id` and `retry` are ignored.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(len) = self.buf[consumed..].iter().position(|b| *b == b'\n') {
            let raw = &self.buf[consumed..consumed + len];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            consumed += len + 1;
            if let Some(frame) = self.feed_line(&line) {
                frames.push(frame);
            }
        }
        self.buf.drain(..consumed);
        frames
    }

    /// Bytes of the event still being assembled.
    pub fn pending_len(&self) -> usize {
        self.buf.len() + self.data.iter().map(String::len).sum::<usize>()
    }

    fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
