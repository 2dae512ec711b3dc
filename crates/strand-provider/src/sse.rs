//! Incremental Server-Sent Events decoder.
//!
//! Byte-oriented: feed arbitrary chunks as they arrive on the socket and
//! collect dispatched events. Feeding a byte sequence one byte at a time
//! yields exactly the same events as feeding it as a single buffer.
//!
//! Field grammar per the SSE spec: `field:value` lines set the named field
//! on the pending event, a single leading space after the colon is
//! stripped, lines starting with `:` are comments, and an empty line
//! dispatches the pending event when it has any data or an event name.
//! `\n`, `\r\n`, and lone `\r` line terminators are all tolerated. A line
//! that is not valid UTF-8 is discarded; the stream continues.

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `event:` name, if any.
    pub event: Option<String>,
    /// Accumulated `data:` payload; multiple data lines are joined with
    /// `\n`.
    pub data: String,
    /// The last seen `id:` value.
    pub id: Option<String>,
    /// The `retry:` reconnection delay in milliseconds, if any.
    pub retry: Option<u64>,
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the line currently being assembled.
    line: Vec<u8>,
    /// A `\r` was just seen; a following `\n` belongs to the same break.
    skip_lf: bool,

    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    /// Create a decoder with no pending state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every event dispatched by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut out = Vec::new();
        for &b in bytes {
            if self.skip_lf {
                self.skip_lf = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    self.skip_lf = true;
                }
                _ => self.line.push(b),
            }
        }
        out
    }

    /// Signal end-of-stream. A trailing line without a terminator is
    /// processed, and any non-empty pending event is dispatched.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.process_line(&line);
        }
        self.dispatch()
    }

    fn end_line(&mut self, out: &mut Vec<SseEvent>) {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                out.push(event);
            }
            return;
        }
        self.process_line(&line);
    }

    fn process_line(&mut self, line: &[u8]) {
        // Malformed UTF-8 discards this line only.
        let Ok(line) = std::str::from_utf8(line) else {
            return;
        };
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            // A line with no colon is a field with an empty value.
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            "id" => self.id = Some(value.to_owned()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_none() && self.event.is_none() {
            self.retry = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: self.data.take().unwrap_or_default(),
            // The id field persists across events per the SSE spec.
            id: self.id.clone(),
            retry: self.retry.take(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<SseEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(input);
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn basic_event_with_name_and_data() {
        let events = decode_all(b"event: message_start\ndata: {\"a\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn single_leading_space_is_stripped_exactly() {
        let events = decode_all(b"data:  two spaces\n\n");
        assert_eq!(events[0].data, " two spaces");

        let events = decode_all(b"data:nospace\n\n");
        assert_eq!(events[0].data, "nospace");
    }

    #[test]
    fn multiple_data_lines_accumulate_with_newlines() {
        let events = decode_all(b"data: first\ndata: second\ndata: third\n\n");
        assert_eq!(events[0].data, "first\nsecond\nthird");
    }

    #[test]
    fn comment_lines_are_ignored() {
        let events = decode_all(b": keepalive\n\ndata: hi\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn empty_dispatch_without_fields_is_discarded() {
        assert!(decode_all(b"\n\n\n").is_empty());
    }

    #[test]
    fn crlf_and_lone_cr_terminators() {
        let events = decode_all(b"data: a\r\n\r\ndata: b\r\rdata: c\n\n");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
        assert_eq!(events[2].data, "c");
    }

    #[test]
    fn crlf_split_across_feeds() {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(b"data: a\r");
        events.extend(decoder.feed(b"\n\r\n"));
        events.extend(decoder.finish());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a");
    }

    #[test]
    fn pending_event_dispatched_at_end_of_stream() {
        let events = decode_all(b"event: done\ndata: tail");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("done"));
        assert_eq!(events[0].data, "tail");
    }

    #[test]
    fn retry_field_parses_and_resets() {
        let events = decode_all(b"retry: 3000\ndata: x\n\ndata: y\n\n");
        assert_eq!(events[0].retry, Some(3000));
        assert_eq!(events[1].retry, None);
    }

    #[test]
    fn id_persists_across_events() {
        let events = decode_all(b"id: 7\ndata: x\n\ndata: y\n\n");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[1].id.as_deref(), Some("7"));
    }

    #[test]
    fn invalid_utf8_discards_only_that_line() {
        let mut input = Vec::new();
        input.extend_from_slice(b"data: ok\n");
        input.extend_from_slice(b"data: \xff\xfe\n");
        input.extend_from_slice(b"data: also ok\n\n");
        let events = decode_all(&input);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "ok\nalso ok");
    }

    #[test]
    fn byte_at_a_time_equals_whole_buffer() {
        let input: &[u8] = b"event: e1\ndata: first\ndata: second\n\n: comment\r\nretry: 10\r\ndata: third\r\rdata: tail";

        let whole = decode_all(input);

        let mut decoder = SseDecoder::new();
        let mut byte_wise = Vec::new();
        for &b in input {
            byte_wise.extend(decoder.feed(&[b]));
        }
        byte_wise.extend(decoder.finish());

        assert_eq!(whole, byte_wise);
        assert_eq!(whole.len(), 3);
    }

    #[test]
    fn field_without_colon_has_empty_value() {
        // `data` alone is a data line with an empty value.
        let events = decode_all(b"data\ndata: x\n\n");
        assert_eq!(events[0].data, "\nx");
    }
}
