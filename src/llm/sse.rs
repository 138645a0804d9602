//! Server-Sent Events parsing for streamed model replies.
//!
//! The gateway streams chat completions as SSE. The line-level state
//! machine is kept separate from the byte transport so it can be tested
//! without a live response.

use super::EngineError;
use futures::StreamExt;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// One parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, when present
    pub event: Option<String>,
    /// Accumulated `data:` payload; multi-line data is joined with `\n`
    pub data: String,
}

/// Incremental SSE field assembler. Feed it lines; it yields an event at
/// each blank-line boundary.
#[derive(Debug, Default)]
pub struct SseParser {
    event: Option<String>,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line (without its terminator). Returns a completed event
    /// when the line is the blank separator.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            return Some(SseEvent {
                event: self.event.take(),
                data: std::mem::take(&mut self.data),
            });
        }

        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
        // id:, retry: and comment lines are irrelevant to this protocol
        None
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(self) -> Option<SseEvent> {
        if self.data.is_empty() {
            None
        } else {
            Some(SseEvent {
                event: self.event,
                data: self.data,
            })
        }
    }
}

/// Drain a streaming response, invoking `on_event` for each SSE event.
pub async fn read_sse_stream(
    response: reqwest::Response,
    mut on_event: impl FnMut(SseEvent),
) -> Result<(), EngineError> {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    let reader = tokio::io::BufReader::new(StreamReader::new(bytes));
    let mut lines = reader.lines();

    let mut parser = SseParser::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| EngineError::unavailable(format!("stream read failed: {e}")))?
    {
        if let Some(event) = parser.push_line(&line) {
            on_event(event);
        }
    }
    if let Some(event) = parser.finish() {
        on_event(event);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(lines: &[&str]) -> Vec<SseEvent> {
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        for line in lines {
            if let Some(ev) = parser.push_line(line) {
                events.push(ev);
            }
        }
        events.extend(parser.finish());
        events
    }

    #[test]
    fn parses_single_event() {
        let events = collect(&["event: delta", "data: {\"x\":1}", ""]);
        assert_eq!(
            events,
            vec![SseEvent {
                event: Some("delta".into()),
                data: "{\"x\":1}".into(),
            }]
        );
    }

    #[test]
    fn joins_multi_line_data() {
        let events = collect(&["data: first", "data: second", ""]);
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn blank_line_without_data_is_noise() {
        assert!(collect(&["", "", ""]).is_empty());
    }

    #[test]
    fn trailing_event_is_flushed() {
        let events = collect(&["data: [DONE]"]);
        assert_eq!(events[0].data, "[DONE]");
    }

    #[test]
    fn ignores_comments_and_ids() {
        let events = collect(&[": keepalive", "id: 7", "data: x", ""]);
        assert_eq!(events, vec![SseEvent { event: None, data: "x".into() }]);
    }

    proptest! {
        /// Event assembly must not depend on how many events share the
        /// stream or where the terminator falls.
        #[test]
        fn roundtrips_arbitrary_payloads(
            payloads in proptest::collection::vec("[ -~]{1,40}", 1..8)
        ) {
            let mut lines: Vec<String> = Vec::new();
            for p in &payloads {
                lines.push(format!("data: {p}"));
                lines.push(String::new());
            }
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            let events = collect(&refs);
            let got: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
            let want: Vec<&str> = payloads.iter().map(String::as_str).collect();
            prop_assert_eq!(got, want);
        }
    }
}
