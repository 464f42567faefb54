//! Incremental SSE event parsing.
//!
//! Splits a byte stream into events at blank-line boundaries and collects
//! the `data:` field of each event. Comment lines (keepalives) and fields
//! this client does not use are skipped. The extracted payloads feed the
//! JSON deframer, so data split across multiple `data:` lines or multiple
//! documents inside one event both decode correctly.

/// Stateful parser recovering `data:` payloads from SSE bytes
#[derive(Debug, Default)]
pub(crate) struct SseEventParser {
    buffer: String,
}

impl SseEventParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the data payloads of every completed event
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let event: String = self.buffer.drain(..end + 2).collect();

            let mut data = String::new();
            for line in event.lines() {
                if let Some(value) = line.strip_prefix("data:") {
                    if !data.is_empty() {
                        data.push('\n');
                    }
                    data.push_str(value.strip_prefix(' ').unwrap_or(value));
                }
                // Comments (": keepalive") and other fields are ignored
            }

            if !data.is_empty() {
                payloads.push(data);
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut parser = SseEventParser::new();
        let payloads = parser.feed(b"data: {\"a\":1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed(b"data: {\"a\"").is_empty());
        assert!(parser.feed(b":1}\n").is_empty());
        let payloads = parser.feed(b"\ndata: {\"b\":2}\n\n");
        assert_eq!(
            payloads,
            vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]
        );
    }

    #[test]
    fn test_keepalive_comments_are_skipped() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed(b": keepalive\n\n").is_empty());
        let payloads = parser.feed(b": keepalive\n\ndata: {}\n\n");
        assert_eq!(payloads, vec!["{}".to_string()]);
    }

    #[test]
    fn test_multi_line_data_joined_with_newline() {
        let mut parser = SseEventParser::new();
        let payloads = parser.feed(b"data: {\ndata: \"a\": 1}\n\n");
        assert_eq!(payloads, vec!["{\n\"a\": 1}".to_string()]);
    }

    #[test]
    fn test_event_and_id_fields_ignored() {
        let mut parser = SseEventParser::new();
        let payloads = parser.feed(b"event: message\nid: 7\ndata: {\"n\":1}\n\n");
        assert_eq!(payloads, vec!["{\"n\":1}".to_string()]);
    }
}
