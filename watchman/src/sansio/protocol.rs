//! Pure frame parsing and serialization functions.
//!
//! Watchman's JSON protocol carries one JSON value per message in each
//! direction. Commands are written as a single line; replies are read as a
//! stream of self-delimited values, so no particular separator is assumed on
//! the inbound side. All functions operate on byte buffers and never perform
//! I/O.

use serde::de::IgnoredAny;

use super::types::{Envelope, EnvelopeFields, ParseResult};
use crate::command::Command;
use crate::{Error, Result};

/// Bytes kept of an offending frame in error messages.
pub(crate) const EXCERPT_LEN: usize = 256;

/// The head of `bytes` as text, cut to [`EXCERPT_LEN`] bytes.
pub(crate) fn excerpt(bytes: &[u8]) -> String {
    if bytes.len() <= EXCERPT_LEN {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    format!(
        "{}... ({} bytes)",
        String::from_utf8_lossy(&bytes[..EXCERPT_LEN]),
        bytes.len()
    )
}

enum Scan {
    Frame { start: usize, end: usize },
    Incomplete,
    Invalid(String),
}

/// Finds where the JSON object or array at the head of a buffer ends.
///
/// Only brackets outside of strings are counted, so every byte is looked at
/// once no matter how many reads a frame is split over. The position is kept
/// between calls; reset the scanner when the buffer is drained.
#[derive(Debug, Default, Clone)]
struct FrameScanner {
    pos: usize,
    start: Option<usize>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl FrameScanner {
    fn scan(&mut self, buf: &[u8]) -> Scan {
        while self.pos < buf.len() {
            let b = buf[self.pos];
            self.pos += 1;

            let start = match self.start {
                Some(start) => start,
                None => {
                    match b {
                        b'{' | b'[' => {
                            self.start = Some(self.pos - 1);
                            self.depth = 1;
                        }
                        b if b.is_ascii_whitespace() => {}
                        other => {
                            return Scan::Invalid(format!(
                                "expected '{{' or '[' at byte {}, found {:?}",
                                self.pos - 1,
                                other as char
                            ))
                        }
                    }
                    continue;
                }
            };

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Scan::Frame {
                            start,
                            end: self.pos,
                        };
                    }
                }
                _ => {}
            }
        }
        Scan::Incomplete
    }
}

/// Find one complete JSON object or array at the head of `buf`.
///
/// Leading whitespace is skipped and counted in `consumed`. A value that is
/// cut off by the end of the buffer yields `Incomplete`; a value that is
/// closed but malformed, or that does not start with `{` or `[`, yields
/// `Invalid`.
///
/// # Example
///
/// ```
/// use watchman::sansio::protocol::parse_message;
/// use watchman::sansio::types::ParseResult;
///
/// let buf = b"{\"version\":\"4.9.0\"}\n{\"log\":";
/// match parse_message(buf) {
///     ParseResult::Complete { message, consumed } => {
///         assert_eq!(message, b"{\"version\":\"4.9.0\"}");
///         assert_eq!(consumed, 19);
///     }
///     _ => panic!("Expected complete message"),
/// }
/// ```
pub fn parse_message(buf: &[u8]) -> ParseResult {
    match FrameScanner::default().scan(buf) {
        Scan::Frame { start, end } => {
            let message = &buf[start..end];
            match serde_json::from_slice::<IgnoredAny>(message) {
                Ok(_) => ParseResult::Complete {
                    message: message.to_vec(),
                    consumed: end,
                },
                Err(e) => ParseResult::Invalid {
                    error: e.to_string(),
                },
            }
        }
        Scan::Incomplete => ParseResult::Incomplete,
        Scan::Invalid(error) => ParseResult::Invalid { error },
    }
}

/// Serialize a command to one newline-terminated frame.
///
/// ```
/// use watchman::{Command, sansio::protocol::serialize_command};
///
/// let bytes = serialize_command(Command::new("clock").arg("/tmp/x")).unwrap();
/// assert_eq!(bytes, b"[\"clock\",\"/tmp/x\"]\n");
/// ```
pub fn serialize_command(command: Command) -> Result<Vec<u8>> {
    let value = command.into_value().map_err(Error::Encode)?;
    let mut bytes = serde_json::to_vec(&value).map_err(Error::Encode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Classify one complete message (from `ParseResult::Complete`).
///
/// Every inbound frame must be a JSON object; anything else is a decode
/// error.
pub fn parse_envelope(message: Vec<u8>) -> Result<Envelope> {
    if message.first() != Some(&b'{') {
        return Err(Error::Decode(format!(
            "expected a JSON object, got: {}",
            excerpt(&message)
        )));
    }
    let fields: EnvelopeFields =
        serde_json::from_slice(&message).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(Envelope::new(fields, message))
}

/// Accumulates inbound bytes and yields complete envelopes.
///
/// Scanning resumes where the previous call stopped, so a frame that arrives
/// over many reads costs time linear in its size. The frame is parsed once,
/// when its closing bracket is in the buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    recv_buf: Vec<u8>,
    scanner: FrameScanner,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.recv_buf.extend_from_slice(data);
    }

    /// Take the next complete frame off the buffer, if there is one.
    ///
    /// An error is unrecoverable: the protocol has no resynchronisation
    /// point, so the buffer is left as it was and the caller must stop.
    pub fn next_envelope(&mut self) -> Result<Option<Envelope>> {
        match self.scanner.scan(&self.recv_buf) {
            Scan::Frame { start, end } => {
                let message = self.recv_buf[start..end].to_vec();
                self.recv_buf.drain(..end);
                self.scanner = FrameScanner::default();
                parse_envelope(message).map(Some)
            }
            Scan::Incomplete => {
                if self.scanner.start.is_none() {
                    // Nothing but whitespace so far.
                    self.recv_buf.clear();
                    self.scanner = FrameScanner::default();
                }
                Ok(None)
            }
            Scan::Invalid(error) => Err(Error::Decode(error)),
        }
    }

    /// Whether bytes of an unfinished frame are buffered.
    pub fn has_partial(&self) -> bool {
        self.recv_buf.iter().any(|b| !b.is_ascii_whitespace())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_complete_message() {
        let buf = b"{\"clock\":\"c:123:1\"}\n";
        match parse_message(buf) {
            ParseResult::Complete { message, consumed } => {
                assert_eq!(consumed, buf.len() - 1);
                assert_eq!(message, b"{\"clock\":\"c:123:1\"}");
            }
            r => panic!("Expected complete message, got {:?}", r),
        }
    }

    #[test]
    fn test_parse_incomplete_message() {
        assert_eq!(
            parse_message(b"{\"clock\":\"c:12"),
            ParseResult::Incomplete
        );
        assert_eq!(parse_message(b"  \n"), ParseResult::Incomplete);
        assert_eq!(parse_message(b""), ParseResult::Incomplete);
    }

    #[test]
    fn test_parse_invalid_message() {
        match parse_message(b"}garbage\n") {
            ParseResult::Invalid { .. } => {}
            r => panic!("Expected invalid message, got {:?}", r),
        }
    }

    #[test]
    fn test_parse_skips_leading_whitespace() {
        let buf = b"\n  {\"a\":1}{\"b\":2}";
        match parse_message(buf) {
            ParseResult::Complete { message, consumed } => {
                assert_eq!(message, b"{\"a\":1}");
                assert_eq!(consumed, 10);
            }
            r => panic!("Expected complete message, got {:?}", r),
        }
    }

    #[test]
    fn test_envelope_classification() {
        let env = parse_envelope(b"{\"log\":\"notice: hi\"}".to_vec()).unwrap();
        assert_eq!(env.log.as_deref(), Some("notice: hi"));
        assert!(env.is_push());

        let env = parse_envelope(b"{\"subscription\":\"s1\",\"files\":[]}".to_vec()).unwrap();
        assert_eq!(env.subscription.as_deref(), Some("s1"));
        assert!(env.is_push());

        let env =
            parse_envelope(b"{\"version\":\"4.9.0\",\"error\":\"nope\"}".to_vec()).unwrap();
        assert_eq!(env.error.as_deref(), Some("nope"));
        assert_eq!(env.version.as_deref(), Some("4.9.0"));
        assert!(!env.is_push());
    }

    #[test]
    fn test_envelope_keeps_raw_bytes() {
        let raw = b"{\"clock\":\"c:1:1\",\"warning\":\"recrawl\"}".to_vec();
        let env = parse_envelope(raw.clone()).unwrap();
        assert_eq!(env.raw, raw);
        assert_eq!(env.warning.as_deref(), Some("recrawl"));
    }

    #[test]
    fn test_non_object_frame_is_decode_error() {
        let e = parse_envelope(b"[1,2]".to_vec()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decode);
        let e = parse_envelope(b"[]".to_vec()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decode);
        let e = parse_envelope(b"\"ok\"".to_vec()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_decoder_handles_split_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"log\":\"a\"}\n{\"clo");
        let first = decoder.next_envelope().unwrap().unwrap();
        assert_eq!(first.log.as_deref(), Some("a"));
        assert!(decoder.next_envelope().unwrap().is_none());
        assert!(decoder.has_partial());

        decoder.extend(b"ck\":\"c:1:2\"}\n");
        let second = decoder.next_envelope().unwrap().unwrap();
        assert_eq!(second.raw, b"{\"clock\":\"c:1:2\"}");
        assert!(decoder.next_envelope().unwrap().is_none());
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_decoder_reports_malformed_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{\"log\":]\n");
        let e = decoder.next_envelope().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_serialize_command_round_trip() {
        #[derive(serde_derive::Deserialize, Debug, PartialEq)]
        struct ClockReply {
            clock: String,
        }

        let bytes = serialize_command(Command::new("clock").arg("/tmp/x")).unwrap();
        assert!(bytes.ends_with(b"\n"));
        match parse_message(&bytes) {
            ParseResult::Complete { message, .. } => {
                let sent: Value = serde_json::from_slice(&message).unwrap();
                assert_eq!(sent, serde_json::json!(["clock", "/tmp/x"]));
            }
            r => panic!("Failed to parse serialized command: {:?}", r),
        }

        let env = parse_envelope(b"{\"version\":\"4.9.0\",\"clock\":\"c:123:1\"}".to_vec())
            .unwrap();
        let reply: ClockReply = serde_json::from_slice(&env.raw).unwrap();
        assert_eq!(
            reply,
            ClockReply {
                clock: "c:123:1".into()
            }
        );
    }

    #[test]
    fn test_brackets_inside_strings_do_not_end_a_frame() {
        let frames: &[u8] =
            b"{\"log\":\"} ] \\\" {[\\\\\"}\n {\"files\":[\"a}.rs\",\"b\\\"]\"],\"clock\":\"c:1:9\"}\n";
        // Every split point, one byte at a time.
        for split in 0..frames.len() {
            let mut decoder = FrameDecoder::new();
            let mut got = Vec::new();
            decoder.extend(&frames[..split]);
            while let Some(env) = decoder.next_envelope().unwrap() {
                got.push(env);
            }
            decoder.extend(&frames[split..]);
            while let Some(env) = decoder.next_envelope().unwrap() {
                got.push(env);
            }
            assert_eq!(got.len(), 2, "split at {}", split);
            assert_eq!(got[0].log.as_deref(), Some("} ] \" {[\\"));
            let second: Value = serde_json::from_slice(&got[1].raw).unwrap();
            assert_eq!(second["files"][1], "b\"]");
            assert!(!decoder.has_partial());
        }
    }

    #[test]
    fn test_large_frame_over_many_reads() {
        let files: Vec<Value> = (0..120_000)
            .map(|i| serde_json::json!({"name": format!("src/dir{}/{{file}}-{}.rs", i % 97, i), "exists": true}))
            .collect();
        let mut frame = serde_json::to_vec(&serde_json::json!({
            "clock": "c:1:2",
            "files": files,
        }))
        .unwrap();
        frame.push(b'\n');
        assert!(frame.len() > 4 * 1024 * 1024);

        let started = std::time::Instant::now();
        let mut decoder = FrameDecoder::new();
        let mut found = None;
        for chunk in frame.chunks(8192) {
            decoder.extend(chunk);
            if let Some(env) = decoder.next_envelope().unwrap() {
                assert!(found.is_none());
                found = Some(env);
            }
        }
        let env = found.expect("frame should be complete");
        assert_eq!(env.raw.len(), frame.len() - 1);
        let reply: Value = serde_json::from_slice(&env.raw).unwrap();
        assert_eq!(reply["files"].as_array().unwrap().len(), 120_000);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(20),
            "decoding took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_scalar_at_frame_start_is_invalid() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"  42\n");
        assert_eq!(decoder.next_envelope().unwrap_err().kind(), ErrorKind::Decode);
        match parse_message(b"\"ok\"") {
            ParseResult::Invalid { .. } => {}
            r => panic!("Expected invalid message, got {:?}", r),
        }
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let big = vec![b'x'; 10 * EXCERPT_LEN];
        let text = excerpt(&big);
        assert!(text.len() < EXCERPT_LEN + 32);
        assert!(text.ends_with(&format!("({} bytes)", big.len())));
        assert_eq!(excerpt(b"{}"), "{}");
    }
}
