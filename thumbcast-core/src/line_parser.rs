//! Incremental line splitting for process output streams.
//!
//! Child processes hand us arbitrary chunks; a line may be split across
//! several reads and a single read may carry many lines. [`LineParser`] keeps
//! the unterminated tail between calls so every complete line is yielded
//! exactly once, and [`ChunkDecoder`] makes sure a UTF-8 sequence split
//! across two reads is reassembled before it reaches the parser.

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n").expect("valid line break regex"));

/// Accumulates text chunks and yields complete lines.
#[derive(Debug, Default, Clone)]
pub struct LineParser {
    buffer: String,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line completed by it, in order.
    ///
    /// Both `\n` and `\r\n` terminate a line; terminators are not part of the
    /// returned lines. The trailing unterminated piece (possibly empty) stays
    /// buffered for the next call.
    pub fn add(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut pieces: Vec<&str> = LINE_BREAK.split(&self.buffer).collect();
        if pieces.len() == 1 {
            return Vec::new();
        }

        let rest = pieces.pop().unwrap_or_default().to_string();
        let lines = pieces.into_iter().map(str::to_string).collect();
        self.buffer = rest;
        lines
    }

    /// Return and clear whatever partial line is still buffered.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Turns raw byte reads into text without splitting multi-byte characters.
///
/// Bytes that can never form valid UTF-8 are replaced with U+FFFD; a valid but
/// incomplete sequence at the end of a read is held until the next read.
#[derive(Debug, Default, Clone)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.carry.len());
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.carry[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.carry.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = start + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.carry[start..valid_up_to]));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_up_to + invalid;
                        }
                        None => {
                            start = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.carry.drain(..start);
        out
    }

    /// Decode whatever is left at end of stream, replacing a truncated sequence.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut LineParser, chunks: &[&str]) -> Vec<String> {
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(parser.add(chunk));
        }
        lines
    }

    #[test]
    fn holds_back_unterminated_chunk() {
        let mut parser = LineParser::new();
        assert!(parser.add("frame=").is_empty());
        assert!(parser.has_partial());
        assert_eq!(parser.add("  12\n"), vec!["frame=  12".to_string()]);
        assert!(!parser.has_partial());
    }

    #[test]
    fn splits_lf_and_crlf() {
        let mut parser = LineParser::new();
        let lines = parser.add("a\r\nb\nc\r\n\nd");
        assert_eq!(lines, vec!["a", "b", "c", ""]);
        assert_eq!(parser.flush(), "d");
        assert_eq!(parser.flush(), "");
    }

    #[test]
    fn crlf_split_across_chunks() {
        let mut parser = LineParser::new();
        assert!(parser.add("one\r").is_empty());
        assert_eq!(parser.add("\ntwo"), vec!["one"]);
        assert_eq!(parser.flush(), "two");
    }

    #[test]
    fn every_split_point_reassembles_the_input() {
        let input = "[Parsed_showinfo_1 @ 0x1] n:   0 pts:      0\r\nframe=    1\nlast line";
        let expected: Vec<&str> = input.split("\r\n").flat_map(|l| l.split('\n')).collect();

        for first in 0..=input.len() {
            for second in first..=input.len() {
                let chunks = [&input[..first], &input[first..second], &input[second..]];
                let mut parser = LineParser::new();
                let mut lines = feed(&mut parser, &chunks);
                lines.push(parser.flush());
                assert_eq!(lines, expected, "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn decoder_reassembles_split_characters() {
        let text = "größe: 320×180";
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = ChunkDecoder::new();
            let mut out = decoder.decode(&bytes[..split]);
            out.push_str(&decoder.decode(&bytes[split..]));
            out.push_str(&decoder.finish());
            assert_eq!(out, text, "split at {split}");
        }
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(b"ok\xffok"), "ok\u{FFFD}ok");
        assert_eq!(decoder.decode(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
