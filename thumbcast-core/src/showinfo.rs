//! Parser for the per-frame diagnostics printed by ffmpeg's `showinfo` filter.
//!
//! A typical line on stderr looks like:
//!
//! ```text
//! [Parsed_showinfo_1 @ 0x55d0c8a1e2c0] n:   3 pts:  30720 pts_time:30.03 pos:  1829632 fmt:yuv420p sar:1/1 s:320x180 i:P iskey:0 type:P
//! ```
//!
//! Lines that are not frame diagnostics (banner, progress, the filter's own
//! config lines) yield no record. Nothing in here ever fails loudly: malformed
//! tokens are skipped and unparseable numbers become `None`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::request::FileNameTemplate;
use crate::thumbnail::Thumbnail;

static SHOWINFO_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[Parsed_showinfo.*?\] (.*)").expect("valid showinfo regex")
});

/// Split `input` into `key:value` pairs.
///
/// Keys are runs of word characters. The value is the text after the colon;
/// when the colon is followed by whitespace (ffmpeg pads numbers, `n:   3`)
/// the next whitespace-separated token is taken instead, unless that token is
/// itself a `key:value` pair. Tokens without a usable key are skipped.
pub fn tokenize(input: &str) -> Vec<(&str, &str)> {
    let mut entries = Vec::new();
    let mut tokens = input.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        if !is_word(key) {
            continue;
        }
        if !value.is_empty() {
            entries.push((key, value));
            continue;
        }
        if let Some(next) = tokens.next_if(|next| !next.contains(':')) {
            entries.push((key, next));
        }
    }

    entries
}

/// Build a key → raw value map; a repeated key keeps its last value.
pub fn fields(input: &str) -> HashMap<&str, &str> {
    tokenize(input).into_iter().collect()
}

/// Extract a [`Thumbnail`] from one stderr line, if it describes a frame.
pub fn parse_line(line: &str, template: &FileNameTemplate) -> Option<Thumbnail> {
    let captures = SHOWINFO_LINE.captures(line)?;
    let body = captures.get(1)?.as_str();

    let fields = fields(body);
    if fields.is_empty() {
        return None;
    }

    let n = parse_index(fields.get("n")?)?;

    Some(Thumbnail {
        n,
        file: template.path(n),
        pts: fields.get("pts").and_then(|v| parse_integer(v)),
        pts_time: fields.get("pts_time").and_then(|v| parse_integer(v)),
        pos: fields.get("pos").and_then(|v| parse_integer(v)),
        size: fields.get("s").map(|v| v.to_string()).unwrap_or_default(),
    })
}

// Negative, fractional or non-numeric indices produce no record.
fn parse_index(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

/// Permissive integer parse: accepts plain integers and truncates decimals.
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

fn is_word(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
