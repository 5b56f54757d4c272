//! Line codec for intercepted stream traffic.
//!
//! Every relayed line is handled twice: once to produce the human-readable
//! trace entry, and once to convert it into whatever representation the
//! destination stream expects. Both conversions are pure functions over the
//! raw bytes read from the source.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Representation a destination stream expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Destination receives UTF-8 text; invalid input is replaced with U+FFFD.
    Text,
    /// Destination receives the raw bytes exactly as read.
    Binary,
}

/// How a line is decoded for the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Replace invalid UTF-8 with U+FFFD. Never fails.
    #[default]
    Lossy,
    /// Any invalid UTF-8 is a decode failure and is logged as binary data.
    Strict,
}

impl FromStr for DecodePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lossy" => Ok(Self::Lossy),
            "strict" => Ok(Self::Strict),
            other => Err(Error::Config(format!(
                "unknown decode policy '{other}' (expected 'lossy' or 'strict')"
            ))),
        }
    }
}

impl fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lossy => f.write_str("lossy"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

/// Loggable form of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePreview {
    /// Decoded text with trailing line terminators removed.
    Text(String),
    /// Placeholder for a line that could not be decoded.
    Binary { len: usize },
}

impl fmt::Display for LinePreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary { len } => write!(f, "<binary data {len} bytes>"),
        }
    }
}

/// Build the trace representation of a raw line.
///
/// `len` in the binary placeholder counts every raw byte, terminator included.
pub fn preview(line: &[u8], policy: DecodePolicy) -> LinePreview {
    let decoded = match policy {
        DecodePolicy::Lossy => String::from_utf8_lossy(line),
        DecodePolicy::Strict => match std::str::from_utf8(line) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => return LinePreview::Binary { len: line.len() },
        },
    };
    LinePreview::Text(strip_terminators(&decoded).to_owned())
}

/// Convert a raw line into the bytes written to a destination of `mode`.
pub fn convert(line: &[u8], mode: StreamMode) -> Cow<'_, [u8]> {
    match mode {
        StreamMode::Binary => Cow::Borrowed(line),
        StreamMode::Text => match String::from_utf8_lossy(line) {
            Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
            Cow::Owned(text) => Cow::Owned(text.into_bytes()),
        },
    }
}

fn strip_terminators(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn preview_strips_trailing_terminators() {
        assert_eq!(
            preview(b"hello\r\n", DecodePolicy::Lossy),
            LinePreview::Text("hello".into())
        );
        assert_eq!(
            preview(b"two\n\n", DecodePolicy::Lossy),
            LinePreview::Text("two".into())
        );
    }

    #[test]
    fn preview_keeps_inner_whitespace() {
        assert_eq!(
            preview(b"  a\rb  \n", DecodePolicy::Lossy),
            LinePreview::Text("  a\rb  ".into())
        );
    }

    #[test]
    fn preview_final_line_without_terminator() {
        assert_eq!(
            preview(b"tail", DecodePolicy::Lossy),
            LinePreview::Text("tail".into())
        );
    }

    #[test]
    fn lossy_preview_marks_invalid_bytes() {
        let p = preview(b"ok\xff\xfeok\n", DecodePolicy::Lossy);
        let LinePreview::Text(text) = p else {
            panic!("expected text preview");
        };
        assert!(text.contains('\u{FFFD}'));
        assert!(text.starts_with("ok"));
        assert!(text.ends_with("ok"));
    }

    #[test]
    fn strict_preview_falls_back_to_binary_placeholder() {
        let p = preview(b"\x00\xff\xfe\n", DecodePolicy::Strict);
        assert_eq!(p, LinePreview::Binary { len: 4 });
        assert_eq!(p.to_string(), "<binary data 4 bytes>");
    }

    #[test]
    fn strict_preview_accepts_valid_utf8() {
        assert_eq!(
            preview("héllo\n".as_bytes(), DecodePolicy::Strict),
            LinePreview::Text("héllo".into())
        );
    }

    #[test]
    fn binary_conversion_is_identity() {
        let raw = b"\xff\x00abc\n";
        assert_eq!(convert(raw, StreamMode::Binary).as_ref(), raw);
    }

    #[test]
    fn text_conversion_borrows_valid_utf8() {
        let out = convert(b"plain\n", StreamMode::Text);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), b"plain\n");
    }

    #[test]
    fn text_conversion_replaces_invalid_bytes() {
        let out = convert(b"a\xffb\n", StreamMode::Text);
        assert_eq!(out.as_ref(), "a\u{FFFD}b\n".as_bytes());
    }

    #[test]
    fn decode_policy_parses() {
        assert_eq!("lossy".parse::<DecodePolicy>().unwrap(), DecodePolicy::Lossy);
        assert_eq!("strict".parse::<DecodePolicy>().unwrap(), DecodePolicy::Strict);
        assert!("utf16".parse::<DecodePolicy>().is_err());
        assert_eq!(DecodePolicy::default().to_string(), "lossy");
    }
}
