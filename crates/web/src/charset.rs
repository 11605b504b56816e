//! Character set model for request decoding and response encoding.
//!
//! The wire contract this layer implements predates UTF-8 defaults: when
//! nothing names a charset, body bytes are read as ISO-8859-1. The enum here
//! covers the charsets that contract deals in; lookup is by IANA label or
//! common alias, case-insensitive.

use std::fmt;

/// A resolved character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8.
    Utf8,
    /// ISO-8859-1 (Latin-1), the historical default for HTTP bodies.
    Iso8859_1,
    /// US-ASCII.
    UsAscii,
}

impl Charset {
    /// Looks a charset up by IANA label or alias, case-insensitively.
    ///
    /// Returns `None` for labels this layer does not deal in; callers decide
    /// whether that is a tolerable condition (a charset parameter inside a
    /// Content-Type header) or a caller error (an explicit override).
    pub fn for_label(label: &str) -> Option<Charset> {
        let label = label.trim();
        const UTF8: &[&str] = &["utf-8", "utf8", "unicode-1-1-utf-8"];
        const LATIN1: &[&str] = &["iso-8859-1", "iso8859-1", "iso_8859-1", "latin-1", "latin1", "l1", "cp819"];
        const ASCII: &[&str] = &["us-ascii", "ascii", "ansi_x3.4-1968", "iso646-us"];

        if UTF8.iter().any(|l| label.eq_ignore_ascii_case(l)) {
            Some(Charset::Utf8)
        } else if LATIN1.iter().any(|l| label.eq_ignore_ascii_case(l)) {
            Some(Charset::Iso8859_1)
        } else if ASCII.iter().any(|l| label.eq_ignore_ascii_case(l)) {
            Some(Charset::UsAscii)
        } else {
            None
        }
    }

    /// Returns the canonical IANA name.
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::UsAscii => "US-ASCII",
        }
    }

    /// Decodes bytes into text, replacing unmappable input rather than failing.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Iso8859_1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Charset::UsAscii => {
                bytes.iter().map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER }).collect()
            }
        }
    }

    /// Encodes text into bytes, substituting `?` for unmappable characters.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Iso8859_1 => {
                text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')).collect()
            }
            Charset::UsAscii => {
                text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }).collect()
            }
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
