//! `Cookie` request header parsing.
//!
//! A request may carry several `Cookie` headers, each holding `;`-separated
//! name/value components. Values may be quoted-strings with backslash escapes.
//! Parsing is tolerant by contract: malformed components are skipped, never
//! surfaced as errors, and a missing header yields an empty list.

use http::HeaderMap;
use http::header::COOKIE;
use tracing::trace;

use crate::tokenizer;

/// A single name/value pair taken from a `Cookie` header.
///
/// The value has been unquoted and unescaped if it arrived as a quoted-string.
/// The same name may appear more than once; encounter order is preserved and
/// name comparison is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
}

impl Cookie {
    /// Returns the cookie name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cookie value, unquoted and unescaped.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Parses every `Cookie` header in `headers`, in header-insertion order.
///
/// Components without a `=`, or with an empty name, are discarded. An explicit
/// empty value (`name=`) is kept as the empty string, not treated as missing.
pub fn parse_cookie_headers(headers: &HeaderMap) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else {
            trace!("skipping cookie header with non-visible-ascii bytes");
            continue;
        };
        parse_cookie_value(value.trim(), &mut cookies);
    }
    cookies
}

fn parse_cookie_value(value: &str, out: &mut Vec<Cookie>) {
    for component in tokenizer::split(value, ';') {
        let component = component.trim();
        let Some((name, raw_value)) = component.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        out.push(Cookie { name: name.to_string(), value: unquote(raw_value.trim()) });
    }
}

/// Strips one layer of surrounding quotes and resolves backslash escapes.
///
/// `\x` becomes `x` for any `x`; a trailing lone backslash is kept literally.
/// Values that are not quoted-strings (including a single `"`) pass through
/// unchanged.
fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
