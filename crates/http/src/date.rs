//! HTTP date parsing and formatting.
//!
//! Date-valued headers arrive in three historical shapes: the canonical
//! RFC 1123 form, the obsolete RFC 1036/850 form with a two-digit year, and
//! the ANSI C `asctime` form. Parsing tries them in that order and finally
//! falls back to a raw decimal count of milliseconds since the epoch.
//! Formatting always emits the canonical RFC 1123 / GMT form.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// A date header value that matched none of the supported formats.
///
/// Carries the raw value; the layer that knows which header it came from
/// attaches the header name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparseable http date: {0:?}")]
pub struct InvalidHttpDate(pub String);

const RFC1123: &str = "%a, %d %b %Y %H:%M:%S";
const ASCTIME: &str = "%a %b %d %H:%M:%S %Y";

/// Parses a date header value into milliseconds since the Unix epoch.
///
/// Runs of whitespace are collapsed first, which also absorbs the one-or-two
/// spaces `asctime` puts before a single-digit day.
pub fn parse_http_date(value: &str) -> Result<i64, InvalidHttpDate> {
    let text: String = value.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(dt) = parse_zoned(&text, RFC1123) {
        return Ok(dt.and_utc().timestamp_millis());
    }
    // RFC 1036 is the same shape with a two-digit year, which always means
    // 19xx. The year token is widened before parsing so that chrono's
    // weekday consistency check runs against the 19xx date, not against its
    // own century pivot.
    if let Some(dt) = expand_two_digit_year(&text).and_then(|t| parse_zoned(&t, RFC1123)) {
        return Ok(dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, ASCTIME) {
        // asctime carries no zone and is defined as UTC
        return Ok(dt.and_utc().timestamp_millis());
    }
    if let Ok(millis) = value.trim().parse::<i64>() {
        return Ok(millis);
    }
    Err(InvalidHttpDate(value.to_string()))
}

/// Formats milliseconds since the Unix epoch as the canonical 29-character
/// RFC 1123 form in the GMT zone, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(epoch_millis: i64) -> String {
    let dt = DateTime::from_timestamp_millis(epoch_millis).unwrap_or_else(|| {
        if epoch_millis < 0 { DateTime::<Utc>::MIN_UTC } else { DateTime::<Utc>::MAX_UTC }
    });
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The zone suffix is matched here: chrono cannot parse `%Z` names, and wire
/// dates only ever carry GMT and the occasional UTC/UT spelling.
fn parse_zoned(text: &str, format: &str) -> Option<NaiveDateTime> {
    let naive = text
        .strip_suffix(" GMT")
        .or_else(|| text.strip_suffix(" UTC"))
        .or_else(|| text.strip_suffix(" UT"))?;
    NaiveDateTime::parse_from_str(naive, format).ok()
}

/// Rewrites the year token of `EEE, dd MMM yy HH:mm:ss zzz` as `19yy`.
fn expand_two_digit_year(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split(' ').collect();
    if tokens.len() < 5 {
        return None;
    }
    let year = tokens[3];
    if year.len() != 2 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut expanded: Vec<String> = tokens.iter().map(|t| (*t).to_string()).collect();
    expanded[3] = format!("19{year}");
    Some(expanded.join(" "))
}
