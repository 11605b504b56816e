//! Spec-correct parsing of HTTP request metadata headers
//!
//! This crate provides the protocol-level half of the `canon` workspace: small,
//! stateless parsers for the header families whose wire grammar is easy to get
//! subtly wrong. It has no I/O and no request/response object model of its own;
//! it operates on an [`http::HeaderMap`] that the surrounding layer has already
//! materialized.
//!
//! # Features
//!
//! - Quoted-string aware tokenizing of delimited header values
//! - `Cookie` header parsing with quoted-value unescaping
//! - Trust-gated `Forwarded` / `X-Forwarded-For` / `X-Forwarded-Proto`
//!   resolution, including bracketed IPv6 literals
//! - Multi-format HTTP date parsing and canonical RFC 1123 formatting
//! - Tolerant by contract: adversarial header input degrades to fewer results,
//!   never to an error
//!
//! # Example
//!
//! ```
//! use http::HeaderMap;
//! use canon_http::forwarded::{self, TrustPolicy};
//! use canon_http::{cookie, date};
//!
//! let mut headers = HeaderMap::new();
//! headers.insert(http::header::COOKIE, "session=abc123; theme=\"dark\"".parse().unwrap());
//! headers.insert(http::header::FORWARDED, "for=203.0.113.195;proto=https".parse().unwrap());
//!
//! let cookies = cookie::parse_cookie_headers(&headers);
//! assert_eq!(cookies[0].name(), "session");
//! assert_eq!(cookies[1].value(), "dark");
//!
//! let client = forwarded::resolve_client(&headers, None, TrustPolicy::All, None).unwrap();
//! assert_eq!(client.host(), "203.0.113.195");
//!
//! let millis = date::parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
//! assert_eq!(date::format_http_date(millis), "Sun, 06 Nov 1994 08:49:37 GMT");
//! ```
//!
//! # Architecture
//!
//! The crate is organized into leaf modules with no shared state:
//!
//! - [`tokenizer`]: quoted-string aware splitting, the innermost loop of
//!   cookie and forwarded parsing
//! - [`cookie`]: `Cookie` header values into ordered name/value pairs
//! - [`forwarded`]: reverse-proxy client and scheme resolution behind a
//!   [`forwarded::TrustPolicy`]
//! - [`date`]: the HTTP date codec
//!
//! # Error Handling
//!
//! Malformed-but-tolerable input (an unparseable cookie pair, an `unknown`
//! forwarded actor, bad port digits) is skipped silently and processing moves
//! to the next candidate. The only surfaced parse error in this crate is
//! [`date::InvalidHttpDate`], raised once every fallback format has been
//! exhausted.

pub mod cookie;
pub mod date;
pub mod forwarded;
pub mod tokenizer;
