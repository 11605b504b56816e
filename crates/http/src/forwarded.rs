//! Trust-gated resolution of reverse-proxy forwarding headers.
//!
//! A reverse proxy that terminates the client connection injects `Forwarded`
//! (RFC 7239) or the older `X-Forwarded-For` / `X-Forwarded-Proto` headers to
//! describe the original client. Honoring them blindly lets any client spoof
//! its own address, so every resolution here is gated on a [`TrustPolicy`]
//! evaluated against the physical peer address. An untrusted peer always
//! resolves to nothing and callers fall back to the transport-level address.

use std::net::SocketAddr;

use http::header::FORWARDED;
use http::{HeaderMap, HeaderName};
use tracing::{debug, trace};

use crate::tokenizer;

fn x_forwarded_for() -> HeaderName {
    HeaderName::from_static("x-forwarded-for")
}

fn x_forwarded_proto() -> HeaderName {
    HeaderName::from_static("x-forwarded-proto")
}

/// Predicate over the physical remote address, deciding whether that peer is
/// a proxy whose forwarding headers may be honored.
pub type TrustedProxyPredicate = dyn Fn(&SocketAddr) -> bool + Send + Sync;

/// Policy for honoring proxy-supplied forwarding headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Honor forwarding headers from any peer.
    All,
    /// Never honor forwarding headers.
    #[default]
    None,
    /// Honor forwarding headers only from peers accepted by the configured
    /// allowlist predicate. Without a predicate (or without a peer address)
    /// this denies.
    Allowlist,
}

/// One resolved `for=` actor: a host and an optional port.
///
/// `host` is either a hostname, an IPv4 literal, or a bracket-stripped IPv6
/// literal. Instances are only produced by [`resolve_client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedClient {
    host: String,
    port: Option<u16>,
}

impl ForwardedClient {
    /// Returns the client host as it appeared in the header, brackets stripped.
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the client port, if one was present and parseable.
    #[inline]
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

/// Evaluates the trust gate for a physical peer.
pub fn is_trusted(
    policy: TrustPolicy,
    predicate: Option<&TrustedProxyPredicate>,
    remote: Option<SocketAddr>,
) -> bool {
    match policy {
        TrustPolicy::All => true,
        TrustPolicy::None => false,
        TrustPolicy::Allowlist => match (predicate, remote) {
            (Some(predicate), Some(addr)) => predicate(&addr),
            _ => false,
        },
    }
}

/// Resolves the original client identity from forwarding headers.
///
/// `Forwarded` wins over `X-Forwarded-For`; within either, the first usable
/// entry wins (proxies append to the right, so the left-most entry is the
/// original client). Returns `None` when the peer is untrusted or no entry is
/// usable; the caller then falls back to the transport address.
pub fn resolve_client(
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
    policy: TrustPolicy,
    predicate: Option<&TrustedProxyPredicate>,
) -> Option<ForwardedClient> {
    if !is_trusted(policy, predicate, remote) {
        debug!(?remote, "forwarding headers not trusted for peer");
        return None;
    }
    from_forwarded(headers).or_else(|| from_x_forwarded_for(headers))
}

/// Resolves the original request scheme from forwarding headers.
///
/// The `proto=` parameter of `Forwarded` wins over `X-Forwarded-Proto`.
/// Returns `None` when the peer is untrusted or no value is present; the
/// caller keeps the transport-level scheme.
pub fn resolve_scheme(
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
    policy: TrustPolicy,
    predicate: Option<&TrustedProxyPredicate>,
) -> Option<String> {
    if !is_trusted(policy, predicate, remote) {
        return None;
    }

    for value in headers.get_all(&FORWARDED) {
        let Ok(value) = value.to_str() else { continue };
        for entry in tokenizer::split(value, ',') {
            if let Some(proto) = entry_param(entry, "proto") {
                return Some(proto.to_ascii_lowercase());
            }
        }
    }

    let value = headers.get(x_forwarded_proto())?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_ascii_lowercase())
}

fn from_forwarded(headers: &HeaderMap) -> Option<ForwardedClient> {
    for value in headers.get_all(&FORWARDED) {
        let Ok(value) = value.to_str() else { continue };
        for entry in tokenizer::split(value, ',') {
            let Some(for_value) = entry_param(entry, "for") else { continue };
            if let Some(client) = parse_for_value(for_value) {
                trace!(host = %client.host, "resolved client from forwarded header");
                return Some(client);
            }
        }
    }
    None
}

fn from_x_forwarded_for(headers: &HeaderMap) -> Option<ForwardedClient> {
    for value in headers.get_all(x_forwarded_for()) {
        let Ok(value) = value.to_str() else { continue };
        for token in value.split(',') {
            if let Some(client) = parse_for_value(strip_quotes(token.trim())) {
                trace!(host = %client.host, "resolved client from x-forwarded-for header");
                return Some(client);
            }
        }
    }
    None
}

/// Returns the value of the first parameter named `name` in a `Forwarded`
/// entry, with one layer of surrounding quotes stripped.
fn entry_param<'a>(entry: &'a str, name: &str) -> Option<&'a str> {
    for param in tokenizer::split(entry, ';') {
        let Some((key, value)) = param.split_once('=') else { continue };
        if key.trim().eq_ignore_ascii_case(name) {
            return Some(strip_quotes(value.trim()));
        }
    }
    None
}

fn strip_quotes(value: &str) -> &str {
    value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value)
}

/// Parses one trimmed `for=` token into host and optional port.
///
/// Rejects the RFC 7239 `unknown` identifier and obfuscated (`_`-prefixed)
/// identifiers. Unparseable port digits are dropped, not an error. A token
/// with two or more colons and no brackets is taken whole as a host with no
/// port; an unbracketed IPv6 literal with an appended port is therefore
/// misread as a longer host. That ambiguity is long-standing behavior and is
/// kept as-is.
fn parse_for_value(token: &str) -> Option<ForwardedClient> {
    if token.is_empty() || token.eq_ignore_ascii_case("unknown") || token.starts_with('_') {
        return None;
    }

    if let Some(rest) = token.strip_prefix('[') {
        let close = rest.find(']')?;
        let host = &rest[..close];
        if host.is_empty() {
            return None;
        }
        let after = &rest[close + 1..];
        let port = if after.is_empty() {
            None
        } else {
            after.strip_prefix(':')?.parse::<u16>().ok()
        };
        return Some(ForwardedClient { host: host.to_string(), port });
    }

    match token.matches(':').count() {
        0 => Some(ForwardedClient { host: token.to_string(), port: None }),
        1 => {
            let (host, port) = token.split_once(':')?;
            if host.is_empty() {
                return None;
            }
            Some(ForwardedClient { host: host.to_string(), port: port.parse::<u16>().ok() })
        }
        _ => Some(ForwardedClient { host: token.to_string(), port: None }),
    }
}
