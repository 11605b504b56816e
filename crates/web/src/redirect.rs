//! Redirect `Location` computation per RFC 3986.
//!
//! A redirect target may be absolute, network-path (`//authority/...`),
//! root-relative, or relative to the request path. Only the last two are
//! rebuilt against the originating request's scheme and authority; absolute
//! and network-path targets pass through verbatim — re-encoding a URL the
//! caller already formed would corrupt it.

use std::borrow::Cow;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters that cannot appear raw in a path produced by a relative merge.
/// `%` is absent so escapes already present in the target survive.
const PATH_ENCODE_SET: &AsciiSet =
    &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`').add(b'{').add(b'}').add(b'|').add(b'\\').add(b'^');

/// Resolves a redirect target into the value to send as `Location`.
///
/// `origin_port` of `None` means the origin used the default port for its
/// scheme; an explicit default port is elided from the result either way.
/// `request_path` is the raw path of the request being answered and anchors
/// relative targets at its parent segment.
pub fn resolve_location(
    target: &str,
    origin_scheme: &str,
    origin_host: &str,
    origin_port: Option<u16>,
    request_path: &str,
) -> String {
    if target.starts_with("//") {
        // network-path reference: same scheme, caller-chosen authority
        return target.to_string();
    }
    if has_scheme(target) {
        return target.to_string();
    }

    let authority = authority(origin_scheme, origin_host, origin_port);
    if target.starts_with('/') {
        return format!("{origin_scheme}://{authority}{target}");
    }

    let merged = merge_with_parent(request_path, target);
    let normalized = remove_dot_segments(&merged);
    let encoded = encode_path(&normalized);
    format!("{origin_scheme}://{authority}{encoded}")
}

/// True when the target carries its own scheme (RFC 3986 `scheme ":"`),
/// making it an absolute reference.
fn has_scheme(target: &str) -> bool {
    let Some(end) = target.find([':', '/', '?', '#']) else {
        return false;
    };
    if !target[end..].starts_with(':') {
        return false;
    }
    let scheme = &target[..end];
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Merges a relative target onto the parent of the request path
/// (RFC 3986 §5.3): everything up to and including the last `/`, or `/`
/// when the path has no further `/`.
fn merge_with_parent(request_path: &str, target: &str) -> String {
    match request_path.rfind('/') {
        Some(idx) => format!("{}{}", &request_path[..=idx], target),
        None => format!("/{target}"),
    }
}

/// Collapses `.` and `..` segments (RFC 3986 §5.2.4). Input and output are
/// absolute paths; `..` at the root is ignored. A trailing `.`/`..` keeps
/// the directory form with a trailing slash.
fn remove_dot_segments(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                output.pop();
            }
            segment => output.push(segment),
        }
    }

    let mut result = String::with_capacity(path.len());
    result.push('/');
    result.push_str(&output.join("/"));

    let directory_form = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if directory_form && !result.ends_with('/') {
        result.push('/');
    }
    result
}

fn encode_path(path: &str) -> Cow<'_, str> {
    utf8_percent_encode(path, PATH_ENCODE_SET).into()
}

/// Builds the authority part: a bare IPv6 host is bracketed, a default port
/// for the scheme is elided.
fn authority(scheme: &str, host: &str, port: Option<u16>) -> String {
    let host: Cow<'_, str> = if host.contains(':') && !host.starts_with('[') {
        Cow::Owned(format!("[{host}]"))
    } else {
        Cow::Borrowed(host)
    };
    match port {
        Some(port) if !is_default_port(scheme, port) => format!("{host}:{port}"),
        _ => host.into_owned(),
    }
}

fn is_default_port(scheme: &str, port: u16) -> bool {
    match scheme {
        "http" | "ws" => port == 80,
        "https" | "wss" => port == 443,
        _ => false,
    }
}
