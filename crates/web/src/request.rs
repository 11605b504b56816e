//! Request-side normalization over raw request parts.
//!
//! A [`RequestContext`] owns one request's raw material (method, path, query,
//! headers, body bytes, peer addresses) and derives the canonical values the
//! framework layer exposes: cookies, the trust-gated client identity and
//! scheme, the effective body charset, and the merged parameter table.
//! Derivations are lazy and memoized; the mutually-exclusive body access
//! styles and the charset-override window are enforced with one-way state
//! latches rather than with locks — an instance belongs to one owner and is
//! not thread-safe by contract.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::uri::Authority;
use http::{HeaderMap, HeaderValue, Method};
use mime::Mime;
use once_cell::unsync::OnceCell;
use tracing::{debug, trace};

use canon_http::cookie::{self, Cookie};
use canon_http::date;
use canon_http::forwarded::{self, ForwardedClient};

use crate::charset::Charset;
use crate::context::ServerContext;
use crate::error::RequestError;
use crate::params::{self, ParamTable};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Which of the two mutually exclusive body access styles a request has
/// committed to. The transition away from `Unspecified` happens once, on
/// first body access, and is never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    #[default]
    Unspecified,
    ByteStream,
    CharReader,
}

/// Normalized view over one request's raw parts.
///
/// Not thread-safe: all mutation runs through `&mut self` and instances are
/// meant to live and die on one thread, one request at a time.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    raw_path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    base_scheme: String,
    context: Arc<ServerContext>,

    cookies: OnceCell<Vec<Cookie>>,
    forwarded_client: OnceCell<Option<ForwardedClient>>,
    forwarded_scheme: OnceCell<Option<String>>,
    explicit_charset: Option<Charset>,
    effective_charset: Option<Charset>,
    read_mode: ReadMode,
    params: Option<ParamTable>,
    params_accessed: bool,
    body_consumed: bool,
}

impl RequestContext {
    /// Starts building a request from raw parts.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Returns the HTTP method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the raw, undecoded request path.
    #[inline]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Returns the raw query string, without the leading `?`.
    #[inline]
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the raw request headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configuration snapshot this request was built with.
    #[inline]
    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Returns the physical peer address, ungated by any trust policy.
    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the parsed Content-Type, if one is present and well-formed.
    pub fn content_type(&self) -> Option<Mime> {
        let value = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        value.trim().parse::<Mime>().ok()
    }

    /// Returns the cookies sent with this request, parsed once and cached.
    pub fn cookies(&self) -> &[Cookie] {
        self.cookies.get_or_init(|| cookie::parse_cookie_headers(&self.headers))
    }

    /// Returns the forwarded client resolved under the configured trust
    /// policy, or `None` when untrusted or unresolvable.
    pub fn forwarded_client(&self) -> Option<&ForwardedClient> {
        self.forwarded_client
            .get_or_init(|| {
                forwarded::resolve_client(
                    &self.headers,
                    self.peer_addr,
                    self.context.trust_policy(),
                    self.context.trusted_proxies(),
                )
            })
            .as_ref()
    }

    /// Returns the client host: the forwarded one when trusted, otherwise the
    /// transport peer address.
    pub fn remote_host(&self) -> Option<String> {
        match self.forwarded_client() {
            Some(client) => Some(client.host().to_string()),
            None => self.peer_addr.map(|addr| addr.ip().to_string()),
        }
    }

    /// Returns the client port, `0` when nothing supplied one.
    pub fn remote_port(&self) -> u16 {
        match self.forwarded_client() {
            Some(client) => client.port().unwrap_or(0),
            None => self.peer_addr.map_or(0, |addr| addr.port()),
        }
    }

    /// Returns the request scheme: the forwarded one when trusted, otherwise
    /// the scheme of the transport this request arrived on.
    pub fn scheme(&self) -> &str {
        self.forwarded_scheme
            .get_or_init(|| {
                forwarded::resolve_scheme(
                    &self.headers,
                    self.peer_addr,
                    self.context.trust_policy(),
                    self.context.trusted_proxies(),
                )
            })
            .as_deref()
            .unwrap_or(&self.base_scheme)
    }

    /// Returns the server host this request addressed: the `Host` header
    /// authority when present, else the local address, else `localhost`.
    pub fn server_name(&self) -> String {
        if let Some(authority) = self.host_authority() {
            return authority.host().to_string();
        }
        match self.local_addr {
            Some(addr) => addr.ip().to_string(),
            None => "localhost".to_string(),
        }
    }

    /// Returns the addressed port; `None` means the default for the scheme.
    pub fn server_port(&self) -> Option<u16> {
        match self.host_authority() {
            Some(authority) => authority.port_u16(),
            None => self.local_addr.map(|addr| addr.port()),
        }
    }

    /// Returns the effective charset for reading this request's body and
    /// parameters: an explicit override or Content-Type charset first, then
    /// the context default, then ISO-8859-1. Computed lazily and cached.
    pub fn charset(&mut self) -> Charset {
        if let Some(charset) = self.effective_charset {
            return charset;
        }
        let charset = self
            .explicit_charset
            .or_else(|| self.content_type_charset())
            .or_else(|| self.context.default_request_charset())
            .unwrap_or(Charset::Iso8859_1);
        self.effective_charset = Some(charset);
        charset
    }

    /// Overrides the request charset.
    ///
    /// A no-op once parameters or the body have been read — the read-once
    /// guarantee outranks late configuration. An unknown label is a caller
    /// error and is surfaced.
    pub fn set_character_encoding(&mut self, label: &str) -> Result<(), RequestError> {
        if self.params_accessed || self.read_mode != ReadMode::Unspecified {
            debug!(label, "charset override ignored: request content already read");
            return Ok(());
        }
        let charset = Charset::for_label(label).ok_or_else(|| RequestError::unsupported_encoding(label))?;
        self.explicit_charset = Some(charset);
        self.effective_charset = None;
        Ok(())
    }

    /// Parses a date-valued header into epoch milliseconds.
    ///
    /// An absent header is `Ok(None)`; a present but unparseable value is an
    /// error carrying the header name and the raw value.
    pub fn date_header(&self, name: &str) -> Result<Option<i64>, RequestError> {
        let Some(value) = self.headers.get(name) else {
            return Ok(None);
        };
        let text = value.to_str().map_err(|_| RequestError::invalid_date_header(name, "<non-ascii>"))?;
        date::parse_http_date(text)
            .map(Some)
            .map_err(|_| RequestError::invalid_date_header(name, text))
    }

    /// Returns the raw body bytes, committing this request to byte-stream
    /// access.
    ///
    /// Empty once form parameters have consumed the body; an error if the
    /// request already committed to reader access.
    pub fn body_bytes(&mut self) -> Result<Bytes, RequestError> {
        if self.read_mode == ReadMode::CharReader {
            return Err(RequestError::read_mode_conflict("reader"));
        }
        if self.read_mode == ReadMode::Unspecified {
            trace!("request committed to byte-stream access");
            self.read_mode = ReadMode::ByteStream;
        }
        if self.body_consumed {
            return Ok(Bytes::new());
        }
        Ok(self.body.clone())
    }

    /// Returns the body decoded with the effective charset, committing this
    /// request to reader access.
    ///
    /// Empty once form parameters have consumed the body; an error if the
    /// request already committed to byte-stream access.
    pub fn body_text(&mut self) -> Result<String, RequestError> {
        if self.read_mode == ReadMode::ByteStream {
            return Err(RequestError::read_mode_conflict("byte stream"));
        }
        if self.read_mode == ReadMode::Unspecified {
            trace!("request committed to reader access");
            self.read_mode = ReadMode::CharReader;
        }
        let charset = self.charset();
        if self.body_consumed {
            return Ok(String::new());
        }
        Ok(charset.decode(&self.body))
    }

    /// Returns the first value of a parameter, query values winning over
    /// form values.
    pub fn parameter(&mut self, name: &str) -> Option<&str> {
        self.ensure_params().value(name)
    }

    /// Returns every value of a parameter: query values first, then form
    /// values, each in encounter order.
    pub fn parameter_values(&mut self, name: &str) -> Option<&[String]> {
        self.ensure_params().values(name)
    }

    /// Iterates parameter names in first-appearance order.
    pub fn parameter_names(&mut self) -> impl Iterator<Item = &str> {
        self.ensure_params().names()
    }

    /// Returns the full parameter table. Repeated calls return the same
    /// cached table.
    pub fn parameter_map(&mut self) -> &ParamTable {
        self.ensure_params()
    }

    /// Builds (once) and returns the parameter table, latching
    /// "parameters accessed" so later charset overrides become no-ops.
    fn ensure_params(&mut self) -> &ParamTable {
        self.params_accessed = true;
        let table = match self.params.take() {
            Some(table) => table,
            None => self.build_params(),
        };
        self.params.insert(table)
    }

    fn build_params(&mut self) -> ParamTable {
        let charset = self.charset();
        let mut table = ParamTable::default();

        if let Some(query) = &self.query {
            for (name, value) in params::parse_pairs(query.as_bytes(), charset) {
                table.append(name, value);
            }
        }

        if self.read_mode == ReadMode::Unspecified && self.is_form_content() && !self.body.is_empty() {
            for (name, value) in params::parse_pairs(&self.body, charset) {
                table.append(name, value);
            }
            // the body has been interpreted; raw access now sees it empty
            self.body_consumed = true;
            trace!("form body consumed into parameter table");
        }

        table
    }

    /// Exact media-type match: a charset or boundary parameter disqualifies.
    fn is_form_content(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim().eq_ignore_ascii_case(FORM_URLENCODED))
    }

    fn content_type_charset(&self) -> Option<Charset> {
        // an unrecognized charset label inside Content-Type is tolerable
        // wire input and is ignored
        let mime = self.content_type()?;
        let label = mime.get_param(mime::CHARSET)?;
        Charset::for_label(label.as_str())
    }

    fn host_authority(&self) -> Option<Authority> {
        let value = self.headers.get(http::header::HOST)?.to_str().ok()?;
        value.trim().parse::<Authority>().ok()
    }
}

/// Builder assembling a [`RequestContext`] from raw parts.
#[derive(Debug)]
pub struct RequestContextBuilder {
    method: Method,
    raw_path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    scheme: String,
    context: Arc<ServerContext>,
}

impl Default for RequestContextBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            raw_path: "/".to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            peer_addr: None,
            local_addr: None,
            scheme: "http".to_string(),
            context: Arc::new(ServerContext::default()),
        }
    }
}

impl RequestContextBuilder {
    /// Sets the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the raw request path.
    pub fn path<S: Into<String>>(mut self, path: S) -> Self {
        self.raw_path = path.into();
        self
    }

    /// Sets the raw query string (no leading `?`).
    pub fn query<S: Into<String>>(mut self, query: S) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Appends one header.
    pub fn header<K: http::header::IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the whole header map.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the materialized body bytes.
    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the physical peer address.
    pub fn peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Sets the local (server-side) address.
    pub fn local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Sets the transport-level scheme, `http` by default.
    pub fn scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Attaches the configuration snapshot.
    pub fn context(mut self, context: Arc<ServerContext>) -> Self {
        self.context = context;
        self
    }

    /// Assembles the request context.
    pub fn build(self) -> RequestContext {
        RequestContext {
            method: self.method,
            raw_path: self.raw_path,
            query: self.query,
            headers: self.headers,
            body: self.body,
            peer_addr: self.peer_addr,
            local_addr: self.local_addr,
            base_scheme: self.scheme,
            context: self.context,
            cookies: OnceCell::new(),
            forwarded_client: OnceCell::new(),
            forwarded_scheme: OnceCell::new(),
            explicit_charset: None,
            effective_charset: None,
            read_mode: ReadMode::default(),
            params: None,
            params_accessed: false,
            body_consumed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_http::forwarded::TrustPolicy;
    use std::net::{IpAddr, Ipv4Addr};

    fn trust_all() -> Arc<ServerContext> {
        Arc::new(ServerContext::builder().trust_policy(TrustPolicy::All).build().unwrap())
    }

    fn peer(ip: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port)
    }

    fn form_request() -> RequestContext {
        RequestContext::builder()
            .method(Method::POST)
            .path("/submit")
            .query("a=query&shared=from-query")
            .header(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED))
            .body("b=form&shared=from-form")
            .build()
    }

    #[test]
    fn cookies_are_parsed_once() {
        let req = RequestContext::builder()
            .header(http::header::COOKIE, HeaderValue::from_static("a=1; b=2"))
            .build();
        assert_eq!(req.cookies().len(), 2);
        assert_eq!(req.cookies()[0].name(), "a");
    }

    #[test]
    fn charset_defaults_to_latin1() {
        let mut req = RequestContext::builder().build();
        assert_eq!(req.charset(), Charset::Iso8859_1);
    }

    #[test]
    fn charset_comes_from_content_type() {
        let mut req = RequestContext::builder()
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .build();
        assert_eq!(req.charset(), Charset::Utf8);
    }

    #[test]
    fn unknown_content_type_charset_is_ignored() {
        let mut req = RequestContext::builder()
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=klingon"))
            .build();
        assert_eq!(req.charset(), Charset::Iso8859_1);
    }

    #[test]
    fn charset_falls_back_to_context_default() {
        let context = Arc::new(ServerContext::builder().default_request_charset("utf-8").build().unwrap());
        let mut req = RequestContext::builder().context(context).build();
        assert_eq!(req.charset(), Charset::Utf8);
    }

    #[test]
    fn explicit_override_wins_and_unknown_label_errors() {
        let mut req = RequestContext::builder()
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .build();
        req.set_character_encoding("latin1").unwrap();
        assert_eq!(req.charset(), Charset::Iso8859_1);

        let err = req.set_character_encoding("klingon").unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn override_after_parameter_access_is_ignored() {
        let mut req = RequestContext::builder().query("a=1").build();
        assert_eq!(req.parameter("a"), Some("1"));
        req.set_character_encoding("utf-8").unwrap();
        assert_eq!(req.charset(), Charset::Iso8859_1);
    }

    #[test]
    fn override_after_body_access_is_ignored() {
        let mut req = RequestContext::builder().body("x").build();
        req.body_bytes().unwrap();
        req.set_character_encoding("utf-8").unwrap();
        assert_eq!(req.charset(), Charset::Iso8859_1);
    }

    #[test]
    fn query_and_form_parameters_merge_in_order() {
        let mut req = form_request();
        assert_eq!(req.parameter("a"), Some("query"));
        assert_eq!(req.parameter("b"), Some("form"));
        // query values precede form values under one name
        assert_eq!(req.parameter_values("shared").unwrap(), &["from-query", "from-form"]);
        assert_eq!(req.parameter("shared"), Some("from-query"));
    }

    #[test]
    fn form_extraction_consumes_the_body() {
        let mut req = form_request();
        assert_eq!(req.parameter("b"), Some("form"));
        // the body has been interpreted as parameters; raw access sees EOF
        assert_eq!(req.body_bytes().unwrap().len(), 0);
    }

    #[test]
    fn stream_access_first_wins_the_body() {
        let mut req = form_request();
        let body = req.body_bytes().unwrap();
        assert_eq!(&body[..], b"b=form&shared=from-form");
        // form parameters are gone, query parameters are unaffected
        assert_eq!(req.parameter("b"), None);
        assert_eq!(req.parameter("a"), Some("query"));
    }

    #[test]
    fn reader_and_stream_are_mutually_exclusive() {
        let mut req = RequestContext::builder().body("payload").build();
        assert_eq!(req.body_text().unwrap(), "payload");
        // repeated reader access is fine
        assert_eq!(req.body_text().unwrap(), "payload");
        let err = req.body_bytes().unwrap_err();
        assert!(matches!(err, RequestError::ReadModeConflict { .. }));

        let mut req = RequestContext::builder().body("payload").build();
        req.body_bytes().unwrap();
        assert!(matches!(req.body_text().unwrap_err(), RequestError::ReadModeConflict { .. }));
    }

    #[test]
    fn charset_parameter_disqualifies_form_extraction() {
        let mut req = RequestContext::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"))
            .body("b=form")
            .build();
        assert_eq!(req.parameter("b"), None);
        // and the body was not consumed
        assert_eq!(&req.body_bytes().unwrap()[..], b"b=form");
    }

    #[test]
    fn parameter_map_is_idempotent() {
        let mut req = form_request();
        let first = req.parameter_map().clone();
        let second = req.parameter_map().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn remote_identity_falls_back_to_peer() {
        let req = RequestContext::builder().peer_addr(peer([10, 0, 0, 9], 4321)).build();
        assert_eq!(req.remote_host().as_deref(), Some("10.0.0.9"));
        assert_eq!(req.remote_port(), 4321);
    }

    #[test]
    fn remote_identity_honors_trusted_forwarded_header() {
        let req = RequestContext::builder()
            .header(http::header::FORWARDED, HeaderValue::from_static("for=\"[2001:db8::1]:4711\""))
            .peer_addr(peer([10, 0, 0, 9], 4321))
            .context(trust_all())
            .build();
        assert_eq!(req.remote_host().as_deref(), Some("2001:db8::1"));
        assert_eq!(req.remote_port(), 4711);
    }

    #[test]
    fn forwarded_port_absent_reads_as_zero() {
        let req = RequestContext::builder()
            .header(http::header::FORWARDED, HeaderValue::from_static("for=203.0.113.195"))
            .peer_addr(peer([10, 0, 0, 9], 4321))
            .context(trust_all())
            .build();
        assert_eq!(req.remote_port(), 0);
    }

    #[test]
    fn scheme_honors_trusted_x_forwarded_proto() {
        let req = RequestContext::builder()
            .header("x-forwarded-proto", HeaderValue::from_static("https"))
            .context(trust_all())
            .build();
        assert_eq!(req.scheme(), "https");

        let untrusted = RequestContext::builder()
            .header("x-forwarded-proto", HeaderValue::from_static("https"))
            .build();
        assert_eq!(untrusted.scheme(), "http");
    }

    #[test]
    fn server_identity_comes_from_host_header() {
        let req = RequestContext::builder()
            .header(http::header::HOST, HeaderValue::from_static("example.com:8080"))
            .build();
        assert_eq!(req.server_name(), "example.com");
        assert_eq!(req.server_port(), Some(8080));

        let req = RequestContext::builder()
            .header(http::header::HOST, HeaderValue::from_static("example.com"))
            .build();
        assert_eq!(req.server_port(), None);
    }

    #[test]
    fn date_header_parses_and_surfaces_bad_values() {
        let req = RequestContext::builder()
            .header(http::header::IF_MODIFIED_SINCE, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"))
            .build();
        assert_eq!(req.date_header("if-modified-since").unwrap(), Some(784_111_777_000));
        assert_eq!(req.date_header("if-unmodified-since").unwrap(), None);

        let req = RequestContext::builder()
            .header(http::header::IF_MODIFIED_SINCE, HeaderValue::from_static("not a date"))
            .build();
        let err = req.date_header("if-modified-since").unwrap_err();
        assert!(matches!(err, RequestError::InvalidDateHeader { .. }));
    }

    #[test]
    fn body_text_decodes_with_effective_charset() {
        let mut req = RequestContext::builder()
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .body(&b"caf\xC3\xA9"[..])
            .build();
        assert_eq!(req.body_text().unwrap(), "café");

        let mut req = RequestContext::builder().body(&b"caf\xE9"[..]).build();
        assert_eq!(req.body_text().unwrap(), "café");
    }
}
