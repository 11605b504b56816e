//! Response-side normalization: charset freezing, header sync, redirects.
//!
//! A [`ResponseContext`] owns one response's status, headers and body sink.
//! Its central invariant is the charset freeze: the charset stays mutable
//! until the first character writer is obtained (or the first raw byte is
//! written), at which point the effective charset is fixed for the lifetime
//! of the response, stamped onto any Content-Type header, and later charset
//! requests turn into no-ops. The byte-oriented and character-oriented output
//! paths are mutually exclusive, and a committed response (a sent redirect)
//! refuses further mutation.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use mime::Mime;
use tracing::debug;

use canon_http::date;

use crate::charset::Charset;
use crate::context::ServerContext;
use crate::error::ResponseError;
use crate::redirect;
use crate::request::RequestContext;

/// Which output path a response has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OutputMode {
    #[default]
    Unused,
    Bytes,
    Writer,
}

/// Normalized view over one response's outbound state.
///
/// Not thread-safe: one owner mutates it for the lifetime of one exchange.
#[derive(Debug)]
pub struct ResponseContext {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    output_mode: OutputMode,
    charset: Option<Charset>,
    frozen_charset: Option<Charset>,
    committed: bool,
    context: Arc<ServerContext>,
}

impl ResponseContext {
    /// Creates a response with default configuration.
    pub fn new() -> Self {
        Self::with_context(Arc::new(ServerContext::default()))
    }

    /// Creates a response bound to a configuration snapshot.
    pub fn with_context(context: Arc<ServerContext>) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            output_mode: OutputMode::default(),
            charset: None,
            frozen_charset: None,
            committed: false,
            context,
        }
    }

    /// Returns the effective status; `200 OK` when none was set.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Returns the response headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the bytes written so far.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// True once the response has been committed (e.g. a redirect was sent).
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Returns the charset currently in effect: the frozen one after freeze,
    /// else the mutable selection, if any.
    pub fn charset(&self) -> Option<Charset> {
        self.frozen_charset.or(self.charset)
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.ensure_open()?;
        self.status = Some(status);
        Ok(())
    }

    /// Sets (replaces) a header value. `Content-Type` runs through
    /// [`set_content_type`] so the charset stays in sync.
    ///
    /// [`set_content_type`]: ResponseContext::set_content_type
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), ResponseError> {
        self.ensure_open()?;
        if name == CONTENT_TYPE {
            let text = value
                .to_str()
                .map_err(|_| ResponseError::invalid_header_value("content-type is not visible ascii"))?
                .to_string();
            return self.set_content_type(&text);
        }
        self.headers.insert(name, value);
        Ok(())
    }

    /// Appends a header value without replacing earlier ones.
    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), ResponseError> {
        self.ensure_open()?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Sets a date-valued header in the canonical RFC 1123 form.
    pub fn set_date_header(&mut self, name: HeaderName, epoch_millis: i64) -> Result<(), ResponseError> {
        self.ensure_open()?;
        let text = date::format_http_date(epoch_millis);
        let value = HeaderValue::from_str(&text)
            .map_err(|_| ResponseError::invalid_header_value("formatted date is not a valid header value"))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Appends a `Set-Cookie` header, quoting the value when it needs it.
    pub fn add_set_cookie(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        self.ensure_open()?;
        if name.is_empty() || name.contains(['=', ';', ',', ' ', '\t']) {
            return Err(ResponseError::invalid_header_value("illegal cookie name"));
        }
        let header = format!("{name}={}", quote_cookie_value(value));
        let value = HeaderValue::from_str(&header)
            .map_err(|_| ResponseError::invalid_header_value("illegal cookie value"))?;
        self.headers.append(SET_COOKIE, value);
        Ok(())
    }

    /// Sets the Content-Type.
    ///
    /// Before the freeze, a recognized `charset=` parameter in `value` becomes
    /// the response charset, and an absent parameter inherits the current
    /// selection. After the freeze the MIME type still changes but the value
    /// is rewritten to carry the frozen charset.
    pub fn set_content_type(&mut self, value: &str) -> Result<(), ResponseError> {
        self.ensure_open()?;

        if let Some(frozen) = self.frozen_charset {
            return self.store_content_type(&with_charset_param(value, frozen));
        }

        match value.parse::<Mime>().ok() {
            Some(mime) => match mime.get_param(mime::CHARSET) {
                Some(label) => {
                    if let Some(charset) = Charset::for_label(label.as_str()) {
                        self.charset = Some(charset);
                    }
                    // an unrecognized label is tolerable wire vocabulary:
                    // the header keeps it, the selection stays put
                    self.store_content_type(value)
                }
                None => match self.charset {
                    Some(charset) => self.store_content_type(&with_charset_param(value, charset)),
                    None => self.store_content_type(value),
                },
            },
            None => self.store_content_type(value),
        }
    }

    /// Selects the response charset by label.
    ///
    /// Silently ignored once the charset is frozen or the response committed;
    /// an unknown label is surfaced as a caller error. Keeps any Content-Type
    /// header's `charset=` parameter in sync.
    pub fn set_character_encoding(&mut self, label: &str) -> Result<(), ResponseError> {
        if self.frozen_charset.is_some() || self.committed {
            debug!(label, "response charset change ignored after freeze");
            return Ok(());
        }
        let charset = Charset::for_label(label).ok_or_else(|| ResponseError::unsupported_encoding(label))?;
        self.charset = Some(charset);
        self.sync_content_type_charset(Some(charset))
    }

    /// Drops the charset selection and the `charset=` parameter of any
    /// Content-Type header. Ignored after the freeze.
    pub fn clear_character_encoding(&mut self) -> Result<(), ResponseError> {
        if self.frozen_charset.is_some() || self.committed {
            return Ok(());
        }
        self.charset = None;
        self.sync_content_type_charset(None)
    }

    /// Obtains the character writer, freezing the charset on first use.
    ///
    /// Mutually exclusive with [`write_bytes`]; requesting both is an illegal
    /// state.
    ///
    /// [`write_bytes`]: ResponseContext::write_bytes
    pub fn writer(&mut self) -> Result<ResponseWriter<'_>, ResponseError> {
        self.ensure_open()?;
        if self.output_mode == OutputMode::Bytes {
            return Err(ResponseError::output_conflict("byte output"));
        }
        if self.output_mode == OutputMode::Unused {
            self.output_mode = OutputMode::Writer;
            self.freeze_charset();
        }
        Ok(ResponseWriter { response: self })
    }

    /// Writes raw bytes, freezing the charset on the first write.
    ///
    /// Mutually exclusive with [`writer`]; requesting both is an illegal
    /// state.
    ///
    /// [`writer`]: ResponseContext::writer
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), ResponseError> {
        self.ensure_open()?;
        if self.output_mode == OutputMode::Writer {
            return Err(ResponseError::output_conflict("writer"));
        }
        if self.output_mode == OutputMode::Unused {
            self.output_mode = OutputMode::Bytes;
            self.freeze_charset();
        }
        self.body.extend_from_slice(data);
        Ok(())
    }

    /// Resolves `target` against the originating request and commits a
    /// redirect: sets `Location`, defaults the status to `302 Found` when none
    /// was set explicitly, and marks the response committed.
    ///
    /// An empty target is a caller error.
    pub fn send_redirect(&mut self, request: &RequestContext, target: &str) -> Result<(), ResponseError> {
        self.ensure_open()?;
        if target.is_empty() {
            return Err(ResponseError::EmptyRedirectTarget);
        }

        let location = redirect::resolve_location(
            target,
            request.scheme(),
            &request.server_name(),
            request.server_port(),
            request.raw_path(),
        );
        let value = HeaderValue::from_str(&location)
            .map_err(|_| ResponseError::invalid_header_value("location contains illegal characters"))?;
        self.headers.insert(LOCATION, value);

        if self.status.is_none() {
            self.status = Some(StatusCode::FOUND);
        }
        self.committed = true;
        debug!(%location, status = %self.status(), "redirect committed");
        Ok(())
    }

    /// Tears the response down into status, headers and body bytes.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        let status = self.status();
        (status, self.headers, Bytes::from(self.body))
    }

    /// Freezes the charset: the current selection, else the context default,
    /// else ISO-8859-1. Stamps an existing Content-Type header.
    fn freeze_charset(&mut self) {
        if self.frozen_charset.is_some() {
            return;
        }
        let charset = self.charset.or_else(|| self.context.default_response_charset()).unwrap_or(Charset::Iso8859_1);
        self.frozen_charset = Some(charset);
        debug!(charset = %charset, "response charset frozen");

        if self.headers.contains_key(CONTENT_TYPE) {
            let _ = self.sync_content_type_charset(Some(charset));
        }
    }

    /// Rewrites the Content-Type header (when present) to carry `charset`,
    /// or to carry no charset parameter at all.
    fn sync_content_type_charset(&mut self, charset: Option<Charset>) -> Result<(), ResponseError> {
        let Some(current) = self.headers.get(CONTENT_TYPE) else {
            return Ok(());
        };
        let Ok(current) = current.to_str() else {
            return Ok(());
        };
        let rewritten = match charset {
            Some(charset) => with_charset_param(current, charset),
            None => without_charset_param(current),
        };
        self.store_content_type(&rewritten)
    }

    fn store_content_type(&mut self, value: &str) -> Result<(), ResponseError> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| ResponseError::invalid_header_value("content-type contains illegal characters"))?;
        self.headers.insert(CONTENT_TYPE, value);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ResponseError> {
        if self.committed { Err(ResponseError::Committed) } else { Ok(()) }
    }
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Character-output handle encoding text with the frozen response charset.
#[derive(Debug)]
pub struct ResponseWriter<'a> {
    response: &'a mut ResponseContext,
}

impl fmt::Write for ResponseWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // the charset was frozen when this writer was first obtained
        let charset = self.response.frozen_charset.unwrap_or(Charset::Iso8859_1);
        let encoded = charset.encode(s);
        self.response.body.extend_from_slice(&encoded);
        Ok(())
    }
}

/// Rebuilds a content-type value with `charset` as its charset parameter,
/// replacing any existing one and keeping other parameters.
fn with_charset_param(value: &str, charset: Charset) -> String {
    let base = without_charset_param(value);
    format!("{base}; charset={}", charset.name().to_ascii_lowercase())
}

/// Rebuilds a content-type value without any charset parameter.
fn without_charset_param(value: &str) -> String {
    match value.parse::<Mime>() {
        Ok(mime) => {
            let mut out = format!("{}/{}", mime.type_(), mime.subtype());
            for (name, param) in mime.params() {
                if name != mime::CHARSET {
                    out.push_str("; ");
                    out.push_str(name.as_str());
                    out.push('=');
                    out.push_str(param.as_str());
                }
            }
            out
        }
        Err(_) => value.to_string(),
    }
}

/// Wraps a cookie value in quotes, escaping as needed, when it contains
/// characters that cannot travel bare.
fn quote_cookie_value(value: &str) -> String {
    let needs_quoting = value.chars().any(|c| matches!(c, ';' | ',' | ' ' | '\t' | '"' | '\\'));
    if !needs_quoting {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    #[test]
    fn charset_freezes_on_writer_acquisition() {
        let mut resp = ResponseContext::new();
        resp.set_character_encoding("utf-8").unwrap();

        let mut writer = resp.writer().unwrap();
        writer.write_str("café ").unwrap();

        // frozen: this request is silently ignored
        resp.set_character_encoding("latin1").unwrap();
        let mut writer = resp.writer().unwrap();
        writer.write_str("café").unwrap();

        assert_eq!(resp.body(), "café café".as_bytes());
        assert_eq!(resp.charset(), Some(Charset::Utf8));
    }

    #[test]
    fn freeze_falls_back_to_context_default_then_latin1() {
        let context = Arc::new(ServerContext::builder().default_response_charset("utf-8").build().unwrap());
        let mut resp = ResponseContext::with_context(context);
        resp.writer().unwrap().write_str("é").unwrap();
        assert_eq!(resp.body(), "é".as_bytes());

        let mut resp = ResponseContext::new();
        resp.writer().unwrap().write_str("é").unwrap();
        assert_eq!(resp.body(), &[0xE9]);
    }

    #[test]
    fn freeze_stamps_an_existing_content_type() {
        let mut resp = ResponseContext::new();
        resp.set_content_type("text/html").unwrap();
        resp.writer().unwrap();
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/html; charset=iso-8859-1");
    }

    #[test]
    fn byte_writes_freeze_too() {
        let mut resp = ResponseContext::new();
        resp.write_bytes(b"raw").unwrap();
        resp.set_character_encoding("utf-8").unwrap();
        assert_eq!(resp.charset(), Some(Charset::Iso8859_1));
    }

    #[test]
    fn output_paths_are_mutually_exclusive() {
        let mut resp = ResponseContext::new();
        resp.writer().unwrap();
        let err = resp.write_bytes(b"raw").unwrap_err();
        assert!(matches!(err, ResponseError::OutputConflict { .. }));

        let mut resp = ResponseContext::new();
        resp.write_bytes(b"raw").unwrap();
        assert!(matches!(resp.writer().unwrap_err(), ResponseError::OutputConflict { .. }));
    }

    #[test]
    fn content_type_charset_param_sets_the_selection() {
        let mut resp = ResponseContext::new();
        resp.set_content_type("text/html; charset=utf-8").unwrap();
        assert_eq!(resp.charset(), Some(Charset::Utf8));

        resp.set_character_encoding("latin1").unwrap();
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/html; charset=iso-8859-1");
    }

    #[test]
    fn content_type_without_charset_inherits_the_selection() {
        let mut resp = ResponseContext::new();
        resp.set_character_encoding("utf-8").unwrap();
        resp.set_content_type("text/plain").unwrap();
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
    }

    #[test]
    fn unrecognized_content_type_charset_is_kept_but_not_adopted() {
        let mut resp = ResponseContext::new();
        resp.set_content_type("text/plain; charset=klingon").unwrap();
        assert_eq!(resp.charset(), None);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/plain; charset=klingon");
    }

    #[test]
    fn clearing_the_charset_removes_the_parameter() {
        let mut resp = ResponseContext::new();
        resp.set_content_type("text/html; charset=utf-8").unwrap();
        resp.clear_character_encoding().unwrap();
        assert_eq!(resp.charset(), None);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/html");
    }

    #[test]
    fn content_type_changes_after_freeze_keep_the_frozen_charset() {
        let mut resp = ResponseContext::new();
        resp.set_character_encoding("utf-8").unwrap();
        resp.writer().unwrap();
        resp.set_content_type("application/json").unwrap();
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json; charset=utf-8");
    }

    #[test]
    fn unknown_label_is_surfaced_before_freeze() {
        let mut resp = ResponseContext::new();
        let err = resp.set_character_encoding("klingon").unwrap_err();
        assert!(matches!(err, ResponseError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn redirect_sets_location_and_default_status() {
        let req = RequestContext::builder()
            .path("/a/b/c")
            .header(http::header::HOST, HeaderValue::from_static("example.com:8080"))
            .build();
        let mut resp = ResponseContext::new();
        resp.send_redirect(&req, "d").unwrap();

        assert_eq!(resp.headers().get(LOCATION).unwrap(), "http://example.com:8080/a/b/d");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert!(resp.is_committed());
    }

    #[test]
    fn redirect_keeps_an_explicit_status() {
        let req = RequestContext::builder().path("/a/b/c").build();
        let mut resp = ResponseContext::new();
        resp.set_status(StatusCode::SEE_OTHER).unwrap();
        resp.send_redirect(&req, "../d").unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "http://localhost/a/d");
    }

    #[test]
    fn empty_redirect_target_fails_fast() {
        let req = RequestContext::builder().build();
        let mut resp = ResponseContext::new();
        assert!(matches!(resp.send_redirect(&req, "").unwrap_err(), ResponseError::EmptyRedirectTarget));
        assert!(!resp.is_committed());
    }

    #[test]
    fn committed_response_refuses_mutation() {
        let req = RequestContext::builder().build();
        let mut resp = ResponseContext::new();
        resp.send_redirect(&req, "/next").unwrap();

        assert!(matches!(resp.set_status(StatusCode::OK).unwrap_err(), ResponseError::Committed));
        assert!(matches!(resp.write_bytes(b"x").unwrap_err(), ResponseError::Committed));
        assert!(matches!(
            resp.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")).unwrap_err(),
            ResponseError::Committed
        ));
        // charset selection after commit stays a silent no-op
        resp.set_character_encoding("utf-8").unwrap();
    }

    #[test]
    fn date_header_is_canonical() {
        let mut resp = ResponseContext::new();
        resp.set_date_header(http::header::LAST_MODIFIED, 784_111_777_000).unwrap();
        assert_eq!(resp.headers().get(http::header::LAST_MODIFIED).unwrap(), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn set_cookie_values_are_quoted_when_needed() {
        let mut resp = ResponseContext::new();
        resp.add_set_cookie("plain", "abc123").unwrap();
        resp.add_set_cookie("spacey", r#"a b"c"#).unwrap();
        let values: Vec<&HeaderValue> = resp.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(values[0], "plain=abc123");
        assert_eq!(values[1], r#"spacey="a b\"c""#);

        let err = resp.add_set_cookie("bad name", "v").unwrap_err();
        assert!(matches!(err, ResponseError::InvalidHeaderValue { .. }));
    }

    #[test]
    fn into_parts_returns_what_was_written() {
        let mut resp = ResponseContext::new();
        resp.set_status(StatusCode::CREATED).unwrap();
        resp.write_bytes(b"done").unwrap();
        let (status, _headers, body) = resp.into_parts();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(&body[..], b"done");
    }
}
