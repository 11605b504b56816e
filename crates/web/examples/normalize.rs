use std::fmt::Write as _;
use std::sync::Arc;

use http::HeaderValue;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use canon_http::forwarded::TrustPolicy;
use canon_web::{RequestContext, ResponseContext, ServerContext};

/// Walks one request/response exchange through the normalization layer:
/// trust-gated client identity, cookies, parameters, then a redirect and a
/// charset-frozen body on the way out.
fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let context = Arc::new(
        ServerContext::builder()
            .trust_policy(TrustPolicy::Allowlist)
            .trusted_proxies(|addr| addr.ip().is_loopback())
            .default_response_charset("utf-8")
            .build()
            .expect("static configuration is valid"),
    );

    let mut req = RequestContext::builder()
        .method(http::Method::POST)
        .path("/account/settings")
        .query("tab=profile")
        .header(http::header::HOST, HeaderValue::from_static("example.com:8443"))
        .header(http::header::COOKIE, HeaderValue::from_static("session=abc123; theme=\"dark\""))
        .header(http::header::FORWARDED, HeaderValue::from_static("for=203.0.113.195;proto=https"))
        .header(http::header::CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
        .body("display_name=Ferris&tab=account")
        .peer_addr("127.0.0.1:52901".parse().expect("valid socket address"))
        .context(Arc::clone(&context))
        .build();

    info!(client = ?req.remote_host(), scheme = req.scheme(), "resolved client identity");
    for cookie in req.cookies() {
        info!(name = cookie.name(), value = cookie.value(), "cookie");
    }
    let tabs = req.parameter_values("tab").map(<[String]>::to_vec).unwrap_or_default();
    let display_name = req.parameter("display_name").map(str::to_string);
    info!(?tabs, ?display_name, "parameters");

    let mut resp = ResponseContext::with_context(Arc::clone(&context));
    resp.set_content_type("text/plain").expect("response is fresh");
    let mut writer = resp.writer().expect("no byte output was used");
    writeln!(writer, "saved settings for Ferris").expect("in-memory write");
    info!(content_type = ?resp.headers().get(http::header::CONTENT_TYPE), body_len = resp.body().len(), "wrote body");

    let mut redirect = ResponseContext::with_context(context);
    redirect.send_redirect(&req, "profile").expect("fresh response accepts a redirect");
    let (status, headers, _body) = redirect.into_parts();
    info!(%status, location = ?headers.get(http::header::LOCATION), "redirect");
}
