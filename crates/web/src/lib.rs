//! Request/response metadata normalization
//!
//! This crate is the stateful half of the `canon` workspace. Where
//! [`canon_http`] parses individual header families, the types here own one
//! request or response at a time and enforce the stateful contracts around
//! them: lazy, memoized derivation of cookies, client identity and charsets;
//! the mutually exclusive body access styles; the response charset freeze;
//! and spec-correct redirect locations.
//!
//! # Example
//!
//! ```
//! use canon_web::{RequestContext, ResponseContext};
//! use http::HeaderValue;
//!
//! let mut req = RequestContext::builder()
//!     .path("/profile/edit")
//!     .query("tab=details")
//!     .header(http::header::HOST, HeaderValue::from_static("example.com"))
//!     .build();
//! assert_eq!(req.parameter("tab"), Some("details"));
//!
//! let mut resp = ResponseContext::new();
//! resp.send_redirect(&req, "view").unwrap();
//! assert_eq!(resp.headers()[http::header::LOCATION], "http://example.com/profile/view");
//! ```

mod charset;
mod context;
mod error;
mod params;
mod redirect;
mod request;
mod response;

pub mod extract;

pub use charset::Charset;
pub use context::ConfigError;
pub use context::ServerContext;
pub use context::ServerContextBuilder;
pub use context::SharedContext;
pub use error::RequestError;
pub use error::ResponseError;
pub use params::ParamTable;
pub use request::ReadMode;
pub use request::RequestContext;
pub use request::RequestContextBuilder;
pub use response::ResponseContext;
pub use response::ResponseWriter;
