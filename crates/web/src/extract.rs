//! Typed extraction of query and form data.
//!
//! Handlers that want strongly-typed parameters instead of the raw
//! [`ParamTable`](crate::ParamTable) can deserialize through the
//! [`FromRequest`] implementations here: [`Query`] reads the query string,
//! [`Form`] reads an `application/x-www-form-urlencoded` body. `Form` goes
//! through the body accessor, so it obeys the same read-mode and
//! body-consumption latches as everything else.

use serde::Deserialize;

use crate::error::RequestError;
use crate::request::RequestContext;

/// Types constructible from a request.
pub trait FromRequest: Sized {
    type Error;

    fn from_request(req: &mut RequestContext) -> Result<Self, Self::Error>;
}

/// Represented as url query data
///
/// When a request carries a query string, this struct deserializes it into
/// `T`; note: the struct must impl [`Deserialize`].
///
/// # Example
/// ```
/// # use serde::Deserialize;
/// # use canon_web::extract::{FromRequest, Query};
/// # use canon_web::RequestContext;
/// #[derive(Deserialize)]
/// struct Params {
///     name: String,
///     zip: String,
/// }
///
/// let mut req = RequestContext::builder().query("name=ferris&zip=12345").build();
/// let Query(params) = Query::<Params>::from_request(&mut req).unwrap();
/// assert_eq!(params.name, "ferris");
/// ```
#[derive(Debug)]
pub struct Query<T>(pub T);

/// Represented as form data
///
/// When a body was `post`ed as `application/x-www-form-urlencoded`, this
/// struct deserializes it into `T`; note: the struct must impl
/// [`Deserialize`].
#[derive(Debug)]
pub struct Form<T>(pub T);

impl<T> FromRequest for Query<T>
where
    T: for<'de> Deserialize<'de>,
{
    type Error = RequestError;

    fn from_request(req: &mut RequestContext) -> Result<Self, Self::Error> {
        let query = req.query_string().ok_or_else(|| RequestError::invalid_params("request has no query string"))?;
        serde_qs::from_str(query).map(Query).map_err(|e| RequestError::invalid_params(e.to_string()))
    }
}

impl<T> FromRequest for Form<T>
where
    T: for<'de> Deserialize<'de>,
{
    type Error = RequestError;

    fn from_request(req: &mut RequestContext) -> Result<Self, Self::Error> {
        let body = req.body_bytes()?;
        serde_urlencoded::from_bytes(&body).map(Form).map_err(|e| RequestError::invalid_params(e.to_string()))
    }
}
