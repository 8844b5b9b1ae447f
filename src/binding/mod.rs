//! Framework bindings.
//!
//! The adapter core never touches a concrete request type. A [`Binding`]
//! names the framework's request and response types and knows how to read
//! the pieces the adapter needs and how to build a response.
//!
//! Two bindings ship with the crate:
//!
//! - [`http::HttpBinding`] over `http::Request<Vec<u8>>` / `http::Response<Vec<u8>>`
//! - [`raw::RawBinding`] over the plain [`raw::RawRequest`] / [`raw::RawResponse`]

pub mod http;
pub mod raw;

use crate::cookie::find_cookie;
use crate::error::ClientError;
use crate::route::HttpMethod;
use futures_util::future::BoxFuture;

/// A response ready to be handed to the framework.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltResponse {
    pub status: u16,
    /// Header lines in order; names may repeat (`set-cookie`)
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl BuiltResponse {
    /// A plain-text response, used for routing and client errors.
    pub fn text(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: message.as_bytes().to_vec(),
        }
    }
}

/// Access to a web framework's request and response types.
pub trait Binding: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Name used in logs
    fn name() -> &'static str;

    /// The request method, `None` when it is not one routes can use
    fn method(request: &Self::Request) -> Option<HttpMethod>;

    /// The request path, without the query string
    fn path(request: &Self::Request) -> &str;

    fn query_string(request: &Self::Request) -> Option<&str>;

    /// Decoded query pairs in order, repeated keys kept.
    fn query_pairs(request: &Self::Request) -> Result<Vec<(String, String)>, ClientError> {
        let Some(query) = Self::query_string(request) else {
            return Ok(Vec::new());
        };
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .map_err(|e| ClientError::bad_request(format!("malformed query string: {}", e)))
    }

    /// A header value; names match case-insensitively.
    fn header<'r>(request: &'r Self::Request, name: &str) -> Option<&'r str>;

    fn cookie(request: &Self::Request, name: &str) -> Option<String> {
        Self::header(request, "cookie").and_then(|header| find_cookie(header, name))
    }

    /// Reads the request body. The request stays usable afterwards.
    fn read_body(request: &mut Self::Request) -> BoxFuture<'_, Result<Vec<u8>, ClientError>>;

    fn into_response(response: BuiltResponse) -> Self::Response;
}
