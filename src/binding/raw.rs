//! A dependency-free request/response pair, for hosts that do not use the
//! `http` crate and for tests.

use super::{Binding, BuiltResponse};
use crate::error::ClientError;
use crate::route::HttpMethod;
use futures_util::future::BoxFuture;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawRequest {
    /// A request for `target`, which may carry a query string (`/items?page=2`).
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method: method.to_string(),
            path,
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// First header with the given name, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Binds [`RawRequest`] and [`RawResponse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBinding;

impl Binding for RawBinding {
    type Request = RawRequest;
    type Response = RawResponse;

    fn name() -> &'static str {
        "raw"
    }

    fn method(request: &Self::Request) -> Option<HttpMethod> {
        HttpMethod::parse(&request.method)
    }

    fn path(request: &Self::Request) -> &str {
        &request.path
    }

    fn query_string(request: &Self::Request) -> Option<&str> {
        request.query.as_deref()
    }

    fn header<'r>(request: &'r Self::Request, name: &str) -> Option<&'r str> {
        request
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn read_body(request: &mut Self::Request) -> BoxFuture<'_, Result<Vec<u8>, ClientError>> {
        Box::pin(async move { Ok(request.body.clone()) })
    }

    fn into_response(built: BuiltResponse) -> Self::Response {
        RawResponse {
            status: built.status,
            headers: built.headers,
            body: built.body,
        }
    }
}
