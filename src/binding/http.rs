//! Binding for the `http` crate types.

use super::{Binding, BuiltResponse};
use crate::error::ClientError;
use crate::route::HttpMethod;
use futures_util::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use log::warn;

/// Binds `http::Request<Vec<u8>>` and `http::Response<Vec<u8>>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpBinding;

impl Binding for HttpBinding {
    type Request = http::Request<Vec<u8>>;
    type Response = http::Response<Vec<u8>>;

    fn name() -> &'static str {
        "http"
    }

    fn method(request: &Self::Request) -> Option<HttpMethod> {
        HttpMethod::parse(request.method().as_str())
    }

    fn path(request: &Self::Request) -> &str {
        request.uri().path()
    }

    fn query_string(request: &Self::Request) -> Option<&str> {
        request.uri().query()
    }

    fn header<'r>(request: &'r Self::Request, name: &str) -> Option<&'r str> {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    fn read_body(request: &mut Self::Request) -> BoxFuture<'_, Result<Vec<u8>, ClientError>> {
        let body = request.body().clone();
        Box::pin(async move { Ok(body) })
    }

    fn into_response(built: BuiltResponse) -> Self::Response {
        let mut response = http::Response::new(built.body);
        *response.status_mut() = StatusCode::from_u16(built.status).unwrap_or_else(|_| {
            warn!("Invalid status {}, answering 500", built.status);
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let headers = response.headers_mut();
        for (name, value) in built.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!("Dropping invalid response header `{}`", name),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> http::Request<Vec<u8>> {
        http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("X-Tenant", "acme")
            .header("Cookie", "session=abc; theme=dark")
            .body(Vec::new())
            .unwrap()
    }

    #[test]
    fn test_request_accessors() {
        let req = request("http://localhost/search?q=rust&page=2&q=web");
        assert_eq!(HttpBinding::method(&req), Some(HttpMethod::Get));
        assert_eq!(HttpBinding::path(&req), "/search");
        assert_eq!(HttpBinding::header(&req, "x-tenant"), Some("acme"));
        assert_eq!(HttpBinding::cookie(&req, "theme").as_deref(), Some("dark"));
        assert_eq!(
            HttpBinding::query_pairs(&req).unwrap(),
            vec![
                ("q".to_string(), "rust".to_string()),
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "web".to_string()),
            ]
        );
    }

    #[test]
    fn test_into_response() {
        let response = HttpBinding::into_response(BuiltResponse {
            status: 201,
            headers: vec![
                ("set-cookie".to_string(), "a=1".to_string()),
                ("set-cookie".to_string(), "b=2".to_string()),
                ("bad header".to_string(), "x".to_string()),
            ],
            body: b"done".to_vec(),
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(response.headers().len(), 2);
        assert_eq!(response.body(), b"done");
    }

    #[test]
    fn test_invalid_status_becomes_500() {
        let response = HttpBinding::into_response(BuiltResponse {
            status: 42,
            ..BuiltResponse::default()
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
