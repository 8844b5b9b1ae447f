//! Handler replies.
//!
//! A handler returns a [`Reply`]: a status, a [`Payload`] and extra headers.
//! The status picks the serializer the adapter planned for that status. A
//! handler can also bail out early with a [`ResponseException`], whose reply
//! goes through exactly the same path.

use crate::cookie::{delete_cookie, set_cookie, CookieSettings};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// The body a handler produced, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Payload {
    /// Unstructures any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Payload, serde_json::Error> {
        serde_json::to_value(value).map(Payload::Json)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Status, payload and headers returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub payload: Payload,
    /// Extra headers; keys starting with `@cookie@` become `Set-Cookie` lines
    pub headers: Vec<(String, String)>,
}

impl Reply {
    /// A 200 reply
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self::with_status(200, payload)
    }

    pub fn with_status(status: u16, payload: impl Into<Payload>) -> Self {
        Self {
            status,
            payload: payload.into(),
            headers: Vec::new(),
        }
    }

    /// A 200 reply carrying `value` as JSON
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(Payload::json(value)?))
    }

    pub fn ok(payload: impl Into<Payload>) -> Self {
        Self::with_status(200, payload)
    }

    pub fn created(payload: impl Into<Payload>) -> Self {
        Self::with_status(201, payload)
    }

    pub fn no_content() -> Self {
        Self::with_status(204, Payload::Empty)
    }

    pub fn found(location: impl Into<String>) -> Self {
        Self::with_status(302, Payload::Empty).with_header("Location", location)
    }

    pub fn see_other(location: impl Into<String>) -> Self {
        Self::with_status(303, Payload::Empty).with_header("Location", location)
    }

    pub fn bad_request(payload: impl Into<Payload>) -> Self {
        Self::with_status(400, payload)
    }

    pub fn unauthorized(payload: impl Into<Payload>) -> Self {
        Self::with_status(401, payload)
    }

    pub fn forbidden(payload: impl Into<Payload>) -> Self {
        Self::with_status(403, payload)
    }

    pub fn not_found(payload: impl Into<Payload>) -> Self {
        Self::with_status(404, payload)
    }

    pub fn conflict(payload: impl Into<Payload>) -> Self {
        Self::with_status(409, payload)
    }

    pub fn too_many_requests(payload: impl Into<Payload>) -> Self {
        Self::with_status(429, payload)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str, settings: &CookieSettings) -> Self {
        self.headers.push(set_cookie(name, value, settings));
        self
    }

    pub fn without_cookie(mut self, name: &str) -> Self {
        self.headers.push(delete_cookie(name));
        self
    }

    /// Turns this reply into an early exit.
    pub fn raise<T>(self) -> Result<T, ResponseException> {
        Err(ResponseException(self))
    }
}

impl From<Payload> for Reply {
    fn from(payload: Payload) -> Self {
        Reply::new(payload)
    }
}

/// What a typed handler body usually returns: a reply, or an early exit.
pub type HandlerResult = Result<Reply, ResponseException>;

/// An early exit carrying a complete reply.
///
/// Returned as the error of a handler; the reply is serialized like any other.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseException(pub Reply);

impl ResponseException {
    pub fn reply(&self) -> &Reply {
        &self.0
    }

    pub fn into_reply(self) -> Reply {
        self.0
    }
}

impl fmt::Display for ResponseException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response exception with status {}", self.0.status)
    }
}

impl std::error::Error for ResponseException {}

impl From<Reply> for ResponseException {
    fn from(reply: Reply) -> Self {
        ResponseException(reply)
    }
}

/// Failing to unstructure a reply is a server error.
impl From<serde_json::Error> for ResponseException {
    fn from(err: serde_json::Error) -> Self {
        ResponseException(Reply::with_status(
            500,
            format!("Failed to serialize response: {}", err),
        ))
    }
}
