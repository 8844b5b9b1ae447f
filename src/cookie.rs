//! Cookie helpers.
//!
//! Handlers set cookies by adding a reply header whose key starts with
//! [`COOKIE_MARKER`]. Adapters turn every such entry into a `Set-Cookie`
//! header, so a reply may set several cookies.

use cookie::{time::Duration, Cookie, SameSite};
use log::warn;

/// Prefix marking a reply header as a cookie to set.
pub const COOKIE_MARKER: &str = "@cookie@";

/// Attributes of a cookie set by a handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSettings {
    /// Lifetime in seconds
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub path: Option<String>,
    pub domain: Option<String>,
    /// `Strict`, `Lax` or `None`
    pub same_site: Option<String>,
}

impl CookieSettings {
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn same_site(mut self, same_site: impl Into<String>) -> Self {
        self.same_site = Some(same_site.into());
        self
    }
}

/// Builds the reply header entry that sets cookie `name` to `value`.
pub fn set_cookie(name: &str, value: &str, settings: &CookieSettings) -> (String, String) {
    let mut cookie = Cookie::new(name.to_string(), value.to_string());
    if let Some(seconds) = settings.max_age {
        cookie.set_max_age(Duration::seconds(seconds));
    }
    if settings.http_only {
        cookie.set_http_only(true);
    }
    if settings.secure {
        cookie.set_secure(true);
    }
    if let Some(path) = &settings.path {
        cookie.set_path(path.clone());
    }
    if let Some(domain) = &settings.domain {
        cookie.set_domain(domain.clone());
    }
    if let Some(same_site) = &settings.same_site {
        match same_site.to_ascii_lowercase().as_str() {
            "strict" => cookie.set_same_site(SameSite::Strict),
            "lax" => cookie.set_same_site(SameSite::Lax),
            "none" => cookie.set_same_site(SameSite::None),
            other => warn!("Ignoring unknown SameSite value `{}`", other),
        }
    }
    (
        format!("{}{}", COOKIE_MARKER, name),
        cookie.encoded().to_string(),
    )
}

/// Builds the reply header entry that expires cookie `name` immediately.
pub fn delete_cookie(name: &str) -> (String, String) {
    (
        format!("{}{}", COOKIE_MARKER, name),
        format!(
            "{}=\"\"; expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/",
            name
        ),
    )
}

/// Reads a cookie from a `Cookie` request header value.
pub fn find_cookie(header: &str, name: &str) -> Option<String> {
    Cookie::split_parse_encoded(header)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
