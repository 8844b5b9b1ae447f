//! Route declarations.

use crate::path::{join_paths, to_curly, validate_template};
use crate::signature::Signature;
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;

/// HTTP methods a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Parses a method name, case-insensitively
    pub fn parse(name: &str) -> Option<HttpMethod> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            "OPTIONS" => Some(HttpMethod::Options),
            "HEAD" => Some(HttpMethod::Head),
            _ => None,
        }
    }

    /// Whether requests with this method usually carry a body
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared route: method, path template, name, handler signature and
/// per-parameter overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecl {
    pub method: HttpMethod,
    /// Template as registered, in either syntax
    pub path: String,
    /// Route name; defaults to the handler name
    pub name: String,
    pub tags: Vec<String>,
    pub signature: Signature,
    /// Parameter name -> header wire name
    pub header_overrides: BTreeMap<String, String>,
}

impl RouteDecl {
    /// Declares a route, checking the template for duplicate parameters.
    pub fn new(method: HttpMethod, path: &str, signature: Signature) -> Result<Self> {
        validate_template(path)?;
        Ok(Self {
            method,
            path: path.to_string(),
            name: signature.name.clone(),
            tags: Vec::new(),
            signature,
            header_overrides: BTreeMap::new(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Reads `param` from the header `wire` instead of the default source.
    pub fn header_name(mut self, param: impl Into<String>, wire: impl Into<String>) -> Self {
        self.header_overrides.insert(param.into(), wire.into());
        self
    }

    /// The template in curly syntax, as used for routing and documentation.
    pub fn curly_path(&self) -> String {
        to_curly(&self.path)
    }

    /// A copy of this route mounted under `path_prefix`, its name optionally
    /// prefixed as `prefix.name`.
    pub fn prefixed(&self, path_prefix: &str, name_prefix: Option<&str>) -> Self {
        let mut route = self.clone();
        route.path = join_paths(path_prefix, &self.path);
        if let Some(prefix) = name_prefix {
            route.name = format!("{}.{}", prefix, self.name);
        }
        route
    }
}
