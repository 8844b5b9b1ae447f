//! Parameter classification.
//!
//! Decides, once per route, where each handler parameter is read from. The
//! resulting [`ParamPlan`]s drive both request extraction in the adapter and
//! parameter documentation in the OpenAPI builder.

use crate::catalog::TypeCatalog;
use crate::error::{Error, Result};
use crate::route::RouteDecl;
use crate::signature::{SigParam, Signature};
use crate::structure::is_list;
use crate::types::TypeRef;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a parameter value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A path template segment
    Path,
    /// A request header, matched case-insensitively
    Header { wire: String },
    Cookie { wire: String },
    /// The JSON request body
    Body,
    /// The form-encoded request body
    Form,
    /// The query string; lists collect repeated keys
    Query { wire: String, list: bool },
    /// The framework's request object, passed through untouched
    NativeRequest,
}

impl Source {
    /// OpenAPI `in` value, for sources documented as parameters
    pub fn location(&self) -> Option<&'static str> {
        match self {
            Source::Path => Some("path"),
            Source::Query { .. } => Some("query"),
            Source::Header { .. } => Some("header"),
            Source::Cookie { .. } => Some("cookie"),
            Source::Body | Source::Form | Source::NativeRequest => None,
        }
    }
}

/// Everything needed to extract one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamPlan {
    pub name: String,
    /// Canonical type with markers stripped; `None` for unannotated parameters
    pub ty: Option<TypeRef>,
    pub default: Option<Value>,
    pub source: Source,
}

impl ParamPlan {
    pub fn required(&self) -> bool {
        self.default.is_none() && self.source != Source::NativeRequest
    }

    /// Raw parameters are handed over as the string found in the request.
    pub fn is_raw(&self) -> bool {
        match &self.ty {
            None => true,
            Some(ty) => ty.is_string(),
        }
    }
}

/// Classifies one parameter. First match wins.
pub fn classify(
    param: &SigParam,
    path_params: &[String],
    overrides: &BTreeMap<String, String>,
    catalog: &TypeCatalog,
) -> std::result::Result<Source, String> {
    let declared = param.ty.as_ref();

    if path_params.contains(&param.name) {
        return Ok(Source::Path);
    }

    if declared == Some(&TypeRef::NativeRequest) {
        return Ok(Source::NativeRequest);
    }

    if let Some(wire) = overrides.get(&param.name) {
        return Ok(Source::Header { wire: wire.clone() });
    }
    if let Some(wire) = &param.header {
        return Ok(Source::Header { wire: wire.clone() });
    }
    if let Some(TypeRef::Header(_)) = declared {
        return Ok(Source::Header {
            wire: param.name.clone(),
        });
    }

    if let Some(wire) = &param.cookie {
        return Ok(Source::Cookie { wire: wire.clone() });
    }
    if let Some(TypeRef::Cookie(_)) = declared {
        return Ok(Source::Cookie {
            wire: param.name.clone(),
        });
    }

    if let Some(ty) = declared {
        if let TypeRef::Json(_) = ty {
            return Ok(Source::Body);
        }
        if let TypeRef::Form(_) = ty {
            return Ok(Source::Form);
        }
        let canonical = catalog.canonicalize(ty)?;
        let target = match &canonical {
            TypeRef::Option(inner) => inner.as_ref(),
            other => other,
        };
        if catalog.is_structured(target) {
            return Ok(Source::Body);
        }
    }

    Ok(Source::Query {
        wire: param.name.clone(),
        list: declared.is_some_and(is_list),
    })
}

/// Classifies every parameter of a route and checks the combination.
pub fn plan_params(route: &RouteDecl, catalog: &TypeCatalog) -> Result<Vec<ParamPlan>> {
    let signature = &route.signature;
    let path_params = crate::path::validate_template(&route.path)?;
    let fail = |message: String| Error::registration(&route.name, message);

    for name in &path_params {
        if signature.param(name).is_none() {
            return Err(fail(format!(
                "path parameter `{}` is not a parameter of `{}`",
                name, signature.name
            )));
        }
    }

    let mut plans = Vec::with_capacity(signature.params.len());
    for param in &signature.params {
        let source = classify(param, &path_params, &route.header_overrides, catalog)
            .map_err(|e| fail(format!("parameter `{}`: {}", param.name, e)))?;

        let ty = match &param.ty {
            Some(ty) => Some(
                catalog
                    .canonicalize(ty.unwrap_marker())
                    .map_err(|e| fail(format!("parameter `{}`: {}", param.name, e)))?,
            ),
            None => None,
        };

        let default = match (&param.default, &ty) {
            (Some(default), _) => Some(default.clone()),
            (None, Some(TypeRef::Option(_))) => Some(Value::Null),
            (None, _) => None,
        };

        debug!(
            "Route {}: parameter {} from {:?}",
            route.name, param.name, source
        );
        plans.push(ParamPlan {
            name: param.name.clone(),
            ty,
            default,
            source,
        });
    }

    let count = |pred: fn(&Source) -> bool| plans.iter().filter(|p| pred(&p.source)).count();
    if count(|s| matches!(s, Source::Body | Source::Form)) > 1 {
        return Err(fail("more than one body parameter".to_string()));
    }
    if count(|s| *s == Source::NativeRequest) > 1 {
        return Err(fail("more than one native request parameter".to_string()));
    }

    Ok(plans)
}

/// A handler taking only the native request and returning the native
/// response (or nothing declared) is registered without any wrapping.
pub fn is_native_handler(signature: &Signature) -> bool {
    let takes_request = matches!(
        signature.params.as_slice(),
        [only] if only.ty == Some(TypeRef::NativeRequest)
    );
    let returns_native = matches!(signature.ret, None | Some(TypeRef::NativeResponse));
    takes_request && returns_native
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::HttpMethod;

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog
            .add_source(
                "",
                r#"
                struct User { id: i64, name: String }
                struct Login { username: String }
                enum Order { Asc, Desc }
            "#,
            )
            .unwrap();
        catalog
    }

    fn plans(path: &str, signature: &str) -> Result<Vec<ParamPlan>> {
        let route = RouteDecl::new(HttpMethod::Post, path, Signature::parse(signature).unwrap())?;
        plan_params(&route, &catalog())
    }

    fn sources(path: &str, signature: &str) -> Vec<Source> {
        plans(path, signature)
            .unwrap()
            .into_iter()
            .map(|p| p.source)
            .collect()
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(
            sources("/items/<int:id>", "fn f(id: i64, page: i64, q: _)"),
            vec![
                Source::Path,
                Source::Query {
                    wire: "page".to_string(),
                    list: false
                },
                Source::Query {
                    wire: "q".to_string(),
                    list: false
                },
            ]
        );
    }

    #[test]
    fn test_path_wins_over_structured_type() {
        assert_eq!(sources("/orders/{order}", "fn f(order: Order)"), vec![Source::Path]);
    }

    #[test]
    fn test_headers() {
        assert_eq!(
            sources(
                "/",
                r#"fn f(#[header] x_token: String, #[header = "X-Tenant"] tenant: String, auth: Header)"#
            ),
            vec![
                Source::Header {
                    wire: "x_token".to_string()
                },
                Source::Header {
                    wire: "X-Tenant".to_string()
                },
                Source::Header {
                    wire: "auth".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_header_override_map() {
        let route = RouteDecl::new(
            HttpMethod::Get,
            "/",
            Signature::parse("fn f(token: String)").unwrap(),
        )
        .unwrap()
        .header_name("token", "X-Token");
        let plans = plan_params(&route, &catalog()).unwrap();
        assert_eq!(
            plans[0].source,
            Source::Header {
                wire: "X-Token".to_string()
            }
        );
    }

    #[test]
    fn test_cookies() {
        assert_eq!(
            sources("/", r#"fn f(#[cookie = "sid"] session: String, theme: Cookie<Option<String>>)"#),
            vec![
                Source::Cookie {
                    wire: "sid".to_string()
                },
                Source::Cookie {
                    wire: "theme".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_bodies() {
        assert_eq!(sources("/", "fn f(user: User)"), vec![Source::Body]);
        assert_eq!(sources("/", "fn f(users: HashMap<String, User>)"), vec![Source::Body]);
        assert_eq!(sources("/", "fn f(ids: Json<Vec<i64>>)"), vec![Source::Body]);
        assert_eq!(sources("/", "fn f(login: Form<Login>)"), vec![Source::Form]);
        assert_eq!(
            sources("/", "fn f(tags: Vec<String>)"),
            vec![Source::Query {
                wire: "tags".to_string(),
                list: true
            }]
        );
    }

    #[test]
    fn test_defaults() {
        let plans = plans("/", "fn f(#[default = 0] page: i64, q: Option<String>, r: i64)").unwrap();
        assert_eq!(plans[0].default, Some(serde_json::json!(0)));
        assert_eq!(plans[1].default, Some(Value::Null));
        assert!(plans[2].required());
        assert!(!plans[0].required());
    }

    #[test]
    fn test_markers_are_stripped_from_plan_types() {
        let plans = plans("/", "fn f(login: Form<Login>)").unwrap();
        assert_eq!(
            plans[0].ty,
            Some(TypeRef::Named {
                path: vec!["Login".to_string()],
                args: vec![]
            })
        );
    }

    #[test]
    fn test_registration_errors() {
        let err = plans("/items/{id}", "fn f(page: i64)").unwrap_err();
        assert!(err.to_string().contains("path parameter `id`"));

        let err = plans("/", "fn f(a: User, b: User)").unwrap_err();
        assert!(err.to_string().contains("more than one body"));

        let err = plans("/", "fn f(a: Request, b: Request)").unwrap_err();
        assert!(err.to_string().contains("more than one native request"));

        let err = plans("/", "fn f(a: Ghost)").unwrap_err();
        assert!(err.to_string().contains("unknown type `Ghost`"));
    }

    #[test]
    fn test_native_handler_detection() {
        assert!(is_native_handler(&Signature::parse("fn f(req: Request) -> Response").unwrap()));
        assert!(is_native_handler(&Signature::parse("fn f(req: Request)").unwrap()));
        assert!(!is_native_handler(&Signature::parse("fn f(req: Request) -> String").unwrap()));
        assert!(!is_native_handler(&Signature::parse("fn f(req: Request, id: i64)").unwrap()));
    }
}
