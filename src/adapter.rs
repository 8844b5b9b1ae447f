//! Adapter generation.
//!
//! [`Adapter::build`] compiles a route into an extraction plan (one
//! [`ParamPlan`] per parameter) and a response plan (one serializer per
//! status). [`Adapter::call`] then only executes those plans: no
//! classification happens per request.

use crate::binding::{Binding, BuiltResponse};
use crate::catalog::TypeCatalog;
use crate::classify::{is_native_handler, plan_params, ParamPlan, Source};
use crate::cookie::COOKIE_MARKER;
use crate::error::{ClientError, Error, Result};
use crate::reply::{Reply, ResponseException};
use crate::responses::{normalize, ResponsePlan, Serializer};
use crate::route::RouteDecl;
use crate::structure::Structurer;
use crate::types::TypeRef;
use futures_util::future::BoxFuture;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Values captured by the router, keyed by template parameter name.
pub type PathParams = BTreeMap<String, String>;

/// Adapter configuration shared by every route of an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Media types accepted for JSON bodies, lowercase, without parameters
    pub json_content_types: Vec<String>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            json_content_types: vec!["application/json".to_string()],
        }
    }
}

/// What a typed handler produced.
pub enum Outcome<B: Binding> {
    Reply(Reply),
    /// A native response, sent as is
    Native(B::Response),
}

/// Conversion of handler return values into an [`Outcome`].
pub trait IntoOutcome<B: Binding> {
    fn into_outcome(self) -> Outcome<B>;
}

impl<B: Binding> IntoOutcome<B> for Reply {
    fn into_outcome(self) -> Outcome<B> {
        Outcome::Reply(self)
    }
}

impl<B: Binding> IntoOutcome<B> for Outcome<B> {
    fn into_outcome(self) -> Outcome<B> {
        self
    }
}

impl<B: Binding> IntoOutcome<B> for std::result::Result<Reply, ResponseException> {
    fn into_outcome(self) -> Outcome<B> {
        Outcome::Reply(self.unwrap_or_else(ResponseException::into_reply))
    }
}

impl<B: Binding> IntoOutcome<B> for std::result::Result<Outcome<B>, ResponseException> {
    fn into_outcome(self) -> Outcome<B> {
        self.unwrap_or_else(|exception| Outcome::Reply(exception.into_reply()))
    }
}

/// Extracted and coerced parameter values handed to a typed handler.
pub struct Args<B: Binding> {
    values: BTreeMap<String, Value>,
    request: Option<B::Request>,
}

impl<B: Binding> Args<B> {
    pub fn new(values: BTreeMap<String, Value>, request: Option<B::Request>) -> Self {
        Self { values, request }
    }

    /// Deserializes a parameter.
    ///
    /// Values were already checked against the declared type, so a failure
    /// here means the handler asked for a different type: a server error.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> std::result::Result<T, ResponseException> {
        let value = self.values.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            warn!("Parameter `{}` does not deserialize: {}", name, e);
            ResponseException(Reply::with_status(
                500,
                format!("Parameter `{}` has an unexpected type", name),
            ))
        })
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// The native request, for handlers declaring a `Request` parameter
    pub fn take_request(&mut self) -> Option<B::Request> {
        self.request.take()
    }
}

type TypedFn<B> = dyn Fn(Args<B>) -> BoxFuture<'static, Outcome<B>> + Send + Sync;
type NativeFn<B> =
    dyn Fn(<B as Binding>::Request) -> BoxFuture<'static, <B as Binding>::Response> + Send + Sync;

/// A handler body.
pub enum Handler<B: Binding> {
    /// Receives extracted [`Args`] and returns a reply
    Typed(Arc<TypedFn<B>>),
    /// Receives the native request and returns the native response
    Native(Arc<NativeFn<B>>),
}

impl<B: Binding> Clone for Handler<B> {
    fn clone(&self) -> Self {
        match self {
            Handler::Typed(f) => Handler::Typed(Arc::clone(f)),
            Handler::Native(f) => Handler::Native(Arc::clone(f)),
        }
    }
}

impl<B: Binding> Handler<B> {
    /// An async typed handler.
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Args<B>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome<B>,
    {
        Handler::Typed(Arc::new(move |args: Args<B>| -> BoxFuture<'static, Outcome<B>> {
            let fut = f(args);
            Box::pin(async move { fut.await.into_outcome() })
        }))
    }

    /// A synchronous typed handler.
    pub fn sync<F, R>(f: F) -> Self
    where
        F: Fn(Args<B>) -> R + Send + Sync + 'static,
        R: IntoOutcome<B>,
    {
        Handler::Typed(Arc::new(move |args: Args<B>| -> BoxFuture<'static, Outcome<B>> {
            let outcome = f(args).into_outcome();
            Box::pin(async move { outcome })
        }))
    }

    /// A native handler, registered without any wrapping.
    pub fn native<F, Fut>(f: F) -> Self
    where
        F: Fn(B::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = B::Response> + Send + 'static,
    {
        Handler::Native(Arc::new(
            move |request: B::Request| -> BoxFuture<'static, B::Response> { Box::pin(f(request)) },
        ))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Handler::Native(_))
    }
}

/// Checks that a handler body matches the kind its signature declares.
pub(crate) fn check_handler_kind<B: Binding>(route: &RouteDecl, handler: &Handler<B>) -> Result<()> {
    match (is_native_handler(&route.signature), handler.is_native()) {
        (true, false) => Err(Error::registration(
            &route.name,
            "declared as fn(Request) -> Response; register it with Handler::native",
        )),
        (false, true) => Err(Error::registration(
            &route.name,
            "native handlers must be declared as fn(Request) -> Response",
        )),
        _ => Ok(()),
    }
}

/// Plans a typed route: where each parameter is read from and which
/// serializer each declared status uses.
pub(crate) fn plan_route(route: &RouteDecl, catalog: &TypeCatalog) -> Result<(Vec<ParamPlan>, ResponsePlan)> {
    let params = plan_params(route, catalog)?;
    let ret = match &route.signature.ret {
        Some(ty) => Some(
            catalog
                .canonicalize(ty)
                .map_err(|e| Error::registration(&route.name, format!("return type: {}", e)))?,
        ),
        None => None,
    };
    let responses = ResponsePlan::from_shape(&normalize(ret.as_ref()));
    Ok((params, responses))
}

struct TypedAdapter<B: Binding> {
    handler: Arc<TypedFn<B>>,
    params: Vec<ParamPlan>,
    responses: ResponsePlan,
    structurer: Structurer,
    options: Arc<AdapterOptions>,
    wants_request: bool,
}

enum AdapterKind<B: Binding> {
    Native(Arc<NativeFn<B>>),
    Typed(TypedAdapter<B>),
}

/// A compiled route, callable with framework requests.
pub struct Adapter<B: Binding> {
    route: String,
    kind: AdapterKind<B>,
}

impl<B: Binding> Adapter<B> {
    /// Compiles a route. Everything that can be checked without a request is
    /// checked here.
    pub fn build(
        route: &RouteDecl,
        handler: Handler<B>,
        catalog: Arc<TypeCatalog>,
        options: Arc<AdapterOptions>,
    ) -> Result<Self> {
        check_handler_kind(route, &handler)?;

        let kind = match handler {
            Handler::Native(f) => {
                debug!("Route {} uses a native {} handler", route.name, B::name());
                AdapterKind::Native(f)
            }
            Handler::Typed(f) => {
                let (params, responses) = plan_route(route, &catalog)?;
                if !responses.is_uniform() {
                    debug!("Route {} dispatches serializers by status", route.name);
                }
                let wants_request = params.iter().any(|p| p.source == Source::NativeRequest);
                AdapterKind::Typed(TypedAdapter {
                    handler: f,
                    params,
                    responses,
                    structurer: Structurer::new(catalog),
                    options,
                    wants_request,
                })
            }
        };

        Ok(Self {
            route: route.name.clone(),
            kind,
        })
    }

    pub fn route_name(&self) -> &str {
        &self.route
    }

    /// Handles one request.
    pub async fn call(&self, mut request: B::Request, path_params: &PathParams) -> B::Response {
        let adapter = match &self.kind {
            AdapterKind::Native(f) => return f(request).await,
            AdapterKind::Typed(adapter) => adapter,
        };

        let values = match adapter.extract(&mut request, path_params).await {
            Ok(values) => values,
            Err(err) => {
                debug!("Route {}: {}", self.route, err);
                return B::into_response(BuiltResponse::text(err.status(), err.message()));
            }
        };

        let request = adapter.wants_request.then_some(request);
        match (adapter.handler)(Args::new(values, request)).await {
            Outcome::Reply(reply) => {
                let serializer = adapter.responses.serializer_for(reply.status);
                B::into_response(render_reply(serializer, reply))
            }
            Outcome::Native(response) => response,
        }
    }
}

impl<B: Binding> TypedAdapter<B> {
    async fn extract(
        &self,
        request: &mut B::Request,
        path_params: &PathParams,
    ) -> std::result::Result<BTreeMap<String, Value>, ClientError> {
        let query = if self.params.iter().any(|p| matches!(p.source, Source::Query { .. })) {
            B::query_pairs(request)?
        } else {
            Vec::new()
        };

        let mut values = BTreeMap::new();
        for plan in &self.params {
            let found = match &plan.source {
                Source::Path => match path_params.get(&plan.name) {
                    Some(raw) => Some(self.coerce(plan, raw)?),
                    None => None,
                },
                Source::Query { wire, list } => {
                    let raws: Vec<String> = query
                        .iter()
                        .filter(|(key, _)| key == wire)
                        .map(|(_, value)| value.clone())
                        .collect();
                    if raws.is_empty() {
                        None
                    } else if *list {
                        Some(self.coerce_list(plan, &raws)?)
                    } else {
                        Some(self.coerce(plan, &raws[0])?)
                    }
                }
                Source::Header { wire } => match B::header(request, wire) {
                    Some(raw) => Some(self.coerce(plan, raw)?),
                    None => None,
                },
                Source::Cookie { wire } => match B::cookie(request, wire) {
                    Some(raw) => Some(self.coerce(plan, &raw)?),
                    None => None,
                },
                Source::Body => self.read_json(plan, request).await?,
                Source::Form => self.read_form(plan, request).await?,
                Source::NativeRequest => continue,
            };

            let value = match (found, &plan.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(missing(plan)),
            };
            values.insert(plan.name.clone(), value);
        }
        Ok(values)
    }

    fn coerce(&self, plan: &ParamPlan, raw: &str) -> std::result::Result<Value, ClientError> {
        match &plan.ty {
            Some(ty) if !plan.is_raw() => self
                .structurer
                .structure_str(raw, ty)
                .map_err(|e| invalid(plan, e)),
            _ => Ok(Value::String(raw.to_string())),
        }
    }

    fn coerce_list(&self, plan: &ParamPlan, raws: &[String]) -> std::result::Result<Value, ClientError> {
        let ty = plan.ty.as_ref().unwrap_or(&TypeRef::Any);
        self.structurer
            .structure_list(raws, ty)
            .map_err(|e| invalid(plan, e))
    }

    async fn read_json(
        &self,
        plan: &ParamPlan,
        request: &mut B::Request,
    ) -> std::result::Result<Option<Value>, ClientError> {
        let content_type = B::header(request, "content-type").map(media_type);
        let bytes = B::read_body(request).await?;
        if bytes.is_empty() && content_type.is_none() && plan.default.is_some() {
            return Ok(None);
        }

        let accepted = content_type
            .as_ref()
            .is_some_and(|ct| self.options.json_content_types.iter().any(|j| j == ct));
        if !accepted {
            return Err(ClientError::unsupported_media_type(format!(
                "expected a body of type {}",
                self.options.json_content_types.join(" or ")
            )));
        }

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::bad_request(format!("malformed JSON body: {}", e)))?;
        let ty = plan.ty.as_ref().unwrap_or(&TypeRef::Any);
        self.structurer
            .structure_value(value, ty)
            .map(Some)
            .map_err(|e| invalid(plan, e))
    }

    async fn read_form(
        &self,
        plan: &ParamPlan,
        request: &mut B::Request,
    ) -> std::result::Result<Option<Value>, ClientError> {
        let content_type = B::header(request, "content-type").map(media_type);
        if content_type.as_deref() != Some(FORM_CONTENT_TYPE) {
            return Err(ClientError::unsupported_media_type(format!(
                "expected a body of type {}",
                FORM_CONTENT_TYPE
            )));
        }

        let bytes = B::read_body(request).await?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
            .map_err(|e| ClientError::bad_request(format!("malformed form body: {}", e)))?;
        let ty = plan.ty.as_ref().unwrap_or(&TypeRef::Any);
        self.structurer
            .structure_form(&pairs, ty)
            .map(Some)
            .map_err(|e| invalid(plan, e))
    }
}

/// Serializes a reply: payload through `serializer`, headers merged, cookie
/// entries turned into `set-cookie` lines.
pub fn render_reply(serializer: Serializer, reply: Reply) -> BuiltResponse {
    let (content_type, body) = serializer.render(reply.payload);

    let mut headers = Vec::with_capacity(reply.headers.len() + 1);
    let mut has_content_type = false;
    for (name, value) in reply.headers {
        if name.starts_with(COOKIE_MARKER) {
            headers.push(("set-cookie".to_string(), value));
            continue;
        }
        if name.eq_ignore_ascii_case("content-type") {
            has_content_type = true;
        }
        headers.push((name, value));
    }
    if let (false, Some(content_type)) = (has_content_type, content_type) {
        headers.push(("content-type".to_string(), content_type.to_string()));
    }

    BuiltResponse {
        status: reply.status,
        headers,
        body,
    }
}

/// `Application/JSON; charset=utf-8` -> `application/json`
fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn missing(plan: &ParamPlan) -> ClientError {
    let what = match &plan.source {
        Source::Path => format!("path parameter `{}`", plan.name),
        Source::Query { wire, .. } => format!("query parameter `{}`", wire),
        Source::Header { wire } => format!("header `{}`", wire),
        Source::Cookie { wire } => format!("cookie `{}`", wire),
        Source::Body | Source::Form => "request body".to_string(),
        Source::NativeRequest => "request".to_string(),
    };
    ClientError::bad_request(format!("missing required {}", what))
}

fn invalid(plan: &ParamPlan, err: crate::structure::StructureError) -> ClientError {
    ClientError::bad_request(format!("invalid value for `{}`: {}", plan.name, err))
}
