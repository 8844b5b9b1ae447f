//! Route registration and dispatch.
//!
//! An [`App`] collects route declarations with their handlers, checks each
//! one as it is added, and builds into a [`Service`]: a `matchit` route table
//! of compiled [`Adapter`]s that any [`Binding`] can drive.
//!
//! ```
//! use sigroute::app::App;
//! use sigroute::adapter::Handler;
//! use sigroute::binding::raw::{RawBinding, RawRequest};
//! use sigroute::reply::{HandlerResult, Reply};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut app: App<RawBinding> = App::new();
//! app.get(
//!     "/items/{id}",
//!     "fn get_item(id: i64) -> String",
//!     Handler::sync(|args| -> HandlerResult {
//!         let id: i64 = args.get("id")?;
//!         Ok(Reply::ok(format!("item {}", id)))
//!     }),
//! )
//! .unwrap();
//!
//! let service = app.build().unwrap();
//! let response = service.handle(RawRequest::new("GET", "/items/7")).await;
//! assert_eq!(response.text(), "item 7");
//! # }
//! ```

use crate::adapter::{check_handler_kind, plan_route, Adapter, AdapterOptions, Handler, PathParams};
use crate::binding::{Binding, BuiltResponse};
use crate::catalog::TypeCatalog;
use crate::error::{Error, Result};
use crate::openapi_builder::{build_document, DocumentConfig, Info, OpenApiDocument, SecurityScheme, Transformer};
use crate::route::{HttpMethod, RouteDecl};
use crate::signature::Signature;
use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A set of routes under construction.
pub struct App<B: Binding> {
    routes: Vec<(RouteDecl, Handler<B>)>,
    catalog: TypeCatalog,
    options: AdapterOptions,
    document: DocumentConfig,
    openapi_path: Option<String>,
}

impl<B: Binding> Default for App<B> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            catalog: TypeCatalog::new(),
            options: AdapterOptions::default(),
            document: DocumentConfig::default(),
            openapi_path: None,
        }
    }
}

impl<B: Binding> App<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the struct and enum definitions in `source` available to routes,
    /// under `module`. Types must be known before the routes using them.
    pub fn types(&mut self, module: &str, source: &str) -> Result<&mut Self> {
        self.catalog.add_source(module, source)?;
        Ok(self)
    }

    /// Adds an already built catalog.
    pub fn with_catalog(&mut self, catalog: TypeCatalog) -> &mut Self {
        self.catalog.merge(catalog);
        self
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Accepts another media type for JSON bodies (`application/vnd.api+json`).
    pub fn json_content_type(&mut self, media_type: &str) -> &mut Self {
        let media_type = media_type.trim().to_ascii_lowercase();
        if !self.options.json_content_types.contains(&media_type) {
            self.options.json_content_types.push(media_type);
        }
        self
    }

    pub fn info(&mut self, title: &str, version: &str, description: Option<&str>) -> &mut Self {
        self.document.info = Info {
            title: title.to_string(),
            version: version.to_string(),
            description: description.map(str::to_string),
        };
        self
    }

    pub fn security_scheme(&mut self, name: &str, scheme: SecurityScheme) -> &mut Self {
        self.document.security_schemes.insert(name.to_string(), scheme);
        self
    }

    pub fn summary_transformer<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&RouteDecl) -> Option<String> + Send + Sync + 'static,
    {
        let transformer: Transformer = Arc::new(f);
        self.document.summary_transformer = Some(transformer);
        self
    }

    pub fn description_transformer<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&RouteDecl) -> Option<String> + Send + Sync + 'static,
    {
        let transformer: Transformer = Arc::new(f);
        self.document.description_transformer = Some(transformer);
        self
    }

    /// Serves the OpenAPI document as JSON on `GET path`.
    pub fn openapi_route(&mut self, path: &str) -> &mut Self {
        self.openapi_path = Some(path.to_string());
        self
    }

    /// Declares `signature` at `method path` and registers `handler` for it.
    pub fn route(
        &mut self,
        method: HttpMethod,
        path: &str,
        signature: &str,
        handler: Handler<B>,
    ) -> Result<&mut Self> {
        let route = RouteDecl::new(method, path, Signature::parse(signature)?)?;
        self.add(route, handler)
    }

    pub fn get(&mut self, path: &str, signature: &str, handler: Handler<B>) -> Result<&mut Self> {
        self.route(HttpMethod::Get, path, signature, handler)
    }

    pub fn post(&mut self, path: &str, signature: &str, handler: Handler<B>) -> Result<&mut Self> {
        self.route(HttpMethod::Post, path, signature, handler)
    }

    pub fn put(&mut self, path: &str, signature: &str, handler: Handler<B>) -> Result<&mut Self> {
        self.route(HttpMethod::Put, path, signature, handler)
    }

    pub fn patch(&mut self, path: &str, signature: &str, handler: Handler<B>) -> Result<&mut Self> {
        self.route(HttpMethod::Patch, path, signature, handler)
    }

    pub fn delete(&mut self, path: &str, signature: &str, handler: Handler<B>) -> Result<&mut Self> {
        self.route(HttpMethod::Delete, path, signature, handler)
    }

    /// Registers a declared route.
    ///
    /// The route is planned right away, so unknown types, unbound path
    /// parameters and mismatched handler kinds fail here rather than on the
    /// first request.
    pub fn add(&mut self, route: RouteDecl, handler: Handler<B>) -> Result<&mut Self> {
        check_handler_kind(&route, &handler)?;
        if !handler.is_native() {
            plan_route(&route, &self.catalog)?;
        }

        let curly = route.curly_path();
        let taken = self
            .routes
            .iter()
            .any(|(existing, _)| existing.method == route.method && existing.curly_path() == curly);
        if taken {
            return Err(Error::registration(
                &route.name,
                format!("{} {} is already registered", route.method, curly),
            ));
        }

        debug!("Registered {} {} -> {}", route.method, curly, route.name);
        self.routes.push((route, handler));
        Ok(self)
    }

    /// Adds every route of `sub` under `prefix`, their names prefixed with
    /// `name_prefix` when given. Types and security schemes come along.
    pub fn mount(&mut self, prefix: &str, name_prefix: Option<&str>, sub: App<B>) -> Result<&mut Self> {
        let App {
            routes,
            catalog,
            document,
            ..
        } = sub;
        self.catalog.merge(catalog);
        for (name, scheme) in document.security_schemes {
            self.document.security_schemes.entry(name).or_insert(scheme);
        }
        for (route, handler) in routes {
            self.add(route.prefixed(prefix, name_prefix), handler)?;
        }
        Ok(self)
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteDecl> {
        self.routes.iter().map(|(route, _)| route)
    }

    /// The OpenAPI document of the registered routes.
    pub fn openapi(&self) -> Result<OpenApiDocument> {
        let routes: Vec<RouteDecl> = self.routes().cloned().collect();
        build_document(&routes, &self.catalog, &self.document)
    }

    /// Compiles every route and builds the route table.
    pub fn build(self) -> Result<Service<B>> {
        let docs = match &self.openapi_path {
            Some(path) => {
                let document = self.openapi()?;
                Some((path.clone(), Arc::new(serde_json::to_vec_pretty(&document)?)))
            }
            None => None,
        };

        let catalog = Arc::new(self.catalog);
        let options = Arc::new(self.options);
        let mut table: Vec<(String, Vec<(HttpMethod, Endpoint<B>)>)> = Vec::new();
        let mut push = |path: String, method: HttpMethod, endpoint: Endpoint<B>| {
            match table.iter_mut().find(|(existing, _)| *existing == path) {
                Some((_, endpoints)) => endpoints.push((method, endpoint)),
                None => table.push((path, vec![(method, endpoint)])),
            }
        };

        let count = self.routes.len();
        for (route, handler) in self.routes {
            let adapter = Adapter::build(&route, handler, Arc::clone(&catalog), Arc::clone(&options))?;
            push(route.curly_path(), route.method, Endpoint::Route(adapter));
        }
        if let Some((path, body)) = docs {
            push(path, HttpMethod::Get, Endpoint::OpenApi(body));
        }

        let mut router = matchit::Router::new();
        for (path, endpoints) in table {
            let mut methods = BTreeSet::new();
            for (method, _) in &endpoints {
                if !methods.insert(*method) {
                    return Err(Error::InvalidTemplate {
                        template: path,
                        message: format!("{} is registered twice", method),
                    });
                }
            }
            router.insert(path.clone(), endpoints).map_err(|e| Error::InvalidTemplate {
                template: path,
                message: e.to_string(),
            })?;
        }

        info!("Built {} service with {} routes", B::name(), count);
        Ok(Service { router })
    }
}

enum Endpoint<B: Binding> {
    Route(Adapter<B>),
    /// The pre-rendered OpenAPI document
    OpenApi(Arc<Vec<u8>>),
}

/// A built route table. Read-only and shareable across requests.
pub struct Service<B: Binding> {
    router: matchit::Router<Vec<(HttpMethod, Endpoint<B>)>>,
}

impl<B: Binding> Service<B> {
    /// Dispatches a request to its route.
    ///
    /// Unknown paths get 404, known paths without the request's method get
    /// 405 with an `Allow` header.
    pub async fn handle(&self, request: B::Request) -> B::Response {
        let path = B::path(&request).to_string();
        let matched = match self.router.at(&path) {
            Ok(matched) => matched,
            Err(_) => {
                debug!("No route for {}", path);
                return B::into_response(BuiltResponse::text(404, "Not Found"));
            }
        };

        let method = B::method(&request);
        let endpoint = matched
            .value
            .iter()
            .find(|(registered, _)| Some(*registered) == method)
            .map(|(_, endpoint)| endpoint);
        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => {
                let allow: Vec<&str> = matched.value.iter().map(|(m, _)| m.as_str()).collect();
                let mut response = BuiltResponse::text(405, "Method Not Allowed");
                response.headers.push(("allow".to_string(), allow.join(", ")));
                return B::into_response(response);
            }
        };

        match endpoint {
            Endpoint::Route(adapter) => {
                let params: PathParams = matched
                    .params
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect();
                adapter.call(request, &params).await
            }
            Endpoint::OpenApi(body) => B::into_response(BuiltResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: body.as_ref().clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Args;
    use crate::binding::raw::{RawBinding, RawRequest, RawResponse};
    use crate::reply::{HandlerResult, Reply};

    fn text_handler(text: &'static str) -> Handler<RawBinding> {
        Handler::sync(move |_args: Args<RawBinding>| Reply::ok(text))
    }

    #[tokio::test]
    async fn test_dispatch_by_method() {
        let mut app: App<RawBinding> = App::new();
        app.get("/items", "fn list_items() -> String", text_handler("list"))
            .unwrap()
            .post("/items", "fn create_item() -> String", text_handler("create"))
            .unwrap();
        let service = app.build().unwrap();

        assert_eq!(service.handle(RawRequest::new("GET", "/items")).await.text(), "list");
        assert_eq!(service.handle(RawRequest::new("POST", "/items")).await.text(), "create");
    }

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let mut app: App<RawBinding> = App::new();
        app.get("/items", "fn list_items() -> String", text_handler("list"))
            .unwrap()
            .post("/items", "fn create_item() -> String", text_handler("create"))
            .unwrap();
        let service = app.build().unwrap();

        let missing = service.handle(RawRequest::new("GET", "/missing")).await;
        assert_eq!(missing.status, 404);

        let wrong: RawResponse = service.handle(RawRequest::new("DELETE", "/items")).await;
        assert_eq!(wrong.status, 405);
        assert_eq!(wrong.header("allow"), Some("GET, POST"));
    }

    #[tokio::test]
    async fn test_angle_and_curly_templates_route_alike() {
        let mut app: App<RawBinding> = App::new();
        app.get(
            "/users/<int:id>",
            "fn get_user(id: i64) -> String",
            Handler::sync(|args: Args<RawBinding>| -> HandlerResult {
                let id: i64 = args.get("id")?;
                Ok(Reply::ok(id.to_string()))
            }),
        )
        .unwrap();
        let service = app.build().unwrap();

        let response = service.handle(RawRequest::new("GET", "/users/42")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "42");
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut app: App<RawBinding> = App::new();
        app.get("/items/{id}", "fn a(id: i64) -> String", text_handler("a"))
            .unwrap();
        let err = app
            .get("/items/<id>", "fn b(id: i64) -> String", text_handler("b"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_registration_errors_are_eager() {
        let mut app: App<RawBinding> = App::new();
        assert!(app.get("/ghost", "fn ghost() -> Ghost", text_handler("")).is_err());
        assert!(app.get("/items/{id}", "fn item() -> String", text_handler("")).is_err());
        assert!(app.get("/broken", "fn (", text_handler("")).is_err());
        assert_eq!(app.routes().count(), 0);
    }

    #[tokio::test]
    async fn test_mount_prefixes_paths_and_names() {
        let mut admin: App<RawBinding> = App::new();
        admin
            .types("", "struct Stats { users: i64 }")
            .unwrap()
            .get(
                "/stats",
                "fn stats() -> Stats",
                Handler::sync(|_args: Args<RawBinding>| -> HandlerResult {
                    Ok(Reply::json(&serde_json::json!({"users": 3}))?)
                }),
            )
            .unwrap();

        let mut app: App<RawBinding> = App::new();
        app.mount("/admin", Some("admin"), admin).unwrap();

        let names: Vec<&str> = app.routes().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["admin.stats"]);
        assert!(app.catalog().get(&["Stats".to_string()]).is_some());

        let service = app.build().unwrap();
        let response = service.handle(RawRequest::new("GET", "/admin/stats")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), r#"{"users":3}"#);
    }

    #[tokio::test]
    async fn test_openapi_route() {
        let mut app: App<RawBinding> = App::new();
        app.info("Shop", "2.0.0", None)
            .openapi_route("/openapi.json")
            .get("/items", "fn list_items() -> String", text_handler("list"))
            .unwrap();
        let service = app.build().unwrap();

        let response = service.handle(RawRequest::new("GET", "/openapi.json")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let doc: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(doc["openapi"], "3.1.0");
        assert_eq!(doc["info"]["title"], "Shop");
        assert!(doc["paths"]["/items"]["get"].is_object());
        assert!(doc["paths"].get("/openapi.json").is_none());
    }

    #[test]
    fn test_openapi_route_clashing_with_a_route() {
        let mut app: App<RawBinding> = App::new();
        app.openapi_route("/docs")
            .get("/docs", "fn docs() -> String", text_handler("docs"))
            .unwrap();
        assert!(matches!(app.build(), Err(Error::InvalidTemplate { .. })));
    }

    #[test]
    fn test_json_content_type_is_normalized() {
        let mut app: App<RawBinding> = App::new();
        app.json_content_type(" Application/Vnd.Api+JSON ")
            .json_content_type("application/vnd.api+json");
        assert_eq!(
            app.options.json_content_types,
            vec!["application/json".to_string(), "application/vnd.api+json".to_string()]
        );
    }
}
