use crate::adapter::FORM_CONTENT_TYPE;
use crate::catalog::TypeCatalog;
use crate::classify::{is_native_handler, plan_params, ParamPlan, Source};
use crate::error::{Error, Result};
use crate::responses::{normalize, Serializer};
use crate::route::{HttpMethod, RouteDecl};
use crate::schema_generator::{Schema, SchemaGenerator};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const OPENAPI_VERSION: &str = "3.1.0";

/// Computes a summary or description for a route; `None` keeps the default.
pub type Transformer = Arc<dyn Fn(&RouteDecl) -> Option<String> + Send + Sync>;

/// OpenAPI document builder
pub struct OpenApiBuilder {
    config: DocumentConfig,
    /// Paths collection (curly template -> PathItem)
    paths: BTreeMap<String, PathItem>,
}

/// Everything about a document that does not come from the routes.
#[derive(Clone, Default)]
pub struct DocumentConfig {
    pub info: Info,
    /// Scheme name -> scheme
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    pub summary_transformer: Option<Transformer>,
    pub description_transformer: Option<Transformer>,
}

impl fmt::Debug for DocumentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentConfig")
            .field("info", &self.info)
            .field("security_schemes", &self.security_schemes)
            .field("summary_transformer", &self.summary_transformer.is_some())
            .field("description_transformer", &self.description_transformer.is_some())
            .finish()
    }
}

/// OpenAPI Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// API title
    pub title: String,
    /// API version
    pub version: String,
    /// API description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            title: "Generated API".to_string(),
            version: "1.0.0".to_string(),
            description: None,
        }
    }
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    fn slot(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }

    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
        }
    }
}

/// Scheme name -> required scopes
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Parameters (path, query, header, cookie)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Status code -> response
    pub responses: BTreeMap<String, Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name on the wire
    pub name: String,
    /// Parameter location (path, query, header, cookie)
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: Schema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    /// Content types and their schemas
    pub content: BTreeMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, MediaType>>,
}

/// OpenAPI SecurityScheme object. Only API keys are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    /// Where the key is sent (cookie, header, query)
    #[serde(rename = "in")]
    pub location: String,
    /// Cookie, header or query parameter name
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SecurityScheme {
    /// An API key carried in the cookie `cookie_name`.
    pub fn cookie(cookie_name: impl Into<String>) -> Self {
        Self::api_key("cookie", cookie_name)
    }

    pub fn header(header_name: impl Into<String>) -> Self {
        Self::api_key("header", header_name)
    }

    fn api_key(location: &str, name: impl Into<String>) -> Self {
        Self {
            scheme_type: "apiKey".to_string(),
            location: location.to_string(),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether an operation reading `source` carries this scheme's key
    fn matches(&self, source: &Source) -> bool {
        match source {
            Source::Cookie { wire } => self.location == "cookie" && *wire == self.name,
            Source::Header { wire } => {
                self.location == "header" && wire.eq_ignore_ascii_case(&self.name)
            }
            _ => false,
        }
    }
}

/// OpenAPI Components object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Components {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemas: Option<BTreeMap<String, Schema>>,
    #[serde(rename = "securitySchemes", skip_serializing_if = "Option::is_none")]
    pub security_schemes: Option<BTreeMap<String, SecurityScheme>>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    pub paths: BTreeMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

impl OpenApiBuilder {
    /// Create a new OpenApiBuilder with default info
    pub fn new() -> Self {
        Self::with_config(DocumentConfig::default())
    }

    pub fn with_config(config: DocumentConfig) -> Self {
        debug!("Initializing OpenApiBuilder");
        Self {
            config,
            paths: BTreeMap::new(),
        }
    }

    /// Set custom info for the API
    pub fn with_info(mut self, title: String, version: String, description: Option<String>) -> Self {
        self.config.info = Info {
            title,
            version,
            description,
        };
        self
    }

    pub fn with_security_scheme(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.config.security_schemes.insert(name.into(), scheme);
        self
    }

    /// Add a route to the OpenAPI document
    ///
    /// Routes with a native handler are left out: nothing is known about
    /// what they read or return.
    pub fn add_route(&mut self, route: &RouteDecl, schema_gen: &mut SchemaGenerator<'_>) -> Result<()> {
        if is_native_handler(&route.signature) {
            debug!("Skipping native route {} {}", route.method, route.path);
            return Ok(());
        }
        debug!("Adding route: {} {}", route.method, route.path);

        let catalog = schema_gen.catalog();
        let plans = plan_params(route, catalog)?;
        let fail = |e: String| Error::registration(&route.name, e);

        let mut parameters = Vec::new();
        let mut request_body = None;
        for plan in &plans {
            let schema = match &plan.ty {
                Some(ty) => schema_gen.schema_for(ty).map_err(fail)?,
                None => Schema::of_type("string"),
            };
            match &plan.source {
                Source::Body | Source::Form => {
                    let media = if plan.source == Source::Form {
                        FORM_CONTENT_TYPE
                    } else {
                        "application/json"
                    };
                    request_body = Some(RequestBody {
                        description: None,
                        required: plan.required(),
                        content: BTreeMap::from([(media.to_string(), MediaType { schema })]),
                    });
                }
                Source::NativeRequest => {}
                source => {
                    if let Some(location) = source.location() {
                        parameters.push(Parameter {
                            name: wire_name(plan),
                            location: location.to_string(),
                            required: plan.required() || *source == Source::Path,
                            schema,
                            description: None,
                        });
                    }
                }
            }
        }

        let ret = match &route.signature.ret {
            Some(ty) => Some(catalog.canonicalize(ty).map_err(fail)?),
            None => None,
        };
        let shape = normalize(ret.as_ref());
        let mut responses = BTreeMap::new();
        if shape.native {
            responses.insert("200".to_string(), response(200, None));
        }
        for (status, payload) in &shape.entries {
            let content = match payload {
                None | Some(crate::types::TypeRef::Unit) => None,
                Some(ty) => {
                    let media = Serializer::for_payload(Some(ty))
                        .content_type()
                        .map(|ct| ct.split(';').next().unwrap_or(ct).to_string())
                        .unwrap_or_else(|| "application/json".to_string());
                    let schema = schema_gen.schema_for(ty).map_err(fail)?;
                    Some(BTreeMap::from([(media, MediaType { schema })]))
                }
            };
            responses.insert(status.to_string(), response(*status, content));
        }

        let security: Vec<SecurityRequirement> = self
            .config
            .security_schemes
            .iter()
            .filter(|(_, scheme)| plans.iter().any(|p| scheme.matches(&p.source)))
            .map(|(name, _)| BTreeMap::from([(name.clone(), Vec::new())]))
            .collect();

        let summary = self
            .config
            .summary_transformer
            .as_ref()
            .and_then(|t| t(route))
            .unwrap_or_else(|| title_case(&route.name));
        let description = match &self.config.description_transformer {
            Some(t) => t(route).or_else(|| route.signature.docs.clone()),
            None => route.signature.docs.clone(),
        };

        let operation = Operation {
            tags: (!route.tags.is_empty()).then(|| route.tags.clone()),
            summary: Some(summary),
            description,
            operation_id: Some(route.name.clone()),
            parameters: (!parameters.is_empty()).then_some(parameters),
            request_body,
            responses,
            security: (!security.is_empty()).then_some(security),
        };

        let path_item = self.paths.entry(route.curly_path()).or_default();
        let slot = path_item.slot(route.method);
        if slot.is_some() {
            warn!("Replacing operation {} {}", route.method, route.curly_path());
        }
        *slot = Some(operation);
        Ok(())
    }

    /// Build the final OpenAPI document
    pub fn build(self, schema_gen: SchemaGenerator<'_>) -> Result<OpenApiDocument> {
        debug!("Building final OpenAPI document");

        let schemas = schema_gen
            .finish()
            .map_err(|e| Error::InvalidArgument(format!("cannot build component schemas: {}", e)))?;
        let security_schemes = self.config.security_schemes;
        let components = if schemas.is_empty() && security_schemes.is_empty() {
            None
        } else {
            Some(Components {
                schemas: (!schemas.is_empty()).then_some(schemas),
                security_schemes: (!security_schemes.is_empty()).then_some(security_schemes),
            })
        };

        Ok(OpenApiDocument {
            openapi: OPENAPI_VERSION.to_string(),
            info: self.config.info,
            paths: self.paths,
            components,
        })
    }
}

impl Default for OpenApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Documents `routes` with a fresh schema registry.
pub fn build_document(
    routes: &[RouteDecl],
    catalog: &TypeCatalog,
    config: &DocumentConfig,
) -> Result<OpenApiDocument> {
    let mut builder = OpenApiBuilder::with_config(config.clone());
    let mut schema_gen = SchemaGenerator::new(catalog);
    for route in routes {
        builder.add_route(route, &mut schema_gen)?;
    }
    builder.build(schema_gen)
}

fn wire_name(plan: &ParamPlan) -> String {
    match &plan.source {
        Source::Query { wire, .. } | Source::Header { wire } | Source::Cookie { wire } => wire.clone(),
        _ => plan.name.clone(),
    }
}

fn response(status: u16, content: Option<BTreeMap<String, MediaType>>) -> Response {
    let description = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Response")
        .to_string();
    Response {
        description,
        content,
    }
}

/// `get_user` -> `Get User`, `admin.list_users` -> `Admin.List Users`
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut boundary = true;
    for c in name.chars() {
        if c == '_' {
            out.push(' ');
            boundary = true;
        } else if c.is_alphanumeric() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Signature;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog
            .add_source(
                "",
                r#"
                pub struct User { pub id: u32, pub name: String }
                pub struct Login { pub username: String, pub password: String }
                pub struct A { pub value: i64 }
            "#,
            )
            .unwrap();
        catalog
    }

    fn route(method: HttpMethod, path: &str, signature: &str) -> RouteDecl {
        RouteDecl::new(method, path, Signature::parse(signature).unwrap()).unwrap()
    }

    fn document(routes: &[RouteDecl]) -> OpenApiDocument {
        build_document(routes, &catalog(), &DocumentConfig::default()).unwrap()
    }

    #[test]
    fn test_new_builder() {
        let builder = OpenApiBuilder::new();
        assert_eq!(builder.config.info.title, "Generated API");
        assert_eq!(builder.config.info.version, "1.0.0");
        assert!(builder.paths.is_empty());
    }

    #[test]
    fn test_with_info() {
        let builder = OpenApiBuilder::new().with_info(
            "My API".to_string(),
            "2.0.0".to_string(),
            Some("Custom description".to_string()),
        );
        assert_eq!(builder.config.info.title, "My API");
        assert_eq!(builder.config.info.description, Some("Custom description".to_string()));
    }

    #[test]
    fn test_path_query_and_header_parameters() {
        let doc = document(&[route(
            HttpMethod::Get,
            "/users/<int:id>",
            r#"fn get_user(id: u32, #[default = 0] page: i64, #[header = "X-Tenant"] tenant: String) -> User"#,
        )]);
        let operation = doc.paths["/users/{id}"].get.as_ref().unwrap();
        let parameters = operation.parameters.as_ref().unwrap();
        assert_eq!(parameters.len(), 3);
        assert_eq!(
            (parameters[0].name.as_str(), parameters[0].location.as_str(), parameters[0].required),
            ("id", "path", true)
        );
        assert_eq!(
            (parameters[1].name.as_str(), parameters[1].location.as_str(), parameters[1].required),
            ("page", "query", false)
        );
        assert_eq!(
            (parameters[2].name.as_str(), parameters[2].location.as_str(), parameters[2].required),
            ("X-Tenant", "header", true)
        );
        assert_eq!(operation.operation_id.as_deref(), Some("get_user"));
        assert_eq!(operation.summary.as_deref(), Some("Get User"));
    }

    #[test]
    fn test_union_response_with_created() {
        let doc = document(&[route(
            HttpMethod::Post,
            "/a",
            "fn make_a(value: i64) -> Union<A, Created<()>>",
        )]);
        let responses = &doc.paths["/a"].post.as_ref().unwrap().responses;
        assert_eq!(
            serde_json::to_value(responses).unwrap(),
            json!({
                "200": {
                    "description": "OK",
                    "content": {"application/json": {"schema": {"$ref": "#/components/schemas/A"}}}
                },
                "201": {"description": "Created"}
            })
        );
        let schemas = doc.components.unwrap().schemas.unwrap();
        assert!(schemas.contains_key("A"));
    }

    #[test]
    fn test_text_and_untyped_responses() {
        let doc = document(&[
            route(HttpMethod::Get, "/text", "fn text() -> String"),
            route(HttpMethod::Get, "/untyped", "fn untyped()"),
        ]);
        let text = &doc.paths["/text"].get.as_ref().unwrap().responses["200"];
        assert!(text.content.as_ref().unwrap().contains_key("text/plain"));
        let untyped = &doc.paths["/untyped"].get.as_ref().unwrap().responses["200"];
        assert_eq!(untyped.content, None);
    }

    #[test]
    fn test_request_bodies() {
        let doc = document(&[
            route(HttpMethod::Post, "/users", "fn create_user(user: User) -> Created<User>"),
            route(HttpMethod::Post, "/login", "fn login(form: Form<Login>) -> SeeOther"),
        ]);
        let create = doc.paths["/users"].post.as_ref().unwrap();
        let body = create.request_body.as_ref().unwrap();
        assert!(body.required);
        assert_eq!(
            body.content["application/json"].schema.referenced_name(),
            Some("User")
        );
        assert!(create.parameters.is_none());
        assert!(create.responses.contains_key("201"));

        let login = doc.paths["/login"].post.as_ref().unwrap();
        assert!(login
            .request_body
            .as_ref()
            .unwrap()
            .content
            .contains_key(FORM_CONTENT_TYPE));
        assert_eq!(login.responses["303"].description, "See Other");
    }

    #[test]
    fn test_operations_merge_per_path() {
        let doc = document(&[
            route(HttpMethod::Get, "/users/{id}", "fn get_user(id: u32) -> User"),
            route(HttpMethod::Delete, "/users/<id>", "fn delete_user(id: u32) -> ()"),
        ]);
        assert_eq!(doc.paths.len(), 1);
        let item = &doc.paths["/users/{id}"];
        assert!(item.get.is_some());
        assert!(item.delete.is_some());
        assert!(item.delete.as_ref().unwrap().responses.contains_key("204"));
    }

    #[test]
    fn test_cookie_security() {
        let config = DocumentConfig {
            security_schemes: BTreeMap::from([(
                "session".to_string(),
                SecurityScheme::cookie("sid"),
            )]),
            ..Default::default()
        };
        let routes = [
            route(HttpMethod::Get, "/me", r#"fn me(#[cookie = "sid"] session: String) -> User"#),
            route(HttpMethod::Get, "/public", "fn public() -> String"),
        ];
        let doc = build_document(&routes, &catalog(), &config).unwrap();

        let me = doc.paths["/me"].get.as_ref().unwrap();
        assert_eq!(
            me.security,
            Some(vec![BTreeMap::from([("session".to_string(), vec![])])])
        );
        assert_eq!(me.parameters.as_ref().unwrap()[0].location, "cookie");
        assert_eq!(doc.paths["/public"].get.as_ref().unwrap().security, None);

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value["components"]["securitySchemes"]["session"],
            json!({"type": "apiKey", "in": "cookie", "name": "sid"})
        );
    }

    #[test]
    fn test_transformers_and_docs() {
        let config = DocumentConfig {
            summary_transformer: Some(Arc::new(|route: &RouteDecl| {
                Some(format!("{} {}", route.method, route.curly_path()))
            })),
            ..Default::default()
        };
        let routes = [route(
            HttpMethod::Get,
            "/users",
            "/// Lists every user.\nfn list_users() -> Vec<User>",
        )
        .with_tags(["users"])];
        let doc = build_document(&routes, &catalog(), &config).unwrap();
        let operation = doc.paths["/users"].get.as_ref().unwrap();
        assert_eq!(operation.summary.as_deref(), Some("GET /users"));
        assert_eq!(operation.description.as_deref(), Some("Lists every user."));
        assert_eq!(operation.tags, Some(vec!["users".to_string()]));
    }

    #[test]
    fn test_native_routes_are_skipped() {
        let doc = document(&[route(HttpMethod::Get, "/raw", "fn raw(req: Request) -> Response")]);
        assert!(doc.paths.is_empty());
        assert!(doc.components.is_none());
    }

    #[test]
    fn test_build_document_structure() {
        let doc = document(&[route(HttpMethod::Get, "/users", "fn list_users() -> Vec<User>")]);
        assert_eq!(doc.openapi, "3.1.0");
        assert_eq!(doc.info.title, "Generated API");
        let schemas = doc.components.unwrap().schemas.unwrap();
        assert_eq!(schemas.keys().collect::<Vec<_>>(), vec!["User"]);
    }

    #[test]
    fn test_registration_error_surfaces() {
        let routes = [route(HttpMethod::Get, "/ghost", "fn ghost() -> Ghost")];
        let err = build_document(&routes, &catalog(), &DocumentConfig::default()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("get_user"), "Get User");
        assert_eq!(title_case("admin.list_users"), "Admin.List Users");
    }
}
