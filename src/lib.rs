//! sigroute - bind type-annotated handler signatures to web frameworks and
//! derive OpenAPI documents from the same declarations.
//!
//! A handler is declared as a Rust signature:
//!
//! ```text
//! /// Fetch one user.
//! fn get_user(id: i64, #[default = 0] page: i64, #[cookie] session: Option<String>)
//!     -> Union<User, NotFound<()>>;
//! ```
//!
//! From it the crate derives, once at registration time:
//!
//! - where each parameter comes from (path, query, header, cookie, JSON body
//!   or form) and how it is coerced ([`classify`], [`structure`])
//! - which serializer each response status uses ([`responses`])
//! - an [`adapter::Adapter`] that runs those plans against any framework's
//!   request type through a [`binding::Binding`]
//! - the OpenAPI operation and component schemas ([`schema_generator`],
//!   [`openapi_builder`])
//!
//! # Modules
//!
//! 1. [`path`] - route templates in `{name}` and `<conv:name>` syntax
//! 2. [`types`], [`signature`], [`catalog`] - annotations, declarations and
//!    the struct/enum definitions they refer to
//! 3. [`classify`] - parameter sources
//! 4. [`responses`], [`reply`], [`cookie`] - response shapes and what handlers return
//! 5. [`adapter`], [`binding`] - per-route request handling
//! 6. [`app`] - registration, mounting and dispatch with `matchit`
//! 7. [`schema_generator`], [`openapi_builder`], [`serializer`] - documentation
//! 8. [`scanner`], [`parser`], [`declare`], [`cli`] - static generation from
//!    `#[get("/path")]`-annotated source files
//!
//! # Example Usage
//!
//! ```
//! use sigroute::app::App;
//! use sigroute::adapter::Handler;
//! use sigroute::binding::raw::RawBinding;
//! use sigroute::reply::{HandlerResult, Reply};
//!
//! let mut app: App<RawBinding> = App::new();
//! app.types("", "pub struct User { pub id: i64, pub name: String }")
//!     .unwrap()
//!     .get(
//!         "/users/<int:id>",
//!         "fn get_user(id: i64) -> User",
//!         Handler::sync(|args| -> HandlerResult {
//!             let id: i64 = args.get("id")?;
//!             Ok(Reply::json(&serde_json::json!({ "id": id, "name": "ann" }))?)
//!         }),
//!     )
//!     .unwrap();
//!
//! let doc = app.openapi().unwrap();
//! assert!(doc.paths.contains_key("/users/{id}"));
//! ```

pub mod adapter;
pub mod app;
pub mod binding;
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod cookie;
pub mod declare;
pub mod error;
pub mod openapi_builder;
pub mod parser;
pub mod path;
pub mod reply;
pub mod responses;
pub mod route;
pub mod scanner;
pub mod schema_generator;
pub mod serializer;
pub mod signature;
pub mod structure;
pub mod types;

pub use adapter::{Adapter, Args, Handler};
pub use app::{App, Service};
pub use error::{ClientError, Error, Result};
pub use reply::{HandlerResult, Reply, ResponseException};
pub use route::{HttpMethod, RouteDecl};
