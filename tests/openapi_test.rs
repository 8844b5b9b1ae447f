//! Document generation through the application surface.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sigroute::adapter::{Args, Handler};
use sigroute::app::App;
use sigroute::binding::raw::RawBinding;
use sigroute::openapi_builder::SecurityScheme;
use sigroute::reply::Reply;
use sigroute::serializer::{serialize, OutputFormat};

fn ok() -> Handler<RawBinding> {
    Handler::sync(|_args: Args<RawBinding>| Reply::no_content())
}

fn users_app() -> App<RawBinding> {
    let mut app: App<RawBinding> = App::new();
    app.types(
        "",
        r#"
        pub struct User { pub id: i64, pub name: String, pub role: Role, pub email: Option<String> }
        pub enum Role { Admin, Member }
        pub struct Page<T> { pub items: Vec<T>, pub next: Option<i64> }
        mod admin { pub struct User { pub level: u8 } }
        mod billing { pub struct User { pub plan: String } }
        "#,
    )
    .unwrap();
    app.info("Users", "1.2.0", Some("User management"))
        .security_scheme("session", SecurityScheme::cookie("session"));
    app.get("/users", "fn list_users(#[default = 0] page: i64) -> Page<User>", ok())
        .unwrap()
        .get("/admins/{id}", "fn get_admin(id: i64) -> admin::User", ok())
        .unwrap()
        .get("/plans/<int:id>", "fn get_plan(id: i64) -> billing::User", ok())
        .unwrap()
        .delete(
            "/users/{id}",
            "fn delete_user(id: i64, #[cookie] session: String) -> ()",
            ok(),
        )
        .unwrap();
    app
}

fn document_json(app: &App<RawBinding>) -> Value {
    serde_json::to_value(app.openapi().unwrap()).unwrap()
}

#[test]
fn test_component_names_and_collisions() {
    let doc = document_json(&users_app());
    let schemas = doc["components"]["schemas"].as_object().unwrap();
    let names: Vec<&str> = schemas.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Page[User]", "Role", "User", "User0", "User1"]);

    // Route types are named in route order; types they refer to are named
    // when the queue is drained, after every route.
    assert_eq!(schemas["User"]["properties"]["level"]["format"], "int32");
    assert_eq!(schemas["User0"]["properties"]["plan"]["type"], "string");
    assert_eq!(schemas["User1"]["required"], json!(["id", "name", "role"]));
    assert_eq!(
        schemas["User1"]["properties"]["role"],
        json!({"$ref": "#/components/schemas/Role"})
    );

    assert_eq!(
        schemas["Page[User]"],
        json!({
            "type": "object",
            "properties": {
                "items": {"type": "array", "items": {"$ref": "#/components/schemas/User1"}},
                "next": {"oneOf": [{"type": "integer", "format": "int64"}, {"type": "null"}]}
            },
            "required": ["items"]
        })
    );
    assert_eq!(schemas["Role"], json!({"type": "string", "enum": ["Admin", "Member"]}));
}

#[test]
fn test_generation_is_deterministic() {
    let app = users_app();
    let first = serialize(&app.openapi().unwrap(), OutputFormat::Yaml).unwrap();
    let second = serialize(&app.openapi().unwrap(), OutputFormat::Yaml).unwrap();
    assert_eq!(first, second);

    let rebuilt = serialize(&users_app().openapi().unwrap(), OutputFormat::Yaml).unwrap();
    assert_eq!(first, rebuilt);
}

#[test]
fn test_operations() {
    let doc = document_json(&users_app());
    assert_eq!(doc["openapi"], "3.1.0");
    assert_eq!(doc["info"], json!({"title": "Users", "version": "1.2.0", "description": "User management"}));

    let list = &doc["paths"]["/users"]["get"];
    assert_eq!(list["operationId"], "list_users");
    assert_eq!(list["summary"], "List Users");
    assert_eq!(list["parameters"][0]["in"], "query");
    assert_eq!(list["parameters"][0]["required"], false);
    assert_eq!(
        list["responses"]["200"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/Page[User]"
    );

    let plan = &doc["paths"]["/plans/{id}"]["get"];
    assert_eq!(plan["parameters"][0]["in"], "path");
    assert_eq!(plan["parameters"][0]["required"], true);

    let delete = &doc["paths"]["/users/{id}"]["delete"];
    assert_eq!(delete["responses"], json!({"204": {"description": "No Content"}}));
    assert_eq!(delete["security"], json!([{"session": []}]));
    assert_eq!(
        doc["components"]["securitySchemes"]["session"],
        json!({"type": "apiKey", "in": "cookie", "name": "session"})
    );
    assert!(list.get("security").is_none());
}

#[test]
fn test_mounted_routes_are_documented_with_prefixes() {
    let mut app: App<RawBinding> = App::new();
    app.summary_transformer(|route| Some(format!("[{}]", route.name)));
    app.mount("/api/v1", Some("v1"), users_app()).unwrap();

    let doc = document_json(&app);
    let paths: Vec<&str> = doc["paths"].as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        vec!["/api/v1/admins/{id}", "/api/v1/plans/{id}", "/api/v1/users", "/api/v1/users/{id}"]
    );
    let list = &doc["paths"]["/api/v1/users"]["get"];
    assert_eq!(list["operationId"], "v1.list_users");
    assert_eq!(list["summary"], "[v1.list_users]");
    assert!(doc["components"]["securitySchemes"]["session"].is_object());
}
