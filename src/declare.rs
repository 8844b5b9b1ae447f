//! Static route declarations.
//!
//! Handlers can be declared in source with route attributes, the same way
//! attribute-routed web frameworks do:
//!
//! ```ignore
//! #[scope("/api")]
//! mod users {
//!     /// Fetch one user.
//!     #[get("/users/{id}")]
//!     #[tags("users")]
//!     fn get_user(id: i64, #[default = 0] page: i64) -> Union<User, NotFound<()>>;
//! }
//! ```
//!
//! [`extract_routes`] walks parsed files and turns every annotated function
//! (free function, trait method or impl method) into a [`RouteDecl`].

use crate::parser::ParsedFile;
use crate::path::join_paths;
use crate::route::{HttpMethod, RouteDecl};
use crate::signature::Signature;
use log::{debug, warn};
use syn::visit::Visit;
use syn::{Attribute, LitStr, Meta};

/// Finds every annotated handler declaration in `files`, in file order.
///
/// Declarations that cannot be turned into routes are logged and skipped.
pub fn extract_routes(files: &[ParsedFile]) -> Vec<RouteDecl> {
    let mut visitor = RouteVisitor::default();
    for file in files {
        visitor.file = file.path.display().to_string();
        visitor.visit_file(&file.syntax_tree);
    }
    debug!("Found {} declared routes", visitor.routes.len());
    visitor.routes
}

#[derive(Default)]
struct RouteVisitor {
    file: String,
    /// Path prefixes of the enclosing `#[scope]`d items
    scopes: Vec<String>,
    routes: Vec<RouteDecl>,
}

impl RouteVisitor {
    fn current_scope(&self) -> String {
        self.scopes.last().cloned().unwrap_or_default()
    }

    /// Runs `visit` with the item's `#[scope]`, if any, pushed.
    fn scoped(&mut self, attrs: &[Attribute], visit: impl FnOnce(&mut Self)) {
        match scope_attr(attrs) {
            Some(prefix) => {
                let scope = join_paths(&self.current_scope(), &prefix);
                self.scopes.push(scope);
                visit(self);
                self.scopes.pop();
            }
            None => visit(self),
        }
    }

    fn collect(&mut self, sig: &syn::Signature, attrs: &[Attribute]) {
        let routes: Vec<(HttpMethod, String)> = attrs.iter().filter_map(route_attr).collect();
        if routes.is_empty() {
            return;
        }

        let signature = match Signature::from_syn(sig, attrs) {
            Ok(signature) => signature,
            Err(e) => {
                warn!("{}: skipping handler `{}`: {}", self.file, sig.ident, e);
                return;
            }
        };
        let name = name_attr(attrs);
        let tags = tags_attr(attrs);

        for (method, path) in routes {
            let full_path = join_paths(&self.current_scope(), &path);
            let route = match RouteDecl::new(method, &full_path, signature.clone()) {
                Ok(route) => route,
                Err(e) => {
                    warn!("{}: skipping {} {}: {}", self.file, method, full_path, e);
                    continue;
                }
            };
            let route = match &name {
                Some(name) => route.with_name(name.clone()),
                None => route,
            };
            debug!("Declared route {} {} -> {}", method, full_path, route.name);
            self.routes.push(route.with_tags(tags.clone()));
        }
    }
}

impl<'ast> Visit<'ast> for RouteVisitor {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        self.collect(&node.sig, &node.attrs);
        syn::visit::visit_item_fn(self, node);
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        self.collect(&node.sig, &node.attrs);
        syn::visit::visit_trait_item_fn(self, node);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        self.collect(&node.sig, &node.attrs);
        syn::visit::visit_impl_item_fn(self, node);
    }

    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        self.scoped(&node.attrs, |v| syn::visit::visit_item_mod(v, node));
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        self.scoped(&node.attrs, |v| syn::visit::visit_item_trait(v, node));
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        self.scoped(&node.attrs, |v| syn::visit::visit_item_impl(v, node));
    }
}

/// `#[get("/path")]` and friends
fn route_attr(attr: &Attribute) -> Option<(HttpMethod, String)> {
    let ident = attr.path().segments.last()?.ident.to_string();
    if ident.chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let method = HttpMethod::parse(&ident)?;
    let path = attr.parse_args::<LitStr>().ok()?.value();
    Some((method, path))
}

/// `#[scope("/prefix")]`
fn scope_attr(attrs: &[Attribute]) -> Option<String> {
    attrs
        .iter()
        .find(|a| a.path().is_ident("scope"))
        .and_then(|a| a.parse_args::<LitStr>().ok())
        .map(|lit| lit.value())
}

/// `#[name = "route.name"]` or `#[name("route.name")]`
fn name_attr(attrs: &[Attribute]) -> Option<String> {
    let attr = attrs.iter().find(|a| a.path().is_ident("name"))?;
    match &attr.meta {
        Meta::NameValue(nv) => match &nv.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(s), ..
            }) => Some(s.value()),
            _ => None,
        },
        Meta::List(_) => attr.parse_args::<LitStr>().ok().map(|s| s.value()),
        Meta::Path(_) => None,
    }
}

/// `#[tags("a", "b")]`, possibly repeated
fn tags_attr(attrs: &[Attribute]) -> Vec<String> {
    let mut tags = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("tags")) {
        let parsed = attr.parse_args_with(
            syn::punctuated::Punctuated::<LitStr, syn::Token![,]>::parse_terminated,
        );
        match parsed {
            Ok(list) => tags.extend(list.into_iter().map(|s| s.value())),
            Err(e) => warn!("Ignoring malformed #[tags]: {}", e),
        }
    }
    tags
}
