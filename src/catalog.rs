use crate::error::{Error, Result};
use crate::parser::ParsedFile;
use crate::types::TypeRef;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Catalog of struct and enum definitions, parsed from Rust source.
///
/// Named annotations (`User`, `models::Page<User>`) are resolved against the
/// catalog. Definitions are keyed by their qualified path (`models::User`, or
/// just `User` at the root), so two types sharing a simple name in different
/// modules stay distinct.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    defs: BTreeMap<String, TypeDef>,
    /// Simple name -> qualified keys
    by_simple: BTreeMap<String, Vec<String>>,
}

/// A type definition found in source
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub module: String,
    pub generics: Vec<String>,
    pub kind: TypeDefKind,
}

#[derive(Debug, Clone)]
pub enum TypeDefKind {
    Struct(Vec<FieldDef>),
    /// An enum whose variants are all unit variants, by wire name
    Enum(Vec<String>),
    /// A tuple struct with one field
    Newtype(TypeRef),
    /// Anything serde can (de)serialize but that has no simple shape,
    /// e.g. enums carrying data
    Opaque,
}

/// Field definition in a struct
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    /// Name on the wire, after `rename` / `rename_all`
    pub wire_name: String,
    /// Declared type, generic parameters marked as [`TypeRef::Param`]
    pub ty: TypeRef,
    /// Whether serde fills the field in when it is missing
    pub has_default: bool,
}

/// The shape of a resolved named type, with generics substituted.
#[derive(Debug, Clone)]
pub enum Shape<'a> {
    Struct(Vec<ResolvedField<'a>>),
    Enum(&'a [String]),
    Newtype(TypeRef),
    Opaque,
}

#[derive(Debug, Clone)]
pub struct ResolvedField<'a> {
    pub def: &'a FieldDef,
    /// Canonical field type
    pub ty: TypeRef,
}

/// Serde attributes relevant to the wire shape
#[derive(Debug, Default)]
struct SerdeAttributes {
    rename: Option<String>,
    rename_all: Option<String>,
    default: bool,
    skip: bool,
}

impl TypeDef {
    pub fn qualified_name(&self) -> String {
        qualify(&self.module, &self.name)
    }
}

fn qualify(module: &str, name: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", module, name)
    }
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from every parsed file
    pub fn from_parsed_files(files: &[ParsedFile]) -> Self {
        let mut catalog = Self::new();
        for file in files {
            catalog.add_file(&file.module, &file.syntax_tree);
        }
        debug!("Catalog holds {} type definitions", catalog.len());
        catalog
    }

    /// Parses `source` and adds its definitions under `module`.
    pub fn add_source(&mut self, module: &str, source: &str) -> Result<()> {
        let file = syn::parse_file(source).map_err(|e| Error::ParseError {
            file: PathBuf::from(if module.is_empty() { "<root>" } else { module }),
            message: e.to_string(),
        })?;
        self.add_file(module, &file);
        Ok(())
    }

    pub fn add_file(&mut self, module: &str, file: &syn::File) {
        self.add_items(module, &file.items);
    }

    fn add_items(&mut self, module: &str, items: &[syn::Item]) {
        for item in items {
            match item {
                syn::Item::Struct(item_struct) => {
                    if let Some(def) = parse_struct(module, item_struct) {
                        self.insert(def);
                    }
                }
                syn::Item::Enum(item_enum) => self.insert(parse_enum(module, item_enum)),
                syn::Item::Mod(item_mod) => {
                    if let Some((_, nested)) = &item_mod.content {
                        let child = qualify(module, &item_mod.ident.to_string());
                        self.add_items(&child, nested);
                    }
                }
                _ => {}
            }
        }
    }

    fn insert(&mut self, def: TypeDef) {
        let key = def.qualified_name();
        debug!("Registering type definition {}", key);
        if self.defs.contains_key(&key) {
            warn!("Type {} is defined twice, keeping the last definition", key);
        } else {
            self.by_simple
                .entry(def.name.clone())
                .or_default()
                .push(key.clone());
        }
        self.defs.insert(key, def);
    }

    /// Adds the definitions of `other`. Definitions already present win.
    pub fn merge(&mut self, other: TypeCatalog) {
        for (key, def) in other.defs {
            if self.defs.contains_key(&key) {
                debug!("Keeping existing definition of {}", key);
                continue;
            }
            self.insert(def);
        }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Looks up a definition by canonical path
    pub fn get(&self, path: &[String]) -> Option<&TypeDef> {
        self.defs.get(&path.join("::"))
    }

    /// Finds the qualified key a path written in `from_module` refers to.
    fn resolve_key(&self, path: &[String], from_module: Option<&str>) -> std::result::Result<String, String> {
        let segments: Vec<&str> = path
            .iter()
            .map(String::as_str)
            .filter(|s| *s != "crate" && *s != "self")
            .collect();
        let joined = segments.join("::");

        if segments.len() > 1 {
            if self.defs.contains_key(&joined) {
                return Ok(joined);
            }
            // Allow paths relative to some parent module
            let suffix = format!("::{}", joined);
            let matches: Vec<&String> = self.defs.keys().filter(|k| k.ends_with(&suffix)).collect();
            return match matches.as_slice() {
                [only] => Ok((*only).clone()),
                [] => Err(format!("unknown type `{}`", joined)),
                _ => Err(format!("ambiguous type `{}`", joined)),
            };
        }

        let candidates = self.by_simple.get(&joined).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(module) = from_module {
            let local = qualify(module, &joined);
            if candidates.contains(&local) {
                return Ok(local);
            }
        }
        match candidates {
            [] => Err(format!("unknown type `{}`", joined)),
            [only] => Ok(only.clone()),
            _ if candidates.contains(&joined) => Ok(joined),
            _ => Err(format!(
                "ambiguous type `{}` (candidates: {})",
                joined,
                candidates.join(", ")
            )),
        }
    }

    /// Rewrites every named type in `ty` to its qualified path.
    ///
    /// Single-segment names prefer definitions in `from_module`. Unknown or
    /// ambiguous names are an error.
    pub fn canonicalize_in(&self, ty: &TypeRef, from_module: Option<&str>) -> std::result::Result<TypeRef, String> {
        let canonical = match ty {
            TypeRef::Named { path, args } => {
                let key = self.resolve_key(path, from_module)?;
                let args = args
                    .iter()
                    .map(|a| self.canonicalize_in(a, from_module))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                if let Some(def) = self.defs.get(&key) {
                    if def.generics.len() != args.len() {
                        return Err(format!(
                            "type `{}` expects {} type argument(s), got {}",
                            key,
                            def.generics.len(),
                            args.len()
                        ));
                    }
                }
                TypeRef::Named {
                    path: key.split("::").map(str::to_string).collect(),
                    args,
                }
            }
            TypeRef::Option(inner) => TypeRef::Option(Box::new(self.canonicalize_in(inner, from_module)?)),
            TypeRef::List(inner) => TypeRef::List(Box::new(self.canonicalize_in(inner, from_module)?)),
            TypeRef::Map(inner) => TypeRef::Map(Box::new(self.canonicalize_in(inner, from_module)?)),
            TypeRef::Cookie(inner) => TypeRef::Cookie(Box::new(self.canonicalize_in(inner, from_module)?)),
            TypeRef::Header(inner) => TypeRef::Header(Box::new(self.canonicalize_in(inner, from_module)?)),
            TypeRef::Form(inner) => TypeRef::Form(Box::new(self.canonicalize_in(inner, from_module)?)),
            TypeRef::Json(inner) => TypeRef::Json(Box::new(self.canonicalize_in(inner, from_module)?)),
            TypeRef::Status { code, payload } => TypeRef::Status {
                code: *code,
                payload: Box::new(self.canonicalize_in(payload, from_module)?),
            },
            TypeRef::Union(members) => TypeRef::Union(
                members
                    .iter()
                    .map(|m| self.canonicalize_in(m, from_module))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
            other => other.clone(),
        };
        Ok(canonical)
    }

    /// Canonicalizes an annotation written outside of any module.
    pub fn canonicalize(&self, ty: &TypeRef) -> std::result::Result<TypeRef, String> {
        self.canonicalize_in(ty, None)
    }

    /// Resolves a canonical named type to its shape.
    pub fn shape_of(&self, ty: &TypeRef) -> std::result::Result<Shape<'_>, String> {
        let TypeRef::Named { path, args } = ty else {
            return Err(format!("`{}` is not a named type", ty));
        };
        let def = self
            .get(path)
            .ok_or_else(|| format!("unknown type `{}`", path.join("::")))?;
        let bindings: BTreeMap<String, TypeRef> = def
            .generics
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        let concrete = |declared: &TypeRef| -> std::result::Result<TypeRef, String> {
            // Resolve names in the defining module before plugging in arguments,
            // which are already canonical.
            let local = self.canonicalize_in(declared, Some(&def.module))?;
            Ok(local.substitute(&bindings))
        };

        let shape = match &def.kind {
            TypeDefKind::Struct(fields) => Shape::Struct(
                fields
                    .iter()
                    .map(|field| -> std::result::Result<ResolvedField<'_>, String> {
                        Ok(ResolvedField {
                            def: field,
                            ty: concrete(&field.ty)?,
                        })
                    })
                    .collect::<std::result::Result<Vec<_>, String>>()?,
            ),
            TypeDefKind::Enum(variants) => Shape::Enum(variants),
            TypeDefKind::Newtype(inner) => Shape::Newtype(concrete(inner)?),
            TypeDefKind::Opaque => Shape::Opaque,
        };
        Ok(shape)
    }

    /// Whether a canonical type is read from a JSON request body when used as a
    /// parameter: structs, opaque types and maps of those.
    pub fn is_structured(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Named { .. } => match self.shape_of(ty) {
                Ok(Shape::Struct(_)) | Ok(Shape::Opaque) => true,
                Ok(Shape::Newtype(inner)) => self.is_structured(&inner),
                _ => false,
            },
            TypeRef::Map(inner) => self.is_structured(inner),
            _ => false,
        }
    }
}

fn parse_struct(module: &str, item_struct: &syn::ItemStruct) -> Option<TypeDef> {
    let name = item_struct.ident.to_string();
    let generics = type_generics(&item_struct.generics);
    let container = parse_serde_attributes(&item_struct.attrs);

    let kind = match &item_struct.fields {
        syn::Fields::Named(named) => {
            let mut fields = Vec::new();
            for field in &named.named {
                let Some(ident) = &field.ident else { continue };
                let attrs = parse_serde_attributes(&field.attrs);
                if attrs.skip {
                    debug!("Skipping field {}.{}", name, ident);
                    continue;
                }
                let ty = match TypeRef::from_syn(&field.ty) {
                    Ok(ty) => ty.mark_params(&generics),
                    Err(e) => {
                        warn!("Field {}.{} has an unsupported type: {}", name, ident, e);
                        TypeRef::Any
                    }
                };
                let field_name = ident.to_string();
                let wire_name = attrs.rename.clone().unwrap_or_else(|| match &container.rename_all {
                    Some(rule) => apply_rename_rule(&field_name, rule),
                    None => field_name.clone(),
                });
                fields.push(FieldDef {
                    has_default: attrs.default || container.default || ty.is_option(),
                    name: field_name,
                    wire_name,
                    ty,
                });
            }
            TypeDefKind::Struct(fields)
        }
        syn::Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
            let inner = &unnamed.unnamed[0].ty;
            match TypeRef::from_syn(inner) {
                Ok(ty) => TypeDefKind::Newtype(ty.mark_params(&generics)),
                Err(_) => TypeDefKind::Opaque,
            }
        }
        syn::Fields::Unnamed(_) => TypeDefKind::Opaque,
        syn::Fields::Unit => return None,
    };

    Some(TypeDef {
        name,
        module: module.to_string(),
        generics,
        kind,
    })
}

fn parse_enum(module: &str, item_enum: &syn::ItemEnum) -> TypeDef {
    let name = item_enum.ident.to_string();
    let container = parse_serde_attributes(&item_enum.attrs);
    let all_unit = item_enum
        .variants
        .iter()
        .all(|v| matches!(v.fields, syn::Fields::Unit));

    let kind = if all_unit {
        let variants = item_enum
            .variants
            .iter()
            .filter_map(|variant| {
                let attrs = parse_serde_attributes(&variant.attrs);
                if attrs.skip {
                    return None;
                }
                let ident = variant.ident.to_string();
                Some(attrs.rename.unwrap_or_else(|| match &container.rename_all {
                    Some(rule) => apply_rename_rule(&ident, rule),
                    None => ident,
                }))
            })
            .collect();
        TypeDefKind::Enum(variants)
    } else {
        TypeDefKind::Opaque
    };

    TypeDef {
        name,
        module: module.to_string(),
        generics: type_generics(&item_enum.generics),
        kind,
    }
}

fn type_generics(generics: &syn::Generics) -> Vec<String> {
    generics
        .type_params()
        .map(|param| param.ident.to_string())
        .collect()
}

/// Parse Serde attributes from field, variant or container attributes
fn parse_serde_attributes(attrs: &[syn::Attribute]) -> SerdeAttributes {
    let mut serde_attrs = SerdeAttributes::default();

    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }

        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") || meta.path.is_ident("rename_all") {
                let is_all = meta.path.is_ident("rename_all");
                let value = if meta.input.peek(syn::Token![=]) {
                    Some(meta.value()?.parse::<syn::LitStr>()?.value())
                } else {
                    // rename(deserialize = "...", serialize = "...")
                    let mut deserialize = None;
                    meta.parse_nested_meta(|inner| {
                        let lit = inner.value()?.parse::<syn::LitStr>()?;
                        if inner.path.is_ident("deserialize") {
                            deserialize = Some(lit.value());
                        }
                        Ok(())
                    })?;
                    deserialize
                };
                if is_all {
                    serde_attrs.rename_all = value;
                } else {
                    serde_attrs.rename = value;
                }
            } else if meta.path.is_ident("default") {
                serde_attrs.default = true;
                skip_meta_value(&meta)?;
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                serde_attrs.skip = true;
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        });

        if let Err(e) = parsed {
            warn!("Ignoring unparsable serde attribute: {}", e);
        }
    }

    serde_attrs
}

fn skip_meta_value(meta: &syn::meta::ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta_value(&inner))?;
    }
    Ok(())
}

/// Applies a serde `rename_all` rule to a field or variant name.
fn apply_rename_rule(ident: &str, rule: &str) -> String {
    let words = split_words(ident);
    let capitalize = |w: &String| {
        let mut chars = w.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    };

    match rule {
        "lowercase" => words.concat(),
        "UPPERCASE" => words.concat().to_uppercase(),
        "PascalCase" => words.iter().map(capitalize).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.clone() } else { capitalize(w) })
            .collect(),
        "snake_case" => words.join("_"),
        "SCREAMING_SNAKE_CASE" => words.join("_").to_uppercase(),
        "kebab-case" => words.join("-"),
        "SCREAMING-KEBAB-CASE" => words.join("-").to_uppercase(),
        other => {
            warn!("Unknown rename_all rule `{}`", other);
            ident.to_string()
        }
    }
}

/// Splits `snake_case` or `PascalCase` identifiers into lowercase words.
fn split_words(ident: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in ident.chars() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.extend(c.to_lowercase());
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(code: &str) -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog.add_source("", code).unwrap();
        catalog
    }

    fn named(path: &[&str]) -> TypeRef {
        TypeRef::Named {
            path: path.iter().map(|s| s.to_string()).collect(),
            args: vec![],
        }
    }

    #[test]
    fn test_struct_fields_and_defaults() {
        let catalog = catalog(
            r#"
            #[derive(Serialize, Deserialize)]
            pub struct User {
                pub id: u32,
                #[serde(rename = "userName")]
                pub name: String,
                pub email: Option<String>,
                #[serde(default)]
                pub active: bool,
                #[serde(skip)]
                pub password: String,
            }
        "#,
        );

        let Shape::Struct(fields) = catalog.shape_of(&named(&["User"])).unwrap() else {
            panic!("Expected struct shape");
        };
        let wire: Vec<&str> = fields.iter().map(|f| f.def.wire_name.as_str()).collect();
        assert_eq!(wire, vec!["id", "userName", "email", "active"]);
        let defaults: Vec<bool> = fields.iter().map(|f| f.def.has_default).collect();
        assert_eq!(defaults, vec![false, false, true, true]);
    }

    #[test]
    fn test_merge_keeps_existing_definitions() {
        let mut base = catalog("struct User { id: i64 }");
        let other = catalog("struct User { name: String } struct Team { id: i64 }");
        base.merge(other);
        assert_eq!(base.len(), 2);
        let Shape::Struct(fields) = base.shape_of(&named(&["User"])).unwrap() else {
            panic!("Expected struct shape");
        };
        assert_eq!(fields[0].def.name, "id");
        assert!(base.canonicalize(&named(&["Team"])).is_ok());
    }

    #[test]
    fn test_rename_all() {
        let catalog = catalog(
            r#"
            #[serde(rename_all = "camelCase")]
            struct Profile { display_name: String, avatar_url: String }

            #[serde(rename_all = "snake_case")]
            enum Status { Active, OnHold }
        "#,
        );

        let Shape::Struct(fields) = catalog.shape_of(&named(&["Profile"])).unwrap() else {
            panic!("Expected struct shape");
        };
        assert_eq!(fields[0].def.wire_name, "displayName");
        assert_eq!(fields[1].def.wire_name, "avatarUrl");

        match catalog.shape_of(&named(&["Status"])).unwrap() {
            Shape::Enum(variants) => assert_eq!(variants, &["active", "on_hold"]),
            other => panic!("Expected enum shape, got {:?}", other),
        }
    }

    #[test]
    fn test_same_simple_name_in_two_modules() {
        let mut catalog = TypeCatalog::new();
        catalog
            .add_source("", "struct Account { user: admin::User } mod admin { pub struct User { level: u8 } }")
            .unwrap();
        catalog.add_source("public", "struct User { nick: String }").unwrap();

        let err = catalog.canonicalize(&named(&["User"])).unwrap_err();
        assert!(err.contains("ambiguous"));

        assert_eq!(
            catalog.canonicalize_in(&named(&["User"]), Some("public")).unwrap(),
            named(&["public", "User"])
        );

        let Shape::Struct(fields) = catalog.shape_of(&named(&["Account"])).unwrap() else {
            panic!("Expected struct shape");
        };
        assert_eq!(fields[0].ty, named(&["admin", "User"]));
    }

    #[test]
    fn test_generic_substitution() {
        let catalog = catalog(
            r#"
            struct Page<T> { items: Vec<T>, total: u64 }
            struct User { id: i64 }
        "#,
        );
        let page_of_users = catalog
            .canonicalize(&TypeRef::parse_str("Page<User>").unwrap())
            .unwrap();

        let Shape::Struct(fields) = catalog.shape_of(&page_of_users).unwrap() else {
            panic!("Expected struct shape");
        };
        assert_eq!(fields[0].ty, TypeRef::List(Box::new(named(&["User"]))));

        let err = catalog
            .canonicalize(&TypeRef::parse_str("Page").unwrap())
            .unwrap_err();
        assert!(err.contains("expects 1 type argument"));
    }

    #[test]
    fn test_unknown_type() {
        let catalog = catalog("struct User { id: i64 }");
        let err = catalog.canonicalize(&named(&["Ghost"])).unwrap_err();
        assert_eq!(err, "unknown type `Ghost`");
    }

    #[test]
    fn test_is_structured() {
        let catalog = catalog(
            r#"
            struct User { id: i64 }
            struct UserId(i64);
            enum Color { Red, Green }
            enum Event { Click { x: i32 }, Key(char) }
        "#,
        );
        assert!(catalog.is_structured(&named(&["User"])));
        assert!(catalog.is_structured(&TypeRef::Map(Box::new(named(&["User"])))));
        assert!(catalog.is_structured(&named(&["Event"])));
        assert!(!catalog.is_structured(&named(&["UserId"])));
        assert!(!catalog.is_structured(&named(&["Color"])));
        assert!(!catalog.is_structured(&TypeRef::parse_str("Vec<User>").unwrap()));
    }

    #[test]
    fn test_invalid_source() {
        let mut catalog = TypeCatalog::new();
        assert!(catalog.add_source("broken", "struct {").is_err());
    }
}
