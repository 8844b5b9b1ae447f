//! Type annotations.
//!
//! Handler parameters and return values are annotated with ordinary Rust type
//! syntax. [`TypeRef`] is the parsed form of such an annotation, shared by the
//! parameter classifier, the response normalizer, the structuring service and
//! the schema generator.
//!
//! Besides the usual std types a handful of marker names are recognised:
//!
//! | Annotation | Meaning |
//! |---|---|
//! | `Cookie<T>`, `Header<T>` | value read from a cookie / header |
//! | `Form<T>`, `Json<T>` | form-encoded / JSON request body |
//! | `Literal<"a", "b">` | one of a fixed set of strings |
//! | `Union<A, B>` | any of several types |
//! | `Response<201, T>`, `Created<T>`, ... | payload `T` sent with a given status |
//! | `Request`, `Response` | the framework's native request / response |
//! | `Bytes`, `Vec<u8>` | raw bytes |
//! | `Value` | arbitrary JSON |

use std::collections::BTreeMap;
use std::fmt;

/// Primitive types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    String,
    Char,
    Bool,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Bytes,
}

impl PrimitiveType {
    /// Parse a primitive type name
    pub fn parse(type_name: &str) -> Option<PrimitiveType> {
        match type_name {
            "String" | "str" => Some(PrimitiveType::String),
            "char" => Some(PrimitiveType::Char),
            "bool" => Some(PrimitiveType::Bool),
            "i8" => Some(PrimitiveType::I8),
            "i16" => Some(PrimitiveType::I16),
            "i32" => Some(PrimitiveType::I32),
            "i64" | "isize" => Some(PrimitiveType::I64),
            "i128" => Some(PrimitiveType::I128),
            "u8" => Some(PrimitiveType::U8),
            "u16" => Some(PrimitiveType::U16),
            "u32" => Some(PrimitiveType::U32),
            "u64" | "usize" => Some(PrimitiveType::U64),
            "u128" => Some(PrimitiveType::U128),
            "f32" => Some(PrimitiveType::F32),
            "f64" => Some(PrimitiveType::F64),
            "Bytes" => Some(PrimitiveType::Bytes),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::String => "String",
            PrimitiveType::Char => "char",
            PrimitiveType::Bool => "bool",
            PrimitiveType::I8 => "i8",
            PrimitiveType::I16 => "i16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::I64 => "i64",
            PrimitiveType::I128 => "i128",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::U128 => "u128",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::Bytes => "Bytes",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            PrimitiveType::I8
                | PrimitiveType::I16
                | PrimitiveType::I32
                | PrimitiveType::I64
                | PrimitiveType::I128
                | PrimitiveType::U8
                | PrimitiveType::U16
                | PrimitiveType::U32
                | PrimitiveType::U64
                | PrimitiveType::U128
        )
    }

    /// Inclusive bounds of an integer type, as `i128`.
    ///
    /// `u128` is clamped to `i128::MAX`; values beyond that cannot be
    /// represented as JSON numbers anyway.
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            PrimitiveType::I8 => (i8::MIN as i128, i8::MAX as i128),
            PrimitiveType::I16 => (i16::MIN as i128, i16::MAX as i128),
            PrimitiveType::I32 => (i32::MIN as i128, i32::MAX as i128),
            PrimitiveType::I64 => (i64::MIN as i128, i64::MAX as i128),
            PrimitiveType::I128 => (i128::MIN, i128::MAX),
            PrimitiveType::U8 => (0, u8::MAX as i128),
            PrimitiveType::U16 => (0, u16::MAX as i128),
            PrimitiveType::U32 => (0, u32::MAX as i128),
            PrimitiveType::U64 => (0, u64::MAX as i128),
            PrimitiveType::U128 => (0, i128::MAX),
            _ => return None,
        };
        Some(bounds)
    }
}

/// A parsed type annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    Primitive(PrimitiveType),
    /// `()`: no value. As a return annotation this means "no content".
    Unit,
    /// Arbitrary JSON (`serde_json::Value`)
    Any,
    Option(Box<TypeRef>),
    List(Box<TypeRef>),
    /// A string-keyed map
    Map(Box<TypeRef>),
    Literal(Vec<String>),
    Union(Vec<TypeRef>),
    /// A struct or enum, looked up in a [`TypeCatalog`](crate::catalog::TypeCatalog)
    Named { path: Vec<String>, args: Vec<TypeRef> },
    /// A generic parameter inside a struct definition
    Param(String),
    Cookie(Box<TypeRef>),
    Header(Box<TypeRef>),
    Form(Box<TypeRef>),
    Json(Box<TypeRef>),
    /// A payload bound to an explicit status code
    Status { code: u16, payload: Box<TypeRef> },
    NativeRequest,
    NativeResponse,
}

/// Named status wrappers and the codes they bind.
const STATUS_WRAPPERS: &[(&str, u16)] = &[
    ("Ok", 200),
    ("Created", 201),
    ("NoContent", 204),
    ("Found", 302),
    ("SeeOther", 303),
    ("BadRequest", 400),
    ("Unauthorized", 401),
    ("Forbidden", 403),
    ("NotFound", 404),
    ("Conflict", 409),
    ("TooManyRequests", 429),
    ("InternalServerError", 500),
];

impl TypeRef {
    /// Parse an annotation from source text, e.g. `"Option<Vec<User>>"`.
    pub fn parse_str(source: &str) -> Result<TypeRef, String> {
        let ty: syn::Type = syn::parse_str(source).map_err(|e| e.to_string())?;
        Self::from_syn(&ty)
    }

    /// Extract a TypeRef from a syn::Type
    pub fn from_syn(ty: &syn::Type) -> Result<TypeRef, String> {
        match ty {
            syn::Type::Path(type_path) => Self::from_path(&type_path.path),
            syn::Type::Reference(type_ref) => Self::from_syn(&type_ref.elem),
            syn::Type::Paren(paren) => Self::from_syn(&paren.elem),
            syn::Type::Group(group) => Self::from_syn(&group.elem),
            syn::Type::Tuple(tuple) if tuple.elems.is_empty() => Ok(TypeRef::Unit),
            syn::Type::Slice(slice) => Ok(Self::list_of(Self::from_syn(&slice.elem)?)),
            syn::Type::Array(array) => Ok(Self::list_of(Self::from_syn(&array.elem)?)),
            other => Err(format!(
                "unsupported type annotation `{}`",
                quote_type(other)
            )),
        }
    }

    fn list_of(inner: TypeRef) -> TypeRef {
        if inner == TypeRef::Primitive(PrimitiveType::U8) {
            TypeRef::Primitive(PrimitiveType::Bytes)
        } else {
            TypeRef::List(Box::new(inner))
        }
    }

    /// Extract a TypeRef from a syn::Path
    fn from_path(path: &syn::Path) -> Result<TypeRef, String> {
        let segment = path
            .segments
            .last()
            .ok_or_else(|| "empty type path".to_string())?;
        let type_name = segment.ident.to_string();
        let args = GenericArgs::collect(&segment.arguments)?;
        let qualified = path.segments.len() > 1;

        if !qualified && args.is_empty() {
            if let Some(primitive) = PrimitiveType::parse(&type_name) {
                return Ok(TypeRef::Primitive(primitive));
            }
            match type_name.as_str() {
                "Value" => return Ok(TypeRef::Any),
                "Request" => return Ok(TypeRef::NativeRequest),
                "Response" => return Ok(TypeRef::NativeResponse),
                _ => {}
            }
        }

        match type_name.as_str() {
            "Option" => return Ok(TypeRef::Option(Box::new(args.single_type(&type_name)?))),
            "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => {
                return Ok(Self::list_of(args.single_type(&type_name)?));
            }
            "Box" | "Arc" | "Rc" | "Cow" => return args.single_type(&type_name),
            "HashMap" | "BTreeMap" | "IndexMap" => {
                if args.types.len() != 2 {
                    return Err(format!("`{}` takes a key and a value type", type_name));
                }
                if args.types[0] != TypeRef::Primitive(PrimitiveType::String) {
                    return Err(format!("`{}` keys must be `String`", type_name));
                }
                return Ok(TypeRef::Map(Box::new(args.types[1].clone())));
            }
            "Literal" => {
                if args.strings.is_empty() || !args.types.is_empty() {
                    return Err("`Literal` takes one or more string literals".to_string());
                }
                return Ok(TypeRef::Literal(args.strings));
            }
            "Union" => {
                if args.types.is_empty() {
                    return Err("`Union` needs at least one member".to_string());
                }
                return Ok(TypeRef::union_of(args.types));
            }
            "Cookie" => return Ok(TypeRef::Cookie(Box::new(args.type_or_string(&type_name)?))),
            "Header" => return Ok(TypeRef::Header(Box::new(args.type_or_string(&type_name)?))),
            "Form" => return Ok(TypeRef::Form(Box::new(args.single_type(&type_name)?))),
            "Json" => return Ok(TypeRef::Json(Box::new(args.single_type(&type_name)?))),
            "Response" => {
                let code = args
                    .integers
                    .first()
                    .copied()
                    .ok_or_else(|| "`Response` needs a status code, e.g. `Response<201, T>`".to_string())?;
                let payload = args.types.first().cloned().unwrap_or(TypeRef::Unit);
                return Ok(TypeRef::Status {
                    code,
                    payload: Box::new(payload),
                });
            }
            _ => {}
        }

        if let Some((_, code)) = STATUS_WRAPPERS.iter().find(|(name, _)| *name == type_name) {
            let payload = args.types.first().cloned().unwrap_or(TypeRef::Unit);
            return Ok(TypeRef::Status {
                code: *code,
                payload: Box::new(payload),
            });
        }

        Ok(TypeRef::Named {
            path: path.segments.iter().map(|s| s.ident.to_string()).collect(),
            args: args.types,
        })
    }

    /// Builds a union, flattening nested unions and dropping duplicates.
    pub fn union_of(members: Vec<TypeRef>) -> TypeRef {
        let mut flat: Vec<TypeRef> = Vec::new();
        for member in members {
            let nested = match member {
                TypeRef::Union(inner) => inner,
                other => vec![other],
            };
            for ty in nested {
                if !flat.contains(&ty) {
                    flat.push(ty);
                }
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            TypeRef::Union(flat)
        }
    }

    /// Strips parameter markers (`Cookie`, `Header`, `Form`, `Json`).
    pub fn unwrap_marker(&self) -> &TypeRef {
        match self {
            TypeRef::Cookie(inner)
            | TypeRef::Header(inner)
            | TypeRef::Form(inner)
            | TypeRef::Json(inner) => inner.unwrap_marker(),
            other => other,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, TypeRef::Primitive(PrimitiveType::String))
    }

    pub fn is_option(&self) -> bool {
        matches!(self, TypeRef::Option(_))
    }

    /// Replaces generic parameters by the given arguments.
    pub fn substitute(&self, bindings: &BTreeMap<String, TypeRef>) -> TypeRef {
        if bindings.is_empty() {
            return self.clone();
        }
        self.map_children(&|ty| match ty {
            TypeRef::Param(name) => bindings.get(name).cloned(),
            _ => None,
        })
    }

    /// Turns single-segment names listed in `generics` into [`TypeRef::Param`]s.
    pub fn mark_params(&self, generics: &[String]) -> TypeRef {
        if generics.is_empty() {
            return self.clone();
        }
        self.map_children(&|ty| match ty {
            TypeRef::Named { path, args } if path.len() == 1 && args.is_empty() => generics
                .iter()
                .find(|g| **g == path[0])
                .map(|g| TypeRef::Param(g.clone())),
            _ => None,
        })
    }

    /// Rebuilds the tree bottom-up, letting `replace` swap out any node.
    fn map_children(&self, replace: &dyn Fn(&TypeRef) -> Option<TypeRef>) -> TypeRef {
        if let Some(replacement) = replace(self) {
            return replacement;
        }
        let boxed = |inner: &TypeRef| Box::new(inner.map_children(replace));
        match self {
            TypeRef::Option(inner) => TypeRef::Option(boxed(inner)),
            TypeRef::List(inner) => TypeRef::List(boxed(inner)),
            TypeRef::Map(inner) => TypeRef::Map(boxed(inner)),
            TypeRef::Cookie(inner) => TypeRef::Cookie(boxed(inner)),
            TypeRef::Header(inner) => TypeRef::Header(boxed(inner)),
            TypeRef::Form(inner) => TypeRef::Form(boxed(inner)),
            TypeRef::Json(inner) => TypeRef::Json(boxed(inner)),
            TypeRef::Status { code, payload } => TypeRef::Status {
                code: *code,
                payload: boxed(payload),
            },
            TypeRef::Union(members) => {
                TypeRef::Union(members.iter().map(|m| m.map_children(replace)).collect())
            }
            TypeRef::Named { path, args } => TypeRef::Named {
                path: path.clone(),
                args: args.iter().map(|a| a.map_children(replace)).collect(),
            },
            leaf => leaf.clone(),
        }
    }

    /// Human readable name, also used to name generic schema instantiations
    /// (`Page[User]`).
    pub fn display_name(&self) -> String {
        match self {
            TypeRef::Primitive(p) => p.name().to_string(),
            TypeRef::Unit => "None".to_string(),
            TypeRef::Any => "Value".to_string(),
            TypeRef::Option(inner) => format!("Option[{}]", inner.display_name()),
            TypeRef::List(inner) => format!("Vec[{}]", inner.display_name()),
            TypeRef::Map(inner) => format!("Map[{}]", inner.display_name()),
            TypeRef::Literal(values) => format!("Literal[{}]", values.join(", ")),
            TypeRef::Union(members) => members
                .iter()
                .map(TypeRef::display_name)
                .collect::<Vec<_>>()
                .join(" | "),
            TypeRef::Named { path, args } => {
                let base = path.last().cloned().unwrap_or_default();
                if args.is_empty() {
                    base
                } else {
                    let args: Vec<String> = args.iter().map(TypeRef::display_name).collect();
                    format!("{}[{}]", base, args.join(", "))
                }
            }
            TypeRef::Param(name) => name.clone(),
            TypeRef::Cookie(inner)
            | TypeRef::Header(inner)
            | TypeRef::Form(inner)
            | TypeRef::Json(inner) => inner.display_name(),
            TypeRef::Status { code, payload } => format!("{} ({})", payload.display_name(), code),
            TypeRef::NativeRequest => "Request".to_string(),
            TypeRef::NativeResponse => "Response".to_string(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Angle-bracketed arguments of a path segment, sorted by kind.
#[derive(Default)]
struct GenericArgs {
    types: Vec<TypeRef>,
    strings: Vec<String>,
    integers: Vec<u16>,
}

impl GenericArgs {
    fn collect(arguments: &syn::PathArguments) -> Result<GenericArgs, String> {
        let mut collected = GenericArgs::default();
        let syn::PathArguments::AngleBracketed(args) = arguments else {
            return Ok(collected);
        };

        for arg in &args.args {
            match arg {
                syn::GenericArgument::Type(ty) => collected.types.push(TypeRef::from_syn(ty)?),
                syn::GenericArgument::Const(syn::Expr::Lit(expr_lit)) => match &expr_lit.lit {
                    syn::Lit::Str(s) => collected.strings.push(s.value()),
                    syn::Lit::Int(i) => collected
                        .integers
                        .push(i.base10_parse::<u16>().map_err(|e| e.to_string())?),
                    _ => return Err("unsupported literal in type arguments".to_string()),
                },
                syn::GenericArgument::Lifetime(_) => {}
                _ => return Err("unsupported generic argument".to_string()),
            }
        }
        Ok(collected)
    }

    fn is_empty(&self) -> bool {
        self.types.is_empty() && self.strings.is_empty() && self.integers.is_empty()
    }

    fn single_type(&self, owner: &str) -> Result<TypeRef, String> {
        match self.types.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(format!("`{}` takes exactly one type argument", owner)),
        }
    }

    /// `Cookie<T>` / `Header<T>`; a missing argument means `String`.
    fn type_or_string(&self, owner: &str) -> Result<TypeRef, String> {
        if self.types.is_empty() {
            Ok(TypeRef::Primitive(PrimitiveType::String))
        } else {
            self.single_type(owner)
        }
    }
}

fn quote_type(ty: &syn::Type) -> String {
    match ty {
        syn::Type::Tuple(_) => "tuple".to_string(),
        syn::Type::ImplTrait(_) => "impl Trait".to_string(),
        syn::Type::TraitObject(_) => "dyn Trait".to_string(),
        syn::Type::Ptr(_) => "raw pointer".to_string(),
        syn::Type::BareFn(_) => "fn pointer".to_string(),
        syn::Type::Never(_) => "!".to_string(),
        _ => "type".to_string(),
    }
}
