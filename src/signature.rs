//! Handler signatures.
//!
//! A handler is declared with ordinary Rust function syntax. The declaration is
//! the single source of truth for request binding and for documentation:
//!
//! ```
//! use sigroute::signature::Signature;
//!
//! let sig = Signature::parse(r#"
//!     /// Fetch one user.
//!     fn get_user(#[header = "X-Tenant"] tenant: String, id: i64, #[default = 0] page: i64)
//!         -> Union<Ok<User>, NotFound<()>>
//! "#).unwrap();
//! assert_eq!(sig.params.len(), 3);
//! assert_eq!(sig.docs.as_deref(), Some("Fetch one user."));
//! ```
//!
//! A parameter typed `_` has no annotation. A missing return type means the
//! handler's return is unannotated; `-> ()` explicitly declares "no content".

use crate::error::{Error, Result};
use crate::types::TypeRef;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<SigParam>,
    /// Return annotation, `None` when absent
    pub ret: Option<TypeRef>,
    pub docs: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SigParam {
    pub name: String,
    /// Declared annotation, `None` when absent
    pub ty: Option<TypeRef>,
    pub default: Option<Value>,
    /// Header wire name from `#[header]` / `#[header = "..."]`
    pub header: Option<String>,
    /// Cookie name from `#[cookie]` / `#[cookie = "..."]`
    pub cookie: Option<String>,
}

impl Signature {
    /// Parses a declaration such as `fn get(id: i64) -> User`.
    ///
    /// The trailing `;` is optional, and a body is ignored if present.
    pub fn parse(source: &str) -> Result<Signature> {
        let trimmed = source.trim();
        let text = if trimmed.ends_with(';') || trimmed.ends_with('}') {
            trimmed.to_string()
        } else {
            format!("{};", trimmed)
        };

        let item: syn::TraitItemFn = syn::parse_str(&text).map_err(|e| Error::InvalidSignature {
            signature: trimmed.to_string(),
            message: e.to_string(),
        })?;
        Self::from_syn(&item.sig, &item.attrs)
    }

    /// Builds a signature from a parsed function signature and its attributes.
    pub fn from_syn(sig: &syn::Signature, attrs: &[syn::Attribute]) -> Result<Signature> {
        let name = sig.ident.to_string();
        let invalid = |message: String| Error::InvalidSignature {
            signature: name.clone(),
            message,
        };

        let mut params = Vec::new();
        for input in &sig.inputs {
            let syn::FnArg::Typed(pat_type) = input else {
                // `self` receivers of trait methods are not request parameters
                continue;
            };
            let param_name = match pat_type.pat.as_ref() {
                syn::Pat::Ident(pat_ident) => pat_ident.ident.to_string(),
                _ => return Err(invalid("parameters must be plain identifiers".to_string())),
            };
            let ty = match pat_type.ty.as_ref() {
                syn::Type::Infer(_) => None,
                other => Some(
                    TypeRef::from_syn(other)
                        .map_err(|e| invalid(format!("parameter `{}`: {}", param_name, e)))?,
                ),
            };
            let meta = ParamAttributes::parse(&param_name, &pat_type.attrs)
                .map_err(|e| invalid(format!("parameter `{}`: {}", param_name, e)))?;
            params.push(SigParam {
                name: param_name,
                ty,
                default: meta.default,
                header: meta.header,
                cookie: meta.cookie,
            });
        }

        let ret = match &sig.output {
            syn::ReturnType::Default => None,
            syn::ReturnType::Type(_, ty) => match ty.as_ref() {
                syn::Type::Infer(_) => None,
                other => Some(
                    TypeRef::from_syn(other).map_err(|e| invalid(format!("return type: {}", e)))?,
                ),
            },
        };

        Ok(Signature {
            name,
            params,
            ret,
            docs: doc_text(attrs),
        })
    }

    pub fn param(&self, name: &str) -> Option<&SigParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Default)]
struct ParamAttributes {
    default: Option<Value>,
    header: Option<String>,
    cookie: Option<String>,
}

impl ParamAttributes {
    fn parse(param_name: &str, attrs: &[syn::Attribute]) -> std::result::Result<Self, String> {
        let mut parsed = ParamAttributes::default();
        for attr in attrs {
            let path = attr.path();
            if path.is_ident("default") {
                let expr = match &attr.meta {
                    syn::Meta::NameValue(nv) => nv.value.clone(),
                    syn::Meta::List(list) => list.parse_args::<syn::Expr>().map_err(|e| e.to_string())?,
                    syn::Meta::Path(_) => return Err("`#[default]` needs a value".to_string()),
                };
                parsed.default = Some(literal_value(&expr)?);
            } else if path.is_ident("header") {
                parsed.header = Some(wire_name(param_name, &attr.meta)?);
            } else if path.is_ident("cookie") {
                parsed.cookie = Some(wire_name(param_name, &attr.meta)?);
            }
        }
        Ok(parsed)
    }
}

/// `#[header]` uses the parameter name, `#[header = "X-Name"]` the given one.
fn wire_name(param_name: &str, meta: &syn::Meta) -> std::result::Result<String, String> {
    match meta {
        syn::Meta::Path(_) => Ok(param_name.to_string()),
        syn::Meta::NameValue(nv) => match &nv.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(s), ..
            }) => Ok(s.value()),
            _ => Err("wire names must be string literals".to_string()),
        },
        syn::Meta::List(list) => list
            .parse_args::<syn::LitStr>()
            .map(|s| s.value())
            .map_err(|e| e.to_string()),
    }
}

/// Converts a literal default (`0`, `-1`, `"x"`, `true`, `None`, `1.5`) to JSON.
fn literal_value(expr: &syn::Expr) -> std::result::Result<Value, String> {
    match expr {
        syn::Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Str(s) => Ok(Value::String(s.value())),
            syn::Lit::Bool(b) => Ok(Value::Bool(b.value)),
            syn::Lit::Int(i) => i
                .base10_parse::<i64>()
                .map(Value::from)
                .map_err(|e| e.to_string()),
            syn::Lit::Float(f) => {
                let n = f.base10_parse::<f64>().map_err(|e| e.to_string())?;
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| "default must be a finite number".to_string())
            }
            syn::Lit::Char(c) => Ok(Value::String(c.value().to_string())),
            _ => Err("unsupported default literal".to_string()),
        },
        syn::Expr::Unary(syn::ExprUnary {
            op: syn::UnOp::Neg(_),
            expr,
            ..
        }) => match literal_value(expr)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(-i))
                } else {
                    n.as_f64()
                        .and_then(|f| serde_json::Number::from_f64(-f))
                        .map(Value::Number)
                        .ok_or_else(|| "cannot negate default".to_string())
                }
            }
            _ => Err("only numbers can be negated".to_string()),
        },
        syn::Expr::Path(path) if path.path.is_ident("None") => Ok(Value::Null),
        syn::Expr::Group(group) => literal_value(&group.expr),
        _ => Err("defaults must be literals".to_string()),
    }
}

/// Collects `///` doc comments into one trimmed block of text.
fn doc_text(attrs: &[syn::Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(syn::MetaNameValue {
                value:
                    syn::Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Str(s),
                        ..
                    }),
                ..
            }) => Some(s.value()),
            _ => None,
        })
        .map(|line| line.strip_prefix(' ').unwrap_or(&line).trim_end().to_string())
        .collect();

    let text = lines.join("\n").trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
