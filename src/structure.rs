//! The structuring service.
//!
//! Request data arrives as raw strings (path segments, query values, headers,
//! cookies, form fields) or as JSON. [`Structurer`] checks that data against a
//! [`TypeRef`] and produces a `serde_json::Value` that the handler can then
//! deserialize with `serde`. Failures are [`StructureError`]s, which adapters turn
//! into 400 responses.

use crate::catalog::{Shape, TypeCatalog};
use crate::types::{PrimitiveType, TypeRef};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A value that does not fit its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureError {
    /// Location inside the value, e.g. `items[2].name`; empty at the top
    pub path: String,
    pub message: String,
}

impl StructureError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
        }
    }

    /// Prefixes the location with a field name or index.
    fn within(mut self, segment: &str) -> Self {
        self.path = if self.path.is_empty() {
            segment.to_string()
        } else if self.path.starts_with('[') {
            format!("{}{}", segment, self.path)
        } else {
            format!("{}.{}", segment, self.path)
        };
        self
    }
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for StructureError {}

type Structured = std::result::Result<Value, StructureError>;

/// Coerces raw and JSON request data into declared types.
#[derive(Debug, Clone)]
pub struct Structurer {
    catalog: Arc<TypeCatalog>,
}

impl Structurer {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Coerces a single raw string, as found in a path, query, header or cookie.
    pub fn structure_str(&self, raw: &str, ty: &TypeRef) -> Structured {
        let ty = ty.unwrap_marker();
        match ty {
            TypeRef::Primitive(primitive) => primitive_from_str(raw, *primitive),
            TypeRef::Unit => Ok(Value::Null),
            TypeRef::Any | TypeRef::Param(_) => {
                Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
            }
            TypeRef::Option(inner) => self.structure_str(raw, inner),
            TypeRef::List(inner) => Ok(Value::Array(vec![self.structure_str(raw, inner)?])),
            TypeRef::Map(_) => self.structure_value(parse_json(raw)?, ty),
            TypeRef::Literal(values) => literal_member(raw, values),
            TypeRef::Union(members) => {
                first_match(members, |member| self.structure_str(raw, member))
            }
            TypeRef::Named { .. } => match self.shape(ty)? {
                Shape::Enum(variants) => literal_member(raw, variants),
                Shape::Newtype(inner) => self.structure_str(raw, &inner),
                Shape::Struct(_) | Shape::Opaque => self.structure_value(parse_json(raw)?, ty),
            },
            TypeRef::Status { payload, .. } => self.structure_str(raw, payload),
            TypeRef::NativeRequest | TypeRef::NativeResponse => {
                Err(StructureError::new("native types cannot be read from text"))
            }
            TypeRef::Cookie(_) | TypeRef::Header(_) | TypeRef::Form(_) | TypeRef::Json(_) => {
                unreachable!("markers are stripped above")
            }
        }
    }

    /// Coerces every value of a repeated query key into a list.
    pub fn structure_list(&self, raws: &[String], ty: &TypeRef) -> Structured {
        let inner = match ty.unwrap_marker() {
            TypeRef::List(inner) => inner.as_ref(),
            TypeRef::Option(inner) => return self.structure_list(raws, inner),
            other => other,
        };
        let mut items = Vec::with_capacity(raws.len());
        for (idx, raw) in raws.iter().enumerate() {
            let item = self
                .structure_str(raw, inner)
                .map_err(|e| e.within(&format!("[{}]", idx)))?;
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    /// Checks a JSON value against a type, filling nothing in: fields serde
    /// defaults may stay absent.
    pub fn structure_value(&self, value: Value, ty: &TypeRef) -> Structured {
        let ty = ty.unwrap_marker();
        match ty {
            TypeRef::Primitive(primitive) => primitive_from_json(value, *primitive),
            TypeRef::Unit => match value {
                Value::Null => Ok(Value::Null),
                other => Err(mismatch("null", &other)),
            },
            TypeRef::Any | TypeRef::Param(_) => Ok(value),
            TypeRef::Option(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => self.structure_value(other, inner),
            },
            TypeRef::List(inner) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        self.structure_value(item, inner)
                            .map_err(|e| e.within(&format!("[{}]", idx)))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Err(mismatch("an array", &other)),
            },
            TypeRef::Map(inner) => match value {
                Value::Object(entries) => {
                    let mut out = Map::new();
                    for (key, entry) in entries {
                        let structured = self
                            .structure_value(entry, inner)
                            .map_err(|e| e.within(&key))?;
                        out.insert(key, structured);
                    }
                    Ok(Value::Object(out))
                }
                other => Err(mismatch("an object", &other)),
            },
            TypeRef::Literal(values) => match value {
                Value::String(s) => literal_member(&s, values),
                other => Err(mismatch("a string", &other)),
            },
            TypeRef::Union(members) => {
                first_match(members, |member| self.structure_value(value.clone(), member))
            }
            TypeRef::Named { .. } => match self.shape(ty)? {
                Shape::Struct(fields) => {
                    let mut object = match value {
                        Value::Object(object) => object,
                        other => return Err(mismatch("an object", &other)),
                    };
                    for field in fields {
                        let key = &field.def.wire_name;
                        match object.remove(key) {
                            Some(entry) => {
                                let structured = self
                                    .structure_value(entry, &field.ty)
                                    .map_err(|e| e.within(key))?;
                                object.insert(key.clone(), structured);
                            }
                            None if field.def.has_default => {}
                            None => {
                                return Err(StructureError::new("missing required field").within(key))
                            }
                        }
                    }
                    Ok(Value::Object(object))
                }
                Shape::Enum(variants) => match value {
                    Value::String(s) => literal_member(&s, variants),
                    other => Err(mismatch("a string", &other)),
                },
                Shape::Newtype(inner) => self.structure_value(value, &inner),
                Shape::Opaque => Ok(value),
            },
            TypeRef::Status { payload, .. } => self.structure_value(value, payload),
            TypeRef::NativeRequest | TypeRef::NativeResponse => {
                Err(StructureError::new("native types cannot be read from JSON"))
            }
            TypeRef::Cookie(_) | TypeRef::Header(_) | TypeRef::Form(_) | TypeRef::Json(_) => {
                unreachable!("markers are stripped above")
            }
        }
    }

    /// Builds a struct (or string map) from decoded form fields.
    pub fn structure_form(&self, pairs: &[(String, String)], ty: &TypeRef) -> Structured {
        let values_of = |key: &str| -> Vec<String> {
            pairs
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect()
        };

        let ty = ty.unwrap_marker();
        match ty {
            TypeRef::Named { .. } => {
                let Shape::Struct(fields) = self.shape(ty)? else {
                    return Err(StructureError::new("form bodies bind to structs"));
                };
                let mut object = Map::new();
                for field in fields {
                    let key = &field.def.wire_name;
                    let raws = values_of(key);
                    let value = match raws.last() {
                        None if field.def.has_default => continue,
                        None => return Err(StructureError::new("missing required field").within(key)),
                        Some(_) if is_list(&field.ty) => self.structure_list(&raws, &field.ty),
                        Some(raw) => self.structure_str(raw, &field.ty),
                    }
                    .map_err(|e| e.within(key))?;
                    object.insert(key.clone(), value);
                }
                Ok(Value::Object(object))
            }
            TypeRef::Map(inner) => {
                let mut object = Map::new();
                for (key, raw) in pairs {
                    let value = self.structure_str(raw, inner).map_err(|e| e.within(key))?;
                    object.insert(key.clone(), value);
                }
                Ok(Value::Object(object))
            }
            TypeRef::Any => Ok(Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            other => Err(StructureError::new(format!(
                "form bodies bind to structs, not `{}`",
                other
            ))),
        }
    }

    fn shape(&self, ty: &TypeRef) -> std::result::Result<Shape<'_>, StructureError> {
        self.catalog.shape_of(ty).map_err(StructureError::new)
    }
}

/// Whether values of this type are collected from repeated keys
pub fn is_list(ty: &TypeRef) -> bool {
    match ty.unwrap_marker() {
        TypeRef::List(_) => true,
        TypeRef::Option(inner) => is_list(inner),
        _ => false,
    }
}

fn parse_json(raw: &str) -> Structured {
    serde_json::from_str(raw).map_err(|e| StructureError::new(format!("malformed JSON: {}", e)))
}

fn first_match(members: &[TypeRef], mut attempt: impl FnMut(&TypeRef) -> Structured) -> Structured {
    for member in members {
        if let Ok(value) = attempt(member) {
            return Ok(value);
        }
    }
    let names: Vec<String> = members.iter().map(TypeRef::display_name).collect();
    Err(StructureError::new(format!(
        "value does not match any of {}",
        names.join(", ")
    )))
}

fn literal_member(raw: &str, allowed: &[String]) -> Structured {
    if allowed.iter().any(|v| v == raw) {
        Ok(Value::String(raw.to_string()))
    } else {
        Err(StructureError::new(format!(
            "`{}` is not one of: {}",
            raw,
            allowed.join(", ")
        )))
    }
}

fn mismatch(expected: &str, found: &Value) -> StructureError {
    let kind = match found {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    StructureError::new(format!("expected {}, found {}", expected, kind))
}

fn integer_value(n: i128, primitive: PrimitiveType) -> Structured {
    let (min, max) = primitive.integer_bounds().unwrap_or((i128::MIN, i128::MAX));
    if n < min || n > max {
        return Err(StructureError::new(format!(
            "{} is out of range for {}",
            n,
            primitive.name()
        )));
    }
    if let Ok(i) = i64::try_from(n) {
        Ok(Value::from(i))
    } else if let Ok(u) = u64::try_from(n) {
        Ok(Value::from(u))
    } else {
        Err(StructureError::new(format!("{} cannot be represented in JSON", n)))
    }
}

fn float_value(f: f64) -> Structured {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| StructureError::new("expected a finite number"))
}

fn primitive_from_str(raw: &str, primitive: PrimitiveType) -> Structured {
    match primitive {
        PrimitiveType::String => Ok(Value::String(raw.to_string())),
        PrimitiveType::Char => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::String(c.to_string())),
                _ => Err(StructureError::new("expected a single character")),
            }
        }
        PrimitiveType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(StructureError::new(format!("`{}` is not a boolean", raw))),
        },
        PrimitiveType::F32 | PrimitiveType::F64 => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| StructureError::new(format!("`{}` is not a number", raw)))
            .and_then(float_value),
        PrimitiveType::Bytes => Ok(Value::Array(raw.bytes().map(Value::from).collect())),
        integer => raw
            .trim()
            .parse::<i128>()
            .map_err(|_| StructureError::new(format!("`{}` is not an integer", raw)))
            .and_then(|n| integer_value(n, integer)),
    }
}

fn primitive_from_json(value: Value, primitive: PrimitiveType) -> Structured {
    match (primitive, value) {
        (PrimitiveType::String, Value::String(s)) => Ok(Value::String(s)),
        (PrimitiveType::Char, Value::String(s)) => primitive_from_str(&s, PrimitiveType::Char),
        (PrimitiveType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (PrimitiveType::F32 | PrimitiveType::F64, Value::Number(n)) => Ok(Value::Number(n)),
        (PrimitiveType::Bytes, Value::String(s)) => primitive_from_str(&s, PrimitiveType::Bytes),
        (PrimitiveType::Bytes, Value::Array(items)) => {
            let bytes_ok = items
                .iter()
                .all(|item| item.as_u64().is_some_and(|b| b <= u8::MAX as u64));
            if bytes_ok {
                Ok(Value::Array(items))
            } else {
                Err(StructureError::new("expected an array of bytes"))
            }
        }
        (integer, Value::Number(n)) if integer.is_integer() => {
            let n = n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .ok_or_else(|| StructureError::new(format!("{} is not an integer", n)))?;
            integer_value(n, integer)
        }
        (primitive, other) => Err(mismatch(primitive.name(), &other)),
    }
}
