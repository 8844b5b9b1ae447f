//! Response-shape normalization.
//!
//! A return annotation is turned into a mapping from status code to payload
//! type. The adapter picks one serializer per status from that mapping when
//! it is built; the OpenAPI builder documents one response per status.

use crate::reply::Payload;
use crate::types::{PrimitiveType, TypeRef};
use log::debug;
use std::collections::BTreeMap;

/// Statuses and payload types a handler can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseShape {
    /// The handler returns the framework's native response
    pub native: bool,
    /// Status -> payload type. `None` means untyped: whatever the handler returns.
    pub entries: BTreeMap<u16, Option<TypeRef>>,
}

/// Normalizes a return annotation.
pub fn normalize(ret: Option<&TypeRef>) -> ResponseShape {
    let mut entries: BTreeMap<u16, Option<TypeRef>> = BTreeMap::new();

    let Some(ret) = ret else {
        entries.insert(200, None);
        return ResponseShape {
            native: false,
            entries,
        };
    };

    if *ret == TypeRef::NativeResponse {
        return ResponseShape {
            native: true,
            entries,
        };
    }

    let members = match ret {
        TypeRef::Union(members) => members.clone(),
        single => vec![single.clone()],
    };

    for member in members {
        let (status, payload) = status_and_payload(member);
        let merged = match entries.remove(&status) {
            Some(Some(existing)) => TypeRef::union_of(vec![existing, payload]),
            _ => payload,
        };
        entries.insert(status, Some(merged));
    }

    debug!("Normalized return type {} into {:?}", ret, entries.keys());
    ResponseShape {
        native: false,
        entries,
    }
}

fn status_and_payload(member: TypeRef) -> (u16, TypeRef) {
    match member {
        TypeRef::Status { code, payload } => (code, *payload),
        TypeRef::Unit => (204, TypeRef::Unit),
        other => (200, other),
    }
}

/// How a payload is written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serializer {
    /// `text/plain`
    Text,
    /// `application/octet-stream`
    Bytes,
    /// No body at all
    Empty,
    /// `application/json`
    Json,
    /// Decided by the payload the handler returned
    Dynamic,
}

impl Serializer {
    /// Picks the serializer for a payload type.
    pub fn for_payload(payload: Option<&TypeRef>) -> Serializer {
        let Some(payload) = payload else {
            return Serializer::Dynamic;
        };
        match payload {
            TypeRef::Primitive(PrimitiveType::String) => Serializer::Text,
            TypeRef::Primitive(PrimitiveType::Bytes) => Serializer::Bytes,
            TypeRef::Unit => Serializer::Empty,
            TypeRef::Union(members) => {
                let mut kinds = members.iter().map(|m| Serializer::for_payload(Some(m)));
                let first = kinds.next().unwrap_or(Serializer::Json);
                if kinds.all(|k| k == first) {
                    first
                } else {
                    Serializer::Dynamic
                }
            }
            _ => Serializer::Json,
        }
    }

    /// Content type advertised for payloads of this serializer
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Serializer::Text => Some("text/plain; charset=utf-8"),
            Serializer::Bytes => Some("application/octet-stream"),
            Serializer::Json => Some("application/json"),
            Serializer::Empty | Serializer::Dynamic => None,
        }
    }

    /// Writes a payload, returning the content type and body bytes.
    pub fn render(&self, payload: Payload) -> (Option<&'static str>, Vec<u8>) {
        match (self, payload) {
            (Serializer::Empty, _) => (None, Vec::new()),
            (Serializer::Dynamic, Payload::Empty) => (None, Vec::new()),
            (Serializer::Dynamic, Payload::Text(text)) => Serializer::Text.render(Payload::Text(text)),
            (Serializer::Dynamic, Payload::Bytes(bytes)) => {
                Serializer::Bytes.render(Payload::Bytes(bytes))
            }
            (Serializer::Dynamic, Payload::Json(value)) => Serializer::Json.render(Payload::Json(value)),
            (Serializer::Text | Serializer::Bytes, payload) => {
                let body = match payload {
                    Payload::Empty => Vec::new(),
                    Payload::Text(text) => text.into_bytes(),
                    Payload::Bytes(bytes) => bytes,
                    Payload::Json(serde_json::Value::String(text)) => text.into_bytes(),
                    Payload::Json(value) => value.to_string().into_bytes(),
                };
                (self.content_type(), body)
            }
            (Serializer::Json, payload) => {
                let value = match payload {
                    Payload::Empty => serde_json::Value::Null,
                    Payload::Text(text) => serde_json::Value::String(text),
                    Payload::Bytes(bytes) => bytes.into_iter().map(serde_json::Value::from).collect(),
                    Payload::Json(value) => value,
                };
                (self.content_type(), value.to_string().into_bytes())
            }
        }
    }
}

/// Serializer lookup by returned status, fixed when the adapter is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePlan {
    by_status: BTreeMap<u16, Serializer>,
    /// Used for statuses the annotation does not mention
    fallback: Serializer,
}

impl ResponsePlan {
    pub fn from_shape(shape: &ResponseShape) -> Self {
        let by_status: BTreeMap<u16, Serializer> = shape
            .entries
            .iter()
            .map(|(status, payload)| (*status, Serializer::for_payload(payload.as_ref())))
            .collect();
        Self {
            by_status,
            fallback: Serializer::Dynamic,
        }
    }

    pub fn serializer_for(&self, status: u16) -> Serializer {
        self.by_status.get(&status).copied().unwrap_or(self.fallback)
    }

    /// Whether every declared status shares one serializer
    pub fn is_uniform(&self) -> bool {
        let mut kinds = self.by_status.values();
        match kinds.next() {
            Some(first) => kinds.all(|k| k == first),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape(source: &str) -> ResponseShape {
        normalize(Some(&TypeRef::parse_str(source).unwrap()))
    }

    fn named(name: &str) -> TypeRef {
        TypeRef::Named {
            path: vec![name.to_string()],
            args: vec![],
        }
    }

    #[test]
    fn test_absent_annotation_is_untyped_200() {
        let shape = normalize(None);
        assert!(!shape.native);
        assert_eq!(shape.entries.len(), 1);
        assert_eq!(shape.entries[&200], None);
    }

    #[test]
    fn test_unit_is_no_content() {
        let shape = shape("()");
        assert_eq!(shape.entries[&204], Some(TypeRef::Unit));
    }

    #[test]
    fn test_native_response_bypasses() {
        let shape = shape("Response");
        assert!(shape.native);
        assert!(shape.entries.is_empty());
    }

    #[test]
    fn test_union_of_statuses() {
        let shape = shape("Union<A, Created<()>>");
        assert_eq!(shape.entries.len(), 2);
        assert_eq!(shape.entries[&200], Some(named("A")));
        assert_eq!(shape.entries[&201], Some(TypeRef::Unit));
    }

    #[test]
    fn test_union_same_status_merges() {
        let shape = shape("Union<A, B, NotFound<String>>");
        assert_eq!(
            shape.entries[&200],
            Some(TypeRef::Union(vec![named("A"), named("B")]))
        );
        assert_eq!(
            shape.entries[&404],
            Some(TypeRef::Primitive(PrimitiveType::String))
        );
    }

    #[test]
    fn test_union_with_unit_member() {
        let shape = shape("Union<User, ()>");
        assert!(shape.entries.contains_key(&200));
        assert_eq!(shape.entries[&204], Some(TypeRef::Unit));
    }

    #[test]
    fn test_plan_per_status() {
        let plan = ResponsePlan::from_shape(&shape("Union<User, Created<()>, BadRequest<String>>"));
        assert_eq!(plan.serializer_for(200), Serializer::Json);
        assert_eq!(plan.serializer_for(201), Serializer::Empty);
        assert_eq!(plan.serializer_for(400), Serializer::Text);
        assert_eq!(plan.serializer_for(500), Serializer::Dynamic);
        assert!(!plan.is_uniform());
    }

    #[test]
    fn test_render() {
        assert_eq!(
            Serializer::Text.render(Payload::Json(json!("16"))),
            (Some("text/plain; charset=utf-8"), b"16".to_vec())
        );
        assert_eq!(
            Serializer::Json.render(Payload::Json(json!({"a": 1}))),
            (Some("application/json"), br#"{"a":1}"#.to_vec())
        );
        assert_eq!(Serializer::Empty.render(Payload::Text("x".into())), (None, vec![]));
        assert_eq!(
            Serializer::Dynamic.render(Payload::Bytes(vec![1, 2])),
            (Some("application/octet-stream"), vec![1, 2])
        );
    }
}
