use crate::catalog::{Shape, TypeCatalog};
use crate::types::{PrimitiveType, TypeRef};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const COMPONENTS_PREFIX: &str = "#/components/schemas/";

/// Schema generator - converts canonical type references to OpenAPI schemas
///
/// Structured types (structs, enums, newtypes) are named components. The
/// first time one is seen it gets a name and a `$ref`, and its expansion is
/// queued; [`SchemaGenerator::finish`] drains the queue until no new types
/// turn up. One generator serves one document.
pub struct SchemaGenerator<'c> {
    catalog: &'c TypeCatalog,
    /// Component name of every registered type
    names: BTreeMap<TypeRef, String>,
    taken: BTreeSet<String>,
    pending: VecDeque<TypeRef>,
    schemas: BTreeMap<String, Schema>,
}

/// OpenAPI Schema definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The type of the schema (string, integer, object, array, null)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Format for primitive types (e.g., "int32", "int64", "float", "double")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Properties for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,
    /// Required property names, in declaration order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Items schema for array types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Value schema for string-keyed maps
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<Box<Schema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(rename = "oneOf", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
    /// Reference to a component schema
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Schema {
    pub fn of_type(schema_type: &str) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            ..Default::default()
        }
    }

    fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("{}{}", COMPONENTS_PREFIX, name)),
            ..Default::default()
        }
    }

    pub fn null() -> Self {
        Self::of_type("null")
    }

    fn string_enum(values: Vec<String>) -> Self {
        Self {
            enum_values: Some(values),
            ..Self::of_type("string")
        }
    }

    /// Name of the component this schema points at, if it is a reference
    pub fn referenced_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(COMPONENTS_PREFIX))
    }
}

impl<'c> SchemaGenerator<'c> {
    pub fn new(catalog: &'c TypeCatalog) -> Self {
        debug!("Initializing SchemaGenerator");
        Self {
            catalog,
            names: BTreeMap::new(),
            taken: BTreeSet::new(),
            pending: VecDeque::new(),
            schemas: BTreeMap::new(),
        }
    }

    pub fn catalog(&self) -> &'c TypeCatalog {
        self.catalog
    }

    /// Schema for a canonical type: inline for primitives and containers, a
    /// `$ref` for named types.
    pub fn schema_for(&mut self, ty: &TypeRef) -> Result<Schema, String> {
        let schema = match ty {
            TypeRef::Primitive(primitive) => primitive_schema(*primitive),
            TypeRef::Unit => Schema::null(),
            TypeRef::Any | TypeRef::Param(_) | TypeRef::NativeRequest | TypeRef::NativeResponse => {
                Schema::default()
            }
            TypeRef::Option(inner) => Schema {
                one_of: Some(vec![self.schema_for(inner)?, Schema::null()]),
                ..Default::default()
            },
            TypeRef::List(inner) => Schema {
                items: Some(Box::new(self.schema_for(inner)?)),
                ..Schema::of_type("array")
            },
            TypeRef::Map(inner) => Schema {
                additional_properties: Some(Box::new(self.schema_for(inner)?)),
                ..Schema::of_type("object")
            },
            TypeRef::Literal(values) => Schema::string_enum(values.clone()),
            TypeRef::Union(members) => Schema {
                one_of: Some(
                    members
                        .iter()
                        .map(|m| self.schema_for(m))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                ..Default::default()
            },
            TypeRef::Named { .. } => Schema::reference(&self.register(ty)?),
            TypeRef::Cookie(inner)
            | TypeRef::Header(inner)
            | TypeRef::Form(inner)
            | TypeRef::Json(inner) => self.schema_for(inner)?,
            TypeRef::Status { payload, .. } => self.schema_for(payload)?,
        };
        Ok(schema)
    }

    /// Returns the component name of a named type, assigning one on first sight.
    pub fn register(&mut self, ty: &TypeRef) -> Result<String, String> {
        if let Some(name) = self.names.get(ty) {
            return Ok(name.clone());
        }
        if let TypeRef::Named { path, .. } = ty {
            if self.catalog.get(path).is_none() {
                return Err(format!("unknown type `{}`", path.join("::")));
            }
        }

        let name = self.unique_name(ty.display_name());
        debug!("Registered schema {} for {:?}", name, ty);
        self.taken.insert(name.clone());
        self.names.insert(ty.clone(), name.clone());
        self.pending.push_back(ty.clone());
        Ok(name)
    }

    /// `base`, or `base` followed by the smallest free number.
    fn unique_name(&self, base: String) -> String {
        if !self.taken.contains(&base) {
            return base;
        }
        let mut suffix = 0usize;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if !self.taken.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn name_of(&self, ty: &TypeRef) -> Option<&str> {
        self.names.get(ty).map(String::as_str)
    }

    /// Number of registered types not expanded yet
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Expands every queued type, including the ones discovered on the way.
    pub fn finish(mut self) -> Result<BTreeMap<String, Schema>, String> {
        while let Some(ty) = self.pending.pop_front() {
            let Some(name) = self.names.get(&ty).cloned() else {
                continue;
            };
            let schema = self.expand(&ty)?;
            self.schemas.insert(name, schema);
        }
        debug!("Generated {} component schemas", self.schemas.len());
        Ok(self.schemas)
    }

    fn expand(&mut self, ty: &TypeRef) -> Result<Schema, String> {
        let catalog = self.catalog;
        let schema = match catalog.shape_of(ty)? {
            Shape::Struct(fields) => {
                let mut properties = BTreeMap::new();
                let mut required = Vec::new();
                for field in fields {
                    properties.insert(field.def.wire_name.clone(), self.schema_for(&field.ty)?);
                    if !field.def.has_default {
                        required.push(field.def.wire_name.clone());
                    }
                }
                Schema {
                    properties: Some(properties),
                    required: (!required.is_empty()).then_some(required),
                    ..Schema::of_type("object")
                }
            }
            Shape::Enum(variants) => Schema::string_enum(variants.to_vec()),
            Shape::Newtype(inner) => self.schema_for(&inner)?,
            Shape::Opaque => Schema::of_type("object"),
        };
        Ok(schema)
    }
}

/// Convert a primitive type to an OpenAPI schema
fn primitive_schema(primitive: PrimitiveType) -> Schema {
    match primitive {
        PrimitiveType::String | PrimitiveType::Char => Schema::of_type("string"),
        PrimitiveType::Bytes => Schema::of_type("string").with_format("binary"),
        PrimitiveType::Bool => Schema::of_type("boolean"),
        PrimitiveType::I8
        | PrimitiveType::I16
        | PrimitiveType::I32
        | PrimitiveType::U8
        | PrimitiveType::U16
        | PrimitiveType::U32 => Schema::of_type("integer").with_format("int32"),
        PrimitiveType::I64 | PrimitiveType::I128 | PrimitiveType::U64 | PrimitiveType::U128 => {
            Schema::of_type("integer").with_format("int64")
        }
        PrimitiveType::F32 => Schema::of_type("number").with_format("float"),
        PrimitiveType::F64 => Schema::of_type("number").with_format("double"),
    }
}
