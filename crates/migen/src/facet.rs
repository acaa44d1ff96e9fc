//! Models derived from `#[derive(Facet)]` structs.
//!
//! ```ignore
//! #[derive(Facet)]
//! struct Person {
//!     id: i64,
//!     first_name: String,
//!     nickname: Option<String>,
//! }
//!
//! let person = FacetModel::new::<Person>("Person").primary_key("id");
//! ```
//!
//! Non-`Option` fields are declared required. Types with no column kind
//! (enums, references, ...) are declared as `any`, which the extractor
//! reports as unsupported.

use crate::model::{DeclaredType, FieldDecl, Model, RelationMapping};
use facet::{Def, Facet, Shape, Type, UserType};
use indexmap::IndexMap;

/// A model read from a struct's shape.
#[derive(Debug, Clone)]
pub struct FacetModel {
    table_name: String,
    shape: &'static Shape,
    primary_key: Vec<String>,
    relations: IndexMap<String, RelationMapping>,
}

impl FacetModel {
    pub fn new<T: Facet<'static>>(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            shape: T::SHAPE,
            primary_key: Vec::new(),
            relations: IndexMap::new(),
        }
    }

    /// Mark a field as (part of) the primary key.
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key.push(field.into());
        self
    }

    pub fn relation(mut self, name: impl Into<String>, mapping: RelationMapping) -> Self {
        self.relations.insert(name.into(), mapping);
        self
    }
}

impl Model for FacetModel {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn schema(&self) -> IndexMap<String, FieldDecl> {
        let Type::User(UserType::Struct(struct_type)) = &self.shape.ty else {
            return IndexMap::new();
        };

        let mut fields = IndexMap::new();
        for field in struct_type.fields {
            let (shape, nullable) = unwrap_option(field.shape.get());
            let mut decl = FieldDecl::from(shape_to_declared(shape));
            if !nullable {
                decl = decl.required();
            }
            if self.primary_key.iter().any(|pk| pk == field.name) {
                decl = decl.primary_key();
            }
            fields.insert(field.name.to_string(), decl);
        }
        fields
    }

    fn relation_mappings(&self) -> IndexMap<String, RelationMapping> {
        self.relations.clone()
    }
}

fn unwrap_option(shape: &'static Shape) -> (&'static Shape, bool) {
    if shape.decl_id == Option::<()>::SHAPE.decl_id
        && let Some(inner) = shape.inner
    {
        return (inner, true);
    }
    (shape, false)
}

/// Declare a Rust type the way a validation schema would.
fn shape_to_declared(shape: &Shape) -> DeclaredType {
    if matches!(&shape.def, Def::List(_) | Def::Slice(_)) {
        return match shape.inner {
            Some(inner) if inner == u8::SHAPE => DeclaredType::Binary,
            _ => DeclaredType::Array,
        };
    }
    if matches!(&shape.def, Def::Map(_)) || matches!(&shape.ty, Type::User(UserType::Struct(_))) {
        // String's shape is a user struct too
        if shape != String::SHAPE {
            return DeclaredType::Object;
        }
    }

    if shape == i8::SHAPE
        || shape == i16::SHAPE
        || shape == i32::SHAPE
        || shape == i64::SHAPE
        || shape == u8::SHAPE
        || shape == u16::SHAPE
        || shape == u32::SHAPE
        || shape == u64::SHAPE
    {
        DeclaredType::Integer
    } else if shape == f32::SHAPE || shape == f64::SHAPE {
        DeclaredType::Number
    } else if shape == bool::SHAPE {
        DeclaredType::Boolean
    } else if shape == String::SHAPE {
        DeclaredType::String
    } else {
        DeclaredType::Any
    }
}
