//! Model definitions: the declarative side of the comparison.
//!
//! A model is anything that can report a table name, a map of field name to
//! declared type, and optionally a set of named relation mappings. That is
//! all the extractor ever asks of it, so the [`Model`] trait is the only
//! seam: [`ModelDef`] is a plain record implementation, and the `facet`
//! feature adds one derived from `#[derive(Facet)]` structs.
//!
//! ```ignore
//! let person = ModelDef::new("Person")
//!     .field("id", DeclaredType::Integer.primary_key())
//!     .field("firstName", DeclaredType::String)
//!     .relation(
//!         "movies",
//!         RelationMapping::many_to_many("Person_Movie.personId", "Person_Movie.movieId")
//!             .extra(["role"]),
//!     );
//! ```

use indexmap::IndexMap;
use migen_schema::FieldKind;

/// The declared type of a model field, as a validation schema spells it.
///
/// Only the type *kinds* matter here; validation rules (min, max, patterns)
/// have no bearing on the column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    /// Any number
    Number,
    /// A number constrained to integers
    Integer,
    String,
    Boolean,
    Date,
    Object,
    Array,
    Binary,
    /// Anything goes; can't be stored in a typed column.
    Any,
    /// One of several types.
    Alternatives(Vec<DeclaredType>),
}

impl DeclaredType {
    /// Name of the type as reported in errors.
    pub fn name(&self) -> &'static str {
        match self {
            DeclaredType::Number => "number",
            DeclaredType::Integer => "integer",
            DeclaredType::String => "string",
            DeclaredType::Boolean => "boolean",
            DeclaredType::Date => "date",
            DeclaredType::Object => "object",
            DeclaredType::Array => "array",
            DeclaredType::Binary => "binary",
            DeclaredType::Any => "any",
            DeclaredType::Alternatives(_) => "alternatives",
        }
    }

    /// The column kind this type is stored as.
    ///
    /// Objects and arrays are stored as json. Alternatives collapse to a
    /// single kind only when every alternative maps to that same kind.
    pub fn kind(&self) -> FieldKind {
        match self {
            DeclaredType::Number => FieldKind::Float,
            DeclaredType::Integer => FieldKind::Integer,
            DeclaredType::String => FieldKind::String,
            DeclaredType::Boolean => FieldKind::Boolean,
            DeclaredType::Date => FieldKind::Date,
            DeclaredType::Object | DeclaredType::Array => FieldKind::Json,
            DeclaredType::Binary => FieldKind::Binary,
            DeclaredType::Any => FieldKind::Unsupported,
            DeclaredType::Alternatives(alts) => {
                let mut kinds = alts.iter().map(DeclaredType::kind);
                match kinds.next() {
                    Some(first) if first.is_supported() && kinds.all(|k| k == first) => first,
                    _ => FieldKind::Unsupported,
                }
            }
        }
    }

    /// Declare a NOT NULL field of this type.
    pub fn required(self) -> FieldDecl {
        FieldDecl::from(self).required()
    }

    /// Declare a primary key field of this type.
    pub fn primary_key(self) -> FieldDecl {
        FieldDecl::from(self).primary_key()
    }
}

/// A field declaration: its type plus column modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub ty: DeclaredType,
    pub required: bool,
    pub primary_key: bool,
}

impl FieldDecl {
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self
    }
}

impl From<DeclaredType> for FieldDecl {
    fn from(ty: DeclaredType) -> Self {
        Self {
            ty,
            required: false,
            primary_key: false,
        }
    }
}

/// How two models relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsToOne,
    HasOne,
    HasMany,
    /// Related through a join table; the only kind that implies a table.
    ManyToMany,
}

/// The join table side of a many-to-many relation.
///
/// `from` and `to` are `table.column` references into the join table; both
/// must name the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    pub from: String,
    pub to: String,
    /// Extra columns carried on the join table.
    pub extra: Vec<String>,
}

/// A relation declared by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMapping {
    pub kind: RelationKind,
    pub through: Option<Through>,
}

impl RelationMapping {
    /// A relation that doesn't go through a join table.
    pub fn new(kind: RelationKind) -> Self {
        Self {
            kind,
            through: None,
        }
    }

    /// A many-to-many relation through the join table named by `from`/`to`.
    pub fn many_to_many(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::ManyToMany,
            through: Some(Through {
                from: from.into(),
                to: to.into(),
                extra: Vec::new(),
            }),
        }
    }

    /// Add extra join table columns.
    pub fn extra<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(through) = &mut self.through {
            through.extra.extend(columns.into_iter().map(Into::into));
        }
        self
    }
}

/// A model definition.
pub trait Model {
    /// Name of the table backing this model.
    fn table_name(&self) -> &str;

    /// Field name to declaration, in declaration order.
    fn schema(&self) -> IndexMap<String, FieldDecl>;

    /// Named relations. Most models have none.
    fn relation_mappings(&self) -> IndexMap<String, RelationMapping> {
        IndexMap::new()
    }
}

/// A model as passed around by the pipeline.
pub type BoxedModel = Box<dyn Model + Send + Sync>;

/// A model spelled out by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    pub table_name: String,
    pub fields: IndexMap<String, FieldDecl>,
    pub relations: IndexMap<String, RelationMapping>,
}

impl ModelDef {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: IndexMap::new(),
            relations: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, decl: impl Into<FieldDecl>) -> Self {
        self.fields.insert(name.into(), decl.into());
        self
    }

    pub fn relation(mut self, name: impl Into<String>, mapping: RelationMapping) -> Self {
        self.relations.insert(name.into(), mapping);
        self
    }
}

impl Model for ModelDef {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn schema(&self) -> IndexMap<String, FieldDecl> {
        self.fields.clone()
    }

    fn relation_mappings(&self) -> IndexMap<String, RelationMapping> {
        self.relations.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_kinds() {
        assert_eq!(DeclaredType::Number.kind(), FieldKind::Float);
        assert_eq!(DeclaredType::Integer.kind(), FieldKind::Integer);
        assert_eq!(DeclaredType::Object.kind(), FieldKind::Json);
        assert_eq!(DeclaredType::Array.kind(), FieldKind::Json);
        assert_eq!(DeclaredType::Any.kind(), FieldKind::Unsupported);
    }

    #[test]
    fn test_alternatives_of_one_kind_collapse() {
        let same = DeclaredType::Alternatives(vec![DeclaredType::Object, DeclaredType::Array]);
        assert_eq!(same.kind(), FieldKind::Json);

        let mixed = DeclaredType::Alternatives(vec![DeclaredType::String, DeclaredType::Object]);
        assert_eq!(mixed.kind(), FieldKind::Unsupported);

        let empty = DeclaredType::Alternatives(vec![]);
        assert_eq!(empty.kind(), FieldKind::Unsupported);

        let with_any = DeclaredType::Alternatives(vec![DeclaredType::Any, DeclaredType::Any]);
        assert_eq!(with_any.kind(), FieldKind::Unsupported);
    }

    #[test]
    fn test_extra_ignored_without_join_table() {
        let rel = RelationMapping::new(RelationKind::HasMany).extra(["ignored"]);
        assert_eq!(rel.through, None);
    }

    #[test]
    fn test_model_def_keeps_declaration_order() {
        let model = ModelDef::new("Dog")
            .field("id", DeclaredType::Integer)
            .field("favoriteToy", DeclaredType::String)
            .field("name", DeclaredType::String);
        let names: Vec<_> = model.schema().into_keys().collect();
        assert_eq!(names, ["id", "favoriteToy", "name"]);
    }
}
