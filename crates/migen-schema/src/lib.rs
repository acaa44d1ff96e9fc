//! Canonical schema types for migen.
//!
//! This crate contains the dialect-neutral table and column shapes that
//! both sides of a comparison are reduced to: the tables declared by models
//! and the tables found in a live database. It also owns the type mapper,
//! which is the only place that knows how a [`FieldKind`] is spelled in a
//! given SQL [`Dialect`].

use std::fmt;

mod dialect;
pub use dialect::*;

/// The abstract kind of a column.
///
/// Comparisons between declared and live schema happen on kinds, never on
/// dialect-specific type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKind {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    Json,
    Binary,
    /// A declared type that can't be stored in a single column, or a live
    /// column whose type the mapper doesn't recognize.
    Unsupported,
}

impl FieldKind {
    /// All kinds that have a column type in every dialect.
    pub const SUPPORTED: [FieldKind; 7] = [
        FieldKind::Integer,
        FieldKind::Float,
        FieldKind::String,
        FieldKind::Boolean,
        FieldKind::Date,
        FieldKind::Json,
        FieldKind::Binary,
    ];

    pub fn is_supported(&self) -> bool {
        !matches!(self, FieldKind::Unsupported)
    }

    /// Lowercase name, as used in messages and generated comments.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Json => "json",
            FieldKind::Binary => "binary",
            FieldKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column name
    pub name: String,
    /// Abstract kind
    pub kind: FieldKind,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Whether this column is (part of) the primary key
    pub primary_key: bool,
}

impl FieldSpec {
    /// A nullable, non-key column.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            primary_key: false,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as primary key. Primary key columns are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

/// A table in canonical form.
///
/// Field order is significant: it is the declaration order of the model and
/// drives the column order of generated `CREATE TABLE` statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub fields: Vec<FieldSpec>,
}

impl TableSpec {
    /// An empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Append `field` unless a field with that name already exists.
    ///
    /// Returns whether the field was added.
    pub fn push_unique(&mut self, field: FieldSpec) -> bool {
        if self.has_field(&field.name) {
            return false;
        }
        self.fields.push(field);
        true
    }
}

/// Parse a `table.column` reference, as used in relation mappings.
///
/// Supports two formats:
/// - `table.column` (dot-separated)
/// - `table(column)` (parentheses)
///
/// Returns `Some((table, column))` on success, `None` on parse failure.
pub fn parse_column_reference(reference: &str) -> Option<(&str, &str)> {
    if let Some((table, col)) = reference.rsplit_once('.')
        && !table.is_empty()
        && !col.is_empty()
    {
        return Some((table, col));
    }

    if let Some(paren_idx) = reference.find('(')
        && reference.ends_with(')')
    {
        let table = &reference[..paren_idx];
        let col = &reference[paren_idx + 1..reference.len() - 1];
        if !table.is_empty() && !col.is_empty() {
            return Some((table, col));
        }
    }

    None
}
