//! Model schema extraction.
//!
//! Turns model definitions into canonical [`TableSpec`]s: one per model in
//! input order, followed by one per distinct join table implied by
//! many-to-many relations.

use crate::model::{BoxedModel, Model, RelationKind, Through};
use crate::{Error, Result};
use indexmap::IndexMap;
use migen_schema::{FieldKind, FieldSpec, TableSpec, parse_column_reference};

/// Extract table specs from `models`.
///
/// Join tables are deduplicated by name. When several relations name the
/// same join table, their extra columns are unioned in first-seen order.
/// A join table that is also declared as a model keeps the model's columns
/// and gains any join columns it's missing.
pub fn extract_tables(models: &[BoxedModel]) -> Result<Vec<TableSpec>> {
    let mut tables: IndexMap<String, TableSpec> = IndexMap::new();
    let mut join_tables: IndexMap<String, TableSpec> = IndexMap::new();

    for model in models {
        let model: &(dyn Model + Send + Sync) = &**model;
        let table = model_table(model)?;
        tables.insert(table.name.clone(), table);

        for (relation, mapping) in model.relation_mappings() {
            if mapping.kind != RelationKind::ManyToMany {
                continue;
            }
            let Some(through) = &mapping.through else {
                return Err(invalid_relation(model, &relation, "many-to-many without a join table"));
            };
            let (name, columns) = join_columns(model, &relation, through)?;
            let join = join_tables
                .entry(name.to_string())
                .or_insert_with(|| TableSpec::new(name));
            for column in columns {
                join.push_unique(FieldSpec::new(column, FieldKind::String));
            }
        }
    }

    for (name, join) in join_tables {
        match tables.get_mut(&name) {
            Some(existing) => {
                for field in join.fields {
                    existing.push_unique(field);
                }
            }
            None => {
                tracing::debug!(table = %name, columns = join.fields.len(), "synthesized join table");
                tables.insert(name, join);
            }
        }
    }

    Ok(tables.into_values().collect())
}

/// Build the table spec for a single model.
fn model_table(model: &(dyn Model + Send + Sync)) -> Result<TableSpec> {
    let mut table = TableSpec::new(model.table_name());
    let mut unsupported = Vec::new();

    for (name, decl) in model.schema() {
        let kind = decl.ty.kind();
        if !kind.is_supported() {
            unsupported.push(format!("{} (\"{}\")", name, decl.ty.name()));
            continue;
        }

        let mut field = FieldSpec::new(name, kind);
        if decl.required {
            field = field.not_null();
        }
        if decl.primary_key {
            field = field.primary_key();
        }
        table.fields.push(field);
    }

    if !unsupported.is_empty() {
        return Err(Error::UnsupportedFieldType {
            model: model.table_name().to_string(),
            fields: unsupported,
        });
    }

    Ok(table)
}

/// Parse a relation's join references into the join table name and its
/// columns: the two foreign keys, then the extras.
fn join_columns<'t>(
    model: &(dyn Model + Send + Sync),
    relation: &str,
    through: &'t Through,
) -> Result<(&'t str, Vec<&'t str>)> {
    let (from_table, from_col) = parse_column_reference(&through.from).ok_or_else(|| {
        invalid_relation(model, relation, &format!("can't parse join reference \"{}\"", through.from))
    })?;
    let (to_table, to_col) = parse_column_reference(&through.to).ok_or_else(|| {
        invalid_relation(model, relation, &format!("can't parse join reference \"{}\"", through.to))
    })?;

    if from_table != to_table {
        return Err(invalid_relation(
            model,
            relation,
            &format!("join references name two tables: \"{from_table}\" and \"{to_table}\""),
        ));
    }

    let mut columns = vec![from_col, to_col];
    columns.extend(through.extra.iter().map(String::as_str));
    Ok((from_table, columns))
}

fn invalid_relation(model: &(dyn Model + Send + Sync), relation: &str, reason: &str) -> Error {
    Error::InvalidRelation {
        model: model.table_name().to_string(),
        relation: relation.to_string(),
        reason: reason.to_string(),
    }
}
