//! Live schema introspection.
//!
//! An inspector reports, for a table name, either the table's columns in
//! canonical form or that the table doesn't exist. Column kinds are always
//! inferred with [`column_type_to_kind`], the inverse of the mapper codegen
//! uses, so a column migen created re-inspects as the kind it was created
//! from.

use crate::diff::SchemaAction;
use crate::traced::{Connection, ConnectionExt};
use crate::{Error, Result};
use indexmap::IndexMap;
use migen_schema::{
    ColumnType, Dialect, FieldKind, FieldSpec, TableSpec, column_type_to_kind, kind_to_column_type,
};
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Inspection results, keyed by table name in the order they were asked
/// for. `None` means the table is absent.
pub type LiveTables = IndexMap<String, Option<TableSpec>>;

/// Something that can describe the tables of a live database.
pub trait SchemaInspector: Send + Sync {
    /// The dialect column types are reported in.
    fn dialect(&self) -> Dialect;

    /// Check that the database is reachable.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;

    /// Describe one table, or `None` if it doesn't exist.
    fn inspect_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Option<TableSpec>>>;
}

impl<T: SchemaInspector + ?Sized> SchemaInspector for &T {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        (**self).ping()
    }

    fn inspect_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Option<TableSpec>>> {
        (**self).inspect_table(table)
    }
}

/// Inspect each of `tables`, one after the other.
pub async fn inspect<I, S>(inspector: &(dyn SchemaInspector + '_), tables: I) -> Result<LiveTables>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut live = LiveTables::new();
    for name in tables {
        let name = name.into();
        let table = inspector.inspect_table(&name).await?;
        tracing::debug!(
            table = %name,
            present = table.is_some(),
            columns = table.as_ref().map(|t| t.fields.len()).unwrap_or(0),
            "inspected table"
        );
        live.insert(name, table);
    }
    Ok(live)
}

const PING_SQL: &str = "SELECT 1";

const TABLE_EXISTS_SQL: &str = "\
SELECT 1
FROM information_schema.tables
WHERE table_schema = current_schema() AND table_name = $1";

const COLUMNS_SQL: &str = "\
SELECT
    c.column_name::text,
    c.data_type::text,
    c.character_maximum_length::int4,
    c.is_nullable = 'YES',
    EXISTS (
        SELECT 1
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_name = tc.constraint_name
         AND kcu.table_schema = tc.table_schema
         AND kcu.table_name = tc.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND kcu.column_name = c.column_name
    )
FROM information_schema.columns c
WHERE c.table_schema = current_schema() AND c.table_name = $1
ORDER BY c.ordinal_position";

/// Inspects a Postgres database through `information_schema`, in the
/// connection's current schema.
pub struct PgInspector<'a, C: Connection + ?Sized> {
    conn: &'a C,
}

impl<'a, C: Connection + ?Sized> PgInspector<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    async fn describe(&self, table: &str) -> Result<Option<TableSpec>> {
        let db = self.conn.traced();

        if db.query_opt(TABLE_EXISTS_SQL, &[&table]).await?.is_none() {
            return Ok(None);
        }

        let rows = db.query(COLUMNS_SQL, &[&table]).await?;
        let mut spec = TableSpec::new(table);
        for row in rows {
            let name: String = row.try_get(0)?;
            let data_type: String = row.try_get(1)?;
            let max_length: Option<i32> = row.try_get(2)?;
            let nullable: bool = row.try_get(3)?;
            let primary_key: bool = row.try_get(4)?;

            let ty = ColumnType {
                data_type,
                max_length,
            };
            spec.fields.push(FieldSpec {
                kind: column_type_to_kind(&ty, Dialect::Postgres),
                name,
                nullable,
                primary_key,
            });
        }
        Ok(Some(spec))
    }
}

impl<C: Connection + ?Sized> SchemaInspector for PgInspector<'_, C> {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.conn.traced().query(PING_SQL, &[]).await?;
            Ok(())
        })
    }

    fn inspect_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Option<TableSpec>>> {
        Box::pin(self.describe(table))
    }
}

/// A column as a live database stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

/// An in-memory database schema.
///
/// Holds dialect column types rather than kinds, so inspecting it goes
/// through the type mapper exactly like a real database. It can also apply
/// schema actions, which makes it usable for dry runs.
#[derive(Debug, Clone, Default)]
pub struct LiveSchema {
    dialect: Dialect,
    tables: IndexMap<String, Vec<LiveColumn>>,
    unreachable: Option<String>,
}

impl LiveSchema {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// A schema whose every call fails with a connection error carrying
    /// `message`.
    pub fn unreachable(dialect: Dialect, message: impl Into<String>) -> Self {
        Self {
            dialect,
            unreachable: Some(message.into()),
            ..Self::default()
        }
    }

    /// Add a table whose columns have the types the mapper gives `spec`'s
    /// kinds.
    pub fn with_table(mut self, spec: &TableSpec) -> Result<Self> {
        self.apply(&SchemaAction::CreateTable(spec.clone()))?;
        Ok(self)
    }

    /// Add a column with a raw dialect type, creating the table if needed.
    pub fn with_column(mut self, table: &str, name: &str, column_type: ColumnType) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(LiveColumn {
                name: name.to_string(),
                column_type,
                nullable: true,
                primary_key: false,
            });
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Describe a table the way an inspector would.
    pub fn table(&self, name: &str) -> Option<TableSpec> {
        let columns = self.tables.get(name)?;
        Some(TableSpec {
            name: name.to_string(),
            fields: columns
                .iter()
                .map(|c| FieldSpec {
                    name: c.name.clone(),
                    kind: column_type_to_kind(&c.column_type, self.dialect),
                    nullable: c.nullable,
                    primary_key: c.primary_key,
                })
                .collect(),
        })
    }

    /// Apply a schema action.
    pub fn apply(&mut self, action: &SchemaAction) -> Result<()> {
        match action {
            SchemaAction::CreateTable(spec) => {
                let columns = spec
                    .fields
                    .iter()
                    .map(|f| self.live_column(f))
                    .collect::<Result<Vec<_>>>()?;
                self.tables.insert(spec.name.clone(), columns);
            }
            SchemaAction::DropTable(name) => {
                self.tables.shift_remove(name);
            }
            SchemaAction::CreateColumn { table, field } => {
                let column = self.live_column(field)?;
                self.columns_mut(table)?.push(column);
            }
            SchemaAction::AlterColumnType { table, field, to, .. } => {
                let column_type = self.column_type(*to)?;
                let column = self
                    .columns_mut(table)?
                    .iter_mut()
                    .find(|c| &c.name == field)
                    .ok_or_else(|| missing(&format!("column \"{table}\".\"{field}\"")))?;
                column.column_type = column_type;
            }
            SchemaAction::DropColumn { table, field } => {
                self.columns_mut(table)?.retain(|c| c.name != field.name);
            }
        }
        Ok(())
    }

    fn column_type(&self, kind: FieldKind) -> Result<ColumnType> {
        kind_to_column_type(kind, self.dialect).map_err(|e| Error::UnsupportedOperation {
            dialect: e.dialect,
            operation: format!("store a column of kind \"{kind}\""),
        })
    }

    fn live_column(&self, field: &FieldSpec) -> Result<LiveColumn> {
        Ok(LiveColumn {
            name: field.name.clone(),
            column_type: self.column_type(field.kind)?,
            nullable: field.nullable,
            primary_key: field.primary_key,
        })
    }

    fn columns_mut(&mut self, table: &str) -> Result<&mut Vec<LiveColumn>> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| missing(&format!("table \"{table}\"")))
    }

    fn check_reachable(&self) -> Result<()> {
        match &self.unreachable {
            Some(message) => Err(Error::Connection(message.clone())),
            None => Ok(()),
        }
    }
}

fn missing(what: &str) -> Error {
    Error::NotFound(what.to_string())
}

impl SchemaInspector for LiveSchema {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.check_reachable() })
    }

    fn inspect_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Option<TableSpec>>> {
        Box::pin(async move {
            self.check_reachable()?;
            Ok(self.table(table))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> TableSpec {
        TableSpec::new("Person")
            .with_field(FieldSpec::new("id", FieldKind::Integer).primary_key())
            .with_field(FieldSpec::new("firstName", FieldKind::String))
    }

    #[tokio::test]
    async fn test_inspect_reports_absent_tables() {
        let schema = LiveSchema::new(Dialect::Postgres).with_table(&person()).unwrap();

        let live = inspect(&schema, ["Person", "Dog"]).await.unwrap();
        let order: Vec<_> = live.keys().map(String::as_str).collect();
        assert_eq!(order, ["Person", "Dog"]);
        assert_eq!(live["Person"], Some(person()));
        assert_eq!(live["Dog"], None);
    }

    #[tokio::test]
    async fn test_raw_types_go_through_the_mapper() {
        let schema = LiveSchema::new(Dialect::Postgres)
            .with_column("Person", "age", ColumnType::new("bigint"))
            .with_column("Person", "token", ColumnType::new("uuid"));

        let table = schema.inspect_table("Person").await.unwrap().unwrap();
        assert_eq!(table.fields[0].kind, FieldKind::Integer);
        assert_eq!(table.fields[1].kind, FieldKind::Unsupported);
    }

    #[tokio::test]
    async fn test_unreachable_surfaces_message_verbatim() {
        let schema = LiveSchema::unreachable(Dialect::Postgres, "connection refused");
        let err = schema.ping().await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_apply_alter_and_drop() {
        let mut schema = LiveSchema::new(Dialect::Mysql).with_table(&person()).unwrap();

        schema
            .apply(&SchemaAction::AlterColumnType {
                table: "Person".into(),
                field: "firstName".into(),
                from: FieldKind::String,
                to: FieldKind::Json,
            })
            .unwrap();
        assert_eq!(
            schema.table("Person").unwrap().field("firstName").unwrap().kind,
            FieldKind::Json
        );

        schema
            .apply(&SchemaAction::DropColumn {
                table: "Person".into(),
                field: FieldSpec::new("firstName", FieldKind::Json),
            })
            .unwrap();
        assert!(!schema.table("Person").unwrap().has_field("firstName"));
    }

    #[test]
    fn test_apply_to_missing_table_fails() {
        let mut schema = LiveSchema::new(Dialect::Postgres);
        let err = schema
            .apply(&SchemaAction::CreateColumn {
                table: "Ghost".into(),
                field: FieldSpec::new("id", FieldKind::Integer),
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "table \"Ghost\" does not exist");
    }
}
