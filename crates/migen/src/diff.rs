//! Schema diffing: compare model tables against the live database.
//!
//! [`diff`] walks the desired tables in order and emits a [`MigrationPlan`]:
//! a flat list of [`SchemaAction`]s, grouped by table on demand. Which kinds
//! of action may appear depends on the [`Mode`]; in create mode existing
//! columns are never even compared.
//!
//! ```text
//! Changes detected:
//!
//!   Person:
//!     + lastName: string
//!     ~ age: string -> integer
//!     - nickname
//!   Dog:
//!     + table Dog
//! ```
//!
//! Every plan can be inverted. Running a plan and then its inverse leaves
//! the database with the columns it started with.

use crate::introspect::LiveTables;
use crate::policy::{ActionKind, Mode, permits};
use indexmap::IndexMap;
use migen_schema::{FieldKind, FieldSpec, TableSpec};
use std::fmt;

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaAction {
    /// Create a table with all its columns.
    CreateTable(TableSpec),
    /// Add a column to an existing table.
    CreateColumn { table: String, field: FieldSpec },
    /// Change the kind of an existing column.
    AlterColumnType {
        table: String,
        field: String,
        from: FieldKind,
        to: FieldKind,
    },
    /// Drop a column. Carries the full column so it can be recreated.
    DropColumn { table: String, field: FieldSpec },
    /// Drop a table. Only ever produced by inverting a plan.
    DropTable(String),
}

impl SchemaAction {
    /// The table this action touches.
    pub fn table(&self) -> &str {
        match self {
            SchemaAction::CreateTable(spec) => &spec.name,
            SchemaAction::DropTable(name) => name,
            SchemaAction::CreateColumn { table, .. }
            | SchemaAction::AlterColumnType { table, .. }
            | SchemaAction::DropColumn { table, .. } => table,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            SchemaAction::CreateTable(_) => ActionKind::CreateTable,
            SchemaAction::CreateColumn { .. } => ActionKind::CreateColumn,
            SchemaAction::AlterColumnType { .. } => ActionKind::AlterColumnType,
            SchemaAction::DropColumn { .. } => ActionKind::DropColumn,
            SchemaAction::DropTable(_) => ActionKind::DropTable,
        }
    }

    /// The action that undoes this one.
    pub fn inverse(&self) -> SchemaAction {
        match self {
            SchemaAction::CreateTable(spec) => SchemaAction::DropTable(spec.name.clone()),
            // never planned, so there is no spec to restore
            SchemaAction::DropTable(name) => SchemaAction::CreateTable(TableSpec::new(name.clone())),
            SchemaAction::CreateColumn { table, field } => SchemaAction::DropColumn {
                table: table.clone(),
                field: field.clone(),
            },
            SchemaAction::AlterColumnType {
                table,
                field,
                from,
                to,
            } => SchemaAction::AlterColumnType {
                table: table.clone(),
                field: field.clone(),
                from: *to,
                to: *from,
            },
            SchemaAction::DropColumn { table, field } => SchemaAction::CreateColumn {
                table: table.clone(),
                field: field.clone(),
            },
        }
    }
}

impl fmt::Display for SchemaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaAction::CreateTable(spec) => write!(f, "+ table {}", spec.name),
            SchemaAction::DropTable(name) => write!(f, "- table {}", name),
            SchemaAction::CreateColumn { field, .. } => {
                let nullable = if field.nullable { "" } else { " (not null)" };
                write!(f, "+ {}: {}{}", field.name, field.kind, nullable)
            }
            SchemaAction::AlterColumnType { field, from, to, .. } => {
                write!(f, "~ {}: {} -> {}", field, from, to)
            }
            SchemaAction::DropColumn { field, .. } => write!(f, "- {}", field.name),
        }
    }
}

/// An ordered list of schema actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub actions: Vec<SchemaAction>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Actions grouped by table, tables in the order they first appear.
    pub fn by_table(&self) -> IndexMap<&str, Vec<&SchemaAction>> {
        let mut groups: IndexMap<&str, Vec<&SchemaAction>> = IndexMap::new();
        for action in &self.actions {
            groups.entry(action.table()).or_default().push(action);
        }
        groups
    }

    /// The plan that undoes this one.
    ///
    /// Tables are visited in reverse. Within a table, actions keep their
    /// order and are each inverted; they touch distinct columns, so the
    /// order between them doesn't matter.
    pub fn inverse(&self) -> MigrationPlan {
        let groups = self.by_table();
        let actions = groups
            .values()
            .rev()
            .flat_map(|actions| actions.iter().map(|a| a.inverse()))
            .collect();
        MigrationPlan { actions }
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }
        writeln!(f, "Changes detected:\n")?;
        for (table, actions) in self.by_table() {
            writeln!(f, "  {}:", table)?;
            for action in actions {
                writeln!(f, "    {}", action)?;
            }
        }
        Ok(())
    }
}

/// Compare `desired` tables against what `live` reports for them.
///
/// A table missing from `live` (or reported absent) is created whole.
/// Otherwise model fields missing from the live table are added; in alter
/// mode, fields whose kind differs are altered and live-only columns are
/// dropped. Live columns of a kind migen can't map are never touched.
pub fn diff(desired: &[TableSpec], live: &LiveTables, mode: Mode) -> MigrationPlan {
    let mut actions = Vec::new();

    for table in desired {
        let Some(existing) = live.get(&table.name).and_then(Option::as_ref) else {
            actions.push(SchemaAction::CreateTable(table.clone()));
            continue;
        };

        diff_table(table, existing, mode, &mut actions);
    }

    MigrationPlan { actions }
}

fn diff_table(desired: &TableSpec, existing: &TableSpec, mode: Mode, actions: &mut Vec<SchemaAction>) {
    let compare = permits(ActionKind::AlterColumnType, mode);
    if !compare {
        tracing::debug!(table = %desired.name, %mode, "skipping alter/drop checks");
    }

    for field in &desired.fields {
        let Some(live_field) = existing.field(&field.name) else {
            actions.push(SchemaAction::CreateColumn {
                table: desired.name.clone(),
                field: field.clone(),
            });
            continue;
        };

        if !compare || live_field.kind == field.kind {
            continue;
        }
        if !live_field.kind.is_supported() {
            tracing::warn!(
                table = %desired.name,
                column = %field.name,
                "live column has a type migen can't map, leaving it alone"
            );
            continue;
        }
        actions.push(SchemaAction::AlterColumnType {
            table: desired.name.clone(),
            field: field.name.clone(),
            from: live_field.kind,
            to: field.kind,
        });
    }

    if !permits(ActionKind::DropColumn, mode) {
        return;
    }

    for live_field in &existing.fields {
        if desired.has_field(&live_field.name) {
            continue;
        }
        if !live_field.kind.is_supported() {
            tracing::warn!(
                table = %desired.name,
                column = %live_field.name,
                "not dropping live column of a type migen can't map"
            );
            continue;
        }
        actions.push(SchemaAction::DropColumn {
            table: desired.name.clone(),
            field: live_field.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::LiveSchema;
    use migen_schema::Dialect;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn live_of(tables: &[TableSpec], names: &[&str]) -> LiveTables {
        names
            .iter()
            .map(|n| (n.to_string(), tables.iter().find(|t| t.name == *n).cloned()))
            .collect()
    }

    fn person_desired() -> TableSpec {
        TableSpec::new("Person")
            .with_field(FieldSpec::new("id", FieldKind::Integer))
            .with_field(FieldSpec::new("firstName", FieldKind::String))
            .with_field(FieldSpec::new("lastName", FieldKind::String))
            .with_field(FieldSpec::new("age", FieldKind::Integer))
    }

    fn person_live() -> TableSpec {
        TableSpec::new("Person")
            .with_field(FieldSpec::new("id", FieldKind::Integer))
            .with_field(FieldSpec::new("firstName", FieldKind::String))
            .with_field(FieldSpec::new("age", FieldKind::String))
            .with_field(FieldSpec::new("nickname", FieldKind::String))
    }

    #[test]
    fn test_absent_table_is_created_whole() {
        let desired = vec![person_desired()];
        let plan = diff(&desired, &live_of(&[], &["Person"]), Mode::Create);
        assert_eq!(plan.actions, vec![SchemaAction::CreateTable(person_desired())]);
    }

    #[test]
    fn test_alter_mode_plan() {
        let desired = vec![person_desired()];
        let live = live_of(&[person_live()], &["Person"]);

        let plan = diff(&desired, &live, Mode::Alter);
        insta::assert_snapshot!(plan.to_string(), @r"
        Changes detected:

          Person:
            + lastName: string
            ~ age: string -> integer
            - nickname
        ");
    }

    #[test]
    fn test_create_mode_only_adds() {
        let desired = vec![person_desired()];
        let live = live_of(&[person_live()], &["Person"]);

        let plan = diff(&desired, &live, Mode::Create);
        assert_eq!(
            plan.actions,
            vec![SchemaAction::CreateColumn {
                table: "Person".into(),
                field: FieldSpec::new("lastName", FieldKind::String),
            }]
        );
    }

    #[test]
    fn test_unmappable_live_columns_are_left_alone() {
        let desired = vec![TableSpec::new("Person").with_field(FieldSpec::new("token", FieldKind::String))];
        let live = TableSpec::new("Person")
            .with_field(FieldSpec::new("token", FieldKind::Unsupported))
            .with_field(FieldSpec::new("geom", FieldKind::Unsupported));

        let plan = diff(&desired, &live_of(&[live], &["Person"]), Mode::Alter);
        assert!(plan.is_empty(), "{plan}");
    }

    #[test]
    fn test_inverse_reverses_tables_and_inverts_actions() {
        let desired = vec![
            person_desired(),
            TableSpec::new("Dog").with_field(FieldSpec::new("id", FieldKind::Integer)),
        ];
        let live = live_of(&[person_live()], &["Person", "Dog"]);

        let down = diff(&desired, &live, Mode::Alter).inverse();
        insta::assert_snapshot!(down.to_string(), @r"
        Changes detected:

          Dog:
            - table Dog
          Person:
            - lastName
            ~ age: integer -> string
            + nickname: string
        ");
    }

    #[test]
    fn test_empty_plan_display() {
        assert_eq!(MigrationPlan::default().to_string(), "No changes detected.\n");
    }

    fn kind() -> impl Strategy<Value = FieldKind> {
        prop::sample::select(FieldKind::SUPPORTED.to_vec())
    }

    fn tables() -> impl Strategy<Value = Vec<TableSpec>> {
        prop::collection::btree_map("[a-d]", prop::collection::btree_map("[a-f]", kind(), 0..5), 0..4)
            .prop_map(|tables| {
                tables
                    .into_iter()
                    .map(|(name, fields)| TableSpec {
                        name,
                        fields: fields
                            .into_iter()
                            .map(|(name, kind)| FieldSpec::new(name, kind))
                            .collect(),
                    })
                    .collect()
            })
    }

    fn mode() -> impl Strategy<Value = Mode> {
        prop_oneof![Just(Mode::Create), Just(Mode::Alter)]
    }

    fn snapshot_of(tables: &[TableSpec]) -> LiveSchema {
        tables.iter().fold(LiveSchema::new(Dialect::Postgres), |schema, t| {
            schema.with_table(t).expect("supported kinds only")
        })
    }

    fn inspect_now(schema: &LiveSchema, names: &BTreeSet<String>) -> LiveTables {
        names.iter().map(|n| (n.clone(), schema.table(n))).collect()
    }

    fn columns(live: &LiveTables) -> BTreeMap<String, Option<BTreeSet<(String, FieldKind)>>> {
        live.iter()
            .map(|(name, table)| {
                let cols = table.as_ref().map(|t| {
                    t.fields
                        .iter()
                        .map(|f| (f.name.clone(), f.kind))
                        .collect::<BTreeSet<_>>()
                });
                (name.clone(), cols)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_no_change_against_itself(desired in tables(), mode in mode()) {
            let names: Vec<&str> = desired.iter().map(|t| t.name.as_str()).collect();
            let plan = diff(&desired, &live_of(&desired, &names), mode);
            prop_assert!(plan.is_empty(), "{}", plan);
        }

        #[test]
        fn prop_create_mode_never_alters_or_drops(desired in tables(), live in tables()) {
            let names: Vec<&str> = desired.iter().map(|t| t.name.as_str()).collect();
            let plan = diff(&desired, &live_of(&live, &names), Mode::Create);
            for action in &plan.actions {
                prop_assert!(
                    matches!(action.kind(), ActionKind::CreateTable | ActionKind::CreateColumn),
                    "{}", action
                );
            }
        }

        #[test]
        fn prop_apply_is_idempotent_and_inverse_restores(desired in tables(), live in tables(), mode in mode()) {
            let names: BTreeSet<String> = desired.iter().map(|t| t.name.clone()).collect();
            let mut schema = snapshot_of(&live);
            let before = inspect_now(&schema, &names);

            let plan = diff(&desired, &before, mode);
            for action in &plan.actions {
                schema.apply(action).expect("plan applies");
            }

            let after = inspect_now(&schema, &names);
            let again = diff(&desired, &after, mode);
            prop_assert!(again.is_empty(), "{}", again);

            for action in &plan.inverse().actions {
                schema.apply(action).expect("inverse applies");
            }
            prop_assert_eq!(columns(&inspect_now(&schema, &names)), columns(&before));
        }
    }
}
