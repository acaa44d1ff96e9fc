//! Migration codegen: render a plan as SQL and as a Rust migration module.
//!
//! Actions are grouped by table, and each group becomes exactly one
//! `ctx.execute(...)` call. Table-level actions render as standalone
//! statements. Column actions share a single `ALTER TABLE` where the
//! dialect allows several clauses in one statement, and are otherwise
//! issued as consecutive statements in the same call.

use crate::diff::{MigrationPlan, SchemaAction};
use crate::migrate::MigrationContext;
use crate::traced::Connection;
use crate::{Error, MigrationResult, Result};
use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use migen_schema::{ColumnType, Dialect, FieldKind, FieldSpec, TableSpec, kind_to_column_type};
use tokio::io::AsyncWriteExt;

/// Suffix of every generated file name.
pub const FILE_SUFFIX: &str = "migen";

/// File name for a migration created at `created`.
///
/// The prefix sorts chronologically: `m2026_10_18_093000_migen.rs`.
pub fn file_name(created: Timestamp) -> String {
    format!("m{}_{}.rs", created.strftime("%Y_%m_%d_%H%M%S"), FILE_SUFFIX)
}

/// Render each table group of `plan` as the SQL of one call.
pub fn render_plan(plan: &MigrationPlan, dialect: Dialect) -> Result<Vec<String>> {
    plan.by_table()
        .into_iter()
        .map(|(table, actions)| render_table(table, &actions, dialect))
        .collect()
}

fn render_table(table: &str, actions: &[&SchemaAction], dialect: Dialect) -> Result<String> {
    let mut statements = Vec::new();
    let mut clauses = Vec::new();

    for action in actions {
        match action {
            SchemaAction::CreateTable(spec) => statements.push(create_table_sql(spec, dialect)?),
            SchemaAction::DropTable(name) => {
                statements.push(format!("DROP TABLE {}", dialect.quote_ident(name)))
            }
            SchemaAction::CreateColumn { field, .. } => clauses.push(add_column(field, dialect)?),
            SchemaAction::AlterColumnType { field, to, .. } => {
                clauses.push(alter_column_type(field, *to, dialect)?)
            }
            SchemaAction::DropColumn { field, .. } => {
                clauses.push(format!("DROP COLUMN {}", dialect.quote_ident(&field.name)))
            }
        }
    }

    if !clauses.is_empty() {
        let quoted = dialect.quote_ident(table);
        if dialect.supports_multi_alter() {
            statements.push(format!("ALTER TABLE {}\n    {}", quoted, clauses.join(",\n    ")));
        } else {
            statements.extend(clauses.iter().map(|c| format!("ALTER TABLE {} {}", quoted, c)));
        }
    }

    Ok(statements.join(";\n"))
}

/// Generate a `CREATE TABLE` statement.
///
/// A single primary key column is marked inline; several get a table
/// constraint, and then need an explicit `NOT NULL` each.
pub fn create_table_sql(table: &TableSpec, dialect: Dialect) -> Result<String> {
    let pk_columns: Vec<&str> = table
        .fields
        .iter()
        .filter(|f| f.primary_key)
        .map(|f| f.name.as_str())
        .collect();
    let use_table_pk_constraint = pk_columns.len() > 1;

    let mut parts = Vec::with_capacity(table.fields.len() + 1);
    for field in &table.fields {
        let mut def = format!(
            "    {} {}",
            dialect.quote_ident(&field.name),
            column_type(field.kind, dialect)?
        );
        if field.primary_key && !use_table_pk_constraint {
            def.push_str(" PRIMARY KEY");
        }
        if !field.nullable && (!field.primary_key || use_table_pk_constraint) {
            def.push_str(" NOT NULL");
        }
        parts.push(def);
    }

    if use_table_pk_constraint {
        let quoted: Vec<_> = pk_columns.iter().map(|c| dialect.quote_ident(c)).collect();
        parts.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} (\n{}\n)",
        dialect.quote_ident(&table.name),
        parts.join(",\n")
    ))
}

/// `ADD COLUMN` clause. Added columns are always nullable so they apply
/// to tables that already have rows.
fn add_column(field: &FieldSpec, dialect: Dialect) -> Result<String> {
    let keyword = if dialect == Dialect::Mssql { "ADD" } else { "ADD COLUMN" };
    Ok(format!(
        "{} {} {}",
        keyword,
        dialect.quote_ident(&field.name),
        column_type(field.kind, dialect)?
    ))
}

fn alter_column_type(field: &str, to: FieldKind, dialect: Dialect) -> Result<String> {
    if !dialect.supports_alter_column_type() {
        return Err(Error::UnsupportedOperation {
            dialect,
            operation: format!("change the type of column \"{field}\""),
        });
    }
    let name = dialect.quote_ident(field);
    let ty = column_type(to, dialect)?;
    Ok(match dialect {
        Dialect::Postgres => format!("ALTER COLUMN {name} TYPE {ty} USING {name}::{ty}"),
        Dialect::Mysql => format!("MODIFY COLUMN {name} {ty}"),
        Dialect::Mssql | Dialect::Sqlite => format!("ALTER COLUMN {name} {ty}"),
    })
}

fn column_type(kind: FieldKind, dialect: Dialect) -> Result<ColumnType> {
    kind_to_column_type(kind, dialect).map_err(|e| Error::UnsupportedOperation {
        dialect: e.dialect,
        operation: format!("store a column of kind \"{kind}\""),
    })
}

/// Render the Rust module for a migration.
pub fn render_source(up: &[String], down: &[String], created: Timestamp) -> String {
    let mut out = String::new();
    out.push_str("//! Migration generated by migen\n");
    out.push_str(&format!(
        "//! Created: {} UTC\n",
        created.strftime("%Y-%m-%d %H:%M:%S")
    ));
    out.push('\n');
    out.push_str("use migen::{MigrationContext, MigrationResult};\n");
    write_fn(&mut out, "up", up);
    write_fn(&mut out, "down", down);
    out
}

fn write_fn(out: &mut String, name: &str, calls: &[String]) {
    out.push('\n');
    out.push_str(&format!(
        "pub async fn {name}(ctx: &mut MigrationContext<'_>) -> MigrationResult<()> {{\n"
    ));
    for sql in calls {
        out.push_str(&format!("    ctx.execute({}).await?;\n", raw_string(sql)));
    }
    out.push_str("    Ok(())\n}\n");
}

/// Quote `s` as a raw string literal with enough `#`s to contain it.
fn raw_string(s: &str) -> String {
    let mut longest = 0;
    for (i, _) in s.match_indices('"') {
        let run = s[i + 1..].bytes().take_while(|&b| b == b'#').count();
        longest = longest.max(run);
    }
    let hashes = "#".repeat(longest + 1);
    format!("r{hashes}\"{s}\"{hashes}")
}

/// A rendered migration, not yet on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMigration {
    pub file_name: String,
    /// SQL of each call in `up`, one per table.
    pub up: Vec<String>,
    /// SQL of each call in `down`, one per table.
    pub down: Vec<String>,
    /// The full Rust module.
    pub source: String,
}

impl RenderedMigration {
    /// Render `plan` and its inverse.
    ///
    /// Fails without side effects if the dialect can't express an action.
    pub fn render(plan: &MigrationPlan, dialect: Dialect, created: Timestamp) -> Result<Self> {
        let up = render_plan(plan, dialect)?;
        let down = render_plan(&plan.inverse(), dialect)?;
        let source = render_source(&up, &down, created);
        Ok(Self {
            file_name: file_name(created),
            up,
            down,
            source,
        })
    }

    /// Write the module into `dir`, creating the directory if needed.
    ///
    /// A file of the same name is replaced.
    pub async fn write(self, dir: &Utf8Path) -> Result<GeneratedMigration> {
        let dir = resolve_dir(dir)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| fs_error(&dir, source))?;
        let dir = canonicalize(&dir).await?;
        let path = dir.join(&self.file_name);
        replace_file(&path, self.source.as_bytes()).await?;

        tracing::info!(path = %path, up = self.up.len(), down = self.down.len(), "wrote migration");
        Ok(GeneratedMigration {
            path,
            migration: self,
        })
    }

    pub async fn apply_up(&self, conn: &(dyn Connection + '_)) -> MigrationResult<()> {
        run_calls(conn, &self.up).await
    }

    pub async fn apply_down(&self, conn: &(dyn Connection + '_)) -> MigrationResult<()> {
        run_calls(conn, &self.down).await
    }
}

async fn run_calls(conn: &(dyn Connection + '_), calls: &[String]) -> MigrationResult<()> {
    let mut ctx = MigrationContext::new(conn);
    for sql in calls {
        ctx.execute(sql).await?;
    }
    Ok(())
}

/// A migration written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMigration {
    /// Absolute path of the written file.
    pub path: Utf8PathBuf,
    pub migration: RenderedMigration,
}

impl GeneratedMigration {
    pub async fn apply_up(&self, conn: &(dyn Connection + '_)) -> MigrationResult<()> {
        self.migration.apply_up(conn).await
    }

    pub async fn apply_down(&self, conn: &(dyn Connection + '_)) -> MigrationResult<()> {
        self.migration.apply_down(conn).await
    }
}

/// Resolve a relative directory against the working directory.
pub fn resolve_dir(dir: &Utf8Path) -> Result<Utf8PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| fs_error(dir, source))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|p| {
        fs_error(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("working directory {} is not UTF-8", p.display()),
            ),
        )
    })?;
    Ok(cwd.join(dir))
}

async fn canonicalize(dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let path = tokio::fs::canonicalize(dir)
        .await
        .map_err(|source| fs_error(dir, source))?;
    Utf8PathBuf::from_path_buf(path).map_err(|p| {
        fs_error(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not UTF-8", p.display()),
            ),
        )
    })
}

/// Write `contents` next to `path` and rename it into place, replacing any
/// file already there. Nothing is left behind on failure.
async fn replace_file(path: &Utf8Path, contents: &[u8]) -> Result<()> {
    let tmp = match path.file_name() {
        Some(name) => path.with_file_name(format!(".{name}.tmp")),
        None => path.with_extension("tmp"),
    };
    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(source) = written {
        if let Err(e) = tokio::fs::remove_file(&tmp).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %tmp, error = %e, "failed to remove temporary migration file");
        }
        return Err(fs_error(path, source));
    }
    Ok(())
}

fn fs_error(path: &Utf8Path, source: std::io::Error) -> Error {
    Error::FileSystem {
        path: path.to_path_buf(),
        source,
    }
}
