//! Reversible migration generator for Rust services.
//!
//! migen compares a set of model definitions against a live database and
//! writes a Rust migration module with an `up` function that brings the
//! database in line with the models, and a `down` function that undoes it.
//!
//! The pipeline runs in four stages, each awaited before the next:
//!
//! 1. **extract**: models become canonical [`TableSpec`]s, plus one table
//!    per distinct many-to-many join table
//! 2. **inspect**: the live database describes each of those tables
//! 3. **diff**: the two sides are compared into a [`MigrationPlan`], gated
//!    by the [`Mode`]
//! 4. **codegen**: the plan and its inverse are rendered and written
//!
//! ```ignore
//! let options = GenerateOptions::builder()
//!     .model(ModelDef::new("Person")
//!         .field("id", DeclaredType::Integer.primary_key())
//!         .field("firstName", DeclaredType::String))
//!     .migrations_dir("migrations")
//!     .connection(&client)
//!     .mode(Mode::Create)
//!     .build()?;
//!
//! match generate_migration(options).await? {
//!     Outcome::Written(migration) => println!("wrote {}", migration.path),
//!     other => println!("{other}"),
//! }
//! ```
//!
//! # Modes
//!
//! In `create` mode migen only adds: missing tables are created and missing
//! columns are added. Existing columns aren't even compared. In `alter`
//! mode, columns whose kind changed are altered and columns the models no
//! longer declare are dropped. Tables are never dropped.
//!
//! # Generated migrations
//!
//! ```ignore
//! // migrations/m2026_10_18_093000_migen.rs
//! pub async fn up(ctx: &mut MigrationContext<'_>) -> MigrationResult<()> {
//!     ctx.execute(r#"ALTER TABLE "Person" ADD COLUMN "lastName" TEXT"#).await?;
//!     Ok(())
//! }
//! ```
//!
//! Use `MigrationResult` instead of `Result` in migrations - when a statement
//! fails, the error records the file:line:column of the `?` that returned it.

mod codegen;
mod diff;
mod error;
mod extract;
#[cfg(feature = "facet")]
mod facet;
mod generate;
mod introspect;
mod migrate;
mod model;
mod policy;
mod traced;

pub use codegen::{
    FILE_SUFFIX, GeneratedMigration, RenderedMigration, create_table_sql, file_name, render_plan,
    render_source, resolve_dir,
};
pub use diff::{MigrationPlan, SchemaAction, diff};
pub use error::{Error, MigrationError};
pub use extract::extract_tables;
#[cfg(feature = "facet")]
pub use facet::FacetModel;
pub use generate::{GenerateOptions, GenerateOptionsBuilder, Outcome, generate_migration, plan};
pub use introspect::{LiveColumn, LiveSchema, LiveTables, PgInspector, SchemaInspector, inspect};
pub use migrate::MigrationContext;
pub use model::{
    BoxedModel, DeclaredType, FieldDecl, Model, ModelDef, RelationKind, RelationMapping, Through,
};
pub use policy::{ActionKind, Mode, permits};
pub use traced::{Connection, ConnectionExt, TracedConn};

pub use migen_schema::{
    ColumnType, Dialect, FieldKind, FieldSpec, TableSpec, UnknownDialect, UnsupportedKind,
    column_type_to_kind, kind_to_column_type, parse_column_reference,
};

/// Result type for migen operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for migration functions, captures caller location on error.
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;
