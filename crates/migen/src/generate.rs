//! The migration generation pipeline and its options.

use crate::codegen::{GeneratedMigration, RenderedMigration};
use crate::diff::{MigrationPlan, diff};
use crate::extract::extract_tables;
use crate::introspect::{PgInspector, SchemaInspector, inspect};
use crate::model::{BoxedModel, Model};
use crate::policy::Mode;
use crate::traced::Connection;
use crate::{Error, Result};
use camino::Utf8PathBuf;
use jiff::Timestamp;
use migen_schema::Dialect;
use std::collections::HashSet;
use std::fmt;
use tracing::Instrument;

/// Validated options for [`generate_migration`].
pub struct GenerateOptions<'a> {
    pub models: Vec<BoxedModel>,
    pub migrations_dir: Utf8PathBuf,
    pub inspector: Box<dyn SchemaInspector + 'a>,
    pub mode: Mode,
    pub dialect: Dialect,
    /// Creation time; defaults to now.
    pub timestamp: Option<Timestamp>,
}

impl<'a> GenerateOptions<'a> {
    pub fn builder() -> GenerateOptionsBuilder<'a> {
        GenerateOptionsBuilder::default()
    }
}

impl fmt::Debug for GenerateOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("models", &self.models.iter().map(|m| m.table_name()).collect::<Vec<_>>())
            .field("migrations_dir", &self.migrations_dir)
            .field("mode", &self.mode)
            .field("dialect", &self.dialect)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Builder for [`GenerateOptions`].
///
/// ```ignore
/// let options = GenerateOptions::builder()
///     .models(models)
///     .migrations_dir("migrations")
///     .connection(&client)
///     .mode(Mode::Alter)
///     .build()?;
/// ```
#[derive(Default)]
pub struct GenerateOptionsBuilder<'a> {
    models: Option<Vec<BoxedModel>>,
    migrations_dir: Option<Utf8PathBuf>,
    inspector: Option<Box<dyn SchemaInspector + 'a>>,
    mode: Option<std::result::Result<Mode, String>>,
    dialect: Option<std::result::Result<Dialect, String>>,
    timestamp: Option<Timestamp>,
}

impl<'a> GenerateOptionsBuilder<'a> {
    /// Add one model.
    pub fn model(mut self, model: impl Model + Send + Sync + 'static) -> Self {
        self.models.get_or_insert_with(Vec::new).push(Box::new(model));
        self
    }

    /// Add models, keeping their order. Passing none still counts as
    /// setting the option.
    pub fn models(mut self, models: impl IntoIterator<Item = BoxedModel>) -> Self {
        self.models.get_or_insert_with(Vec::new).extend(models);
        self
    }

    pub fn migrations_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.migrations_dir = Some(dir.into());
        self
    }

    /// Inspect a Postgres database through `conn`.
    pub fn connection<C: Connection + ?Sized>(mut self, conn: &'a C) -> Self {
        self.inspector = Some(Box::new(PgInspector::new(conn)));
        self
    }

    /// Inspect through any inspector, such as a [`LiveSchema`](crate::LiveSchema).
    pub fn inspector(mut self, inspector: impl SchemaInspector + 'a) -> Self {
        self.inspector = Some(Box::new(inspector));
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(Ok(mode));
        self
    }

    /// Set the mode from its string form, validated by [`build`](Self::build).
    pub fn mode_str(mut self, mode: &str) -> Self {
        self.mode = Some(mode.parse());
        self
    }

    /// Defaults to the inspector's dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(Ok(dialect));
        self
    }

    pub fn dialect_str(mut self, dialect: &str) -> Self {
        self.dialect = Some(
            dialect
                .parse()
                .map_err(|e: migen_schema::UnknownDialect| format!("\"dialect\": {e}")),
        );
        self
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate the options, failing on the first bad field.
    pub fn build(self) -> Result<GenerateOptions<'a>> {
        let models = self.models.ok_or_else(|| required("models"))?;
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.table_name()) {
                return Err(Error::BadOptions(format!(
                    "\"models\" declares table \"{}\" more than once",
                    model.table_name()
                )));
            }
        }

        let migrations_dir = self
            .migrations_dir
            .filter(|dir| !dir.as_str().is_empty())
            .ok_or_else(|| required("migrations_dir"))?;

        let inspector = self.inspector.ok_or_else(|| required("connection"))?;

        let mode = self
            .mode
            .ok_or_else(|| required("mode"))?
            .map_err(Error::BadOptions)?;

        let dialect = match self.dialect {
            None => inspector.dialect(),
            Some(dialect) => {
                let dialect = dialect.map_err(Error::BadOptions)?;
                if dialect != inspector.dialect() {
                    return Err(Error::BadOptions(format!(
                        "\"dialect\" is {} but the connection is {}",
                        dialect,
                        inspector.dialect()
                    )));
                }
                dialect
            }
        };

        Ok(GenerateOptions {
            models,
            migrations_dir,
            inspector,
            mode,
            dialect,
            timestamp: self.timestamp,
        })
    }
}

fn required(field: &str) -> Error {
    Error::BadOptions(format!("\"{field}\" is required"))
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model list was empty; the database wasn't touched.
    NoModels,
    /// The database already matches the models.
    NoMigrationNeeded,
    Written(GeneratedMigration),
}

impl Outcome {
    /// `No models passed`, `No migration needed`, or the written file's path.
    pub fn message(&self) -> &str {
        match self {
            Outcome::NoModels => "No models passed",
            Outcome::NoMigrationNeeded => "No migration needed",
            Outcome::Written(migration) => migration.path.as_str(),
        }
    }

    pub fn migration(&self) -> Option<&GeneratedMigration> {
        match self {
            Outcome::Written(migration) => Some(migration),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Compare the models against the live database and write a migration
/// reconciling them.
///
/// Either the whole migration is written or nothing is. Nothing is retried.
pub async fn generate_migration(options: GenerateOptions<'_>) -> Result<Outcome> {
    let span = tracing::info_span!(
        "generate_migration",
        mode = %options.mode,
        dialect = %options.dialect,
        models = options.models.len(),
    );
    run(options).instrument(span).await
}

async fn run(options: GenerateOptions<'_>) -> Result<Outcome> {
    let Some(plan) = plan(&options).await? else {
        tracing::info!("no models passed");
        return Ok(Outcome::NoModels);
    };

    if plan.is_empty() {
        tracing::info!("no migration needed");
        return Ok(Outcome::NoMigrationNeeded);
    }
    tracing::debug!(actions = plan.len(), "\n{plan}");

    let created = options.timestamp.unwrap_or_else(Timestamp::now);
    let rendered = RenderedMigration::render(&plan, options.dialect, created)?;
    let written = rendered.write(&options.migrations_dir).await?;
    Ok(Outcome::Written(written))
}

/// Compute the plan without rendering or writing anything.
///
/// Returns `None` when there are no models, without touching the database.
pub async fn plan(options: &GenerateOptions<'_>) -> Result<Option<MigrationPlan>> {
    if options.models.is_empty() {
        return Ok(None);
    }

    let desired = extract_tables(&options.models)?;
    tracing::debug!(tables = desired.len(), "extracted model tables");

    options.inspector.ping().await?;
    let live = inspect(options.inspector.as_ref(), desired.iter().map(|t| t.name.clone())).await?;

    Ok(Some(diff(&desired, &live, options.mode)))
}
