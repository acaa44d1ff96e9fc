use camino::Utf8PathBuf;
use migen_schema::Dialect;
use std::panic::Location;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Options failed validation. The message names the offending field.
    #[error("bad options passed to migen: {0}")]
    BadOptions(String),

    /// The database could not be reached or rejected us. The driver's
    /// message is passed through untouched.
    #[error("{0}")]
    Connection(String),

    #[error("unsupported field type(s) in model \"{model}\": {}", .fields.join(", "))]
    UnsupportedFieldType {
        model: String,
        /// `field ("declared type")` entries, in declaration order
        fields: Vec<String>,
    },

    #[error("invalid relation \"{relation}\" in model \"{model}\": {reason}")]
    InvalidRelation {
        model: String,
        relation: String,
        reason: String,
    },

    #[error("{dialect} cannot {operation}")]
    UnsupportedOperation { dialect: Dialect, operation: String },

    /// A table or column an action refers to isn't in the schema.
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("filesystem error at {path}: {source}")]
    FileSystem {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        Error::Connection(e.to_string())
    }
}

/// Error returned from a generated migration's `up`/`down` functions.
///
/// Records the source location of the `?` that produced it, so a failing
/// statement points at the line in the migration file.
#[derive(Debug, Error)]
#[error("{source} (at {location})")]
pub struct MigrationError {
    #[source]
    pub source: Error,
    pub location: &'static Location<'static>,
}

impl From<Error> for MigrationError {
    #[track_caller]
    fn from(source: Error) -> Self {
        Self {
            source,
            location: Location::caller(),
        }
    }
}

impl From<tokio_postgres::Error> for MigrationError {
    #[track_caller]
    fn from(e: tokio_postgres::Error) -> Self {
        Self {
            source: e.into(),
            location: Location::caller(),
        }
    }
}
