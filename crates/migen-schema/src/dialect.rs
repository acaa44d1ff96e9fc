//! SQL dialects and the type mapper.

use crate::FieldKind;
use std::fmt;
use std::str::FromStr;

/// SQL dialects migen can map types for and render statements in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    Mysql,
    Mssql,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::Postgres,
        Dialect::Mysql,
        Dialect::Mssql,
        Dialect::Sqlite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Mssql => "mssql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Whether an existing column's type can be changed in place.
    pub fn supports_alter_column_type(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Whether several column operations can share one `ALTER TABLE`.
    pub fn supports_multi_alter(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Mysql)
    }

    /// Quote an identifier for this dialect.
    ///
    /// Always quotes, so reserved words like `user` or `order` are safe.
    /// Embedded closing quotes are doubled.
    pub fn quote_ident(&self, name: &str) -> String {
        let (open, close) = match self {
            Dialect::Postgres | Dialect::Sqlite => ('"', '"'),
            Dialect::Mysql => ('`', '`'),
            Dialect::Mssql => ('[', ']'),
        };
        let mut out = String::with_capacity(name.len() + 2);
        out.push(open);
        for c in name.chars() {
            if c == close {
                out.push(close);
            }
            out.push(c);
        }
        out.push(close);
        out
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown dialect name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDialect(pub String);

impl fmt::Display for UnknownDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown dialect \"{}\" (expected one of: postgres, mysql, mssql, sqlite)",
            self.0
        )
    }
}

impl std::error::Error for UnknownDialect {}

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}

/// A dialect-specific column type.
///
/// `data_type` is spelled the way the database's catalog reports it
/// (lowercase, e.g. `character varying`), and `max_length` carries the
/// character/byte length where the dialect needs one. A length of `-1`
/// stands for `MAX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnType {
    pub data_type: String,
    pub max_length: Option<i32>,
}

impl ColumnType {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            max_length: None,
        }
    }

    pub fn with_length(mut self, len: i32) -> Self {
        self.max_length = Some(len);
        self
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_type.to_ascii_uppercase())?;
        match self.max_length {
            Some(-1) => write!(f, "(MAX)"),
            Some(len) => write!(f, "({})", len),
            None => Ok(()),
        }
    }
}

/// Error returned when asking for the column type of [`FieldKind::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedKind {
    pub dialect: Dialect,
}

impl fmt::Display for UnsupportedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind \"unsupported\" has no {} column type", self.dialect)
    }
}

impl std::error::Error for UnsupportedKind {}

/// Map a field kind to its column type in `dialect`.
///
/// Total over supported kinds; [`FieldKind::Unsupported`] is an error.
pub fn kind_to_column_type(kind: FieldKind, dialect: Dialect) -> Result<ColumnType, UnsupportedKind> {
    use FieldKind::*;

    let ty = match (dialect, kind) {
        (_, Unsupported) => return Err(UnsupportedKind { dialect }),

        (Dialect::Postgres, Integer) => ColumnType::new("integer"),
        (Dialect::Postgres, Float) => ColumnType::new("real"),
        (Dialect::Postgres, String) => ColumnType::new("text"),
        (Dialect::Postgres, Boolean) => ColumnType::new("boolean"),
        (Dialect::Postgres, Date) => ColumnType::new("date"),
        (Dialect::Postgres, Json) => ColumnType::new("jsonb"),
        (Dialect::Postgres, Binary) => ColumnType::new("bytea"),

        (Dialect::Mysql, Integer) => ColumnType::new("int"),
        (Dialect::Mysql, Float) => ColumnType::new("float"),
        (Dialect::Mysql, String) => ColumnType::new("varchar").with_length(255),
        (Dialect::Mysql, Boolean) => ColumnType::new("tinyint").with_length(1),
        (Dialect::Mysql, Date) => ColumnType::new("date"),
        (Dialect::Mysql, Json) => ColumnType::new("json"),
        (Dialect::Mysql, Binary) => ColumnType::new("blob"),

        (Dialect::Mssql, Integer) => ColumnType::new("int"),
        (Dialect::Mssql, Float) => ColumnType::new("real"),
        (Dialect::Mssql, String) => ColumnType::new("nvarchar").with_length(255),
        (Dialect::Mssql, Boolean) => ColumnType::new("bit"),
        (Dialect::Mssql, Date) => ColumnType::new("date"),
        // No native JSON type: NVARCHAR(MAX) is reserved for it so the
        // inverse can tell it apart from bounded strings.
        (Dialect::Mssql, Json) => ColumnType::new("nvarchar").with_length(-1),
        (Dialect::Mssql, Binary) => ColumnType::new("varbinary").with_length(-1),

        (Dialect::Sqlite, Integer) => ColumnType::new("integer"),
        (Dialect::Sqlite, Float) => ColumnType::new("real"),
        (Dialect::Sqlite, String) => ColumnType::new("text"),
        (Dialect::Sqlite, Boolean) => ColumnType::new("boolean"),
        (Dialect::Sqlite, Date) => ColumnType::new("date"),
        (Dialect::Sqlite, Json) => ColumnType::new("json"),
        (Dialect::Sqlite, Binary) => ColumnType::new("blob"),
    };

    Ok(ty)
}

/// Map a column type reported by `dialect` back to a field kind.
///
/// Partial: anything the mapper doesn't recognize becomes
/// [`FieldKind::Unsupported`]. Every type produced by
/// [`kind_to_column_type`] maps back to the kind it came from.
pub fn column_type_to_kind(ty: &ColumnType, dialect: Dialect) -> FieldKind {
    let name = ty.data_type.trim().to_ascii_lowercase();
    // sqlite reports declared types verbatim, e.g. `VARCHAR(255)`
    let name = match name.split_once('(') {
        Some((base, _)) => base.trim_end().to_string(),
        None => name,
    };

    match dialect {
        Dialect::Postgres => match name.as_str() {
            "smallint" | "integer" | "bigint" | "int2" | "int4" | "int8" => FieldKind::Integer,
            "real" | "double precision" | "numeric" | "float4" | "float8" => FieldKind::Float,
            "text" | "character varying" | "character" | "varchar" => FieldKind::String,
            "boolean" | "bool" => FieldKind::Boolean,
            "date" | "timestamp with time zone" | "timestamp without time zone" => {
                FieldKind::Date
            }
            "json" | "jsonb" => FieldKind::Json,
            "bytea" => FieldKind::Binary,
            _ => FieldKind::Unsupported,
        },
        Dialect::Mysql => match name.as_str() {
            "tinyint" if ty.max_length == Some(1) => FieldKind::Boolean,
            "bool" | "boolean" => FieldKind::Boolean,
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
                FieldKind::Integer
            }
            "float" | "double" | "decimal" | "numeric" => FieldKind::Float,
            "varchar" | "char" | "text" | "tinytext" | "mediumtext" | "longtext" => {
                FieldKind::String
            }
            "date" | "datetime" | "timestamp" => FieldKind::Date,
            "json" => FieldKind::Json,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                FieldKind::Binary
            }
            _ => FieldKind::Unsupported,
        },
        Dialect::Mssql => match name.as_str() {
            "nvarchar" | "varchar" if ty.max_length == Some(-1) => FieldKind::Json,
            "nvarchar" | "varchar" | "nchar" | "char" | "text" | "ntext" => FieldKind::String,
            "tinyint" | "smallint" | "int" | "bigint" => FieldKind::Integer,
            "real" | "float" | "decimal" | "numeric" => FieldKind::Float,
            "bit" => FieldKind::Boolean,
            "date" | "datetime" | "datetime2" | "datetimeoffset" => FieldKind::Date,
            "varbinary" | "binary" | "image" => FieldKind::Binary,
            _ => FieldKind::Unsupported,
        },
        Dialect::Sqlite => match name.as_str() {
            "int" | "integer" | "bigint" => FieldKind::Integer,
            "real" | "float" | "double" => FieldKind::Float,
            "text" | "varchar" | "character varying" => FieldKind::String,
            "boolean" | "bool" => FieldKind::Boolean,
            "date" | "datetime" => FieldKind::Date,
            "json" => FieldKind::Json,
            "blob" => FieldKind::Binary,
            _ => FieldKind::Unsupported,
        },
    }
}
