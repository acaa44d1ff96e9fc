//! Mode policy: which kinds of actions a run may emit.

use std::fmt;
use std::str::FromStr;

/// Controls whether altering and destructive actions are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Only create tables and add columns.
    Create,
    /// Also change column types and drop columns.
    Alter,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Create => "create",
            Mode::Alter => "alter",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Mode::Create),
            "alter" => Ok(Mode::Alter),
            other => Err(format!(
                "\"mode\" must be one of [create, alter], got \"{other}\""
            )),
        }
    }
}

/// The kind of a schema action, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CreateTable,
    CreateColumn,
    AlterColumnType,
    DropColumn,
    DropTable,
}

/// Whether `mode` permits actions of `kind`.
///
/// Additive actions are always permitted. Dropping a table is never
/// planned; it only shows up when inverting a plan.
pub fn permits(kind: ActionKind, mode: Mode) -> bool {
    match kind {
        ActionKind::CreateTable | ActionKind::CreateColumn => true,
        ActionKind::AlterColumnType | ActionKind::DropColumn => mode == Mode::Alter,
        ActionKind::DropTable => false,
    }
}
