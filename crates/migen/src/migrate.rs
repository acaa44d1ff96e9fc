//! The context generated migrations run against.

use crate::MigrationResult;
use crate::traced::{Connection, ConnectionExt};

/// Passed to a migration's `up` and `down` functions.
///
/// Borrows the caller's connection; statements run as they are issued, with
/// no transaction of its own.
pub struct MigrationContext<'a> {
    conn: &'a (dyn Connection + 'a),
}

impl<'a> MigrationContext<'a> {
    pub fn new(conn: &'a (dyn Connection + 'a)) -> Self {
        Self { conn }
    }

    /// Execute one call's SQL, which may hold several `;`-separated
    /// statements.
    #[track_caller]
    pub fn execute<'s>(
        &'s mut self,
        sql: &'s str,
    ) -> impl std::future::Future<Output = MigrationResult<()>> + Send + 's {
        let caller = std::panic::Location::caller();
        async move {
            self.conn
                .traced()
                .batch_execute(sql)
                .await
                .map_err(|e| crate::MigrationError {
                    source: e.into(),
                    location: caller,
                })
        }
    }
}
