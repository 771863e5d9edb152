//! Shared database connection handle and SQLite bootstrap.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Expose the connection-handle contract consumed by repositories.
//!
//! # Invariants
//! - One handle is shared by every repository built for a process.
//! - Repositories never close or reconfigure the handle.
//! - Values always travel as bound parameters; identifiers are quoted.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod handle;
mod open;

pub use handle::{quote_identifier, ConnectionHandle, SharedHandle, SqliteHandle};
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A thread panicked while holding the connection lock.
    ConnectionPoisoned,
    /// A mutation was requested with no identifying columns.
    EmptyCriteria {
        operation: &'static str,
        table: String,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::ConnectionPoisoned => write!(f, "database connection lock is poisoned"),
            Self::EmptyCriteria { operation, table } => write!(
                f,
                "refusing {operation} on `{table}` without identifying criteria"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::ConnectionPoisoned | Self::EmptyCriteria { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
