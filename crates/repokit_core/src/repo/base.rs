//! Generic table-scoped repository contract.
//!
//! # Responsibility
//! - Provide CRUD and lookup operations for any table over the shared handle.
//! - Keep SQL assembly out of concrete repositories.
//!
//! # Invariants
//! - Implementors supply only a table name and the shared handle.
//! - Database errors are returned unchanged as `RepoError::Db`.
//! - Identifier/operator validation happens before any SQL is executed.

use super::query::{FieldCriterion, Operator, SelectBuilder, SortDirection};
use crate::db::{DbError, SharedHandle};
use crate::model::record::Record;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for table-scoped persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// A table or column name failed identifier validation.
    InvalidIdentifier(String),
    /// An operator string is not one of the supported comparisons.
    InvalidOperator(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
            Self::InvalidOperator(op) => write!(f, "unsupported comparison operator `{op}`"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidIdentifier(_) | Self::InvalidOperator(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Table-scoped data access over a shared connection handle.
///
/// Concrete repositories implement `table_name` and `handle`; every other
/// operation is provided.
///
/// # Trust boundary
/// Table and column names must come from code, never from request input.
/// They are validated as plain identifiers and quoted, and operators are a
/// closed enum, so malformed names fail instead of reaching SQL. Values are
/// always bound.
pub trait Repository: Send + Sync {
    fn table_name(&self) -> &str;

    fn handle(&self) -> &SharedHandle;

    /// Inserts one row. Returns the affected row count.
    fn insert(&self, data: &Record) -> RepoResult<usize> {
        Ok(self.handle().insert(self.table_name(), data)?)
    }

    /// Updates rows equal to every `identifier` column. Returns the affected row count.
    fn update(&self, data: &Record, identifier: &Record) -> RepoResult<usize> {
        Ok(self.handle().update(self.table_name(), data, identifier)?)
    }

    /// Deletes rows equal to every `identifier` column. Returns the affected row count.
    fn delete(&self, identifier: &Record) -> RepoResult<usize> {
        Ok(self.handle().delete(self.table_name(), identifier)?)
    }

    /// Fetches the row whose `id` column equals `id`.
    fn find(&self, id: Value) -> RepoResult<Option<Record>> {
        self.find_by("id", id, 1, Operator::Eq)
    }

    /// Fetches the first row where `field <operator> value`.
    ///
    /// `limit` caps the underlying query; `0` leaves it uncapped.
    fn find_by(
        &self,
        field: &str,
        value: Value,
        limit: u32,
        operator: Operator,
    ) -> RepoResult<Option<Record>> {
        let query = SelectBuilder::from_table(self.table_name())?
            .filter(field, operator, value)?
            .limit(positive_limit(limit))
            .build();
        Ok(self.handle().fetch_one(&query.sql, &query.params)?)
    }

    /// Fetches the first row matching every active criterion.
    ///
    /// Criteria with an empty name or a NULL value are skipped; with no
    /// active criteria this is the first row of the unfiltered table.
    /// `limit` caps the underlying query; `0` leaves it uncapped.
    fn find_by_fields(&self, fields: &[FieldCriterion], limit: u32) -> RepoResult<Option<Record>> {
        let query = SelectBuilder::from_table(self.table_name())?
            .filter_fields(fields)?
            .limit(positive_limit(limit))
            .build();
        Ok(self.handle().fetch_one(&query.sql, &query.params)?)
    }

    /// Fetches every row matching every active criterion; `0` leaves it uncapped.
    fn find_all_by_fields(&self, fields: &[FieldCriterion], limit: u32) -> RepoResult<Vec<Record>> {
        let query = SelectBuilder::from_table(self.table_name())?
            .filter_fields(fields)?
            .limit(positive_limit(limit))
            .build();
        Ok(self.handle().fetch_all(&query.sql, &query.params)?)
    }

    /// Fetches every row, at most `limit` of them when given (`Some(0)` yields none).
    fn find_all(&self, limit: Option<u32>) -> RepoResult<Vec<Record>> {
        let query = SelectBuilder::from_table(self.table_name())?
            .limit(limit)
            .build();
        Ok(self.handle().fetch_all(&query.sql, &query.params)?)
    }

    /// Fetches every row sorted by `order_field`, capped to `limit` rows when given.
    fn find_all_ordered_by(
        &self,
        order_field: &str,
        direction: SortDirection,
        limit: Option<u32>,
    ) -> RepoResult<Vec<Record>> {
        let query = SelectBuilder::from_table(self.table_name())?
            .order_by(order_field, direction)?
            .limit(limit)
            .build();
        Ok(self.handle().fetch_all(&query.sql, &query.params)?)
    }

    /// Returns the most recently generated row id on the shared connection.
    fn last_insert_id(&self) -> RepoResult<i64> {
        Ok(self.handle().last_insert_id()?)
    }
}

/// Lookup limits below 1 mean "uncapped".
fn positive_limit(limit: u32) -> Option<u32> {
    (limit >= 1).then_some(limit)
}

/// Repository bound to a table name chosen at construction time.
///
/// Useful when a table needs no behavior beyond the provided operations.
pub struct TableRepository {
    table: String,
    handle: SharedHandle,
}

impl TableRepository {
    pub fn new(handle: SharedHandle, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            handle,
        }
    }
}

impl Repository for TableRepository {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn handle(&self) -> &SharedHandle {
        &self.handle
    }
}
