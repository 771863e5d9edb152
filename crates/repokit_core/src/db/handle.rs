//! Connection-handle contract and its SQLite implementation.
//!
//! # Responsibility
//! - Execute table-scoped insert/update/delete from `Record` values.
//! - Run caller-built queries with bound parameters and map rows to `Record`.
//!
//! # Invariants
//! - Every value is bound as a parameter, never spliced into SQL text.
//! - Identifiers are double-quoted with embedded quotes doubled.
//! - Update/delete without criteria are rejected, never widened to the table.

use super::{DbError, DbResult};
use crate::model::record::Record;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, Statement};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle shared by every repository of one container.
pub type SharedHandle = Arc<dyn ConnectionHandle>;

/// Live database connection consumed by repositories.
///
/// Implementations own their concurrency story; repositories call these
/// methods from any thread that holds the shared handle.
pub trait ConnectionHandle: Send + Sync {
    /// Inserts one row. Returns the affected row count.
    fn insert(&self, table: &str, data: &Record) -> DbResult<usize>;
    /// Updates rows matching every identifier column. Returns the affected row count.
    fn update(&self, table: &str, data: &Record, identifier: &Record) -> DbResult<usize>;
    /// Deletes rows matching every identifier column. Returns the affected row count.
    fn delete(&self, table: &str, identifier: &Record) -> DbResult<usize>;
    fn fetch_one(&self, sql: &str, params: &[Value]) -> DbResult<Option<Record>>;
    fn fetch_all(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Record>>;
    /// Renders a value as a SQL literal.
    fn quote(&self, value: &Value) -> String;
    /// Returns the most recently generated row id on this connection.
    fn last_insert_id(&self) -> DbResult<i64>;
}

/// SQLite-backed handle serializing access to one connection.
pub struct SqliteHandle {
    conn: Mutex<Connection>,
}

impl SqliteHandle {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (or creates) a database file and wraps it.
    pub fn open(path: impl AsRef<std::path::Path>) -> DbResult<Self> {
        super::open_db(path).map(Self::new)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        super::open_db_in_memory().map(Self::new)
    }

    /// Wraps this handle for sharing across repositories.
    pub fn into_shared(self) -> SharedHandle {
        Arc::new(self)
    }

    /// Runs a batch of statements without parameters, e.g. schema setup.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::ConnectionPoisoned)
    }
}

impl ConnectionHandle for SqliteHandle {
    fn insert(&self, table: &str, data: &Record) -> DbResult<usize> {
        let sql = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
        } else {
            let columns = data
                .columns()
                .map(quote_identifier)
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=data.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {} ({columns}) VALUES ({placeholders})",
                quote_identifier(table)
            )
        };

        let conn = self.lock()?;
        let changed = conn.execute(&sql, params_from_iter(data.iter().map(|(_, v)| v)))?;
        Ok(changed)
    }

    fn update(&self, table: &str, data: &Record, identifier: &Record) -> DbResult<usize> {
        if identifier.is_empty() {
            return Err(DbError::EmptyCriteria {
                operation: "update",
                table: table.to_string(),
            });
        }
        if data.is_empty() {
            return Ok(0);
        }

        let mut bind_values: Vec<&Value> = Vec::with_capacity(data.len() + identifier.len());
        let assignments = data
            .iter()
            .map(|(column, value)| {
                bind_values.push(value);
                format!("{} = ?{}", quote_identifier(column), bind_values.len())
            })
            .collect::<Vec<_>>()
            .join(", ");
        let filter = equality_filter(identifier, &mut bind_values);

        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {filter}",
            quote_identifier(table)
        );
        let conn = self.lock()?;
        let changed = conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }

    fn delete(&self, table: &str, identifier: &Record) -> DbResult<usize> {
        if identifier.is_empty() {
            return Err(DbError::EmptyCriteria {
                operation: "delete",
                table: table.to_string(),
            });
        }

        let mut bind_values: Vec<&Value> = Vec::with_capacity(identifier.len());
        let filter = equality_filter(identifier, &mut bind_values);
        let sql = format!("DELETE FROM {} WHERE {filter}", quote_identifier(table));

        let conn = self.lock()?;
        let changed = conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }

    fn fetch_one(&self, sql: &str, params: &[Value]) -> DbResult<Option<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params))?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row_to_record(row, &columns)?));
        }

        Ok(None)
    }

    fn fetch_all(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row, &columns)?);
        }
        Ok(records)
    }

    fn quote(&self, value: &Value) -> String {
        quote_literal(value)
    }

    fn last_insert_id(&self) -> DbResult<i64> {
        Ok(self.lock()?.last_insert_rowid())
    }
}

/// Double-quotes one SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(text) => format!("'{}'", text.replace('\'', "''")),
        Value::Blob(bytes) => {
            let hex = bytes.iter().map(|b| format!("{b:02X}")).collect::<String>();
            format!("X'{hex}'")
        }
    }
}

/// Builds `a = ?n AND b IS NULL ...`, appending bound values in order.
fn equality_filter<'a>(identifier: &'a Record, bind_values: &mut Vec<&'a Value>) -> String {
    identifier
        .iter()
        .map(|(column, value)| {
            if matches!(value, Value::Null) {
                format!("{} IS NULL", quote_identifier(column))
            } else {
                bind_values.push(value);
                format!("{} = ?{}", quote_identifier(column), bind_values.len())
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn row_to_record(row: &Row<'_>, columns: &[String]) -> DbResult<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        record.set(column.as_str(), row.get::<_, Value>(index)?);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::{quote_identifier, ConnectionHandle, SqliteHandle};
    use crate::db::DbError;
    use crate::model::record::Record;
    use rusqlite::types::Value;

    fn handle_with_people() -> SqliteHandle {
        let handle = SqliteHandle::open_in_memory().expect("in-memory db should open");
        handle
            .execute_batch(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, team TEXT);",
            )
            .expect("schema should apply");
        handle
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        let handle = SqliteHandle::open_in_memory().unwrap();
        assert_eq!(handle.quote(&Value::Text("O'Brien".into())), "'O''Brien'");
        assert_eq!(handle.quote(&Value::Integer(42)), "42");
        assert_eq!(handle.quote(&Value::Null), "NULL");
        assert_eq!(handle.quote(&Value::Blob(vec![0xAB, 0x01])), "X'AB01'");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn update_and_delete_require_identifier() {
        let handle = handle_with_people();
        let data = Record::new().with("name", "x".to_string());

        let err = handle.update("people", &data, &Record::new()).unwrap_err();
        assert!(matches!(err, DbError::EmptyCriteria { operation: "update", .. }));
        let err = handle.delete("people", &Record::new()).unwrap_err();
        assert!(matches!(err, DbError::EmptyCriteria { operation: "delete", .. }));
    }

    #[test]
    fn null_identifier_matches_null_columns() {
        let handle = handle_with_people();
        handle
            .insert("people", &Record::new().with("name", "Ann".to_string()))
            .unwrap();
        handle
            .insert(
                "people",
                &Record::new()
                    .with("name", "Bob".to_string())
                    .with("team", "core".to_string()),
            )
            .unwrap();

        let removed = handle
            .delete("people", &Record::new().with("team", Value::Null))
            .unwrap();
        assert_eq!(removed, 1);

        let rest = handle.fetch_all("SELECT name FROM people", &[]).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].get_text("name"), Some("Bob"));
    }

    #[test]
    fn fetch_one_preserves_select_column_order() {
        let handle = handle_with_people();
        handle
            .insert(
                "people",
                &Record::new()
                    .with("team", "ops".to_string())
                    .with("name", "Cy".to_string()),
            )
            .unwrap();

        let row = handle
            .fetch_one(
                "SELECT team, id, name FROM people WHERE name = ?1",
                &[Value::Text("Cy".into())],
            )
            .unwrap()
            .expect("row should exist");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["team", "id", "name"]);
    }
}
