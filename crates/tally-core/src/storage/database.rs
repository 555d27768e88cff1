//! Read-only access to the relational store.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::storage::error::{StorageResult, StoreError};

/// Progress-handler granularity, in virtual machine instructions.
const PROGRESS_OPS: i32 = 1_000;

/// Column names plus row values of one executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First cell of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Statement execution against a relational store.
///
/// Implementations must refuse statements that would modify the database and
/// must stop work once `budget` has elapsed.
pub trait RelationalStore: Send + Sync {
    fn execute(&self, sql: &str, budget: Duration) -> StorageResult<RowSet>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// SQLite file opened read-only for every statement.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens the database at `path`, verifying that it is readable.
    ///
    /// # Errors
    /// * `StoreError::Connection` - If the file is missing or is not a database
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(StoreError::Connection(format!("database file not found: {}", path.display())));
        }

        let store = Self { path };
        let conn = store.connect()?;
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Connection(format!("{}: {}", store.path.display(), e)))?;

        info!(path = %store.path.display(), "Opened relational store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> StorageResult<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| StoreError::Connection(format!("{}: {}", self.path.display(), e)))
    }
}

impl RelationalStore for SqliteStore {
    fn execute(&self, sql: &str, budget: Duration) -> StorageResult<RowSet> {
        let conn = self.connect()?;
        let deadline = Instant::now() + budget;
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));

        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(StoreError::Syntax("only read-only statements are allowed".to_string()));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(to_json(row.get::<_, SqlValue>(idx)?));
            }
            rows.push(values);
        }

        debug!(rows = rows.len(), columns = width, "Statement executed");
        Ok(RowSet { columns, rows })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER, name TEXT, price REAL);
             INSERT INTO t VALUES (1, 'a', 1.5), (2, 'b', NULL);",
        )
        .unwrap();
        drop(conn);
        let store = SqliteStore::open(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn test_execute_returns_typed_cells() {
        let (_dir, store) = fixture();
        let rows = store.execute("SELECT id, name, price FROM t ORDER BY id", Duration::from_secs(5)).unwrap();
        assert_eq!(rows.columns, vec!["id", "name", "price"]);
        assert_eq!(rows.rows[0], vec![Value::from(1), Value::from("a"), Value::from(1.5)]);
        assert_eq!(rows.rows[1][2], Value::Null);
        assert_eq!(rows.scalar(), Some(&Value::from(1)));
    }

    #[test]
    fn test_writes_are_refused() {
        let (_dir, store) = fixture();
        let err = store.execute("DELETE FROM t", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, StoreError::Syntax(_)));
        let rows = store.execute("SELECT count(*) FROM t", Duration::from_secs(5)).unwrap();
        assert_eq!(rows.scalar(), Some(&Value::from(2)));
    }

    #[test]
    fn test_unknown_column_is_classified() {
        let (_dir, store) = fixture();
        let err = store.execute("SELECT x.nope FROM t x", Duration::from_secs(5)).unwrap_err();
        match err {
            StoreError::UnknownIdentifier { identifier, .. } => assert_eq!(identifier, "nope"),
            other => panic!("Expected UnknownIdentifier, got {other:?}"),
        }
    }

    #[test]
    fn test_runaway_query_is_interrupted() {
        let (_dir, store) = fixture();
        let sql = "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n) SELECT count(*) FROM n";
        let err = store.execute(sql, Duration::from_millis(50)).unwrap_err();
        assert_eq!(err, StoreError::Interrupted);
    }

    #[test]
    fn test_missing_file_is_connection_error() {
        let err = SqliteStore::open("/definitely/not/here.sqlite").unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }
}
