//! SQLite backend
//!
//! Implements [`Backend`] over a single `rusqlite` connection.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::Config;
use crate::storage::backend::{AnsiQuoter, Backend, Quoter, ResultSet, Row, Statement};
use crate::storage::error::{StoreError, StoreResult};

/// Backend over a live SQLite connection
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open the database named by the configuration
    pub fn open(config: &Config) -> StoreResult<Self> {
        if !config.host.is_empty() || !config.user.is_empty() {
            debug!(
                host = %config.host,
                user = %config.user,
                "sqlite driver ignores host and user"
            );
        }

        let conn = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            let path = Path::new(&config.database);

            // Ensure parent directory exists
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Connection {
                    database: config.database.clone(),
                    source: Box::new(e),
                })?;
            }
            Connection::open(path)
        }
        .map_err(|e| StoreError::Connection {
            database: config.database.clone(),
            source: Box::new(e),
        })?;

        debug!(database = %config.database, "opened sqlite database");
        Ok(Self { conn })
    }

    /// Open a private in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&Config::in_memory())
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Quoter for SqliteBackend {
    fn quote_identifier(&self, raw: &str) -> String {
        AnsiQuoter.quote_identifier(raw)
    }
}

impl Backend for SqliteBackend {
    fn execute(&mut self, statement: &Statement) -> StoreResult<usize> {
        debug!(sql = %statement.sql, binds = statement.binds.len(), "execute");
        let mut stmt = self
            .conn
            .prepare(&statement.sql)
            .map_err(|source| StoreError::StatementPrepare {
                sql: statement.sql.clone(),
                source,
            })?;

        stmt.execute(params_from_iter(statement.binds.iter()))
            .map_err(|source| StoreError::StatementExecute {
                sql: statement.sql.clone(),
                source,
            })
    }

    fn query(&mut self, statement: &Statement) -> StoreResult<ResultSet> {
        debug!(sql = %statement.sql, binds = statement.binds.len(), "query");
        let execute_err = |source| StoreError::StatementExecute {
            sql: statement.sql.clone(),
            source,
        };

        let mut stmt = self
            .conn
            .prepare(&statement.sql)
            .map_err(|source| StoreError::StatementPrepare {
                sql: statement.sql.clone(),
                source,
            })?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(statement.binds.iter()))
            .map_err(execute_err)?;

        let mut fetched = Vec::new();
        while let Some(row) = rows.next().map_err(execute_err)? {
            let mut keyed = Row::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row.get_ref(i).map_err(execute_err)?;
                keyed.insert(name.clone(), to_json(value));
            }
            fetched.push(keyed);
        }

        Ok(ResultSet::new(columns, fetched))
    }

    fn execute_batch(&mut self, sql: &str) -> StoreResult<()> {
        debug!(sql = %sql, "execute batch");
        self.conn
            .execute_batch(sql)
            .map_err(|source| StoreError::StatementExecute {
                sql: sql.to_string(),
                source,
            })
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        self.conn
            .close()
            .map_err(|(_, source)| StoreError::StatementExecute {
                sql: "<close>".to_string(),
                source,
            })
    }
}

/// Convert a stored value into its JSON shape
fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::error::ErrorKind;
    use crate::value::{BindType, BindValue, Value};
    use serde_json::json;

    #[test]
    fn test_execute_and_query_roundtrip() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .execute_batch("CREATE TABLE t (id TEXT, n INTEGER, f DOUBLE)")
            .unwrap();

        let insert = Statement::new("INSERT INTO t (id, n, f) VALUES (?, ?, ?)")
            .bind(BindValue::text("a"))
            .bind(BindValue {
                kind: BindType::Integer,
                value: Value::Integer(7),
            })
            .bind(BindValue {
                kind: BindType::Float,
                value: Value::Float(1.5),
            });
        assert_eq!(backend.execute(&insert).unwrap(), 1);

        let mut rows = backend.query(&Statement::new("SELECT * FROM t")).unwrap();
        assert_eq!(rows.columns(), ["id", "n", "f"]);
        assert_eq!(rows.num_rows(), 1);
        let row = rows.fetch().unwrap();
        assert_eq!(JsonValue::Object(row), json!({"id": "a", "n": 7, "f": 1.5}));
    }

    #[test]
    fn test_prepare_error_is_classified() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        let err = backend
            .query(&Statement::new("SELECT * FROM missing"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatementPrepare);
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_execute_error_is_classified() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY)")
            .unwrap();
        let insert = Statement::new("INSERT INTO t (id) VALUES (?)").bind(BindValue::text("a"));
        backend.execute(&insert).unwrap();

        let err = backend.execute(&insert).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatementExecute);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("store.db");
        let config = Config {
            database: path.to_string_lossy().into_owned(),
            ..Config::default()
        };

        SqliteBackend::open(&config).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_fails_when_parent_is_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config {
            database: file.path().join("store.db").to_string_lossy().into_owned(),
            ..Config::default()
        };

        let err = SqliteBackend::open(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
