//! Backing relational collaborator
//!
//! The store never talks to a driver directly. It hands fully built
//! [`Statement`]s to a [`Backend`], which owns preparing, binding, executing
//! and fetching. [`SqliteBackend`](super::sqlite::SqliteBackend) is the
//! implementation shipped with the crate.

use std::collections::VecDeque;

use serde_json::{Map, Value as JsonValue};

use crate::storage::error::StoreResult;
use crate::value::BindValue;

/// One fetched row, keyed by column name in select order
pub type Row = Map<String, JsonValue>;

/// Statement text with positional `?` placeholders plus its bind list
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn bind(mut self, value: BindValue) -> Self {
        self.binds.push(value);
        self
    }
}

/// Escapes raw names for interpolation into identifier positions
pub trait Quoter {
    fn quote_identifier(&self, raw: &str) -> String;
}

/// Standard SQL quoting: wrap in double quotes, double any embedded quote
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiQuoter;

impl Quoter for AnsiQuoter {
    fn quote_identifier(&self, raw: &str) -> String {
        format!("\"{}\"", raw.replace('"', "\"\""))
    }
}

/// Materialized query cursor
///
/// Rows are fetched sequentially; dropping the set releases it.
#[derive(Debug, Default)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Rows not yet fetched
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fetch the next row as a keyed map
    pub fn fetch(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }
}

impl Iterator for ResultSet {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.fetch()
    }
}

/// Primitives the store needs from a relational engine
pub trait Backend: Quoter {
    /// Run a DDL/DML statement, returning the affected row count
    fn execute(&mut self, statement: &Statement) -> StoreResult<usize>;

    /// Run a query and materialize its rows
    fn query(&mut self, statement: &Statement) -> StoreResult<ResultSet>;

    /// Run unbound statement text that may hold several statements
    fn execute_batch(&mut self, sql: &str) -> StoreResult<()>;

    /// Release the connection
    fn close(self: Box<Self>) -> StoreResult<()>;
}
