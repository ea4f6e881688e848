//! Statement builder
//!
//! Pure translation from logical requests to [`Statement`]s, plus the rules
//! that shape fetched rows into what callers get back. Identifiers are
//! quoted through a [`Quoter`]; every value travels as a bind parameter
//! unless a predicate explicitly asks for inlining.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::predicate::Filter;
use crate::storage::backend::{Quoter, ResultSet, Row, Statement};
use crate::storage::error::StoreResult;
use crate::value::{BindValue, TypedValue, ID_COLUMN};

/// Column list for a projection: `*`, or `id` plus the named attributes
fn projection<Q: Quoter + ?Sized>(quoter: &Q, columns: &[String]) -> String {
    if columns.is_empty() {
        return "*".to_string();
    }
    std::iter::once(ID_COLUMN)
        .chain(
            columns
                .iter()
                .map(String::as_str)
                .filter(|c| *c != ID_COLUMN),
        )
        .map(|c| quoter.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT id FROM table`
pub fn select_ids<Q: Quoter + ?Sized>(quoter: &Q, table: &str) -> Statement {
    Statement::new(format!(
        "SELECT {} FROM {}",
        quoter.quote_identifier(ID_COLUMN),
        quoter.quote_identifier(table)
    ))
}

/// Every row, optionally projected
pub fn select_all<Q: Quoter + ?Sized>(quoter: &Q, table: &str, columns: &[String]) -> Statement {
    Statement::new(format!(
        "SELECT {} FROM {}",
        projection(quoter, columns),
        quoter.quote_identifier(table)
    ))
}

/// One document by id, optionally projected
pub fn select_by_id<Q: Quoter + ?Sized>(
    quoter: &Q,
    table: &str,
    id: &str,
    columns: &[String],
) -> Statement {
    Statement::new(format!(
        "SELECT {} FROM {} WHERE {} = ?",
        projection(quoter, columns),
        quoter.quote_identifier(table),
        quoter.quote_identifier(ID_COLUMN)
    ))
    .bind(BindValue::text(id))
}

/// Rows matching a filter, optionally projected
pub fn select_filtered<Q: Quoter + ?Sized>(
    quoter: &Q,
    table: &str,
    columns: &[String],
    filter: &Filter,
) -> StoreResult<Statement> {
    let mut sql = format!(
        "SELECT {} FROM {}",
        projection(quoter, columns),
        quoter.quote_identifier(table)
    );

    let (condition, binds) = filter.render(quoter)?;
    if !condition.is_empty() {
        let keyword = filter.where_keyword.trim();
        if !keyword.is_empty() {
            sql.push(' ');
            sql.push_str(keyword);
        }
        sql.push(' ');
        sql.push_str(&condition);
    }

    Ok(Statement { sql, binds })
}

/// Number of rows in a table, as column `count`
pub fn count_rows<Q: Quoter + ?Sized>(quoter: &Q, table: &str) -> Statement {
    Statement::new(format!(
        "SELECT COUNT(*) AS count FROM {}",
        quoter.quote_identifier(table)
    ))
}

/// Insert a document holding only its id
pub fn insert_id<Q: Quoter + ?Sized>(quoter: &Q, table: &str, id: &str) -> Statement {
    Statement::new(format!(
        "INSERT INTO {} ({}) VALUES (?)",
        quoter.quote_identifier(table),
        quoter.quote_identifier(ID_COLUMN)
    ))
    .bind(BindValue::text(id))
}

/// Set every attribute on one document; `None` when there is nothing to set
pub fn update<Q: Quoter + ?Sized>(
    quoter: &Q,
    table: &str,
    id: &str,
    attributes: &[(String, TypedValue)],
) -> StoreResult<Option<Statement>> {
    if attributes.is_empty() {
        return Ok(None);
    }

    let assignments = attributes
        .iter()
        .map(|(name, _)| format!("{} = ?", quoter.quote_identifier(name)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut binds = attributes
        .iter()
        .map(|(_, value)| value.bind())
        .collect::<StoreResult<Vec<_>>>()?;
    binds.push(BindValue::text(id));

    Ok(Some(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quoter.quote_identifier(table),
            assignments,
            quoter.quote_identifier(ID_COLUMN)
        ),
        binds,
    }))
}

/// Statements that make a document exist and carry the given attributes
///
/// `exists` comes from a by-id lookup issued beforehand. An absent
/// document gets an id-only insert; attributes, if any, follow as a single
/// update.
pub fn upsert<Q: Quoter + ?Sized>(
    quoter: &Q,
    table: &str,
    id: &str,
    attributes: &[(String, TypedValue)],
    exists: bool,
) -> StoreResult<Vec<Statement>> {
    let mut statements = Vec::with_capacity(2);
    if !exists {
        statements.push(insert_id(quoter, table, id));
    }
    if let Some(update) = update(quoter, table, id, attributes)? {
        statements.push(update);
    }
    Ok(statements)
}

/// What a successful read hands back
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Found {
    /// Ids of every document in a table
    Ids(Vec<String>),
    /// One row, one projected column
    Scalar(JsonValue),
    /// One full or projected row
    Document(Row),
    /// Several rows, in retrieval order
    Documents(Vec<Row>),
    /// Every row keyed by id, in retrieval order
    Table(Map<String, JsonValue>),
}

impl Found {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Found::Ids(ids) => JsonValue::from(ids.clone()),
            Found::Scalar(value) => value.clone(),
            Found::Document(row) => JsonValue::Object(row.clone()),
            Found::Documents(rows) => {
                JsonValue::Array(rows.iter().cloned().map(JsonValue::Object).collect())
            }
            Found::Table(map) => JsonValue::Object(map.clone()),
        }
    }
}

/// How a result set is turned into a [`Found`]
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Ids,
    Table,
    /// By-id read; collapses to a scalar for a single projected column
    Document { single_column: Option<String> },
    /// Filtered read; collapses like `Document` when exactly one row matches
    Documents { single_column: Option<String> },
}

impl Shape {
    fn single_column(columns: &[String]) -> Option<String> {
        match columns {
            [only] => Some(only.clone()),
            _ => None,
        }
    }

    pub fn document(columns: &[String]) -> Self {
        Shape::Document {
            single_column: Self::single_column(columns),
        }
    }

    pub fn documents(columns: &[String]) -> Self {
        Shape::Documents {
            single_column: Self::single_column(columns),
        }
    }

    /// Shape fetched rows; `None` when nothing matched
    pub fn apply(&self, mut rows: ResultSet) -> Option<Found> {
        if rows.num_rows() == 0 {
            return None;
        }

        match self {
            Shape::Ids => Some(Found::Ids(rows.map(|row| id_of(&row)).collect())),
            Shape::Table => Some(Found::Table(
                rows.map(|row| (id_of(&row), JsonValue::Object(row)))
                    .collect(),
            )),
            Shape::Document { single_column } | Shape::Documents { single_column } => {
                if rows.num_rows() == 1 {
                    let mut row = rows.fetch()?;
                    return Some(match single_column {
                        Some(column) => Found::Scalar(row.remove(column).unwrap_or(JsonValue::Null)),
                        None if matches!(self, Shape::Document { .. }) => Found::Document(row),
                        None => Found::Documents(vec![row]),
                    });
                }
                Some(Found::Documents(rows.collect()))
            }
        }
    }
}

fn id_of(row: &Row) -> String {
    match row.get(ID_COLUMN) {
        Some(JsonValue::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
