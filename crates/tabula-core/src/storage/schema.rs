//! Schema reconciliation
//!
//! Tables and columns are created on demand, right before a write needs
//! them. Evolution is strictly additive: a table starts with only its
//! identity column, and columns are added but never narrowed or dropped.

use tracing::info;

use crate::storage::backend::{Backend, Quoter, Statement};
use crate::storage::error::StoreResult;
use crate::value::{BindValue, ColumnType, ID_COLUMN};

/// SQL type of the identity column
pub const ID_COLUMN_TYPE: &str = "CHAR(64)";

/// Create-if-absent statement for a table holding only the identity column
pub fn create_table_sql<Q: Quoter + ?Sized>(quoter: &Q, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL PRIMARY KEY)",
        quoter.quote_identifier(table),
        quoter.quote_identifier(ID_COLUMN),
        ID_COLUMN_TYPE
    )
}

/// Additive alter batch, one `ADD COLUMN` per missing column
pub fn add_columns_sql<Q: Quoter + ?Sized>(
    quoter: &Q,
    table: &str,
    columns: &[(String, ColumnType)],
) -> String {
    let table = quoter.quote_identifier(table);
    columns
        .iter()
        .map(|(name, column_type)| {
            format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                table,
                quoter.quote_identifier(name),
                column_type.sql()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ensure the table exists
pub fn ensure_table(backend: &mut dyn Backend, table: &str) -> StoreResult<()> {
    let sql = create_table_sql(&*backend, table);
    backend.execute(&Statement::new(sql))?;
    Ok(())
}

/// Check whether a table exists
///
/// Names compare case-insensitively, as SQLite resolves them.
pub fn table_exists(backend: &mut dyn Backend, table: &str) -> StoreResult<bool> {
    let stmt = Statement::new(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
    )
        .bind(BindValue::text(table));
    Ok(backend.query(&stmt)?.num_rows() > 0)
}

/// Check whether a column exists on a table, ignoring case
pub fn column_exists(backend: &mut dyn Backend, table: &str, column: &str) -> StoreResult<bool> {
    let stmt = Statement::new(
        "SELECT name FROM pragma_table_info(?) WHERE name = ? COLLATE NOCASE",
    )
        .bind(BindValue::text(table))
        .bind(BindValue::text(column));
    Ok(backend.query(&stmt)?.num_rows() > 0)
}

/// Ensure every attribute has a backing column
///
/// Missing columns are added in one batch, in caller order. Returns the
/// names of the columns that were added; empty when nothing was missing.
pub fn ensure_columns(
    backend: &mut dyn Backend,
    table: &str,
    attributes: &[(String, ColumnType)],
) -> StoreResult<Vec<String>> {
    let mut missing = Vec::new();
    for (name, column_type) in attributes {
        let pending = missing
            .iter()
            .any(|(m, _): &(String, ColumnType)| m.eq_ignore_ascii_case(name));
        if !pending && !column_exists(backend, table, name)? {
            missing.push((name.clone(), column_type.clone()));
        }
    }

    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let sql = add_columns_sql(&*backend, table, &missing);
    backend.execute_batch(&sql)?;

    let added: Vec<String> = missing.into_iter().map(|(name, _)| name).collect();
    info!(table, columns = ?added, "added columns");
    Ok(added)
}

/// Create the table if needed, then any missing columns
pub fn reconcile(
    backend: &mut dyn Backend,
    table: &str,
    attributes: &[(String, ColumnType)],
) -> StoreResult<Vec<String>> {
    if !table_exists(backend, table)? {
        ensure_table(backend, table)?;
        info!(table, "created table");
    }
    ensure_columns(backend, table, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::AnsiQuoter;
    use crate::storage::sqlite::SqliteBackend;

    fn column_types(backend: &mut SqliteBackend, table: &str) -> Vec<(String, String)> {
        backend
            .connection()
            .prepare("SELECT name, type FROM pragma_table_info(?)")
            .unwrap()
            .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql(&AnsiQuoter, "users"),
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" CHAR(64) NOT NULL PRIMARY KEY)"
        );
    }

    #[test]
    fn test_add_columns_sql_keeps_order() {
        let sql = add_columns_sql(
            &AnsiQuoter,
            "users",
            &[
                ("name".to_string(), ColumnType::Text),
                ("age".to_string(), ColumnType::Integer),
            ],
        );
        assert_eq!(
            sql,
            "ALTER TABLE \"users\" ADD COLUMN \"name\" VARCHAR(255);\n\
             ALTER TABLE \"users\" ADD COLUMN \"age\" INTEGER;"
        );
    }

    #[test]
    fn test_ensure_table_creates_identity_only() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        assert!(!table_exists(&mut backend, "users").unwrap());

        ensure_table(&mut backend, "users").unwrap();
        assert!(table_exists(&mut backend, "users").unwrap());
        assert_eq!(
            column_types(&mut backend, "users"),
            vec![("id".to_string(), "CHAR(64)".to_string())]
        );

        // Idempotent
        ensure_table(&mut backend, "users").unwrap();
    }

    #[test]
    fn test_ensure_columns_adds_missing_once() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        ensure_table(&mut backend, "users").unwrap();

        let attrs = vec![
            ("name".to_string(), ColumnType::Text),
            ("age".to_string(), ColumnType::Integer),
        ];

        let added = ensure_columns(&mut backend, "users", &attrs).unwrap();
        assert_eq!(added, vec!["name", "age"]);

        let added = ensure_columns(&mut backend, "users", &attrs).unwrap();
        assert!(added.is_empty());

        assert_eq!(
            column_types(&mut backend, "users"),
            vec![
                ("id".to_string(), "CHAR(64)".to_string()),
                ("name".to_string(), "VARCHAR(255)".to_string()),
                ("age".to_string(), "INTEGER".to_string()),
            ]
        );
    }

    #[test]
    fn test_existing_column_is_never_retyped() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        reconcile(&mut backend, "t", &[("x".to_string(), ColumnType::Integer)]).unwrap();

        let added = reconcile(&mut backend, "t", &[("x".to_string(), ColumnType::Text)]).unwrap();
        assert!(added.is_empty());
        assert_eq!(column_types(&mut backend, "t")[1].1, "INTEGER");
    }

    #[test]
    fn test_existence_checks_ignore_case() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        reconcile(&mut backend, "Users", &[("Name".to_string(), ColumnType::Text)]).unwrap();

        assert!(table_exists(&mut backend, "users").unwrap());
        assert!(column_exists(&mut backend, "users", "NAME").unwrap());

        let added = reconcile(&mut backend, "users", &[("name".to_string(), ColumnType::Text)]).unwrap();
        assert!(added.is_empty());
    }

    #[test]
    fn test_case_variants_in_one_write_add_one_column() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        let added = reconcile(
            &mut backend,
            "t",
            &[
                ("Nick".to_string(), ColumnType::Text),
                ("nick".to_string(), ColumnType::Text),
            ],
        )
        .unwrap();
        assert_eq!(added, vec!["Nick"]);
        assert_eq!(column_types(&mut backend, "t").len(), 2);
    }

    #[test]
    fn test_declared_type_used_verbatim() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        let declared = ColumnType::declare("DECIMAL(10,2)").unwrap();
        reconcile(&mut backend, "prices", &[("amount".to_string(), declared)]).unwrap();

        assert_eq!(column_types(&mut backend, "prices")[1].1, "DECIMAL(10,2)");
    }

    #[test]
    fn test_quoted_names_survive() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        reconcile(
            &mut backend,
            "odd \"table\"",
            &[("first name".to_string(), ColumnType::Text)],
        )
        .unwrap();

        assert!(table_exists(&mut backend, "odd \"table\"").unwrap());
        assert!(column_exists(&mut backend, "odd \"table\"", "first name").unwrap());
    }
}
