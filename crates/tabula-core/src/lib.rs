//! Tabula Core Library
//!
//! A schema-flexible document layer over a relational database. Callers
//! write attribute maps addressed by `(table, id)`; tables and columns are
//! created the first time a write needs them.
//!
//! # Architecture
//!
//! - **SQLite**: storage, one table per collection, one column per attribute
//! - **Error log**: failures are recorded on the store instead of propagated
//!
//! # Quick Start
//!
//! ```text
//! let mut store = Store::open(Config::load()?);
//!
//! // Write, creating the table and columns on demand
//! let attrs = Attributes::new().with("name", "Joe").with("age", 26);
//! store.set("users", "u1", &attrs);
//!
//! // Read one attribute back
//! let name = store.get("users", "u1", &["name"]);
//!
//! // Inspect the most recent failure
//! if let Some(entry) = store.error(0) {
//!     eprintln!("{}", entry.message);
//! }
//! ```
//!
//! # Modules
//!
//! - `store`: document store facade (main entry point)
//! - `value`: attribute values and column types
//! - `predicate`: read-filter DSL
//! - `query`: statement builder and result shaping
//! - `storage`: backend trait, SQLite backend, schema reconciliation
//! - `log`: ordered error log
//! - `config`: application configuration

pub mod config;
pub mod log;
pub mod predicate;
pub mod query;
pub mod storage;
pub mod store;
pub mod value;

pub use config::Config;
pub use log::{ErrorLog, LogEntry, Severity};
pub use predicate::{Filter, Predicate};
pub use query::Found;
pub use storage::{Backend, ErrorKind, SqliteBackend, StoreError, StoreResult};
pub use store::{Child, Store, StoreState};
pub use value::{Attributes, ColumnType, TypedValue, Value};
