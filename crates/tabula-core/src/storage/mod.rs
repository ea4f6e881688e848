//! Storage layer
//!
//! Everything that talks to the relational backend.
//!
//! ## Architecture
//!
//! - **Backend**: trait over one open connection (execute, query, close)
//! - **SQLite**: the shipped backend, via rusqlite
//! - **Schema**: on-demand table and column creation
//!
//! Statements are built elsewhere and handed to the backend whole.

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{AnsiQuoter, Backend, Quoter, ResultSet, Row, Statement};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use schema::reconcile;
pub use sqlite::SqliteBackend;
