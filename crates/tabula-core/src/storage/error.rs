//! Storage error handling
//!
//! Provides typed errors for store operations with descriptive messages
//! and recovery suggestions.

use thiserror::Error;

/// Boxed driver error carried by connection failures
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The configured database driver is not available
    #[error("Database driver '{driver}' is not available. Supported drivers: sqlite")]
    ExtensionUnavailable { driver: String },

    /// Failed to open the backing connection
    #[error("Failed to connect to database '{database}': {source}")]
    Connection {
        database: String,
        #[source]
        source: DriverError,
    },

    /// A data operation was attempted without a live connection
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Statement text was rejected by the backend
    #[error("Failed to prepare statement '{sql}': {source}")]
    StatementPrepare {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Statement failed while binding or running
    #[error("Failed to execute statement '{sql}': {source}")]
    StatementExecute {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Read against a table that does not exist
    #[error("Table not found: '{0}'")]
    TableNotFound(String),

    /// Malformed identifier, value or type declaration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No unused id was found within the attempt limit
    #[error("Could not generate an unused id for table '{table}' after {attempts} attempts")]
    IdSpaceExhausted { table: String, attempts: usize },
}

/// Copyable classification of a [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ExtensionUnavailable,
    Connection,
    NotConnected,
    StatementPrepare,
    StatementExecute,
    TableNotFound,
    InvalidInput,
    IdSpaceExhausted,
}

impl StoreError {
    /// Shorthand for an [`StoreError::InvalidInput`] error
    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidInput(message.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ExtensionUnavailable { .. } => ErrorKind::ExtensionUnavailable,
            StoreError::Connection { .. } => ErrorKind::Connection,
            StoreError::NotConnected(_) => ErrorKind::NotConnected,
            StoreError::StatementPrepare { .. } => ErrorKind::StatementPrepare,
            StoreError::StatementExecute { .. } => ErrorKind::StatementExecute,
            StoreError::TableNotFound(_) => ErrorKind::TableNotFound,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::IdSpaceExhausted { .. } => ErrorKind::IdSpaceExhausted,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::ExtensionUnavailable { .. } => {
                Some("Set `driver = \"sqlite\"` in the configuration and create a new store.")
            }
            StoreError::Connection { .. } => {
                Some("Check that the database path is writable and its parent is a directory.")
            }
            StoreError::NotConnected(_) => Some("Call `connect()` before reading or writing."),
            StoreError::TableNotFound(_) => {
                Some("Tables are created by the first `set` or `push` that targets them.")
            }
            StoreError::IdSpaceExhausted { .. } => {
                Some("Use a longer id length or raise `max_id_attempts`.")
            }
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
