//! Document store facade
//!
//! The `Store` is the public surface: `set`, `push`, `get` and the error
//! log. Each write reconciles schema first, then runs the upsert built by
//! the statement builder. Failures never escape as faults from the
//! contract methods; they are appended to the error log and the call
//! reports `false`/`None`. The `try_*` twins return the same failure as a
//! `Result` and log it just the same.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open(Config::in_memory());
//!
//! let attrs = Attributes::new().with("name", "Joe").with("age", 26);
//! store.set("users", "u1", &attrs);
//!
//! let name = store.get("users", "u1", &["name"]);   // Some(Found::Scalar("Joe"))
//! let id = store.push("users", &attrs);             // Some("aZ3k9QpL0x")
//! ```

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::log::{ErrorLog, LogEntry};
use crate::predicate::{Filter, Predicate};
use crate::query::{self, Found, Shape};
use crate::storage::backend::Backend;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema;
use crate::storage::sqlite::SqliteBackend;
use crate::value::{Attributes, ColumnType, ID_COLUMN, ID_MAX_LEN};

/// Drivers this build can connect with
pub const SUPPORTED_DRIVERS: &[&str] = &["sqlite"];

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Unconnected,
    Connected,
    /// Terminal: the store holds no handle and never will
    FailedToConnect,
}

enum Connection {
    Unconnected,
    Connected(Box<dyn Backend>),
    Failed,
}

/// What a read addresses inside a table
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    /// Ids of every document
    Ids,
    /// Every document, keyed by id
    All,
    /// One document
    Id(String),
    /// Documents matching a filter
    Where(Filter),
}

impl Child {
    /// Coerce the loosely-typed JSON form
    ///
    /// `null`/`false` list ids, `true` reads everything, a string is an id,
    /// an object or array is a filter. Numbers are accepted as ids; the
    /// second element then carries a warning.
    pub fn from_json(json: &JsonValue) -> StoreResult<(Self, Option<String>)> {
        Ok(match json {
            JsonValue::Null | JsonValue::Bool(false) => (Child::Ids, None),
            JsonValue::Bool(true) => (Child::All, None),
            JsonValue::String(id) => (Child::Id(id.clone()), None),
            JsonValue::Number(n) => (
                Child::Id(n.to_string()),
                Some(format!("numeric child {} used as id '{}'", n, n)),
            ),
            filter => (Child::Where(Filter::from_json(filter)?), None),
        })
    }
}

impl From<bool> for Child {
    fn from(all: bool) -> Self {
        if all {
            Child::All
        } else {
            Child::Ids
        }
    }
}

impl From<&str> for Child {
    fn from(id: &str) -> Self {
        Child::Id(id.to_string())
    }
}

impl From<String> for Child {
    fn from(id: String) -> Self {
        Child::Id(id)
    }
}

impl From<Filter> for Child {
    fn from(filter: Filter) -> Self {
        Child::Where(filter)
    }
}

impl From<Predicate> for Child {
    fn from(predicate: Predicate) -> Self {
        Child::Where(Filter::new().with(predicate))
    }
}

impl From<Vec<Predicate>> for Child {
    fn from(predicates: Vec<Predicate>) -> Self {
        Child::Where(Filter {
            predicates,
            ..Filter::default()
        })
    }
}

/// Coerce a JSON projection into column names
///
/// Returns the columns plus a warning when the input had to be bent into
/// shape.
pub fn columns_from_json(json: &JsonValue) -> (Vec<String>, Option<String>) {
    match json {
        JsonValue::Null => (Vec::new(), None),
        JsonValue::String(column) => (
            vec![column.clone()],
            Some(format!("projection '{}' given as a string, not a list", column)),
        ),
        JsonValue::Array(items) => {
            let columns: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect();
            let warning = (columns.len() != items.len())
                .then(|| "non-string projection entries were ignored".to_string());
            (columns, warning)
        }
        other => (
            Vec::new(),
            Some(format!("projection {} ignored; expected a list of names", other)),
        ),
    }
}

/// Schema-flexible document store over a relational backend
pub struct Store {
    config: Config,
    connection: Connection,
    log: ErrorLog,
    /// Operations currently running, outermost first
    frames: Vec<String>,
    /// Trace captured where the current failure was first seen
    failure_trace: Option<Vec<String>>,
    rng: StdRng,
}

impl Store {
    /// Create an unconnected store
    ///
    /// An unsupported driver is logged as `ExtensionUnavailable` and leaves
    /// the store permanently inert.
    pub fn new(config: Config) -> Self {
        let mut store = Self::with_connection(config, Connection::Unconnected);
        if !SUPPORTED_DRIVERS.contains(&store.config.driver.as_str()) {
            let error = StoreError::ExtensionUnavailable {
                driver: store.config.driver.clone(),
            };
            store.connection = Connection::Failed;
            store.append_error(&error, vec!["new".to_string()]);
        }
        store
    }

    /// Create a store and connect it
    pub fn open(config: Config) -> Self {
        let mut store = Self::new(config);
        store.connect();
        store
    }

    /// Open a private in-memory database (for testing)
    pub fn open_in_memory() -> Self {
        Self::open(Config::in_memory())
    }

    /// Create a store already connected through a caller-supplied backend
    ///
    /// The configured driver is not consulted.
    pub fn with_backend(config: Config, backend: Box<dyn Backend>) -> Self {
        Self::with_connection(config, Connection::Connected(backend))
    }

    fn with_connection(config: Config, connection: Connection) -> Self {
        Self {
            config,
            connection,
            log: ErrorLog::new(),
            frames: Vec::new(),
            failure_trace: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seed id generation so `push` is reproducible
    pub fn with_id_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> StoreState {
        match self.connection {
            Connection::Unconnected => StoreState::Unconnected,
            Connection::Connected(_) => StoreState::Connected,
            Connection::Failed => StoreState::FailedToConnect,
        }
    }

    // ==================== Connection ====================

    /// Open the backing connection
    ///
    /// A store that failed to connect stays failed; build a new one.
    pub fn connect(&mut self) -> bool {
        match self.connection {
            Connection::Connected(_) => true,
            Connection::Failed => {
                let error = StoreError::NotConnected(
                    "this store failed to connect earlier; create a new store".to_string(),
                );
                self.append_error(&error, vec!["connect".to_string()]);
                false
            }
            Connection::Unconnected => match SqliteBackend::open(&self.config) {
                Ok(backend) => {
                    info!(database = %self.config.database, "connected");
                    self.connection = Connection::Connected(Box::new(backend));
                    true
                }
                Err(error) => {
                    self.connection = Connection::Failed;
                    self.append_error(&error, vec!["connect".to_string()]);
                    false
                }
            },
        }
    }

    /// Release the connection if one is held
    ///
    /// Close failures are swallowed. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        match std::mem::replace(&mut self.connection, Connection::Unconnected) {
            Connection::Connected(backend) => {
                if let Err(e) = backend.close() {
                    debug!(error = %e, "ignoring failure while closing connection");
                }
                debug!("disconnected");
            }
            other => self.connection = other,
        }
    }

    // ==================== Writes ====================

    /// Create or update a document; `false` on failure (see the error log)
    pub fn set(&mut self, table: &str, id: &str, attributes: &Attributes) -> bool {
        self.try_set(table, id, attributes).is_ok()
    }

    pub fn try_set(&mut self, table: &str, id: &str, attributes: &Attributes) -> StoreResult<()> {
        self.run(format!("set({}, {})", table, id), |store| {
            store.write(table, id, attributes)
        })
    }

    /// Insert a document under a fresh random id of the configured length
    pub fn push(&mut self, table: &str, attributes: &Attributes) -> Option<String> {
        self.try_push(table, attributes).ok()
    }

    /// Insert a document under a fresh random id of `id_length` characters
    pub fn push_with_length(
        &mut self,
        table: &str,
        attributes: &Attributes,
        id_length: usize,
    ) -> Option<String> {
        self.try_push_with_length(table, attributes, id_length).ok()
    }

    pub fn try_push(&mut self, table: &str, attributes: &Attributes) -> StoreResult<String> {
        let id_length = self.config.id_length;
        self.try_push_with_length(table, attributes, id_length)
    }

    pub fn try_push_with_length(
        &mut self,
        table: &str,
        attributes: &Attributes,
        id_length: usize,
    ) -> StoreResult<String> {
        self.run(format!("push({})", table), |store| {
            if id_length == 0 || id_length > ID_MAX_LEN {
                return Err(StoreError::invalid(format!(
                    "id length must be between 1 and {}, got {}",
                    ID_MAX_LEN, id_length
                )));
            }
            let table = store.table_name(table)?;
            let id = store.unused_id(&table, id_length)?;
            store.run(format!("set({}, {})", table, id), |store| {
                store.write(&table, &id, attributes)
            })?;
            Ok(id)
        })
    }

    fn write(&mut self, table: &str, id: &str, attributes: &Attributes) -> StoreResult<()> {
        let table = self.table_name(table)?;
        let id = self.document_id(id)?;
        let resolved = attributes.resolve()?;
        let columns: Vec<(String, ColumnType)> = resolved
            .iter()
            .map(|(name, value)| (name.clone(), value.column_type()))
            .collect();

        self.run(format!("reconcile({})", table), |store| {
            schema::reconcile(store.backend()?, &table, &columns)?;
            Ok(())
        })?;

        self.run(format!("upsert({}, {})", table, id), |store| {
            let backend = store.backend()?;
            let exists = id_taken(backend, &table, &id)?;
            for statement in query::upsert(&*backend, &table, &id, &resolved, exists)? {
                backend.execute(&statement)?;
            }
            Ok(())
        })
    }

    /// Generate an id not yet present in the table
    fn unused_id(&mut self, table: &str, length: usize) -> StoreResult<String> {
        let populated = {
            let backend = self.backend()?;
            schema::table_exists(backend, table)? && has_rows(backend, table)?
        };
        if !populated {
            return Ok(generate_id(&mut self.rng, length));
        }

        let max_attempts = self.config.max_id_attempts;
        let mut attempts = 0;
        loop {
            let candidate = generate_id(&mut self.rng, length);
            attempts += 1;
            if !id_taken(self.backend()?, table, &candidate)? {
                return Ok(candidate);
            }
            debug!(table, candidate = %candidate, attempts, "generated id already taken");
            if max_attempts != 0 && attempts >= max_attempts {
                return Err(StoreError::IdSpaceExhausted {
                    table: table.to_string(),
                    attempts,
                });
            }
        }
    }

    // ==================== Reads ====================

    /// Read from a table; `None` when nothing matched or on failure
    ///
    /// `child` selects the mode: `false` lists ids, `true` reads every
    /// document keyed by id, a string reads one document, a filter reads
    /// matching documents. An empty `columns` slice selects all columns.
    pub fn get(&mut self, table: &str, child: impl Into<Child>, columns: &[&str]) -> Option<Found> {
        self.try_get(table, child, columns).ok().flatten()
    }

    pub fn try_get(
        &mut self,
        table: &str,
        child: impl Into<Child>,
        columns: &[&str],
    ) -> StoreResult<Option<Found>> {
        let child = child.into();
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        self.run(format!("get({})", table), |store| {
            store.read(table, child, columns)
        })
    }

    /// [`Store::get`] over loosely-typed JSON arguments
    ///
    /// Coercions are logged as warnings; a malformed filter fails the call.
    pub fn get_json(
        &mut self,
        table: &str,
        child: &JsonValue,
        columns: &JsonValue,
    ) -> Option<Found> {
        self.try_get_json(table, child, columns).ok().flatten()
    }

    pub fn try_get_json(
        &mut self,
        table: &str,
        child: &JsonValue,
        columns: &JsonValue,
    ) -> StoreResult<Option<Found>> {
        self.run(format!("get({})", table), |store| {
            let (child, child_warning) = Child::from_json(child)?;
            let (columns, columns_warning) = columns_from_json(columns);
            for warning in child_warning.into_iter().chain(columns_warning) {
                store.warn(warning);
            }
            store.read(table, child, columns)
        })
    }

    fn read(&mut self, table: &str, child: Child, columns: Vec<String>) -> StoreResult<Option<Found>> {
        let table = self.table_name(table)?;
        let child = match child {
            Child::Id(id) => Child::Id(self.document_id(&id)?),
            other => other,
        };

        let mut projected = Vec::with_capacity(columns.len());
        for column in columns {
            if column.trim().is_empty() {
                self.warn("empty column name dropped from projection".to_string());
            } else {
                projected.push(column);
            }
        }
        if child == Child::Ids && !projected.is_empty() {
            self.warn("projection ignored when listing ids".to_string());
        }

        let backend = self.backend()?;
        if !schema::table_exists(backend, &table)? {
            return Err(StoreError::TableNotFound(table));
        }

        let (statement, shape) = match child {
            Child::Ids => (query::select_ids(&*backend, &table), Shape::Ids),
            Child::All => (query::select_all(&*backend, &table, &projected), Shape::Table),
            Child::Id(id) => (
                query::select_by_id(&*backend, &table, &id, &projected),
                Shape::document(&projected),
            ),
            Child::Where(filter) => (
                query::select_filtered(&*backend, &table, &projected, &filter)?,
                Shape::documents(&projected),
            ),
        };

        Ok(shape.apply(backend.query(&statement)?))
    }

    // ==================== Error log ====================

    /// Entry `n` positions back from the most recent (0 = most recent)
    pub fn error(&self, n: usize) -> Option<&LogEntry> {
        self.log.back(n)
    }

    /// Total number of log entries, warnings included
    pub fn error_count(&self) -> usize {
        self.log.len()
    }

    pub fn last_error(&self) -> Option<&LogEntry> {
        self.log.back(0)
    }

    /// Log entries, most recent first
    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.recent()
    }

    // ==================== Private helpers ====================

    /// Run one operation inside a named frame
    ///
    /// The failure is logged once, when the outermost frame unwinds, with
    /// the frames that were active where it was first seen.
    fn run<T>(
        &mut self,
        frame: String,
        op: impl FnOnce(&mut Self) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.frames.push(frame);
        let result = op(self);
        if result.is_err() && self.failure_trace.is_none() {
            self.failure_trace = Some(self.frames.clone());
        }
        self.frames.pop();

        if self.frames.is_empty() {
            let trace = self.failure_trace.take();
            if let Err(error) = &result {
                self.append_error(error, trace.unwrap_or_default());
            }
        }
        result
    }

    fn append_error(&mut self, error: &StoreError, trace: Vec<String>) {
        let entry = LogEntry::error(error, trace);
        warn!(trace = %entry.trace_line(), "{}", entry.message);
        self.log.push(entry);
    }

    fn warn(&mut self, message: String) {
        let entry = LogEntry::warning(message, self.frames.clone());
        warn!(trace = %entry.trace_line(), "{}", entry.message);
        self.log.push(entry);
    }

    fn backend(&mut self) -> StoreResult<&mut dyn Backend> {
        match &mut self.connection {
            Connection::Connected(backend) => Ok(backend.as_mut()),
            Connection::Unconnected => Err(StoreError::NotConnected(
                "call connect() before reading or writing".to_string(),
            )),
            Connection::Failed => Err(StoreError::NotConnected(
                "the store failed to connect".to_string(),
            )),
        }
    }

    /// Trim an identifier, warning when that changed it
    fn identifier(&mut self, what: &str, raw: &str) -> StoreResult<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StoreError::invalid(format!("{} cannot be empty", what)));
        }
        if trimmed != raw {
            self.warn(format!("{} '{}' trimmed to '{}'", what, raw, trimmed));
        }
        Ok(trimmed.to_string())
    }

    fn table_name(&mut self, raw: &str) -> StoreResult<String> {
        let table = self.identifier("table name", raw)?;
        if table.to_ascii_lowercase().starts_with("sqlite_") {
            return Err(StoreError::invalid(format!(
                "table name '{}' is reserved",
                table
            )));
        }
        Ok(table)
    }

    fn document_id(&mut self, raw: &str) -> StoreResult<String> {
        let id = self.identifier("id", raw)?;
        if id.chars().count() > ID_MAX_LEN {
            return Err(StoreError::invalid(format!(
                "id '{}' is longer than {} characters",
                id, ID_MAX_LEN
            )));
        }
        Ok(id)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Random id over `[0-9a-zA-Z]`
fn generate_id<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

fn id_taken(backend: &mut dyn Backend, table: &str, id: &str) -> StoreResult<bool> {
    let lookup = query::select_by_id(&*backend, table, id, &[ID_COLUMN.to_string()]);
    Ok(backend.query(&lookup)?.num_rows() > 0)
}

fn has_rows(backend: &mut dyn Backend, table: &str) -> StoreResult<bool> {
    let count = query::count_rows(&*backend, table);
    let rows = backend.query(&count)?.fetch();
    Ok(rows
        .and_then(|row| row.get("count").and_then(JsonValue::as_i64))
        .unwrap_or(0)
        > 0)
}
