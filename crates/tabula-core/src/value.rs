//! Typed values at the input boundary
//!
//! Callers hand the store loosely-typed JSON: bare scalars or typed wrappers
//! of the form `{"val": 26, "type": "integer"}`. Everything is resolved into
//! a [`TypedValue`] before it reaches the reconciler or the statement
//! builder, so those components never inspect raw input.

use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde_json::{Map, Value as JsonValue};

use crate::storage::error::{StoreError, StoreResult};

/// Key holding the value inside a typed wrapper
pub const WRAPPER_VALUE_KEY: &str = "val";

/// Key holding the column type inside a typed wrapper
pub const WRAPPER_TYPE_KEY: &str = "type";

/// Name of the identity column every table carries
pub const ID_COLUMN: &str = "id";

/// Longest id the identity column accepts
pub const ID_MAX_LEN: usize = 64;

/// A resolved scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Resolve a JSON scalar. Arrays and objects are rejected.
    pub fn from_json(json: &JsonValue) -> StoreResult<Self> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::from(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if n.is_u64() {
                    // Past i64::MAX; keep every digit
                    Ok(Value::Text(n.to_string()))
                } else {
                    Ok(Value::Float(n.as_f64().unwrap_or_default()))
                }
            }
            JsonValue::String(s) => Ok(Value::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(StoreError::invalid(format!(
                "expected a scalar value, got {}",
                json
            ))),
        }
    }

    /// The bind tag this value implies when no type is declared
    pub fn inferred_bind_type(&self) -> BindType {
        match self {
            Value::Integer(_) => BindType::Integer,
            Value::Float(_) => BindType::Float,
            Value::Null | Value::Text(_) => BindType::Text,
        }
    }

    /// Convert to the representation a bind tag requires
    pub fn coerce(self, kind: BindType) -> StoreResult<Self> {
        let coerced = match (kind, self) {
            (_, Value::Null) => Value::Null,
            (BindType::Integer, Value::Integer(i)) => Value::Integer(i),
            // 2^63 is exact in f64; i64::MAX is not
            (BindType::Integer, Value::Float(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0 =>
            {
                Value::Integer(f as i64)
            }
            (BindType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => {
                    return Err(StoreError::invalid(format!("'{}' is not an integer", s)));
                }
            },
            (BindType::Float, Value::Integer(i)) => Value::Float(i as f64),
            (BindType::Float, Value::Float(f)) => Value::Float(f),
            (BindType::Float, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => return Err(StoreError::invalid(format!("'{}' is not a number", s))),
            },
            (BindType::Text, other) => Value::Text(other.to_string()),
            (BindType::Integer, other) => {
                return Err(StoreError::invalid(format!("{} is not an integer", other)));
            }
        };
        Ok(coerced)
    }

    /// Render as an SQL literal for inline (unbound) predicate values
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) if f.is_finite() => format!("{:?}", f),
            Value::Float(_) => "NULL".to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Text(if v { "1" } else { "0" }.to_string())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Coarse type tag passed alongside each bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    Integer,
    Float,
    Text,
}

impl BindType {
    /// Pick a tag for a declared column type using SQLite affinity rules
    pub fn for_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            BindType::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            BindType::Float
        } else {
            BindType::Text
        }
    }
}

/// One positional statement parameter
#[derive(Debug, Clone, PartialEq)]
pub struct BindValue {
    pub kind: BindType,
    pub value: Value,
}

impl BindValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: BindType::Text,
            value: Value::Text(value.into()),
        }
    }
}

impl ToSql for BindValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match &self.value {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Column type chosen for a new attribute column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// Default bounded string column
    Text,
    Integer,
    Float,
    /// Caller-declared SQL type, used verbatim
    Declared(String),
}

impl ColumnType {
    /// Validate a caller-declared type name
    pub fn declare(raw: &str) -> StoreResult<Self> {
        let declared = raw.trim();
        let starts_with_letter = declared
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic());
        let allowed = declared
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ','));

        if !starts_with_letter || !allowed || declared.len() > 64 {
            return Err(StoreError::invalid(format!(
                "'{}' is not a valid column type",
                raw
            )));
        }
        Ok(ColumnType::Declared(declared.to_string()))
    }

    /// Column type implied by a value's runtime kind
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Null | Value::Text(_) => ColumnType::Text,
        }
    }

    /// SQL text used in `ADD COLUMN`
    pub fn sql(&self) -> &str {
        match self {
            ColumnType::Text => "VARCHAR(255)",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "DOUBLE",
            ColumnType::Declared(s) => s,
        }
    }

    fn bind_type(&self) -> BindType {
        match self {
            ColumnType::Text => BindType::Text,
            ColumnType::Integer => BindType::Integer,
            ColumnType::Float => BindType::Float,
            ColumnType::Declared(s) => BindType::for_declared(s),
        }
    }
}

/// A value plus an optional explicit type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub value: Value,
    pub declared: Option<ColumnType>,
}

impl TypedValue {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            declared: None,
        }
    }

    /// Resolve a bare scalar or a `{"val": .., "type": ..}` wrapper
    pub fn from_json(json: &JsonValue) -> StoreResult<Self> {
        match json {
            JsonValue::Object(map) => Self::from_wrapper(map),
            scalar => Ok(Self::new(Value::from_json(scalar)?)),
        }
    }

    /// Resolve a wrapper object; keys other than `val` and `type` are ignored
    pub(crate) fn from_wrapper(map: &Map<String, JsonValue>) -> StoreResult<Self> {
        let value = map.get(WRAPPER_VALUE_KEY).ok_or_else(|| {
            StoreError::invalid(format!("typed value is missing '{}'", WRAPPER_VALUE_KEY))
        })?;
        let declared = match map.get(WRAPPER_TYPE_KEY) {
            Some(JsonValue::String(t)) => ColumnType::declare(t)?,
            Some(other) => {
                return Err(StoreError::invalid(format!(
                    "typed value has a non-string '{}': {}",
                    WRAPPER_TYPE_KEY, other
                )));
            }
            None => {
                return Err(StoreError::invalid(format!(
                    "typed value is missing '{}'",
                    WRAPPER_TYPE_KEY
                )));
            }
        };
        Ok(Self {
            value: Value::from_json(value)?,
            declared: Some(declared),
        })
    }

    /// Declared type if present, otherwise inferred from the value
    pub fn column_type(&self) -> ColumnType {
        self.declared
            .clone()
            .unwrap_or_else(|| ColumnType::infer(&self.value))
    }

    /// Tagged parameter for statement execution
    pub fn bind(&self) -> StoreResult<BindValue> {
        let kind = match &self.declared {
            Some(declared) => declared.bind_type(),
            None => self.value.inferred_bind_type(),
        };
        Ok(BindValue {
            kind,
            value: self.value.clone().coerce(kind)?,
        })
    }
}

/// Ordered attribute map supplied to a write
///
/// Entries stay raw until [`Attributes::resolve`] runs at the start of the
/// write, so malformed entries surface as logged store failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Map<String, JsonValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bare value; an existing entry with the same name is replaced
    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    /// Add a value with an explicit column type
    pub fn with_typed(
        mut self,
        name: impl Into<String>,
        value: impl Into<JsonValue>,
        column_type: &str,
    ) -> Self {
        let mut wrapper = Map::new();
        wrapper.insert(WRAPPER_VALUE_KEY.to_string(), value.into());
        wrapper.insert(WRAPPER_TYPE_KEY.to_string(), JsonValue::from(column_type));
        self.entries.insert(name.into(), JsonValue::Object(wrapper));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve every entry, in insertion order
    pub fn resolve(&self) -> StoreResult<Vec<(String, TypedValue)>> {
        self.entries
            .iter()
            .map(|(name, raw)| {
                if name.trim().is_empty() {
                    return Err(StoreError::invalid("attribute names cannot be empty"));
                }
                if name == ID_COLUMN {
                    return Err(StoreError::invalid(
                        "'id' is assigned by the store and cannot be written",
                    ));
                }
                let typed = TypedValue::from_json(raw)
                    .map_err(|e| StoreError::invalid(format!("attribute '{}': {}", name, e)))?;
                Ok((name.clone(), typed))
            })
            .collect()
    }
}

impl From<Map<String, JsonValue>> for Attributes {
    fn from(entries: Map<String, JsonValue>) -> Self {
        Self { entries }
    }
}

impl TryFrom<JsonValue> for Attributes {
    type Error = StoreError;

    /// `null` is an empty attribute set; anything but an object is rejected
    fn try_from(json: JsonValue) -> Result<Self, Self::Error> {
        match json {
            JsonValue::Null => Ok(Self::default()),
            JsonValue::Object(entries) => Ok(Self { entries }),
            other => Err(StoreError::invalid(format!(
                "attributes must be an object, got {}",
                other
            ))),
        }
    }
}
