//! Read-filter DSL
//!
//! A [`Filter`] is an ordered list of [`Predicate`]s folded left to right
//! into a condition string plus a parallel bind list. Each predicate carries
//! the joiner placed between it and the next one; the last joiner is never
//! emitted.
//!
//! ## JSON form
//!
//! ```text
//! {
//!   "where": "WHERE",                                // optional keyword override
//!   "name": "Joe",                                   // name = ?
//!   "age": {"cond": "BETWEEN ? AND ?", "val": [20, 30], "next": "OR"},
//!   "nick": {"cond": "IS NULL"},
//!   "score": {"val": "7", "type": "integer"}         // typed equality
//! }
//! ```
//!
//! An array of single-key objects may be used instead of one object when the
//! same attribute appears more than once.

use serde_json::{Map, Value as JsonValue};

use crate::storage::backend::Quoter;
use crate::storage::error::{StoreError, StoreResult};
use crate::value::{BindValue, ColumnType, TypedValue, Value};

/// Joiner used when a predicate does not name one
pub const DEFAULT_JOIN: &str = "AND";

/// Keyword placed before the folded predicates
pub const DEFAULT_WHERE: &str = "WHERE";

/// Pseudo-key that overrides the `WHERE` keyword
pub const WHERE_KEY: &str = "where";

const COND_KEY: &str = "cond";
const VAL_KEY: &str = "val";
const TYPE_KEY: &str = "type";
const BIND_KEY: &str = "bind";
const NEXT_KEY: &str = "next";

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateKind {
    /// `attribute = ?`, or `attribute IS NULL` for a null value
    Simple { attribute: String, value: TypedValue },
    /// `attribute <fragment>` with one value per `?` in the fragment
    Conditioned {
        attribute: String,
        fragment: String,
        values: Vec<TypedValue>,
        /// Inline values as literals instead of binding them
        inline: bool,
    },
}

/// One clause of a filter
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub kind: PredicateKind,
    /// Joiner to the next predicate; empty means a bare space
    pub join: String,
}

impl Predicate {
    /// Equality on an attribute
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: PredicateKind::Simple {
                attribute: attribute.into(),
                value: TypedValue::new(value.into()),
            },
            join: DEFAULT_JOIN.to_string(),
        }
    }

    /// Free-form condition fragment, e.g. `"> ?"` or `"LIKE ?"`
    pub fn condition(attribute: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            kind: PredicateKind::Conditioned {
                attribute: attribute.into(),
                fragment: fragment.into(),
                values: Vec::new(),
                inline: false,
            },
            join: DEFAULT_JOIN.to_string(),
        }
    }

    /// Add an expected value (replaces the value of a simple predicate)
    pub fn value(self, value: impl Into<Value>) -> Self {
        self.typed_value(TypedValue::new(value.into()))
    }

    /// Add an expected value with an explicit type
    pub fn typed_value(mut self, typed: TypedValue) -> Self {
        match &mut self.kind {
            PredicateKind::Simple { value, .. } => *value = typed,
            PredicateKind::Conditioned { values, .. } => values.push(typed),
        }
        self
    }

    /// Inline the expected values instead of binding them
    pub fn inline(mut self) -> Self {
        if let PredicateKind::Conditioned { inline, .. } = &mut self.kind {
            *inline = true;
        }
        self
    }

    /// Joiner placed between this predicate and the next
    pub fn join(mut self, operator: impl Into<String>) -> Self {
        self.join = operator.into();
        self
    }

    pub fn attribute(&self) -> &str {
        match &self.kind {
            PredicateKind::Simple { attribute, .. } => attribute,
            PredicateKind::Conditioned { attribute, .. } => attribute,
        }
    }

    /// Render this clause, appending its bound values
    fn render<Q: Quoter + ?Sized>(&self, quoter: &Q, binds: &mut Vec<BindValue>) -> StoreResult<String> {
        let attribute = quoter.quote_identifier(self.attribute());
        match &self.kind {
            PredicateKind::Simple { value, .. } => {
                if value.value == Value::Null {
                    return Ok(format!("{} IS NULL", attribute));
                }
                binds.push(value.bind()?);
                Ok(format!("{} = ?", attribute))
            }
            PredicateKind::Conditioned {
                fragment,
                values,
                inline,
                ..
            } => {
                let fragment = fragment.trim();
                if fragment.is_empty() {
                    return Err(StoreError::invalid(format!(
                        "condition on '{}' has an empty fragment",
                        self.attribute()
                    )));
                }

                let placeholders = placeholder_positions(fragment);
                if placeholders.len() != values.len() {
                    return Err(StoreError::invalid(format!(
                        "condition '{}' on '{}' has {} placeholder(s) but {} value(s)",
                        fragment,
                        self.attribute(),
                        placeholders.len(),
                        values.len()
                    )));
                }

                let bound = values
                    .iter()
                    .map(TypedValue::bind)
                    .collect::<StoreResult<Vec<_>>>()?;

                if *inline {
                    let mut text = String::with_capacity(fragment.len());
                    let mut last = 0;
                    for (pos, bind) in placeholders.iter().zip(&bound) {
                        text.push_str(&fragment[last..*pos]);
                        text.push_str(&bind.value.to_sql_literal());
                        last = pos + 1;
                    }
                    text.push_str(&fragment[last..]);
                    Ok(format!("{} {}", attribute, text))
                } else {
                    binds.extend(bound);
                    Ok(format!("{} {}", attribute, fragment))
                }
            }
        }
    }
}

/// Byte offsets of `?` placeholders outside quoted literals and identifiers
fn placeholder_positions(fragment: &str) -> Vec<usize> {
    let mut quote: Option<char> = None;
    fragment
        .char_indices()
        .filter_map(|(i, c)| match (quote, c) {
            (None, '\'' | '"') => {
                quote = Some(c);
                None
            }
            (Some(open), _) if c == open => {
                quote = None;
                None
            }
            (None, '?') => Some(i),
            _ => None,
        })
        .collect()
}

/// Ordered predicates plus the keyword that introduces them
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
    pub where_keyword: String,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            where_keyword: DEFAULT_WHERE.to_string(),
        }
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Replace the `WHERE` keyword; an empty keyword emits none
    pub fn where_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.where_keyword = keyword.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Fold the predicates into condition text and its bind list
    pub fn render<Q: Quoter + ?Sized>(&self, quoter: &Q) -> StoreResult<(String, Vec<BindValue>)> {
        let mut sql = String::new();
        let mut binds = Vec::new();
        let count = self.predicates.len();

        for (i, predicate) in self.predicates.iter().enumerate() {
            sql.push_str(&predicate.render(quoter, &mut binds)?);
            if i + 1 < count {
                let join = predicate.join.trim();
                sql.push(' ');
                if !join.is_empty() {
                    sql.push_str(join);
                    sql.push(' ');
                }
            }
        }

        Ok((sql, binds))
    }

    /// Parse the JSON filter form
    pub fn from_json(json: &JsonValue) -> StoreResult<Self> {
        let mut filter = Filter::new();
        match json {
            JsonValue::Object(map) => {
                for (key, value) in map {
                    filter.push_json(key, value)?;
                }
            }
            JsonValue::Array(items) => {
                for item in items {
                    let JsonValue::Object(map) = item else {
                        return Err(StoreError::invalid(format!(
                            "filter entries must be objects, got {}",
                            item
                        )));
                    };
                    for (key, value) in map {
                        filter.push_json(key, value)?;
                    }
                }
            }
            other => {
                return Err(StoreError::invalid(format!(
                    "filter must be an object or array, got {}",
                    other
                )));
            }
        }
        Ok(filter)
    }

    fn push_json(&mut self, key: &str, value: &JsonValue) -> StoreResult<()> {
        if key == WHERE_KEY {
            let JsonValue::String(keyword) = value else {
                return Err(StoreError::invalid("'where' must be a string"));
            };
            self.where_keyword = keyword.trim().to_string();
            return Ok(());
        }
        if key.trim().is_empty() {
            return Err(StoreError::invalid("filter attribute names cannot be empty"));
        }
        self.predicates.push(predicate_from_json(key, value)?);
        Ok(())
    }
}

fn predicate_from_json(attribute: &str, json: &JsonValue) -> StoreResult<Predicate> {
    let JsonValue::Object(options) = json else {
        let value = TypedValue::from_json(json)?;
        return Ok(Predicate::eq(attribute, Value::Null).typed_value(value));
    };

    if let Some(key) = options
        .keys()
        .find(|k| ![COND_KEY, VAL_KEY, TYPE_KEY, BIND_KEY, NEXT_KEY].contains(&k.as_str()))
    {
        return Err(StoreError::invalid(format!(
            "unknown key '{}' in filter on '{}'",
            key, attribute
        )));
    }

    let join = match options.get(NEXT_KEY) {
        None => DEFAULT_JOIN.to_string(),
        Some(JsonValue::String(join)) => join.clone(),
        Some(other) => {
            return Err(StoreError::invalid(format!("'next' must be a string, got {}", other)));
        }
    };

    let predicate = match options.get(COND_KEY) {
        Some(cond) => conditioned_from_json(attribute, cond, options)?,
        None if options.contains_key(TYPE_KEY) => {
            Predicate::eq(attribute, Value::Null).typed_value(TypedValue::from_wrapper(options)?)
        }
        None => {
            let value = options.get(VAL_KEY).ok_or_else(|| {
                StoreError::invalid(format!("filter on '{}' needs 'cond' or 'val'", attribute))
            })?;
            Predicate::eq(attribute, Value::Null).typed_value(TypedValue::from_json(value)?)
        }
    };

    Ok(predicate.join(join))
}

fn conditioned_from_json(
    attribute: &str,
    cond: &JsonValue,
    options: &Map<String, JsonValue>,
) -> StoreResult<Predicate> {
    let JsonValue::String(fragment) = cond else {
        return Err(StoreError::invalid(format!("'cond' must be a string, got {}", cond)));
    };

    let shared_type = match options.get(TYPE_KEY) {
        None => None,
        Some(JsonValue::String(t)) => Some(ColumnType::declare(t)?),
        Some(other) => {
            return Err(StoreError::invalid(format!("'type' must be a string, got {}", other)));
        }
    };

    let raw_values: Vec<&JsonValue> = match options.get(VAL_KEY) {
        None => Vec::new(),
        Some(JsonValue::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    };

    let mut predicate = Predicate::condition(attribute, fragment.clone());
    for raw in raw_values {
        let mut typed = TypedValue::from_json(raw)?;
        if typed.declared.is_none() {
            typed.declared = shared_type.clone();
        }
        predicate = predicate.typed_value(typed);
    }

    match options.get(BIND_KEY) {
        None | Some(JsonValue::Bool(true)) => Ok(predicate),
        Some(JsonValue::Bool(false)) => Ok(predicate.inline()),
        Some(other) => Err(StoreError::invalid(format!("'bind' must be a boolean, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::AnsiQuoter;
    use crate::storage::error::ErrorKind;
    use crate::value::BindType;
    use serde_json::json;

    fn render(filter: &Filter) -> (String, Vec<BindValue>) {
        filter.render(&AnsiQuoter).unwrap()
    }

    #[test]
    fn test_single_predicate_has_no_trailing_joiner() {
        let (sql, binds) = render(&Filter::new().with(Predicate::eq("name", "Joe")));
        assert_eq!(sql, "\"name\" = ?");
        assert_eq!(binds, vec![BindValue::text("Joe")]);
    }

    #[test]
    fn test_default_and_between_predicates() {
        let filter = Filter::new()
            .with(Predicate::eq("name", "Joe"))
            .with(Predicate::condition("age", "> ?").value(20));

        let (sql, binds) = render(&filter);
        assert_eq!(sql, "\"name\" = ? AND \"age\" > ?");
        assert_eq!(binds.len(), 2);
        assert_eq!(binds[1].kind, BindType::Integer);
        assert_eq!(binds[1].value, Value::Integer(20));
    }

    #[test]
    fn test_custom_and_empty_joiners() {
        let filter = Filter::new()
            .with(Predicate::eq("a", 1).join("OR"))
            .with(Predicate::eq("b", 2).join(""))
            .with(Predicate::condition("c", "IS NOT NULL").join("OR"));

        let (sql, _) = render(&filter);
        assert_eq!(sql, "\"a\" = ? OR \"b\" = ? \"c\" IS NOT NULL");
    }

    #[test]
    fn test_null_equality_is_not_bound() {
        let (sql, binds) = render(&Filter::new().with(Predicate::eq("nick", Value::Null)));
        assert_eq!(sql, "\"nick\" IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_inline_values_become_literals() {
        let filter = Filter::new().with(
            Predicate::condition("name", "IN (?, ?)")
                .value("O'Brien")
                .value("Smith")
                .inline(),
        );

        let (sql, binds) = render(&filter);
        assert_eq!(sql, "\"name\" IN ('O''Brien', 'Smith')");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_placeholders_inside_literals_are_ignored() {
        assert_eq!(placeholder_positions("= '?' OR x = ?"), vec![13]);
        assert!(placeholder_positions("LIKE 'a?c'").is_empty());
        assert_eq!(placeholder_positions("= \"odd?col\" + ?"), vec![14]);
        assert_eq!(placeholder_positions("= '\"' OR x = ?"), vec![13]);
    }

    #[test]
    fn test_quoted_identifier_question_mark_is_not_bound() {
        let filter = Filter::new().with(
            Predicate::condition("score", "> \"min?\" + ?")
                .value(5)
                .inline(),
        );
        let (sql, binds) = render(&filter);
        assert_eq!(sql, "\"score\" > \"min?\" + 5");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_placeholder_mismatch_is_invalid() {
        let filter = Filter::new().with(Predicate::condition("age", "BETWEEN ? AND ?").value(1));
        let err = filter.render(&AnsiQuoter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_from_json_object() {
        let filter = Filter::from_json(&json!({
            "where": "WHERE NOT",
            "name": "Joe",
            "age": {"cond": "BETWEEN ? AND ?", "val": [20, 30], "next": "OR"},
            "score": {"val": "7", "type": "integer"}
        }))
        .unwrap();

        assert_eq!(filter.where_keyword, "WHERE NOT");
        assert_eq!(filter.predicates.len(), 3);

        let (sql, binds) = render(&filter);
        assert_eq!(
            sql,
            "\"name\" = ? AND \"age\" BETWEEN ? AND ? OR \"score\" = ?"
        );
        assert_eq!(binds.len(), 4);
        assert_eq!(binds[3].value, Value::Integer(7));
    }

    #[test]
    fn test_from_json_array_repeats_attribute() {
        let filter = Filter::from_json(&json!([
            {"age": {"cond": ">= ?", "val": 18}},
            {"age": {"cond": "< ?", "val": "65", "type": "integer", "bind": false}}
        ]))
        .unwrap();

        let (sql, binds) = render(&filter);
        assert_eq!(sql, "\"age\" >= ? AND \"age\" < 65");
        assert_eq!(binds.len(), 1);
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        for bad in [
            json!("name = 'Joe'"),
            json!({"where": 1}),
            json!({"age": {"cond": 5}}),
            json!({"age": {"cond": "> ?", "bind": "no"}}),
            json!({"age": {"op": "> ?"}}),
            json!({"age": {"next": "OR"}}),
            json!([1]),
        ] {
            let err = Filter::from_json(&bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "input: {}", bad);
        }
    }
}
