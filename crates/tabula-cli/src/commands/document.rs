//! Document command handlers

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value as JsonValue};

use tabula_core::value::{WRAPPER_TYPE_KEY, WRAPPER_VALUE_KEY};
use tabula_core::{Attributes, Store};

use crate::output::Output;

/// Create or update a document
pub fn set(
    store: &mut Store,
    table: &str,
    id: &str,
    attrs: &[String],
    data: Option<&str>,
    output: &Output,
) -> Result<()> {
    let attributes = parse_attributes(attrs, data)?;
    if let Err(e) = store.try_set(table, id, &attributes) {
        output.print_log(store.errors())?;
        bail!("Failed to write {}/{}: {}", table, id, e);
    }
    report_warnings(store, output)?;
    output.print_id(table.trim(), id.trim());
    Ok(())
}

/// Insert a document under a generated id
pub fn push(
    store: &mut Store,
    table: &str,
    attrs: &[String],
    data: Option<&str>,
    id_length: Option<usize>,
    output: &Output,
) -> Result<()> {
    let attributes = parse_attributes(attrs, data)?;
    let result = match id_length {
        Some(length) => store.try_push_with_length(table, &attributes, length),
        None => store.try_push(table, &attributes),
    };
    match result {
        Ok(id) => {
            report_warnings(store, output)?;
            output.print_id(table.trim(), &id);
            Ok(())
        }
        Err(e) => {
            output.print_log(store.errors())?;
            bail!("Failed to insert into {}: {}", table, e);
        }
    }
}

/// Read documents
pub fn get(
    store: &mut Store,
    table: &str,
    id: Option<&str>,
    all: bool,
    filter: Option<&str>,
    columns: &[String],
    output: &Output,
) -> Result<()> {
    let child = match (id, filter) {
        (Some(id), _) => JsonValue::from(id),
        (None, Some(filter)) => {
            serde_json::from_str::<JsonValue>(filter).context("--where is not valid JSON")?
        }
        (None, None) => JsonValue::Bool(all),
    };
    let columns = JsonValue::from(columns.to_vec());

    match store.try_get_json(table, &child, &columns) {
        Ok(found) => {
            report_warnings(store, output)?;
            output.print_found(found.as_ref())
        }
        Err(e) => {
            output.print_log(store.errors())?;
            bail!("Failed to read {}: {}", table, e);
        }
    }
}

/// Build attributes from `--data` JSON then `-a` pairs, later wins
fn parse_attributes(attrs: &[String], data: Option<&str>) -> Result<Attributes> {
    let mut entries = match data {
        Some(data) => match serde_json::from_str::<JsonValue>(data).context("--data is not valid JSON")? {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => bail!("--data must be a JSON object, got {}", other),
        },
        None => Map::new(),
    };

    for pair in attrs {
        let (name, value) = parse_pair(pair)?;
        entries.insert(name, value);
    }
    Ok(Attributes::from(entries))
}

/// Parse `key=value` or `key:type=value`
fn parse_pair(pair: &str) -> Result<(String, JsonValue)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("Attribute '{}' must look like key=value or key:type=value", pair);
    };

    match key.split_once(':') {
        Some((name, column_type)) => {
            let mut wrapper = Map::new();
            wrapper.insert(WRAPPER_VALUE_KEY.to_string(), JsonValue::from(raw));
            wrapper.insert(WRAPPER_TYPE_KEY.to_string(), JsonValue::from(column_type));
            Ok((name.to_string(), JsonValue::Object(wrapper)))
        }
        None => Ok((key.to_string(), infer_value(raw))),
    }
}

/// Integer, float, boolean or null when the text reads as one; else string
fn infer_value(raw: &str) -> JsonValue {
    match raw {
        "null" => return JsonValue::Null,
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return JsonValue::from(i);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => JsonValue::from(f),
        _ => JsonValue::from(raw),
    }
}

/// Print warnings the last call left in the log
fn report_warnings(store: &Store, output: &Output) -> Result<()> {
    if store.error_count() > 0 {
        output.print_log(store.errors())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula_core::{Config, Found};

    #[test]
    fn test_infer_value() {
        assert_eq!(infer_value("26"), json!(26));
        assert_eq!(infer_value("0.5"), json!(0.5));
        assert_eq!(infer_value("true"), json!(true));
        assert_eq!(infer_value("null"), JsonValue::Null);
        assert_eq!(infer_value("Joe"), json!("Joe"));
        assert_eq!(infer_value("inf"), json!("inf"));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("name=Joe").unwrap(), ("name".to_string(), json!("Joe")));
        assert_eq!(
            parse_pair("age:integer=26").unwrap(),
            ("age".to_string(), json!({"val": "26", "type": "integer"}))
        );
        assert_eq!(
            parse_pair("expr=a=b").unwrap(),
            ("expr".to_string(), json!("a=b"))
        );
        assert!(parse_pair("no-equals").is_err());
    }

    #[test]
    fn test_parse_attributes_pairs_override_data() {
        let attrs = parse_attributes(
            &["age=27".to_string()],
            Some(r#"{"name": "Joe", "age": 26}"#),
        )
        .unwrap();
        assert_eq!(
            attrs,
            Attributes::from(json!({"name": "Joe", "age": 27}).as_object().cloned().unwrap())
        );

        assert!(parse_attributes(&[], Some("[1, 2]")).is_err());
        assert!(parse_attributes(&[], Some("{")).is_err());
    }

    #[test]
    fn test_commands_against_memory_store() {
        let output = Output::new(crate::output::OutputFormat::Quiet);
        let mut store = Store::open(Config::in_memory());

        set(
            &mut store,
            "users",
            "u1",
            &["name=Joe".to_string(), "age:integer=26".to_string()],
            None,
            &output,
        )
        .unwrap();
        push(&mut store, "users", &["name=Ann".to_string()], None, Some(6), &output).unwrap();

        assert_eq!(
            store.get("users", "u1", &["age"]),
            Some(Found::Scalar(json!(26)))
        );
        get(&mut store, "users", None, true, None, &[], &output).unwrap();
        get(
            &mut store,
            "users",
            None,
            false,
            Some(r#"{"name": "Ann"}"#),
            &["name".to_string()],
            &output,
        )
        .unwrap();

        assert!(get(&mut store, "missing", None, false, None, &[], &output).is_err());
        assert!(set(&mut store, "users", "u1", &["id=x".to_string()], None, &output).is_err());
        assert_eq!(store.error_count(), 2);
    }
}
