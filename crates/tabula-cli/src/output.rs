//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use anyhow::Result;
use serde_json::{json, Value as JsonValue};

use tabula_core::{Found, LogEntry, Severity};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print whatever a read returned
    pub fn print_found(&self, found: Option<&Found>) -> Result<()> {
        let Some(found) = found else {
            match self.format {
                OutputFormat::Human => println!("No documents found."),
                OutputFormat::Json => println!("null"),
                OutputFormat::Quiet => {}
            }
            return Ok(());
        };

        match self.format {
            OutputFormat::Human => print_human(found),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&found.to_json())?);
            }
            OutputFormat::Quiet => {
                for line in quiet_lines(found) {
                    println!("{}", line);
                }
            }
        }
        Ok(())
    }

    /// Print a generated or written document id
    pub fn print_id(&self, table: &str, id: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}/{}", table, id),
            OutputFormat::Json => println!("{}", json!({"table": table, "id": id})),
            OutputFormat::Quiet => println!("{}", id),
        }
    }

    /// Print log entries to stderr, most recent first
    pub fn print_log<'a>(&self, entries: impl Iterator<Item = &'a LogEntry>) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<JsonValue> = entries
                    .map(|entry| {
                        json!({
                            "severity": severity_label(entry.severity),
                            "kind": entry.kind.map(|k| format!("{:?}", k)),
                            "message": entry.message,
                            "trace": entry.trace,
                            "at": entry.at.to_rfc3339(),
                        })
                    })
                    .collect();
                eprintln!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Human | OutputFormat::Quiet => {
                for entry in entries {
                    eprintln!("{}: {}", severity_label(entry.severity), entry.message);
                    if !entry.trace.is_empty() {
                        eprintln!("    in {}", entry.trace_line());
                    }
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

/// Render a scalar without JSON string quotes
fn scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "(null)".to_string(),
        other => other.to_string(),
    }
}

fn print_document(row: &serde_json::Map<String, JsonValue>) {
    let width = row.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in row {
        println!("{:width$}  {}", key, scalar(value), width = width);
    }
}

fn print_human(found: &Found) {
    match found {
        Found::Ids(ids) => {
            for id in ids {
                println!("{}", id);
            }
            println!("\n{} document(s)", ids.len());
        }
        Found::Scalar(value) => println!("{}", scalar(value)),
        Found::Document(row) => print_document(row),
        Found::Documents(rows) => {
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    println!("────────────────────────────────────────");
                }
                print_document(row);
            }
            println!("\n{} document(s)", rows.len());
        }
        Found::Table(documents) => {
            for (i, document) in documents.values().enumerate() {
                if i > 0 {
                    println!("────────────────────────────────────────");
                }
                if let JsonValue::Object(row) = document {
                    print_document(row);
                }
            }
            println!("\n{} document(s)", documents.len());
        }
    }
}

/// One line per document id, or the bare value for a scalar
fn quiet_lines(found: &Found) -> Vec<String> {
    let id_of = |row: &serde_json::Map<String, JsonValue>| {
        row.get("id").map(scalar).unwrap_or_default()
    };
    match found {
        Found::Ids(ids) => ids.clone(),
        Found::Scalar(value) => vec![scalar(value)],
        Found::Document(row) => vec![id_of(row)],
        Found::Documents(rows) => rows.iter().map(id_of).collect(),
        Found::Table(documents) => documents.keys().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: JsonValue) -> serde_json::Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(scalar(&json!("Joe")), "Joe");
        assert_eq!(scalar(&json!(26)), "26");
        assert_eq!(scalar(&JsonValue::Null), "(null)");
    }

    #[test]
    fn test_quiet_lines() {
        let found = Found::Documents(vec![
            row(json!({"id": "u1", "name": "Joe"})),
            row(json!({"id": "u2", "name": "Ann"})),
        ]);
        assert_eq!(quiet_lines(&found), vec!["u1", "u2"]);

        let found = Found::Scalar(json!("Joe"));
        assert_eq!(quiet_lines(&found), vec!["Joe"]);

        let mut table = serde_json::Map::new();
        table.insert("u9".to_string(), json!({"id": "u9"}));
        assert_eq!(quiet_lines(&Found::Table(table)), vec!["u9"]);
    }
}
