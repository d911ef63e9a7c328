// SPDX-License-Identifier: PMPL-1.0-or-later
//! Rendering of command results.
//!
//! Record lists become a table with one column per field seen in any
//! record; single records become a `field | value` table. JSON output is
//! the gateway's own representation, pretty-printed.

use std::fmt;

use comfy_table::{Cell, ContentArrangement, Table};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown format '{other}', expected table or json")),
        }
    }
}

pub fn render(value: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        OutputFormat::Table => match value {
            Value::Array(rows) => records_table(rows),
            Value::Object(record) => record_table(record),
            Value::Null => "(not found)".to_string(),
            other => other.to_string(),
        },
    }
}

/// Columns in first-seen order, gateway fields first.
fn columns(rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in rows.iter().filter_map(Value::as_object) {
        for field in record.keys() {
            if !columns.contains(field) {
                columns.push(field.clone());
            }
        }
    }
    columns.sort_by_key(|c| !c.starts_with('_'));
    columns
}

fn records_table(rows: &[Value]) -> String {
    if rows.is_empty() {
        return "(0 records)".to_string();
    }
    let columns = columns(rows);
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(columns.iter().map(Cell::new));

    for row in rows {
        table.add_row(
            columns
                .iter()
                .map(|c| Cell::new(cell(row.get(c).unwrap_or(&Value::Null)))),
        );
    }
    let n = rows.len();
    format!("{table}\n({n} record{})", if n == 1 { "" } else { "s" })
}

fn record_table(record: &Map<String, Value>) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("field"), Cell::new("value")]);
    for (field, value) in record {
        table.add_row(vec![Cell::new(field), Cell::new(cell(value))]);
    }
    table.to_string()
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.len() > 3 => format!("[{} items]", items.len()),
        Value::Object(fields) if fields.len() > 3 => format!("{{{} fields}}", fields.len()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("csv".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_records_table() {
        let out = render(
            &json!([{"title": "a", "_id": "1"}, {"_id": "2", "extra": [1, 2, 3, 4]}]),
            OutputFormat::Table,
        );
        assert!(out.contains("(2 records)"));
        assert!(out.contains("[4 items]"));
        assert!(out.find("_id").unwrap() < out.find("title").unwrap());
    }

    #[test]
    fn test_single_record_and_missing() {
        let out = render(&json!({"_id": "x", "n": 1}), OutputFormat::Table);
        assert!(out.contains("field"));
        assert!(out.contains("x"));
        assert_eq!(render(&Value::Null, OutputFormat::Table), "(not found)");
        assert_eq!(render(&json!([]), OutputFormat::Table), "(0 records)");
    }

    #[test]
    fn test_json_is_pretty() {
        let out = render(&json!({"n": 1}), OutputFormat::Json);
        assert!(out.contains("\"n\": 1"));
    }
}
