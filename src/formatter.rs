//! Text rendering of query results

use std::collections::HashSet;
use std::str::FromStr;

use serde_json::Value;
use tabled::{builder::Builder, settings::Style};

use crate::database::Row;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("unsupported format_type `{0}` (expected one of: json, csv, markdown)")]
    Unsupported(String),

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatType {
    #[default]
    Json,
    Csv,
    Markdown,
}

impl FromStr for FormatType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(FormatType::Json),
            "csv" => Ok(FormatType::Csv),
            "markdown" | "md" => Ok(FormatType::Markdown),
            _ => Err(FormatError::Unsupported(s.to_string())),
        }
    }
}

/// Render `rows` in the format named by `format_type`.
///
/// Unknown format names are rejected rather than silently falling back.
pub fn format_results(rows: &[Row], format_type: &str) -> Result<String, FormatError> {
    match format_type.parse()? {
        FormatType::Json => Ok(serde_json::to_string_pretty(rows)?),
        FormatType::Csv => Ok(to_csv(rows)),
        FormatType::Markdown => Ok(to_markdown(rows)),
    }
}

/// Column names across all rows, in first-seen order
fn columns(rows: &[Row]) -> Vec<&str> {
    let mut seen = HashSet::new();
    rows.iter()
        .flat_map(|row| row.keys())
        .map(String::as_str)
        .filter(|key| seen.insert(*key))
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn to_csv(rows: &[Row]) -> String {
    fn escape(field: &str) -> String {
        if field.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    let columns = columns(rows);
    if columns.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| escape(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in rows {
        let fields: Vec<String> = columns.iter().map(|c| escape(&cell(row.get(*c)))).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn to_markdown(rows: &[Row]) -> String {
    fn escape(field: &str) -> String {
        field.replace('|', "\\|").replace('\n', " ")
    }

    let columns = columns(rows);
    if columns.is_empty() {
        return "_No rows_".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| escape(c)));

    for row in rows {
        builder.push_record(columns.iter().map(|c| match row.get(*c) {
            Some(Value::Null) => "NULL".to_string(),
            value => escape(&cell(value)),
        }));
    }

    builder.build().with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    #[test]
    fn test_empty_json_is_empty_array() {
        assert_eq!(format_results(&[], "json").unwrap(), "[]");
    }

    #[test]
    fn test_json_preserves_column_order() {
        let mut r = Row::new();
        r.insert("b".to_string(), json!("x"));
        r.insert("a".to_string(), json!(1));

        let text = format_results(&[r], "json").unwrap();
        let parsed: Vec<Row> = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed.len(), 1);
        let keys: Vec<&String> = parsed[0].keys().collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(parsed[0]["a"], json!(1));
        assert_eq!(parsed[0]["b"], json!("x"));
    }

    #[test]
    fn test_json_single_row() {
        let rows = vec![row(json!({"a": 1, "b": "x"}))];
        let parsed: Value = serde_json::from_str(&format_results(&rows, "JSON").unwrap()).unwrap();
        assert_eq!(parsed, json!([{"a": 1, "b": "x"}]));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = format_results(&[], "xml").unwrap_err();
        assert!(matches!(err, FormatError::Unsupported(f) if f == "xml"));
    }

    #[test]
    fn test_csv() {
        let rows = vec![
            row(json!({"id": 1, "name": "Ada, Countess", "note": null})),
            row(json!({"id": 2, "name": "say \"hi\"", "extra": true})),
        ];
        let text = format_results(&rows, "csv").unwrap();
        assert_eq!(
            text,
            "id,name,note,extra\n\
             1,\"Ada, Countess\",,\n\
             2,\"say \"\"hi\"\"\",,true\n"
        );
    }

    #[test]
    fn test_csv_empty() {
        assert_eq!(format_results(&[], "csv").unwrap(), "");
    }

    #[test]
    fn test_markdown() {
        let rows = vec![row(json!({"table_name": "users", "comment": "a|b", "owner": null}))];
        let text = format_results(&rows, "md").unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("| table_name"));
        assert!(lines[0].contains("| comment"));
        assert!(lines[1].starts_with("|-"));
        assert!(lines[2].contains("a\\|b"));
        assert!(lines[2].contains("NULL"));
    }

    #[test]
    fn test_columns_are_unioned_in_first_seen_order() {
        let rows = vec![
            row(json!({"id": 1, "name": "a"})),
            row(json!({"name": "b", "extra": true, "id": 2})),
        ];
        assert_eq!(columns(&rows), ["id", "name", "extra"]);
    }

    #[test]
    fn test_markdown_empty() {
        assert_eq!(format_results(&[], "markdown").unwrap(), "_No rows_");
    }
}
