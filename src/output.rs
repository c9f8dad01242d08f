//! Output rendering: tables for people, JSON for scripts

use anyhow::{Context, Result};
use comfy_table::{presets, ContentArrangement, Table};
use serde_json::Value;

use crate::resource::{Action, Outcome, Record};

/// Widest cell in list tables before truncation
const MAX_LIST_CELL: usize = 40;

/// Widest value in the single-record view before truncation
const MAX_DETAIL_CELL: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json {
        omit_null: bool,
    },
}

impl OutputFormat {
    pub fn from_flags(json: bool, omit_null: bool) -> Self {
        if json {
            OutputFormat::Json { omit_null }
        } else {
            OutputFormat::Text
        }
    }
}

/// Render a command outcome for stdout
pub fn render(outcome: &Outcome, resource: &str, action: Action, format: OutputFormat) -> Result<String> {
    match (outcome, format) {
        (Outcome::Help(text), _) => Ok(text.clone()),
        (Outcome::Record(record), OutputFormat::Json { omit_null }) => {
            let mut value = Value::Object(record.clone());
            if omit_null {
                strip_nulls(&mut value);
            }
            serde_json::to_string_pretty(&value).context("Failed to serialize record")
        }
        (Outcome::Records(records), OutputFormat::Json { omit_null }) => {
            let mut value = Value::Array(records.iter().cloned().map(Value::Object).collect());
            if omit_null {
                strip_nulls(&mut value);
            }
            serde_json::to_string_pretty(&value).context("Failed to serialize records")
        }
        (Outcome::Record(record), OutputFormat::Text) => Ok(render_record(record, resource, action)),
        (Outcome::Records(records), OutputFormat::Text) => Ok(render_records(records, resource)),
    }
}

fn render_record(record: &Record, resource: &str, action: Action) -> String {
    let id = record.get("id").map(display_value).unwrap_or_default();
    match action {
        Action::Delete => return format!("Deleted {resource} {id}"),
        Action::Create => return format!("Created {resource} {id}\n{}", detail_table(record)),
        Action::Update => return format!("Updated {resource} {id}\n{}", detail_table(record)),
        Action::List | Action::Show => {}
    }
    detail_table(record)
}

fn detail_table(record: &Record) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for key in column_order(std::slice::from_ref(record)) {
        let value = record.get(&key).map(display_value).unwrap_or_default();
        table.add_row(vec![key, truncate_string(&value, MAX_DETAIL_CELL)]);
    }
    table.to_string()
}

fn render_records(records: &[Record], resource: &str) -> String {
    if records.is_empty() {
        return format!("No {resource} found");
    }

    let columns = column_order(records);
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns.iter().map(|c| c.to_uppercase()).collect::<Vec<_>>());

    for record in records {
        table.add_row(
            columns
                .iter()
                .map(|c| {
                    let value = record.get(c).map(display_value).unwrap_or_else(|| "-".into());
                    truncate_string(&value, MAX_LIST_CELL)
                })
                .collect::<Vec<_>>(),
        );
    }
    table.to_string()
}

/// `id` first, then every other key in sorted order
fn column_order(records: &[Record]) -> Vec<String> {
    let mut keys: Vec<String> = records
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| k.as_str() != "id")
        .cloned()
        .collect();
    keys.sort();
    keys.dedup();
    keys.insert(0, "id".to_string());
    keys
}

/// Drop null-valued keys from every object, at any depth
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|_, v| !v.is_null());
            fields.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Format a JSON value for a table cell
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) if arr.iter().all(|v| v.is_string() || v.is_number()) => arr
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => "[object]".to_string(),
    }
}

/// Truncate string for display (Unicode-safe)
fn truncate_string(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_len {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}
