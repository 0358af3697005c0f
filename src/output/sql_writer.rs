//! INSERT statement generation.

use std::io::Write;

use chrono::{SecondsFormat, Utc};

use super::rows_sorted_by_pk;
use crate::error::Result;
use crate::extractor::{TableRow, TraversalState};
use crate::graph::Graph;
use crate::value::PgValue;

/// Writes extracted data as a deterministic sequence of INSERT statements.
///
/// Apart from the generation timestamp in the header, output is byte-stable
/// for a given database state, query, and options.
pub struct SqlWriter<'a, W: Write> {
    writer: W,
    graph: &'a Graph,
}

impl<'a, W: Write> SqlWriter<'a, W> {
    pub fn new(writer: W, graph: &'a Graph) -> Self {
        Self { writer, graph }
    }

    pub fn write(&mut self, state: &TraversalState) -> Result<()> {
        let tables = state.tables();
        let sorted_tables = self.graph.topological_sort(&tables)?;

        writeln!(self.writer, "-- pg-rocket data export")?;
        writeln!(
            self.writer,
            "-- Generated at: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
        )?;
        writeln!(self.writer, "-- Total tables: {}", sorted_tables.len())?;
        writeln!(self.writer)?;

        for table in &sorted_tables {
            let rows = state.data.get(table).map(Vec::as_slice).unwrap_or(&[]);
            if rows.is_empty() {
                continue;
            }
            self.write_table(table, rows)?;
        }

        Ok(())
    }

    fn write_table(&mut self, table: &str, rows: &[TableRow]) -> Result<()> {
        let pk_columns = self.graph.primary_key_columns(table).to_vec();
        let rows = rows_sorted_by_pk(rows, &pk_columns);

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();

        writeln!(self.writer, "-- Table: {table} ({} rows)", rows.len())?;
        writeln!(
            self.writer,
            "INSERT INTO {table} ({}) VALUES",
            columns.join(", ")
        )?;

        for (i, row) in rows.iter().enumerate() {
            let values: Vec<String> = columns
                .iter()
                .map(|column| format_value(row.get(column).unwrap_or(&PgValue::Null)))
                .collect();

            let terminator = if i + 1 < rows.len() { "," } else { ";" };
            writeln!(self.writer, "  ({}){terminator}", values.join(", "))?;
        }

        writeln!(self.writer)?;
        Ok(())
    }
}

/// Render one value as a SQL literal.
pub(crate) fn format_value(value: &PgValue) -> String {
    match value {
        PgValue::Null => "NULL".to_string(),
        PgValue::Bool(b) => b.to_string(),
        PgValue::Int(i) => i.to_string(),
        PgValue::Float(f) => f.to_string(),
        PgValue::Text(s) => quote_string(s),
        PgValue::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("'\\x{hex}'")
        }
        PgValue::Timestamp(ts) => {
            format!("'{}'", ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
        }
        PgValue::Json(json) => format_json(json),
        // Remaining kinds render textually and are quoted; PostgreSQL casts
        // the literal back to the column type on insert.
        PgValue::Decimal(d) => quote_textual(&d.to_string()),
        PgValue::Date(d) => quote_textual(&d.to_string()),
        PgValue::Time(t) => quote_textual(&t.to_string()),
        PgValue::Uuid(u) => quote_textual(&u.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    let escaped = s.replace('\'', "''").replace('\\', "\\\\");
    format!("'{escaped}'")
}

fn quote_textual(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn format_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(_) => {
            format!("'{}'::jsonb", render_json(value))
        }
        serde_json::Value::Array(items) => format_sql_array(items),
        // Scalar JSON documents (including the JSON null literal) keep their
        // compact serialization and re-enter as jsonb.
        other => format!("'{}'::jsonb", render_json(other).replace('\'', "''")),
    }
}

/// Deterministic JSON serialization: object keys ascending, recursive for
/// nested containers.
fn render_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => {
            let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render_json).collect();
            format!("[{}]", parts.join(","))
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    let key = k.replace('\\', "\\\\").replace('"', "\\\"");
                    format!("\"{key}\":{}", render_json(&map[k]))
                })
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

/// JSON arrays surface as PostgreSQL `ARRAY[...]` literals, rendering each
/// element as a SQL value.
fn format_sql_array(items: &[serde_json::Value]) -> String {
    if items.is_empty() {
        return "ARRAY[]".to_string();
    }

    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => quote_string(s),
            serde_json::Value::Object(_) => format_json(item),
            serde_json::Value::Array(inner) => format_sql_array(inner),
        })
        .collect();

    format!("ARRAY[{}]", elements.join(", "))
}
