//! JSON document generation.

use std::io::Write;

use super::rows_sorted_by_pk;
use crate::error::{Error, Result};
use crate::extractor::TraversalState;
use crate::graph::Graph;

/// Writes extracted data as a single JSON object mapping each table, in
/// topological order, to its rows sorted by primary key.
pub struct JsonWriter<'a, W: Write> {
    writer: W,
    graph: &'a Graph,
}

impl<'a, W: Write> JsonWriter<'a, W> {
    pub fn new(writer: W, graph: &'a Graph) -> Self {
        Self { writer, graph }
    }

    pub fn write(&mut self, state: &TraversalState) -> Result<()> {
        let tables = state.tables();
        let sorted_tables = self.graph.topological_sort(&tables)?;

        let mut document = serde_json::Map::new();

        for table in &sorted_tables {
            let rows = state.data.get(table).map(Vec::as_slice).unwrap_or(&[]);
            if rows.is_empty() {
                document.insert(table.clone(), serde_json::Value::Array(Vec::new()));
                continue;
            }

            let pk_columns = self.graph.primary_key_columns(table).to_vec();
            let sorted_rows = rows_sorted_by_pk(rows, &pk_columns);

            let mut encoded = Vec::with_capacity(sorted_rows.len());
            for row in &sorted_rows {
                let mut object = serde_json::Map::new();
                for (column, value) in row {
                    object.insert(column.clone(), value.to_json()?);
                }
                encoded.push(serde_json::Value::Object(object));
            }

            document.insert(table.clone(), serde_json::Value::Array(encoded));
        }

        serde_json::to_writer_pretty(&mut self.writer, &serde_json::Value::Object(document))
            .map_err(|e| Error::Emit(format!("failed to encode JSON: {e}")))?;
        writeln!(self.writer)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ForeignKey, Metadata};
    use crate::extractor::TableRow;
    use crate::value::PgValue;

    #[test]
    fn test_write_topological_key_order_and_pk_sorted_rows() {
        let mut metadata = Metadata::default();
        metadata.insert_foreign_key(ForeignKey {
            child_table: "users".to_string(),
            child_column: "org_id".to_string(),
            parent_table: "organizations".to_string(),
            parent_column: "id".to_string(),
        });
        metadata
            .primary_key
            .insert("organizations".to_string(), vec!["id".to_string()]);
        metadata
            .primary_key
            .insert("users".to_string(), vec!["id".to_string()]);
        let graph = crate::graph::Graph::build(metadata).unwrap();

        let mut state = TraversalState::default();
        let user = |id: i64| -> TableRow {
            [
                ("id".to_string(), PgValue::Int(id)),
                ("org_id".to_string(), PgValue::Int(1)),
            ]
            .into_iter()
            .collect()
        };
        state.data.insert("users".to_string(), vec![user(2), user(1)]);
        state.data.insert(
            "organizations".to_string(),
            vec![[("id".to_string(), PgValue::Int(1))].into_iter().collect()],
        );
        state.row_count = 3;

        let mut out = Vec::new();
        JsonWriter::new(&mut out, &graph).write(&state).unwrap();
        let text = String::from_utf8(out).unwrap();

        // Topological order is preserved in the document key order.
        assert!(text.find("\"organizations\"").unwrap() < text.find("\"users\"").unwrap());
        assert!(text.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let users = parsed["users"].as_array().unwrap();
        assert_eq!(users[0]["id"], serde_json::json!(1));
        assert_eq!(users[1]["id"], serde_json::json!(2));
    }
}
