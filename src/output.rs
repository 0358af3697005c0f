//! Output generation: SQL statements, JSON documents, and direct database
//! execution. All emitters share the same determinism contract: tables in
//! topological order, rows in primary-key order, columns ascending.

mod executor;
mod json_writer;
mod sql_writer;

pub use executor::Executor;
pub use json_writer::JsonWriter;
pub use sql_writer::SqlWriter;

use crate::extractor::TableRow;
use crate::value::PgValue;

/// Rows sorted by the textual rendering of their primary-key columns,
/// compared column by column in ordinal order.
pub(crate) fn rows_sorted_by_pk(rows: &[TableRow], pk_columns: &[String]) -> Vec<TableRow> {
    let mut sorted: Vec<TableRow> = rows.to_vec();
    sorted.sort_by_cached_key(|row| {
        pk_columns
            .iter()
            .map(|pk| row.get(pk).map(PgValue::render_key).unwrap_or_default())
            .collect::<Vec<String>>()
    });
    sorted
}
