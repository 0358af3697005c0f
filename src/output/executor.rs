//! Direct insertion into a target database.

use std::collections::BTreeMap;

use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::rows_sorted_by_pk;
use crate::db::{cancellable, Connection};
use crate::error::{Error, Result};
use crate::extractor::{TableRow, TraversalState};
use crate::graph::Graph;
use crate::value::PgValue;

const SQL_NULL: PgValue = PgValue::Null;

/// Inserts an extracted snapshot into a target database inside a single
/// transaction: parents before children, optional upsert on primary-key
/// conflicts, full rollback on any failure.
pub struct Executor<'a> {
    connection: Connection,
    graph: &'a Graph,
    upsert_mode: bool,
}

impl<'a> Executor<'a> {
    /// Takes ownership of the dedicated target connection.
    pub fn new(connection: Connection, graph: &'a Graph, upsert_mode: bool) -> Self {
        Self {
            connection,
            graph,
            upsert_mode,
        }
    }

    /// Validate the snapshot's referential structure, then insert every
    /// table in topological order and commit. The transaction rolls back
    /// when any step fails.
    pub async fn execute(
        &mut self,
        cancel: &CancellationToken,
        state: &TraversalState,
    ) -> Result<()> {
        let graph = self.graph;
        let upsert_mode = self.upsert_mode;

        validate_foreign_keys(graph, state)?;

        let tables = state.tables();
        let sorted_tables = graph.topological_sort(&tables)?;

        let client = self.connection.client_mut();
        let transaction = cancellable(cancel, client.transaction())
            .await?
            .map_err(|e| Error::ExecutionDb {
                context: "failed to start transaction".to_string(),
                source: e,
            })?;

        let mut total = 0usize;
        for table in &sorted_tables {
            let rows = state.data.get(table).map(Vec::as_slice).unwrap_or(&[]);
            if rows.is_empty() {
                continue;
            }

            let pk_columns = graph.primary_key_columns(table);
            insert_table(&transaction, cancel, table, rows, pk_columns, upsert_mode).await?;

            total += rows.len();
            debug!("inserted {} rows into {table}", rows.len());
        }

        transaction.commit().await.map_err(|e| Error::ExecutionDb {
            context: "failed to commit transaction".to_string(),
            source: e,
        })?;

        info!("inserted {total} rows into {} tables", sorted_tables.len());

        Ok(())
    }
}

/// Structural check on the snapshot itself: every non-self foreign key of an
/// emitted table must point at a table that was also extracted with at least
/// one row. No catalog query is made against the target.
fn validate_foreign_keys(graph: &Graph, state: &TraversalState) -> Result<()> {
    let mut missing: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (table, rows) in &state.data {
        if rows.is_empty() {
            continue;
        }

        for fk in graph.parents_of(table) {
            let parent = fk.parent_table.as_str();
            if parent == table {
                continue;
            }

            let absent = state.data.get(parent).map_or(true, |rows| rows.is_empty());
            if absent {
                let parents = missing.entry(table).or_default();
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    let details: Vec<String> = missing
        .iter()
        .map(|(table, parents)| {
            format!(
                "table '{table}' references missing parent table(s): {}",
                parents.join(", ")
            )
        })
        .collect();

    Err(Error::Execution(format!(
        "snapshot integrity violation: {}; re-run with full traversal (no --parents/--children) or check the FK graph",
        details.join("; ")
    )))
}

async fn insert_table(
    transaction: &Transaction<'_>,
    cancel: &CancellationToken,
    table: &str,
    rows: &[TableRow],
    pk_columns: &[String],
    upsert_mode: bool,
) -> Result<()> {
    let rows = rows_sorted_by_pk(rows, pk_columns);

    let columns: Vec<String> = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();

    let json_columns = target_json_columns(transaction, cancel, table).await?;

    // json/jsonb values travel as text; the cast re-types them on entry.
    let placeholders: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| match json_columns.get(column) {
            Some(data_type) => format!("${}::{data_type}", i + 1),
            None => format!("${}", i + 1),
        })
        .collect();

    let insert = build_insert_statement(table, &columns, &placeholders, pk_columns, upsert_mode);

    let statement = cancellable(cancel, transaction.prepare(&insert))
        .await?
        .map_err(|e| Error::ExecutionDb {
            context: format!("failed to prepare insert for {table}"),
            source: e,
        })?;

    for row in &rows {
        let params: Vec<&(dyn ToSql + Sync)> = columns
            .iter()
            .map(|column| row.get(column).unwrap_or(&SQL_NULL) as &(dyn ToSql + Sync))
            .collect();

        cancellable(cancel, transaction.execute(&statement, &params))
            .await?
            .map_err(|e| Error::ExecutionDb {
                context: format!("failed to insert into {table}"),
                source: e,
            })?;
    }

    Ok(())
}

/// Which columns of `table` are json/jsonb in the target database.
async fn target_json_columns(
    transaction: &Transaction<'_>,
    cancel: &CancellationToken,
    table: &str,
) -> Result<BTreeMap<String, String>> {
    let query = "
        SELECT column_name, data_type
        FROM information_schema.columns
        WHERE table_schema = 'public'
          AND table_name = $1
    ";

    let rows = cancellable(cancel, transaction.query(query, &[&table]))
        .await?
        .map_err(|e| Error::ExecutionDb {
            context: format!("failed to get column info for {table}"),
            source: e,
        })?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            (data_type == "json" || data_type == "jsonb").then_some((name, data_type))
        })
        .collect())
}

fn build_insert_statement(
    table: &str,
    columns: &[String],
    placeholders: &[String],
    pk_columns: &[String],
    upsert_mode: bool,
) -> String {
    let base = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );

    if !upsert_mode {
        return base;
    }

    let update_set: Vec<String> = columns
        .iter()
        .filter(|column| !pk_columns.contains(column))
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();

    if update_set.is_empty() {
        format!("{base} ON CONFLICT ({}) DO NOTHING", pk_columns.join(", "))
    } else {
        format!(
            "{base} ON CONFLICT ({}) DO UPDATE SET {}",
            pk_columns.join(", "),
            update_set.join(", ")
        )
    }
}
