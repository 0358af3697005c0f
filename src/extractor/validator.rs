//! Root-query validation.

use tokio_util::sync::CancellationToken;

use crate::db::{cancellable, Connection};
use crate::error::{Error, Result};
use crate::graph::Graph;

/// A validated root query and the single table it draws rows from.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    /// The original SQL SELECT query.
    pub query: String,
    /// The table this query extracts data from.
    pub base_table: String,
}

/// Analyze a SQL query to determine the base table and validate that it is
/// suitable for extraction: read-only, single-table, and projecting every
/// primary-key column of the base table.
pub async fn validate_query(
    connection: &Connection,
    cancel: &CancellationToken,
    query: &str,
    graph: &Graph,
) -> Result<QueryInfo> {
    let base_table = connection.detect_base_table(cancel, query).await?;

    let pk_columns = graph.primary_key_columns(&base_table);
    if pk_columns.is_empty() {
        return Err(Error::Schema(format!(
            "table '{base_table}' does not have a primary key defined"
        )));
    }

    // Preparing with LIMIT 0 yields the result shape without fetching rows.
    let probe = format!("{} LIMIT 0", query.trim());
    let statement = cancellable(cancel, connection.client().prepare(&probe))
        .await?
        .map_err(|e| Error::QueryDb {
            context: "failed to validate query".to_string(),
            source: e,
        })?;

    let missing: Vec<&str> = pk_columns
        .iter()
        .filter(|pk| !statement.columns().iter().any(|c| c.name() == pk.as_str()))
        .map(|pk| pk.as_str())
        .collect();

    if !missing.is_empty() {
        return Err(Error::Query(format!(
            "query must include all primary key columns of '{base_table}'; missing: {}",
            missing.join(", ")
        )));
    }

    Ok(QueryInfo {
        query: query.trim().to_string(),
        base_table,
    })
}
