//! Breadth-first closure over the foreign-key graph.
//!
//! The traversal is over tables, not rows: each dequeued table contributes
//! the values its already-collected rows hold for one side of a foreign key,
//! and the other side is fetched in batched IN-list queries. Row-level
//! deduplication happens in the row processor, which also enforces the row
//! cap.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::validator::QueryInfo;
use crate::db::{cancellable, Connection};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::value::PgValue;

/// Number of IN-list values per fetch, balancing memory and round trips.
pub const BATCH_SIZE: usize = 500;

/// One extracted row, keyed by column name. The map ordering doubles as the
/// ascending column order every emitter relies on.
pub type TableRow = BTreeMap<String, PgValue>;

/// Configuration for a single extraction traversal.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Only traverse upward to parent rows.
    pub parents_only: bool,
    /// Only traverse downward; suppresses the upward closure entirely.
    pub children_only: bool,
    /// Restrict downward traversal to these child tables. Empty means all.
    pub selected_children: BTreeSet<String>,
    /// Hard cap on the number of extracted rows.
    pub max_rows: usize,
    /// Ignore the row cap.
    pub force: bool,
    /// Detailed per-table logging.
    pub verbose: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            parents_only: false,
            children_only: false,
            selected_children: BTreeSet::new(),
            max_rows: 10_000,
            force: false,
            verbose: false,
        }
    }
}

/// Accumulated result of a traversal.
///
/// For every table, each row in `data` has its primary-key identity recorded
/// in `visited`, and `row_count` equals the total number of collected rows.
#[derive(Debug, Default)]
pub struct TraversalState {
    /// Visited primary-key identities per table.
    pub visited: BTreeMap<String, BTreeSet<String>>,
    /// Collected rows per table, in discovery order.
    pub data: BTreeMap<String, Vec<TableRow>>,
    /// Total rows collected across all tables.
    pub row_count: usize,
}

impl TraversalState {
    /// Names of all tables holding at least one extracted row, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.data
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(table, _)| table.clone())
            .collect()
    }
}

/// A single extraction run against one source connection.
pub struct Traversal<'a> {
    graph: &'a Graph,
    connection: &'a Connection,
    options: &'a TraversalOptions,
    cancel: &'a CancellationToken,
    state: TraversalState,
}

impl<'a> Traversal<'a> {
    pub fn new(
        graph: &'a Graph,
        connection: &'a Connection,
        options: &'a TraversalOptions,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            graph,
            connection,
            options,
            cancel,
            state: TraversalState::default(),
        }
    }

    /// Execute the root query, then close over the graph in the configured
    /// direction(s). Consumes the traversal and returns the collected state.
    pub async fn run(mut self, query_info: &QueryInfo) -> Result<TraversalState> {
        info!("starting extraction from table: {}", query_info.base_table);

        self.execute_root_query(query_info).await?;

        // Tracks tables whose upward closure already ran, across both the
        // initial pass and the post-children pass.
        let mut processed_parents: BTreeSet<String> = BTreeSet::new();

        if !self.options.children_only {
            debug!("traversing parent relationships");
            self.traverse_parents(&query_info.base_table).await?;
            processed_parents.insert(query_info.base_table.clone());
        }

        if !self.options.parents_only {
            debug!("traversing child relationships");
            self.traverse_children(&query_info.base_table).await?;

            // Newly discovered child tables may reference lookup tables of
            // their own; pull those parents too. No second downward round.
            if !self.options.children_only {
                let discovered: Vec<String> = self.state.data.keys().cloned().collect();
                for table in discovered {
                    if table != query_info.base_table && !processed_parents.contains(&table) {
                        debug!("traversing parents of discovered table: {table}");
                        self.traverse_parents(&table).await?;
                        processed_parents.insert(table);
                    }
                }
            }
        }

        info!(
            "extracted {} rows from {} tables",
            self.state.row_count,
            self.state.data.len()
        );

        Ok(self.state)
    }

    async fn execute_root_query(&mut self, query_info: &QueryInfo) -> Result<()> {
        let columns = self.table_columns(&query_info.base_table).await?;
        let has_json = columns.iter().any(|(_, data_type)| is_json_type(data_type));

        // A SELECT * over a table with json/jsonb columns is rewritten into
        // an explicit column list so those columns arrive as text with the
        // SQL NULL / JSON null distinction intact. Explicit projections are
        // assumed to come from a user aware of the type.
        let query = if has_json && query_info.query.to_uppercase().contains("SELECT *") {
            rewrite_select_star(&query_info.query, &columns)
        } else {
            query_info.query.clone()
        };

        let rows = cancellable(self.cancel, self.connection.client().query(&query, &[]))
            .await?
            .map_err(|e| Error::Traversal {
                context: "failed to execute root query".to_string(),
                source: e,
            })?;

        self.process_rows(&rows, &query_info.base_table)
    }

    /// Materialize fetched rows into the state: build row maps, derive the
    /// primary-key identity, deduplicate, and enforce the row cap.
    fn process_rows(&mut self, rows: &[Row], table: &str) -> Result<()> {
        let pk_columns = self.graph.primary_key_columns(table).to_vec();
        if pk_columns.is_empty() {
            return Err(Error::Row(format!("table '{table}' has no primary key")));
        }

        let mut discovered = 0usize;

        for row in rows {
            let mut row_map = TableRow::new();
            for (index, column) in row.columns().iter().enumerate() {
                let value = PgValue::from_row(row, index)?;
                row_map.insert(column.name().to_string(), value);
            }

            let mut key_parts = Vec::with_capacity(pk_columns.len());
            for pk in &pk_columns {
                match row_map.get(pk) {
                    None => {
                        return Err(Error::Row(format!(
                            "primary key value(s) missing in table '{table}'"
                        )))
                    }
                    Some(PgValue::Null) => {
                        return Err(Error::Row(format!(
                            "primary key value is NULL in table '{table}'"
                        )))
                    }
                    Some(value) => key_parts.push(value.render_key()),
                }
            }
            let identity = key_parts.join("\u{1f}");

            if !self
                .state
                .visited
                .entry(table.to_string())
                .or_default()
                .insert(identity)
            {
                continue;
            }

            self.state
                .data
                .entry(table.to_string())
                .or_default()
                .push(row_map);
            self.state.row_count += 1;
            discovered += 1;

            if !self.options.force && self.state.row_count > self.options.max_rows {
                return Err(Error::RowLimit {
                    max_rows: self.options.max_rows,
                });
            }
        }

        if discovered > 0 {
            debug!("found {discovered} new rows in {table}");
        }

        Ok(())
    }

    async fn traverse_parents(&mut self, start_table: &str) -> Result<()> {
        let mut queue = VecDeque::from([start_table.to_string()]);
        let mut processed: BTreeSet<String> = BTreeSet::new();

        while let Some(current) = queue.pop_front() {
            if !processed.insert(current.clone()) {
                continue;
            }

            debug!("traversing parents of {current}");

            for fk in self.graph.parents_of(&current).to_vec() {
                self.close_over_edge(&current, &fk.child_column, &fk.parent_table, &fk.parent_column)
                    .await?;
                queue.push_back(fk.parent_table);
            }
        }

        Ok(())
    }

    async fn traverse_children(&mut self, start_table: &str) -> Result<()> {
        let mut queue = VecDeque::from([start_table.to_string()]);
        let mut processed: BTreeSet<String> = BTreeSet::new();

        while let Some(current) = queue.pop_front() {
            if !processed.insert(current.clone()) {
                continue;
            }

            debug!("traversing children of {current}");

            for fk in self.graph.children_of(&current).to_vec() {
                if !self.options.selected_children.is_empty()
                    && !self.options.selected_children.contains(&fk.child_table)
                {
                    continue;
                }

                self.close_over_edge(&current, &fk.parent_column, &fk.child_table, &fk.child_column)
                    .await?;
                queue.push_back(fk.child_table);
            }
        }

        Ok(())
    }

    /// Fetch every row of `to_table` whose `to_column` matches a value that
    /// `from_table`'s rows hold in `from_column`, in sorted batches.
    async fn close_over_edge(
        &mut self,
        from_table: &str,
        from_column: &str,
        to_table: &str,
        to_column: &str,
    ) -> Result<()> {
        let values = self.collect_column_values(from_table, from_column);
        if values.is_empty() {
            return Ok(());
        }

        for batch in values.chunks(BATCH_SIZE) {
            self.fetch_rows_filtered(to_table, to_column, batch).await?;
        }

        Ok(())
    }

    /// Distinct non-null values of one column across a table's collected
    /// rows, sorted by their canonical rendering so batches are
    /// reproducible.
    fn collect_column_values(&self, table: &str, column: &str) -> Vec<PgValue> {
        let mut unique: BTreeMap<String, PgValue> = BTreeMap::new();

        if let Some(rows) = self.state.data.get(table) {
            for row in rows {
                if let Some(value) = row.get(column) {
                    if !value.is_null() {
                        unique
                            .entry(value.render_key())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
        }

        unique.into_values().collect()
    }

    async fn fetch_rows_filtered(
        &mut self,
        table: &str,
        filter_column: &str,
        values: &[PgValue],
    ) -> Result<()> {
        let pk_columns = self.graph.primary_key_columns(table);
        if pk_columns.is_empty() {
            return Err(Error::Schema(format!(
                "table '{table}' does not have a primary key defined"
            )));
        }
        let order_by = pk_columns.join(", ");

        let columns = self.table_columns(table).await?;
        let select_list = build_select_list(&columns);

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${i}")).collect();
        let query = format!(
            "SELECT {select_list} FROM {table} WHERE {filter_column} IN ({}) ORDER BY {order_by}",
            placeholders.join(", ")
        );

        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let rows = cancellable(self.cancel, self.connection.client().query(&query, &params))
            .await?
            .map_err(|e| Error::Traversal {
                context: format!("failed to fetch rows from {table}"),
                source: e,
            })?;

        self.process_rows(&rows, table)
    }

    /// Column names and declared types of a table, in ordinal order.
    async fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        let query = "
            SELECT column_name, data_type
            FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = $1
            ORDER BY ordinal_position
        ";

        let rows = cancellable(self.cancel, self.connection.client().query(query, &[&table]))
            .await?
            .map_err(|e| Error::Traversal {
                context: format!("failed to get column info for {table}"),
                source: e,
            })?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }
}

fn is_json_type(data_type: &str) -> bool {
    data_type == "json" || data_type == "jsonb"
}

/// Explicit column list in which json/jsonb columns are projected through
/// `to_jsonb(col)::text`. A plain `::text` cast would collapse a JSON `null`
/// literal into SQL NULL; `to_jsonb(SQL NULL)` stays SQL NULL while
/// `to_jsonb('null'::jsonb)::text` yields the string "null".
fn build_select_list(columns: &[(String, String)]) -> String {
    columns
        .iter()
        .map(|(name, data_type)| {
            if is_json_type(data_type) {
                format!("to_jsonb({name})::text AS {name}")
            } else {
                name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn rewrite_select_star(query: &str, columns: &[(String, String)]) -> String {
    let select_list = format!("SELECT {}", build_select_list(columns));
    let rewritten = query.replacen("SELECT *", &select_list, 1);
    if rewritten != query {
        rewritten
    } else {
        query.replacen("select *", &select_list, 1)
    }
}
