//! Foreign-key and primary-key discovery from the system catalogs.
//!
//! Queries go through `pg_catalog` rather than `information_schema` for
//! compatibility with restricted-permission roles.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use super::connection::{cancellable, Connection};
use crate::error::{Error, Result};

/// A single-column foreign-key relationship between two tables.
///
/// Multi-column constraints surface as one entry per column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Table holding the foreign key.
    pub child_table: String,
    /// Column in the child table.
    pub child_column: String,
    /// Referenced parent table.
    pub parent_table: String,
    /// Referenced column in the parent table.
    pub parent_column: String,
}

/// The complete foreign-key and primary-key structure of the public schema.
///
/// Every foreign key appears exactly once in `parents[child_table]` and
/// exactly once in `children[parent_table]`.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Parent relationships keyed by child table (the FKs a table owns).
    pub parents: BTreeMap<String, Vec<ForeignKey>>,
    /// Child relationships keyed by parent table (the FKs pointing at it).
    pub children: BTreeMap<String, Vec<ForeignKey>>,
    /// Primary-key columns per table, in constraint ordinal order.
    pub primary_key: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    /// Register a foreign key in both adjacency maps.
    pub fn insert_foreign_key(&mut self, fk: ForeignKey) {
        self.children
            .entry(fk.parent_table.clone())
            .or_default()
            .push(fk.clone());
        self.parents.entry(fk.child_table.clone()).or_default().push(fk);
    }

    /// All tables that participate in at least one foreign key, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.parents.keys().cloned().collect();
        for table in self.children.keys() {
            if !self.parents.contains_key(table) {
                tables.push(table.clone());
            }
        }
        tables.sort();
        tables
    }
}

const PRIMARY_KEY_QUERY: &str = "
    SELECT
        c.relname AS table_name,
        a.attname AS column_name
    FROM pg_constraint con
    JOIN pg_class c ON con.conrelid = c.oid
    JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(con.conkey)
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE con.contype = 'p'
        AND n.nspname = 'public'
    ORDER BY c.relname, array_position(con.conkey, a.attnum)
";

const FOREIGN_KEY_QUERY: &str = "
    SELECT
        c.relname AS child_table,
        a.attname AS child_column,
        cp.relname AS parent_table,
        ap.attname AS parent_column
    FROM pg_constraint con
    JOIN pg_class c ON con.conrelid = c.oid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(con.conkey)
    JOIN pg_class cp ON con.confrelid = cp.oid
    JOIN pg_attribute ap ON ap.attrelid = cp.oid AND ap.attnum = ANY(con.confkey)
    WHERE con.contype = 'f'
        AND n.nspname = 'public'
    ORDER BY c.relname, a.attname, cp.relname, ap.attname
";

impl Connection {
    /// Extract all foreign-key relationships and primary-key definitions
    /// from the public schema.
    pub async fn extract_metadata(&self, cancel: &CancellationToken) -> Result<Metadata> {
        let mut metadata = Metadata::default();

        let rows = cancellable(cancel, self.client().query(PRIMARY_KEY_QUERY, &[]))
            .await?
            .map_err(|e| Error::Schema(format!("failed to query primary keys: {e}")))?;

        for row in rows {
            let table: String = row.get(0);
            let column: String = row.get(1);
            metadata.primary_key.entry(table).or_default().push(column);
        }

        let rows = cancellable(cancel, self.client().query(FOREIGN_KEY_QUERY, &[]))
            .await?
            .map_err(|e| Error::Schema(format!("failed to query foreign keys: {e}")))?;

        for row in rows {
            metadata.insert_foreign_key(ForeignKey {
                child_table: row.get(0),
                child_column: row.get(1),
                parent_table: row.get(2),
                parent_column: row.get(3),
            });
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(child: &str, child_col: &str, parent: &str, parent_col: &str) -> ForeignKey {
        ForeignKey {
            child_table: child.to_string(),
            child_column: child_col.to_string(),
            parent_table: parent.to_string(),
            parent_column: parent_col.to_string(),
        }
    }

    #[test]
    fn test_insert_foreign_key_registers_both_sides() {
        let mut metadata = Metadata::default();
        metadata.insert_foreign_key(fk("tasks", "project_id", "projects", "id"));

        assert_eq!(metadata.parents["tasks"].len(), 1);
        assert_eq!(metadata.children["projects"].len(), 1);
        assert_eq!(metadata.parents["tasks"][0].parent_table, "projects");
    }

    #[test]
    fn test_tables_is_sorted_union() {
        let mut metadata = Metadata::default();
        metadata.insert_foreign_key(fk("tasks", "project_id", "projects", "id"));
        metadata.insert_foreign_key(fk("comments", "task_id", "tasks", "id"));

        assert_eq!(metadata.tables(), vec!["comments", "projects", "tasks"]);
    }
}
