//! Base-table detection through the query planner.

use std::collections::BTreeSet;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::connection::{cancellable, Connection};
use crate::error::{Error, Result};

/// Keywords whose presence anywhere in the query text rejects it outright.
/// Intentionally conservative: a literal containing one of these words is
/// refused rather than risking a write slipping through.
const WRITE_KEYWORDS: [&str; 6] = ["INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER"];

/// Top-level element of `EXPLAIN (FORMAT JSON)` output.
#[derive(Debug, Deserialize)]
struct ExplainPlan {
    #[serde(rename = "Plan")]
    plan: ExplainNode,
}

/// One node of the query plan tree.
#[derive(Debug, Deserialize)]
struct ExplainNode {
    #[serde(rename = "Relation Name", default)]
    relation_name: Option<String>,
    #[serde(rename = "Plans", default)]
    plans: Vec<ExplainNode>,
}

/// True when the trimmed, upper-cased query text contains a write keyword.
pub fn is_write_query(query: &str) -> bool {
    let upper = query.trim().to_uppercase();
    WRITE_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

fn collect_relations(node: &ExplainNode, tables: &mut BTreeSet<String>) {
    if let Some(name) = &node.relation_name {
        if !name.is_empty() {
            tables.insert(name.clone());
        }
    }
    for child in &node.plans {
        collect_relations(child, tables);
    }
}

impl Connection {
    /// Determine which table a query draws rows from by walking its
    /// `EXPLAIN` plan. Fails for non-read-only queries and for queries whose
    /// plan references zero or more than one relation.
    pub async fn detect_base_table(
        &self,
        cancel: &CancellationToken,
        query: &str,
    ) -> Result<String> {
        let query = query.trim();

        if is_write_query(query) {
            return Err(Error::Query(
                "query must be read-only (SELECT only)".to_string(),
            ));
        }

        let explain_query = format!("EXPLAIN (FORMAT JSON) {query}");
        let rows = cancellable(cancel, self.client().query(&explain_query, &[]))
            .await?
            .map_err(|e| Error::QueryDb {
                context: "failed to execute EXPLAIN".to_string(),
                source: e,
            })?;

        let row = rows
            .first()
            .ok_or_else(|| Error::Query("empty EXPLAIN output".to_string()))?;

        // The plan column is json on modern servers; fall back to parsing a
        // textual column for anything older.
        let plan_json: serde_json::Value = match row.try_get(0) {
            Ok(value) => value,
            Err(_) => {
                let text: String = row.try_get(0).map_err(|e| Error::QueryDb {
                    context: "failed to read EXPLAIN output".to_string(),
                    source: e,
                })?;
                serde_json::from_str(&text)
                    .map_err(|e| Error::Query(format!("failed to parse EXPLAIN output: {e}")))?
            }
        };

        let plans: Vec<ExplainPlan> = serde_json::from_value(plan_json)
            .map_err(|e| Error::Query(format!("failed to parse EXPLAIN output: {e}")))?;

        let plan = plans
            .first()
            .ok_or_else(|| Error::Query("empty EXPLAIN output".to_string()))?;

        let mut tables = BTreeSet::new();
        collect_relations(&plan.plan, &mut tables);

        match tables.len() {
            0 => Err(Error::Query("no base table detected in query".to_string())),
            1 => Ok(tables.into_iter().next().unwrap_or_default()),
            _ => {
                let list: Vec<String> = tables.into_iter().collect();
                Err(Error::Query(format!(
                    "query references multiple base tables: {}; the query must return rows from exactly one table",
                    list.join(", ")
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_keywords_rejected() {
        assert!(is_write_query("INSERT INTO users VALUES (1)"));
        assert!(is_write_query("  delete from users"));
        assert!(is_write_query("DROP TABLE users"));
        assert!(!is_write_query("SELECT * FROM users"));
    }

    #[test]
    fn test_keyword_screen_is_substring_based() {
        // Conservative by contract: literals containing keywords are refused.
        assert!(is_write_query("SELECT * FROM logs WHERE msg = 'UPDATE ok'"));
    }

    #[test]
    fn test_plan_tree_relation_collection() {
        let json = serde_json::json!([{
            "Plan": {
                "Node Type": "Hash Join",
                "Plans": [
                    {"Node Type": "Seq Scan", "Relation Name": "tasks"},
                    {"Node Type": "Hash", "Plans": [
                        {"Node Type": "Seq Scan", "Relation Name": "projects"}
                    ]}
                ]
            }
        }]);
        let plans: Vec<ExplainPlan> = serde_json::from_value(json).unwrap();
        let mut tables = BTreeSet::new();
        collect_relations(&plans[0].plan, &mut tables);
        let tables: Vec<String> = tables.into_iter().collect();
        assert_eq!(tables, vec!["projects", "tasks"]);
    }
}
