//! High-level orchestration of an extraction run.

use tokio_util::sync::CancellationToken;

use super::traversal::{Traversal, TraversalOptions, TraversalState};
use super::validator::validate_query;
use crate::db::Connection;
use crate::error::Result;
use crate::graph::Graph;

/// Owns the source connection and the foreign-key graph for the lifetime of
/// an invocation.
pub struct Engine {
    connection: Connection,
    graph: Graph,
}

impl Engine {
    /// Extract schema metadata and build the foreign-key graph. Fails when
    /// metadata extraction fails or the graph contains a multi-table cycle.
    pub async fn new(connection: Connection, cancel: &CancellationToken) -> Result<Self> {
        let metadata = connection.extract_metadata(cancel).await?;
        let graph = Graph::build(metadata)?;
        Ok(Self { connection, graph })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Validate the root query, then run the traversal and return the
    /// collected state.
    pub async fn extract(
        &self,
        cancel: &CancellationToken,
        query: &str,
        options: &TraversalOptions,
    ) -> Result<TraversalState> {
        let query_info = validate_query(&self.connection, cancel, query, &self.graph).await?;
        Traversal::new(&self.graph, &self.connection, options, cancel)
            .run(&query_info)
            .await
    }
}
