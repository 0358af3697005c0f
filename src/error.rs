//! Error types for pg-rocket.
//!
//! Every failure category carries a distinct, grep-able message prefix so
//! operators can filter logs by phase: `config:`, `connection:`, `schema:`,
//! `query:`, `traversal:`, `emit:`, `exec:`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the extraction pipeline.
///
/// All errors are fatal; there is no local recovery. The direct executor
/// rolls back its transaction when any variant propagates out of its scope.
#[derive(Debug, Error)]
pub enum Error {
    /// Flag or environment validation problems, reported before any
    /// network I/O happens.
    #[error("config: {0}")]
    Config(String),

    /// DSN parse, connect, or ping failures.
    #[error("connection: {context}: {source}")]
    Connection {
        context: String,
        source: tokio_postgres::Error,
    },

    /// Catalog-level problems: metadata extraction failures, missing
    /// primary keys, multi-table FK cycles.
    #[error("schema: {0}")]
    Schema(String),

    /// Root query rejected by validation.
    #[error("query: {0}")]
    Query(String),

    /// Root query validation failed inside the database.
    #[error("query: {context}: {source}")]
    QueryDb {
        context: String,
        source: tokio_postgres::Error,
    },

    /// A traversal-phase fetch failed, annotated with the table involved.
    #[error("traversal: {context}: {source}")]
    Traversal {
        context: String,
        source: tokio_postgres::Error,
    },

    /// Row processing failed: missing or NULL primary key values,
    /// unsupported column types.
    #[error("traversal: {0}")]
    Row(String),

    /// The row cap was exceeded without `force`. Distinct from other
    /// traversal failures so callers can surface the `--force` hint.
    #[error("traversal: row limit exceeded ({max_rows} rows); use --force to override")]
    RowLimit { max_rows: usize },

    /// Output generation failed (serialization, unsortable table set).
    #[error("emit: {0}")]
    Emit(String),

    /// Writer I/O failure.
    #[error("emit: {0}")]
    EmitIo(#[from] std::io::Error),

    /// Direct-execution failures detected before touching the target,
    /// such as snapshot integrity violations.
    #[error("exec: {0}")]
    Execution(String),

    /// Direct-execution failures reported by the target database,
    /// annotated with the offending table or phase.
    #[error("exec: {context}: {source}")]
    ExecutionDb {
        context: String,
        source: tokio_postgres::Error,
    },

    /// The cancellation token fired while a query was in flight.
    #[error("operation cancelled")]
    Cancelled,
}
