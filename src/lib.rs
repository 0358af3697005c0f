//! pg-rocket library
//!
//! Extracts referentially complete subsets of rows from a PostgreSQL
//! database, seeded by a single read-only SELECT query, and emits the result
//! as ordered INSERT statements, as a JSON document, or by direct insertion
//! into a second database inside one transaction.
//!
//! # Pipeline
//!
//! 1. [`db`] extracts primary-key and foreign-key metadata from the catalog.
//! 2. [`graph`] builds the FK graph, refusing multi-table cycles.
//! 3. [`extractor`] validates the root query and closes over the graph
//!    breadth-first, upward to parents and/or downward to children.
//! 4. [`output`] emits the accumulated rows in topological order, or inserts
//!    them transactionally into a target database.
//!
//! # Library usage
//!
//! ```no_run
//! use pg_rocket::{Connection, Engine, SqlWriter, TraversalOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> pg_rocket::Result<()> {
//! let cancel = CancellationToken::new();
//! let connection = Connection::connect("postgres://localhost/app").await?;
//! let engine = Engine::new(connection, &cancel).await?;
//!
//! let options = TraversalOptions::default();
//! let state = engine
//!     .extract(&cancel, "SELECT * FROM tasks WHERE id = 1", &options)
//!     .await?;
//!
//! let mut out = Vec::new();
//! SqlWriter::new(&mut out, engine.graph()).write(&state)?;
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod output;
pub mod testing;
pub mod value;

pub use db::{Connection, ForeignKey, Metadata};
pub use error::{Error, Result};
pub use extractor::{Engine, QueryInfo, TraversalOptions, TraversalState};
pub use graph::Graph;
pub use output::{Executor, JsonWriter, SqlWriter};
pub use value::PgValue;
