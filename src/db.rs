//! Database connectivity and schema introspection for PostgreSQL sources.

mod connection;
mod explain;
mod metadata;

pub use connection::{cancellable, Connection};
pub use metadata::{ForeignKey, Metadata};
