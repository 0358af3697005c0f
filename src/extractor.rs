//! The data extraction engine.
//!
//! Validates the root query, then performs a breadth-first closure over the
//! foreign-key graph to collect a referentially complete row set.

mod engine;
mod traversal;
mod validator;

pub use engine::Engine;
pub use traversal::{TableRow, Traversal, TraversalOptions, TraversalState, BATCH_SIZE};
pub use validator::{validate_query, QueryInfo};
