//! Shared scaffolding for integration tests.
//!
//! Provides environment-driven connection configuration and the seeded
//! schema the end-to-end scenarios run against. Tests skip cleanly when the
//! environment variables are not set.

pub mod dataset;

use tokio_postgres::{Client, NoTls};

/// Source database DSN for integration tests, from `PGROCKET_TEST_URL`.
pub fn source_dsn() -> Option<String> {
    std::env::var("PGROCKET_TEST_URL").ok()
}

/// Target database DSN for direct-execution tests, from
/// `PGROCKET_TEST_TARGET_URL`. Must point at a different database than the
/// source.
pub fn target_dsn() -> Option<String> {
    std::env::var("PGROCKET_TEST_TARGET_URL").ok()
}

/// Connect a raw client for test setup and assertions.
pub async fn connect(dsn: &str) -> anyhow::Result<Client> {
    let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("postgresql connection error: {e}");
        }
    });

    Ok(client)
}
