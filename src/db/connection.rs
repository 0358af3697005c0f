//! Connection management for source and target databases.

use std::future::Future;

use tokio_postgres::{Client, NoTls};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A PostgreSQL connection with its I/O task spawned in the background.
pub struct Connection {
    client: Client,
}

impl Connection {
    /// Connect to the database at `dsn` and verify the connection with a
    /// ping before handing it out.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let (client, connection) =
            tokio_postgres::connect(dsn, NoTls)
                .await
                .map_err(|e| Error::Connection {
                    context: "failed to connect to database".to_string(),
                    source: e,
                })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("postgresql connection error: {e}");
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| Error::Connection {
                context: "failed to ping database".to_string(),
                source: e,
            })?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

/// Await a driver future, aborting as soon as the token is cancelled.
///
/// The driver error stays unmapped so each call site can attach its own
/// failure category and context.
pub async fn cancellable<T, F>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<std::result::Result<T, tokio_postgres::Error>>
where
    F: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => Ok(res),
    }
}
