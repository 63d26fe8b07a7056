//! Connection manager — owns the process-lifetime store handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::QueryError;
use crate::store::{DocumentStore, StoreConnector};

/// Holds at most one live [`DocumentStore`] handle.
///
/// Callers get a cloned `Arc` from [`handle`](Self::handle) and query without
/// holding the lock, so concurrent operations never serialize on the manager.
pub struct ConnectionManager {
    connector: Arc<dyn StoreConnector>,
    connect_timeout: Duration,
    handle: RwLock<Option<Arc<dyn DocumentStore>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn StoreConnector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            handle: RwLock::new(None),
        }
    }

    /// Open the store. Resolves once a live handle exists.
    ///
    /// Fails with [`QueryError::Connection`] on refusal or when the
    /// configured timeout elapses. No retry is attempted. Connecting an
    /// already-connected manager keeps the existing handle.
    pub async fn connect(&self, url: &str, database_name: &str) -> Result<(), QueryError> {
        let mut slot = self.handle.write().await;
        if slot.is_some() {
            warn!(database = database_name, "connect called on an open connection; keeping it");
            return Ok(());
        }

        let store = tokio::time::timeout(
            self.connect_timeout,
            self.connector.connect(url, database_name),
        )
        .await
        .map_err(|_| {
            QueryError::Connection(format!(
                "timed out after {}ms connecting to {database_name}",
                self.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| match e {
            QueryError::Connection(_) => e,
            other => QueryError::Connection(other.to_string()),
        })?;

        *slot = Some(store);
        info!(database = database_name, "document store connected");
        Ok(())
    }

    /// Release the handle. Idempotent, and a no-op when never connected.
    pub async fn close(&self) -> Result<(), QueryError> {
        let store = self.handle.write().await.take();
        if let Some(store) = store {
            store.close().await?;
            info!("document store connection closed");
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// The live handle, or [`QueryError::NotConnected`].
    pub async fn handle(&self) -> Result<Arc<dyn DocumentStore>, QueryError> {
        self.handle
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(QueryError::NotConnected)
    }
}
