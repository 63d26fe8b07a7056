//! Document store traits implemented by the storage backends.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QueryError;
use crate::query::{Condition, FindQuery};
use crate::types::StoredDocument;

/// Read access to a document store.
///
/// Implementations live in `chainquery-storage` (`InMemoryStore`,
/// `PostgresStore`). Every method is one logical round-trip; drivers do their
/// own pooling, so a single `Arc<dyn DocumentStore>` is shared by all callers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find documents matching `query`, honouring sort, skip, limit and projection.
    async fn find(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<StoredDocument>, QueryError>;

    /// Like [`find`](Self::find), but also returns how many documents match
    /// the filter before skip/limit, computed in the same pass.
    async fn find_with_count(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<(u64, Vec<StoredDocument>), QueryError>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &str, filter: &[Condition]) -> Result<u64, QueryError>;

    /// First document matching `query`, or `None`.
    async fn find_one(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Option<StoredDocument>, QueryError> {
        let query = query.clone().limit(1);
        Ok(self.find(collection, &query).await?.into_iter().next())
    }

    /// Release driver resources. Must be safe to call more than once.
    async fn close(&self) -> Result<(), QueryError> {
        Ok(())
    }
}

/// Opens a [`DocumentStore`] for a given URL and database name.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        database_name: &str,
    ) -> Result<Arc<dyn DocumentStore>, QueryError>;
}
