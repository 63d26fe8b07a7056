//! In-memory document store.
//!
//! Holds collections of JSON documents in RAM and evaluates conditions,
//! sorting and projection in process. Used for tests and local runs where
//! no database is available.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chainquery_core::error::QueryError;
use chainquery_core::query::{matches_all, Condition, FindQuery};
use chainquery_core::store::{DocumentStore, StoreConnector};
use chainquery_core::types::{StorageId, StoredDocument};

/// In-memory document store.
///
/// Storage ids are assigned from one counter shared by all collections, so
/// they increase in insertion order like a database sequence.
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, Vec<StoredDocument>>>,
    next_id: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<StoredDocument>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a document and return its assigned storage id.
    pub fn insert(&self, collection: &str, body: Value) -> StorageId {
        let id = StorageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument::new(id, body));
        id
    }

    /// Append several documents, returning their ids in order.
    pub fn insert_many(
        &self,
        collection: &str,
        bodies: impl IntoIterator<Item = Value>,
    ) -> Vec<StorageId> {
        bodies
            .into_iter()
            .map(|body| self.insert(collection, body))
            .collect()
    }

    /// Total documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.lock().get(collection).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn matching(&self, collection: &str, filter: &[Condition]) -> Vec<StoredDocument> {
        self.lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches_all(filter, doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn run(&self, collection: &str, query: &FindQuery) -> (u64, Vec<StoredDocument>) {
        let mut docs = self.matching(collection, &query.filter);
        let total = docs.len() as u64;

        let sort = query.effective_sort();
        docs.sort_by(|a, b| sort.compare(a, b));

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        let page = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|mut doc| {
                query.projection.apply(&mut doc.body);
                doc
            })
            .collect();
        (total, page)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<StoredDocument>, QueryError> {
        Ok(self.run(collection, query).1)
    }

    async fn find_with_count(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<(u64, Vec<StoredDocument>), QueryError> {
        Ok(self.run(collection, query))
    }

    async fn count(&self, collection: &str, filter: &[Condition]) -> Result<u64, QueryError> {
        Ok(self.matching(collection, filter).len() as u64)
    }
}

/// Hands out a shared [`InMemoryStore`] regardless of URL or database name.
#[derive(Default, Clone)]
pub struct InMemoryConnector {
    store: Arc<InMemoryStore>,
}

impl InMemoryConnector {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(
        &self,
        _url: &str,
        _database_name: &str,
    ) -> Result<Arc<dyn DocumentStore>, QueryError> {
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainquery_core::query::{FieldPath, Sort, SortDirection, SortField};
    use serde_json::json;

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for h in [3u64, 1, 2, 5, 4] {
            store.insert("blocks", json!({"block": {"height": h}, "meta": {"hash": format!("H{h}")}}));
        }
        store
    }

    #[tokio::test]
    async fn ids_increase_across_collections() {
        let store = InMemoryStore::new();
        let a = store.insert("blocks", json!({}));
        let b = store.insert("accounts", json!({}));
        let c = store.insert("blocks", json!({}));
        assert!(a < b && b < c);
        assert_eq!(store.len("blocks"), 2);
        assert!(store.is_empty("transactions"));
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let store = seeded();
        let query = FindQuery::new(vec![])
            .sort(Sort::new(SortField::path("block.height"), SortDirection::Descending))
            .skip(1)
            .limit(2);
        let (total, rows) = store.find_with_count("blocks", &query).await.unwrap();
        assert_eq!(total, 5);
        let heights: Vec<u64> = rows
            .iter()
            .map(|r| r.get_u64(&FieldPath::new("block.height")).unwrap())
            .collect();
        assert_eq!(heights, vec![4, 3]);
    }

    #[tokio::test]
    async fn count_applies_filter() {
        let store = seeded();
        let filter = [Condition::Gte(FieldPath::new("block.height"), json!(3))];
        assert_eq!(store.count("blocks", &filter).await.unwrap(), 3);
        assert_eq!(store.count("missing", &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn projection_is_applied_to_results() {
        let store = seeded();
        let query = FindQuery::new(vec![Condition::eq("block.height", 2u64)])
            .exclude([FieldPath::new("meta.hash")]);
        let row = store.find_one("blocks", &query).await.unwrap().unwrap();
        assert_eq!(row.body, json!({"block": {"height": 2}, "meta": {}}));
    }

    #[tokio::test]
    async fn connector_shares_one_store() {
        let connector = InMemoryConnector::default();
        connector.store().insert("blocks", json!({"block": {"height": 1}}));
        let store = connector.connect("memory://", "test").await.unwrap();
        assert_eq!(store.count("blocks", &[]).await.unwrap(), 1);
    }
}
