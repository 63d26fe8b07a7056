//! Aggregate transaction assembler.
//!
//! Dependent (inner) transactions are stored as separate documents that point
//! at their owner through `meta.aggregateId`. After the owners are fetched
//! (phase 1) their ids are known, so a second request (phase 2) loads the
//! dependents and this module stitches them into `transaction.transactions`.
//!
//! The two phases are not atomic: a dependent written between them can be
//! missed on that call. Ingestion is append-only, so a retry sees it.

use std::collections::{BTreeMap, HashSet};

use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;

use crate::builders::transactions::{ADDRESSES, AGGREGATE_ID};
use crate::error::QueryError;
use crate::query::{Condition, FieldPath, FindQuery, Sort};
use crate::sanitize;
use crate::store::DocumentStore;
use crate::types::{Document, EntityKind, StorageId, StoredDocument};

/// Aggregate complete transaction type.
pub const AGGREGATE_COMPLETE: u64 = 0x4141;
/// Aggregate bonded transaction type.
pub const AGGREGATE_BONDED: u64 = 0x4241;

/// Payload key the dependents are attached under.
pub const DEPENDENTS_KEY: &str = "transactions";

pub fn is_aggregate_type(transaction_type: u64) -> bool {
    matches!(transaction_type, AGGREGATE_COMPLETE | AGGREGATE_BONDED)
}

pub fn is_aggregate(doc: &Document) -> bool {
    doc.kind() == EntityKind::Transaction && doc.payload_u64("type").is_some_and(is_aggregate_type)
}

/// Storage ids of the aggregates among `docs`, deduplicated, in input order.
pub fn aggregate_ids(docs: &[Document]) -> Vec<StorageId> {
    let mut seen = HashSet::new();
    docs.iter()
        .filter(|doc| is_aggregate(doc))
        .filter_map(Document::storage_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Phase-2 request: every dependent of the given aggregates, in storage order.
pub fn dependents_query(aggregate_ids: &[StorageId]) -> FindQuery {
    FindQuery::new(vec![Condition::is_in(
        AGGREGATE_ID,
        aggregate_ids.iter().map(|id| id.as_u64()),
    )])
    .sort(Sort::default())
    .exclude([FieldPath::new(ADDRESSES)])
}

/// Attach dependents to their owners.
///
/// A `transactions` list is added only to aggregates with at least one
/// resolved dependent; everything else is returned unchanged.
pub fn attach_dependents(
    owners: Vec<Document>,
    mut dependents: Vec<StoredDocument>,
) -> Result<Vec<Document>, QueryError> {
    dependents.sort_by_key(|d| d.id);

    let aggregate_id_path = FieldPath::new(AGGREGATE_ID);
    let strip = [FieldPath::new(ADDRESSES)];
    let mut grouped: BTreeMap<u64, Vec<Value>> = BTreeMap::new();
    for dependent in dependents {
        let Some(owner) = dependent.get_u64(&aggregate_id_path) else {
            continue;
        };
        let rendered = sanitize::to_entity(EntityKind::Transaction, dependent, &strip);
        grouped
            .entry(owner)
            .or_default()
            .push(serde_json::to_value(rendered)?);
    }

    Ok(owners
        .into_iter()
        .map(|mut owner| {
            if !is_aggregate(&owner) {
                return owner;
            }
            let group = owner
                .storage_id()
                .and_then(|id| grouped.remove(&id.as_u64()));
            if let Some(children) = group {
                owner
                    .payload
                    .fields_mut()
                    .insert(DEPENDENTS_KEY.into(), Value::Array(children));
            }
            owner
        })
        .collect())
}

/// Listing path: one batched dependent lookup for the whole page.
pub async fn attach_batched(
    store: &dyn DocumentStore,
    collection: &str,
    owners: Vec<Document>,
) -> Result<Vec<Document>, QueryError> {
    let ids = aggregate_ids(&owners);
    if ids.is_empty() {
        return Ok(owners);
    }
    let dependents = store.find(collection, &dependents_query(&ids)).await?;
    debug!(
        collection,
        aggregates = ids.len(),
        dependents = dependents.len(),
        "attached dependents to page"
    );
    attach_dependents(owners, dependents)
}

/// Direct-lookup path: each resolved aggregate gets its own dependent lookup.
///
/// The lookups run concurrently; all of them start after the owners are known.
pub async fn attach_individually(
    store: &dyn DocumentStore,
    collection: &str,
    owners: Vec<Document>,
) -> Result<Vec<Document>, QueryError> {
    let ids = aggregate_ids(&owners);
    if ids.is_empty() {
        return Ok(owners);
    }
    let lookups = ids.iter().map(|id| {
        let query = dependents_query(std::slice::from_ref(id));
        async move { store.find(collection, &query).await }
    });
    let dependents: Vec<StoredDocument> = try_join_all(lookups).await?.into_iter().flatten().collect();
    attach_dependents(owners, dependents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner(id: u64, tx_type: u64) -> Document {
        sanitize::to_listing(
            EntityKind::Transaction,
            StoredDocument::new(id, json!({"meta": {"height": 1}, "transaction": {"type": tx_type}})),
            &[],
        )
    }

    fn dependent(id: u64, aggregate: u64) -> StoredDocument {
        StoredDocument::new(
            id,
            json!({
                "meta": {"aggregateId": aggregate, "addresses": ["AA"]},
                "transaction": {"type": 0x4154}
            }),
        )
    }

    #[test]
    fn dependents_attach_in_storage_order() {
        let owners = vec![owner(1, AGGREGATE_COMPLETE), owner(2, 0x4154)];
        let out = attach_dependents(owners, vec![dependent(9, 1), dependent(5, 1)]).unwrap();

        let children = out[0].payload.fields()[DEPENDENTS_KEY].as_array().unwrap();
        let ids: Vec<u64> = children
            .iter()
            .map(|c| c["meta"]["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![5, 9]);
        assert!(children[0]["meta"].get("addresses").is_none());
        assert!(out[1].payload.fields().get(DEPENDENTS_KEY).is_none());
    }

    #[test]
    fn aggregate_without_dependents_gains_no_field() {
        let out = attach_dependents(vec![owner(1, AGGREGATE_BONDED)], vec![]).unwrap();
        assert!(out[0].payload.fields().get(DEPENDENTS_KEY).is_none());
    }

    #[test]
    fn aggregate_ids_skip_non_aggregates_and_duplicates() {
        let docs = vec![
            owner(3, AGGREGATE_BONDED),
            owner(4, 0x4154),
            owner(3, AGGREGATE_BONDED),
            owner(7, AGGREGATE_COMPLETE),
        ];
        assert_eq!(aggregate_ids(&docs), vec![StorageId(3), StorageId(7)]);
    }

    #[test]
    fn dependents_query_shape() {
        let query = dependents_query(&[StorageId(1), StorageId(2)]);
        assert_eq!(
            query.filter,
            vec![Condition::is_in(AGGREGATE_ID, [1u64, 2])]
        );
        assert_eq!(query.effective_sort(), Sort::default());
        assert_eq!(query.projection.exclude, vec![FieldPath::new(ADDRESSES)]);
    }
}
