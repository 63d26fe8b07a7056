//! `LedgerDb` — the entry point gateway handlers call.
//!
//! Owns the connection manager and exposes every read operation: paged
//! listings, point lookups, batch lookups, and chain-level statistics.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::address::{normalize_hex, public_key_to_address};
use crate::aggregate;
use crate::builders::accounts::{ADDRESS as ACCOUNT_ADDRESS, IMPORTANCES, PUBLIC_KEY};
use crate::builders::blocks::HEIGHT as BLOCK_HEIGHT;
use crate::builders::transactions::{ADDRESSES, HASH as TRANSACTION_HASH, TYPE as TRANSACTION_TYPE};
use crate::builders::{AccountFilter, BlockFilter, TransactionFilter};
use crate::config::DbConfig;
use crate::connection::ConnectionManager;
use crate::error::QueryError;
use crate::height::HeightWindow;
use crate::pagination::{query_page, Page, PageOptions, Pageable};
use crate::query::{Condition, FieldPath, FindQuery, Sort, SortDirection, SortField};
use crate::sanitize;
use crate::store::{DocumentStore, StoreConnector};
use crate::types::{
    collections, AccountRef, ChainStatistic, Document, EntityKind, Height, MerkleTree, StorageId,
    StorageInfo, TransactionState, TransactionStatus,
};

const BLOCK_HASH: &str = "meta.hash";
const STATUS_HASH: &str = "status.hash";
const STATUS_CODE: &str = "status.code";

/// Payload field names used by [`LedgerDb::find_names_by_ids`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameFields {
    /// Field holding the human-readable name, e.g. `name`.
    pub name: String,
    /// Marker-id field documents are grouped by, e.g. `namespaceId`.
    pub id: String,
    /// Optional parent-id field carried through, e.g. `parentId`.
    pub parent_id: Option<String>,
}

/// Read-only access to ledger state in the document store.
pub struct LedgerDb {
    config: DbConfig,
    network_id: u8,
    connection: ConnectionManager,
}

impl LedgerDb {
    /// Validate `config` and build an unconnected instance.
    ///
    /// Fails with [`QueryError::Configuration`] (before any connection
    /// attempt) when the network id is missing or the page bounds are invalid.
    pub fn new(config: DbConfig, connector: Arc<dyn StoreConnector>) -> Result<Self, QueryError> {
        config.validate()?;
        let network_id = config.require_network_id()?;
        let connection =
            ConnectionManager::new(connector, Duration::from_millis(config.connect_timeout_ms));
        Ok(Self {
            config,
            network_id,
            connection,
        })
    }

    pub async fn connect(&self) -> Result<(), QueryError> {
        self.connection
            .connect(&self.config.url, &self.config.database_name)
            .await
    }

    pub async fn close(&self) -> Result<(), QueryError> {
        self.connection.close().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn network_id(&self) -> u8 {
        self.network_id
    }

    async fn store(&self) -> Result<Arc<dyn DocumentStore>, QueryError> {
        self.connection.handle().await
    }

    // ─── Paged listings ───────────────────────────────────────────────────────

    /// Run any [`Pageable`] filter through the pagination engine.
    pub async fn page<P: Pageable + ?Sized>(
        &self,
        filter: &P,
        options: &PageOptions,
    ) -> Result<Page, QueryError> {
        let store = self.store().await?;
        query_page(store.as_ref(), filter, options, &self.config.page_size).await
    }

    pub async fn blocks(&self, filter: &BlockFilter, options: &PageOptions) -> Result<Page, QueryError> {
        self.page(filter, options).await
    }

    /// Paged transactions. Unless `embedded` is set, aggregates on the page
    /// get their dependents attached with one batched lookup.
    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
        options: &PageOptions,
    ) -> Result<Page, QueryError> {
        let store = self.store().await?;
        let mut page = query_page(store.as_ref(), filter, options, &self.config.page_size).await?;
        if !filter.embedded {
            page.data =
                aggregate::attach_batched(store.as_ref(), filter.collection(), page.data).await?;
        }
        Ok(page)
    }

    pub async fn accounts(
        &self,
        filter: &AccountFilter,
        options: &PageOptions,
    ) -> Result<Page, QueryError> {
        self.page(filter, options).await
    }

    // ─── Blocks ───────────────────────────────────────────────────────────────

    async fn find_block(
        &self,
        condition: Condition,
        excluded: &[MerkleTree],
    ) -> Result<Option<Document>, QueryError> {
        let store = self.store().await?;
        let query = FindQuery::new(vec![condition]).exclude(excluded.iter().map(|t| t.field()));
        let row = store.find_one(collections::BLOCKS, &query).await?;
        Ok(row.map(|row| sanitize::to_entity(EntityKind::Block, row, &[])))
    }

    /// Block at `height` without either merkle tree, or `None`.
    pub async fn block_at_height(&self, height: Height) -> Result<Option<Document>, QueryError> {
        self.find_block(
            Condition::eq(BLOCK_HEIGHT, height),
            &[MerkleTree::Transaction, MerkleTree::Statement],
        )
        .await
    }

    /// Block at `height` carrying only the requested merkle tree.
    pub async fn block_with_merkle_tree_at_height(
        &self,
        height: Height,
        tree: MerkleTree,
    ) -> Result<Option<Document>, QueryError> {
        self.find_block(Condition::eq(BLOCK_HEIGHT, height), &[tree.other()])
            .await
    }

    pub async fn block_by_hash(&self, hash: &str) -> Result<Option<Document>, QueryError> {
        self.find_block(
            Condition::eq(BLOCK_HASH, normalize_hex(hash)),
            &[MerkleTree::Transaction, MerkleTree::Statement],
        )
        .await
    }

    /// Up to `count` blocks starting at `height` (`0` = most recent), newest first.
    pub async fn blocks_from(&self, height: Height, count: u64) -> Result<Vec<Document>, QueryError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let chain_height = self.chain_height().await?;
        let window = HeightWindow::resolve(height, count, chain_height);
        if window.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.store().await?;
        let query = FindQuery::new(vec![
            Condition::Gte(BLOCK_HEIGHT.into(), Value::from(window.start_height)),
            Condition::Lt(BLOCK_HEIGHT.into(), Value::from(window.end_height)),
        ])
        .sort(Sort::new(
            SortField::path(BLOCK_HEIGHT),
            SortDirection::Descending,
        ))
        .limit(window.count())
        .exclude([MerkleTree::Transaction.field(), MerkleTree::Statement.field()]);

        let rows = store.find(collections::BLOCKS, &query).await?;
        debug!(
            start = window.start_height,
            end = window.end_height,
            returned = rows.len(),
            "blocks_from"
        );
        Ok(rows
            .into_iter()
            .map(|row| sanitize::to_entity(EntityKind::Block, row, &[]))
            .collect())
    }

    // ─── Chain ────────────────────────────────────────────────────────────────

    pub async fn chain_statistic(&self) -> Result<Option<ChainStatistic>, QueryError> {
        let store = self.store().await?;
        let row = store
            .find_one(collections::CHAIN_STATISTIC, &FindQuery::default())
            .await?;
        match row.and_then(|row| row.body.get("current").cloned()) {
            Some(current) => Ok(Some(serde_json::from_value(current)?)),
            None => Ok(None),
        }
    }

    /// Current chain height; `0` before the first statistic is written.
    pub async fn chain_height(&self) -> Result<Height, QueryError> {
        Ok(self.chain_statistic().await?.map_or(0, |s| s.height))
    }

    pub async fn storage_info(&self) -> Result<StorageInfo, QueryError> {
        let store = self.store().await?;
        let (num_blocks, num_transactions, num_accounts) = tokio::try_join!(
            store.count(collections::BLOCKS, &[]),
            store.count(collections::TRANSACTIONS, &[]),
            store.count(collections::ACCOUNTS, &[]),
        )?;
        Ok(StorageInfo {
            num_blocks,
            num_transactions,
            num_accounts,
        })
    }

    // ─── Transactions ─────────────────────────────────────────────────────────

    async fn transactions_where(
        &self,
        state: TransactionState,
        condition: Condition,
    ) -> Result<Vec<Document>, QueryError> {
        let store = self.store().await?;
        let collection = state.collection();
        let query = FindQuery::new(vec![condition]).exclude([FieldPath::new(ADDRESSES)]);
        let owners = store
            .find(collection, &query)
            .await?
            .into_iter()
            .map(|row| sanitize::to_entity(EntityKind::Transaction, row, &[]))
            .collect();
        aggregate::attach_individually(store.as_ref(), collection, owners).await
    }

    /// Transactions by storage id. Unknown ids are omitted.
    pub async fn transactions_by_ids(
        &self,
        state: TransactionState,
        ids: &[StorageId],
    ) -> Result<Vec<Document>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.transactions_where(state, Condition::IdIn(ids.to_vec()))
            .await
    }

    /// Transactions by content hash. Unknown hashes are omitted.
    pub async fn transactions_by_hashes(
        &self,
        state: TransactionState,
        hashes: &[String],
    ) -> Result<Vec<Document>, QueryError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let hashes = hashes.iter().map(|h| normalize_hex(h));
        self.transactions_where(state, Condition::is_in(TRANSACTION_HASH, hashes))
            .await
    }

    /// Validation results for failed transactions; unknown hashes are omitted.
    pub async fn transactions_by_hashes_failed(
        &self,
        hashes: &[String],
    ) -> Result<Vec<TransactionStatus>, QueryError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store().await?;
        let query = FindQuery::new(vec![Condition::is_in(
            STATUS_HASH,
            hashes.iter().map(|h| normalize_hex(h)),
        )]);
        let hash_path = FieldPath::new(STATUS_HASH);
        let code_path = FieldPath::new(STATUS_CODE);
        Ok(store
            .find(collections::TRANSACTION_STATUSES, &query)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(TransactionStatus {
                    hash: row.get(&hash_path)?.as_str()?.to_string(),
                    validation_result: row.get_u64(&code_path)?,
                })
            })
            .collect())
    }

    /// Latest name record per marker id among transactions of `transaction_type`.
    ///
    /// Documents are scanned newest-first, so when several transactions share a
    /// marker id the most recently stored one wins. Output is ordered by
    /// marker id, descending.
    pub async fn find_names_by_ids(
        &self,
        ids: &[u64],
        transaction_type: u64,
        fields: &NameFields,
    ) -> Result<Vec<Map<String, Value>>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_path = FieldPath::new(format!("transaction.{}", fields.id));
        let name_path = FieldPath::new(format!("transaction.{}", fields.name));
        let parent_path = fields
            .parent_id
            .as_ref()
            .map(|p| FieldPath::new(format!("transaction.{p}")));

        let store = self.store().await?;
        let query = FindQuery::new(vec![
            Condition::is_in(id_path.clone(), ids.iter().copied()),
            Condition::eq(TRANSACTION_TYPE, transaction_type),
        ])
        .sort(Sort::new(SortField::Id, SortDirection::Descending));
        let rows = store.find(collections::TRANSACTIONS, &query).await?;

        let mut names: BTreeMap<u64, Map<String, Value>> = BTreeMap::new();
        for row in rows {
            let Some(marker) = row.get_u64(&id_path) else {
                continue;
            };
            names.entry(marker).or_insert_with(|| {
                let mut record = Map::new();
                record.insert(
                    fields.name.clone(),
                    row.get(&name_path).cloned().unwrap_or(Value::Null),
                );
                record.insert(fields.id.clone(), Value::from(marker));
                if let (Some(parent_field), Some(path)) = (&fields.parent_id, &parent_path) {
                    record.insert(
                        parent_field.clone(),
                        row.get(path).cloned().unwrap_or(Value::Null),
                    );
                }
                record
            });
        }
        Ok(names.into_values().rev().collect())
    }

    // ─── Accounts ─────────────────────────────────────────────────────────────

    /// Accounts for a mix of address and public-key references.
    ///
    /// Public keys are converted to addresses with the configured network id.
    /// Each account's importance history collapses to `importance` and
    /// `importanceHeight` from its first snapshot (zero when there is none).
    pub async fn accounts_by_ids(&self, refs: &[AccountRef]) -> Result<Vec<Document>, QueryError> {
        let mut seen = HashSet::new();
        let mut addresses = Vec::with_capacity(refs.len());
        for account in refs {
            let address = match account {
                AccountRef::Address(address) => normalize_hex(address),
                AccountRef::PublicKey(key) => public_key_to_address(key, self.network_id)?,
            };
            if seen.insert(address.clone()) {
                addresses.push(address);
            }
        }
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.store().await?;
        let query = FindQuery::new(vec![Condition::is_in(ACCOUNT_ADDRESS, addresses)]);
        Ok(store
            .find(collections::ACCOUNTS, &query)
            .await?
            .into_iter()
            .map(|row| collapse_importances(sanitize::to_entity(EntityKind::Account, row, &[])))
            .collect())
    }

    /// The public key recorded for `address`, if the account has one.
    pub async fn address_to_public_key(&self, address: &str) -> Result<Option<String>, QueryError> {
        let store = self.store().await?;
        let public_key = FieldPath::new(PUBLIC_KEY);
        let query = FindQuery::new(vec![Condition::eq(ACCOUNT_ADDRESS, normalize_hex(address))])
            .include([public_key.clone()]);
        let row = store.find_one(collections::ACCOUNTS, &query).await?;
        Ok(row
            .as_ref()
            .and_then(|row| row.get(&public_key))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// Replace `importances: [{value, height}, ..]` with scalar fields taken
/// from the first snapshot.
fn collapse_importances(mut doc: Document) -> Document {
    let key = IMPORTANCES.trim_start_matches("account.");
    let fields = doc.payload.fields_mut();
    let first = match fields.remove(key) {
        Some(Value::Array(snapshots)) => snapshots.into_iter().next(),
        _ => None,
    };
    let (importance, height) = first
        .map(|s| {
            (
                s.get("value").and_then(Value::as_u64).unwrap_or(0),
                s.get("height").and_then(Value::as_u64).unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));
    fields.insert("importance".into(), Value::from(importance));
    fields.insert("importanceHeight".into(), Value::from(height));
    doc
}
