//! Shared types for stored and sanitized ledger documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::FieldPath;

/// Block height. Always a full-width `u64`; never narrowed for arithmetic.
pub type Height = u64;

// ─── StorageId ────────────────────────────────────────────────────────────────

/// The store's internal, insertion-ordered document identifier.
///
/// Never leaves the core under its storage name: paged listings expose it as
/// top-level `id`, point lookups as `meta.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(pub u64);

impl StorageId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for StorageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for StorageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── StoredDocument ───────────────────────────────────────────────────────────

/// A raw document as returned by a [`DocumentStore`](crate::store::DocumentStore).
///
/// `body` holds everything except the storage identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: StorageId,
    pub body: Value,
}

impl StoredDocument {
    pub fn new(id: impl Into<StorageId>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// Resolve a dotted path inside the body.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve(&self.body)
    }

    /// Read a `u64` at `path`; `None` when missing or not an unsigned integer.
    pub fn get_u64(&self, path: &FieldPath) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }
}

// ─── Entity kinds ─────────────────────────────────────────────────────────────

/// The entity kinds that share the `{id, meta, <payload>}` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Block,
    Transaction,
    Account,
}

impl EntityKind {
    /// Key of the payload object inside a stored document.
    pub fn payload_key(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Transaction => "transaction",
            Self::Account => "account",
        }
    }

    pub(crate) fn wrap(self, fields: Map<String, Value>) -> EntityPayload {
        match self {
            Self::Block => EntityPayload::Block(fields),
            Self::Transaction => EntityPayload::Transaction(fields),
            Self::Account => EntityPayload::Account(fields),
        }
    }
}

/// Entity-specific payload, serialized under its payload key
/// (`{"block": {...}}`, `{"transaction": {...}}`, `{"account": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityPayload {
    Block(Map<String, Value>),
    Transaction(Map<String, Value>),
    Account(Map<String, Value>),
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Block(_) => EntityKind::Block,
            Self::Transaction(_) => EntityKind::Transaction,
            Self::Account(_) => EntityKind::Account,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            Self::Block(f) | Self::Transaction(f) | Self::Account(f) => f,
        }
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Self::Block(f) | Self::Transaction(f) | Self::Account(f) => f,
        }
    }
}

// ─── Document ─────────────────────────────────────────────────────────────────

/// A sanitized entity ready to cross the core boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Present on paged listings only; point lookups carry `meta.id` instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<StorageId>,
    pub meta: Map<String, Value>,
    #[serde(flatten)]
    pub payload: EntityPayload,
}

impl Document {
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    /// The storage id, whichever of the two exposed positions holds it.
    pub fn storage_id(&self) -> Option<StorageId> {
        self.id.or_else(|| {
            self.meta
                .get("id")
                .and_then(Value::as_u64)
                .map(StorageId)
        })
    }

    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.meta.get(key).and_then(Value::as_u64)
    }

    pub fn payload_u64(&self, key: &str) -> Option<u64> {
        self.payload.fields().get(key).and_then(Value::as_u64)
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.fields().get(key).and_then(Value::as_str)
    }
}

// ─── Transaction state ────────────────────────────────────────────────────────

/// Which backing collection a transaction query reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    #[default]
    Confirmed,
    Unconfirmed,
    Partial,
}

impl TransactionState {
    pub fn collection(self) -> &'static str {
        match self {
            Self::Confirmed => collections::TRANSACTIONS,
            Self::Unconfirmed => collections::UNCONFIRMED_TRANSACTIONS,
            Self::Partial => collections::PARTIAL_TRANSACTIONS,
        }
    }
}

impl std::str::FromStr for TransactionState {
    type Err = crate::error::QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "unconfirmed" => Ok(Self::Unconfirmed),
            "partial" => Ok(Self::Partial),
            other => Err(crate::error::QueryError::InvalidQuery(format!(
                "unknown transaction state '{other}'"
            ))),
        }
    }
}

/// Collection names written by the ingestion pipeline.
pub mod collections {
    pub const BLOCKS: &str = "blocks";
    pub const TRANSACTIONS: &str = "transactions";
    pub const UNCONFIRMED_TRANSACTIONS: &str = "unconfirmedTransactions";
    pub const PARTIAL_TRANSACTIONS: &str = "partialTransactions";
    pub const ACCOUNTS: &str = "accounts";
    pub const CHAIN_STATISTIC: &str = "chainStatistic";
    pub const TRANSACTION_STATUSES: &str = "transactionStatuses";
}

// ─── Merkle trees ─────────────────────────────────────────────────────────────

/// The two merkle trees stored alongside each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerkleTree {
    Transaction,
    Statement,
}

impl MerkleTree {
    pub fn field(self) -> FieldPath {
        match self {
            Self::Transaction => FieldPath::new("meta.transactionMerkleTree"),
            Self::Statement => FieldPath::new("meta.statementMerkleTree"),
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Transaction => Self::Statement,
            Self::Statement => Self::Transaction,
        }
    }
}

// ─── Auxiliary entities ───────────────────────────────────────────────────────

/// Current chain tip as recorded by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatistic {
    pub height: Height,
    #[serde(default)]
    pub score_high: u64,
    #[serde(default)]
    pub score_low: u64,
}

/// A transaction that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub hash: String,
    pub validation_result: u64,
}

/// Document counts for the main collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub num_blocks: u64,
    pub num_transactions: u64,
    pub num_accounts: u64,
}

/// A reference to an account by either of its identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountRef {
    Address(String),
    PublicKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_serializes_payload_under_kind_key() {
        let mut fields = Map::new();
        fields.insert("height".into(), json!(15));
        let doc = Document {
            id: Some(StorageId(7)),
            meta: Map::new(),
            payload: EntityPayload::Block(fields),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!({"id": 7, "meta": {}, "block": {"height": 15}}));
    }

    #[test]
    fn point_lookup_document_omits_top_level_id() {
        let mut meta = Map::new();
        meta.insert("id".into(), json!(u64::MAX));
        let doc = Document {
            id: None,
            meta,
            payload: EntityPayload::Account(Map::new()),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(doc.storage_id(), Some(StorageId(u64::MAX)));
    }

    #[test]
    fn transaction_state_selects_collection() {
        assert_eq!(TransactionState::default().collection(), "transactions");
        assert_eq!(
            "partial".parse::<TransactionState>().unwrap().collection(),
            "partialTransactions"
        );
        assert!("pending".parse::<TransactionState>().is_err());
    }

    #[test]
    fn merkle_tree_other() {
        assert_eq!(MerkleTree::Transaction.other(), MerkleTree::Statement);
        assert_eq!(
            MerkleTree::Statement.field().as_str(),
            "meta.statementMerkleTree"
        );
    }
}
