//! Transaction listing filter.

use serde::{Deserialize, Serialize};

use crate::address::normalize_hex;
use crate::pagination::Pageable;
use crate::query::{Condition, FieldPath};
use crate::types::{EntityKind, TransactionState};

pub const TYPE: &str = "transaction.type";
pub const SIGNER_PUBLIC_KEY: &str = "transaction.signerPublicKey";
pub const RECIPIENT_ADDRESS: &str = "transaction.recipientAddress";
pub const HEIGHT: &str = "meta.height";
pub const HASH: &str = "meta.hash";
/// Private list of every address a transaction involves. Never returned.
pub const ADDRESSES: &str = "meta.addresses";
/// Back-reference from a dependent transaction to its aggregate.
pub const AGGREGATE_ID: &str = "meta.aggregateId";

/// Filters for paged transaction listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionFilter {
    /// Involved-address test. When set, signer/recipient are ignored.
    pub address: Option<String>,
    pub signer_public_key: Option<String>,
    pub recipient_address: Option<String>,
    pub state: TransactionState,
    pub height: Option<u64>,
    /// Include dependent (inner) transactions as rows of their own.
    pub embedded: bool,
    pub transaction_types: Vec<u64>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn signer(mut self, public_key: impl Into<String>) -> Self {
        self.signer_public_key = Some(public_key.into());
        self
    }

    pub fn recipient(mut self, address: impl Into<String>) -> Self {
        self.recipient_address = Some(address.into());
        self
    }

    pub fn state(mut self, state: TransactionState) -> Self {
        self.state = state;
        self
    }

    pub fn height(mut self, height: u64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    pub fn types(mut self, types: impl IntoIterator<Item = u64>) -> Self {
        self.transaction_types = types.into_iter().collect();
        self
    }
}

impl Pageable for TransactionFilter {
    fn kind(&self) -> EntityKind {
        EntityKind::Transaction
    }

    fn collection(&self) -> &'static str {
        self.state.collection()
    }

    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();

        if let Some(height) = self.height {
            conditions.push(Condition::eq(HEIGHT, height));
        }

        if !self.embedded {
            conditions.push(Condition::missing(AGGREGATE_ID));
        }

        if let Some(address) = &self.address {
            conditions.push(Condition::contains(ADDRESSES, normalize_hex(address)));
        } else {
            if let Some(key) = &self.signer_public_key {
                conditions.push(Condition::eq(SIGNER_PUBLIC_KEY, normalize_hex(key)));
            }
            if let Some(recipient) = &self.recipient_address {
                conditions.push(Condition::eq(RECIPIENT_ADDRESS, normalize_hex(recipient)));
            }
        }

        if !self.transaction_types.is_empty() {
            conditions.push(Condition::is_in(TYPE, self.transaction_types.iter().copied()));
        }

        conditions
    }

    fn stripped_fields(&self) -> Vec<FieldPath> {
        vec![FieldPath::new(ADDRESSES)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_excludes_dependents() {
        let filter = TransactionFilter::new();
        assert_eq!(filter.collection(), "transactions");
        assert_eq!(filter.conditions(), vec![Condition::missing(AGGREGATE_ID)]);
        assert_eq!(filter.stripped_fields(), vec![FieldPath::new(ADDRESSES)]);
    }

    #[test]
    fn address_replaces_signer_and_recipient() {
        let filter = TransactionFilter::new()
            .address("98aa")
            .signer("bb")
            .recipient("cc")
            .embedded(true);
        assert_eq!(
            filter.conditions(),
            vec![Condition::contains(ADDRESSES, "98AA")]
        );
    }

    #[test]
    fn all_narrow_filters_are_anded() {
        let filter = TransactionFilter::new()
            .signer("bb")
            .recipient("cc")
            .height(10)
            .types([0x4154, 0x4141])
            .state(TransactionState::Unconfirmed);
        assert_eq!(filter.collection(), "unconfirmedTransactions");
        assert_eq!(
            filter.conditions(),
            vec![
                Condition::eq(HEIGHT, 10u64),
                Condition::missing(AGGREGATE_ID),
                Condition::eq(SIGNER_PUBLIC_KEY, "BB"),
                Condition::eq(RECIPIENT_ADDRESS, "CC"),
                Condition::is_in(TYPE, [0x4154u64, 0x4141]),
            ]
        );
    }

    #[test]
    fn filter_deserializes_with_defaults() {
        let filter: TransactionFilter =
            serde_json::from_str(r#"{"state": "partial", "transactionTypes": [16724]}"#).unwrap();
        assert_eq!(filter.state, TransactionState::Partial);
        assert!(!filter.embedded);
        assert_eq!(filter.transaction_types, vec![16724]);
    }
}
