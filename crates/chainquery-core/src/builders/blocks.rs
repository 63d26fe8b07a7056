//! Block listing filter.

use serde::{Deserialize, Serialize};

use crate::address::normalize_hex;
use crate::pagination::Pageable;
use crate::query::{Condition, FieldPath, SortField};
use crate::types::{collections, EntityKind};

pub const HEIGHT: &str = "block.height";
pub const SIGNER_PUBLIC_KEY: &str = "block.signerPublicKey";
pub const BENEFICIARY_ADDRESS: &str = "block.beneficiaryAddress";

/// Sort blocks by height instead of storage order.
pub fn sort_by_height() -> SortField {
    SortField::Path(FieldPath::new(HEIGHT))
}

/// Filters for paged block listings.
///
/// Merkle trees are kept in listings; only single-block lookups drop them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockFilter {
    pub signer_public_key: Option<String>,
    pub beneficiary_address: Option<String>,
}

impl BlockFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signer(mut self, public_key: impl Into<String>) -> Self {
        self.signer_public_key = Some(public_key.into());
        self
    }

    pub fn beneficiary(mut self, address: impl Into<String>) -> Self {
        self.beneficiary_address = Some(address.into());
        self
    }
}

impl Pageable for BlockFilter {
    fn kind(&self) -> EntityKind {
        EntityKind::Block
    }

    fn collection(&self) -> &'static str {
        collections::BLOCKS
    }

    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(key) = &self.signer_public_key {
            conditions.push(Condition::eq(SIGNER_PUBLIC_KEY, normalize_hex(key)));
        }
        if let Some(address) = &self.beneficiary_address {
            conditions.push(Condition::eq(BENEFICIARY_ADDRESS, normalize_hex(address)));
        }
        conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_all() {
        assert!(BlockFilter::new().conditions().is_empty());
        assert!(BlockFilter::new().stripped_fields().is_empty());
    }

    #[test]
    fn signer_and_beneficiary_are_anded() {
        let filter = BlockFilter::new().signer("ab01").beneficiary("98cd");
        assert_eq!(
            filter.conditions(),
            vec![
                Condition::eq(SIGNER_PUBLIC_KEY, "AB01"),
                Condition::eq(BENEFICIARY_ADDRESS, "98CD"),
            ]
        );
    }
}
