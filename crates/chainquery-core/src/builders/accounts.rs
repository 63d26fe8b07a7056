//! Account listing filter.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::address::normalize_hex;
use crate::pagination::Pageable;
use crate::query::Condition;
use crate::types::{collections, EntityKind};

pub const ADDRESS: &str = "account.address";
pub const PUBLIC_KEY: &str = "account.publicKey";
pub const MOSAICS: &str = "account.mosaics";
pub const IMPORTANCES: &str = "account.importances";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountFilter {
    pub address: Option<String>,
    /// Only accounts holding a balance entry for this mosaic.
    pub mosaic_id: Option<u64>,
}

impl AccountFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn holding(mut self, mosaic_id: u64) -> Self {
        self.mosaic_id = Some(mosaic_id);
        self
    }
}

impl Pageable for AccountFilter {
    fn kind(&self) -> EntityKind {
        EntityKind::Account
    }

    fn collection(&self) -> &'static str {
        collections::ACCOUNTS
    }

    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(address) = &self.address {
            conditions.push(Condition::eq(ADDRESS, normalize_hex(address)));
        }
        if let Some(mosaic_id) = self.mosaic_id {
            conditions.push(Condition::contains(MOSAICS, json!({ "id": mosaic_id })));
        }
        conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mosaic_filter_is_element_membership() {
        let filter = AccountFilter::new().holding(u64::MAX);
        assert_eq!(
            filter.conditions(),
            vec![Condition::contains(MOSAICS, json!({"id": u64::MAX}))]
        );
    }

    #[test]
    fn address_is_normalized() {
        let filter = AccountFilter::new().address("98ab");
        assert_eq!(filter.conditions(), vec![Condition::eq(ADDRESS, "98AB")]);
    }
}
