//! Entity query builders.
//!
//! Each filter type translates caller-level options into store predicates and
//! implements [`Pageable`](crate::pagination::Pageable), so the ledger facade
//! runs all three through the same pagination engine.

pub mod accounts;
pub mod blocks;
pub mod transactions;

pub use accounts::AccountFilter;
pub use blocks::BlockFilter;
pub use transactions::TransactionFilter;
