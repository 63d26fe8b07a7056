//! chainquery-core — read-side query layer for a ledger gateway.
//!
//! # Architecture
//!
//! ```text
//! LedgerDb
//!    ├── ConnectionManager   (one shared store handle, connect timeout)
//!    ├── builders            (block / transaction / account filters)
//!    ├── pagination          (page + offset modes, clamped page size)
//!    ├── aggregate           (two-phase dependent transaction stitching)
//!    ├── sanitize            (listing form / entity form)
//!    └── DocumentStore       (memory / Postgres, in chainquery-storage)
//! ```

pub mod address;
pub mod aggregate;
pub mod builders;
pub mod config;
pub mod connection;
pub mod error;
pub mod height;
pub mod ledger;
pub mod pagination;
pub mod query;
pub mod sanitize;
pub mod store;
pub mod types;

pub use builders::{AccountFilter, BlockFilter, TransactionFilter};
pub use config::{DbConfig, PageSizeBounds};
pub use connection::ConnectionManager;
pub use error::QueryError;
pub use ledger::{LedgerDb, NameFields};
pub use pagination::{Page, PageOptions, Pageable, Pagination};
pub use query::{Condition, FieldPath, FindQuery, Projection, Sort, SortDirection, SortField};
pub use store::{DocumentStore, StoreConnector};
pub use types::{
    AccountRef, ChainStatistic, Document, EntityKind, Height, MerkleTree, StorageId, StorageInfo,
    StoredDocument, TransactionState, TransactionStatus,
};
