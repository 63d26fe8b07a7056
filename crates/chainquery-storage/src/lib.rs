//! chainquery-storage — document store backends for ChainQuery.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - `postgres` — PostgreSQL JSONB tables via `sqlx` (feature `postgres`)

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryConnector, InMemoryStore};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnector, PostgresOptions, PostgresStore};
