//! Error types for the chainquery data-access layer.

use thiserror::Error;

/// Errors that can occur while configuring, connecting to, or querying the store.
///
/// Absent entities and unknown batch keys are not errors: point lookups
/// return `Ok(None)` and batch lookups return the subset that was found.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected to the document store")]
    NotConnected,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueryError {
    /// Returns `true` if the store could not be reached (or was never connected).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotConnected)
    }

    /// Returns `true` if the error was raised before any store round-trip.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_classification() {
        assert!(QueryError::NotConnected.is_connection());
        assert!(QueryError::Connection("refused".into()).is_connection());
        assert!(!QueryError::Storage("bad query".into()).is_connection());
        assert!(QueryError::Configuration("network id".into()).is_configuration());
    }
}
