//! Error taxonomy for the graphwire driver.
//!
//! Invalid values, invalid identifiers, closed transactions and ambiguous
//! matches are detected locally before any request is sent. Execution,
//! transport and decode errors are only known after a round trip.

use thiserror::Error;

/// Top-level error type for graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid property value for '{key}': {reason}")]
    InvalidPropertyValue { key: String, reason: String },

    #[error("Invalid {kind} identifier: {name:?}")]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("Transaction is already {state}")]
    ClosedTransaction { state: String },

    #[error("Session already has an open transaction")]
    TransactionActive,

    #[error("Expected at most one result from node {node_id} but found {count}")]
    AmbiguousMatch { node_id: i64, count: usize },

    #[error("Query execution error [{code}]: {message}")]
    QueryExecution { code: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{kind} not found with id {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GraphError {
    /// Shorthand for an [`GraphError::InvalidPropertyValue`].
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPropertyValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised by the backend while running a statement.
    pub fn is_query_execution(&self) -> bool {
        matches!(self, Self::QueryExecution { .. })
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<config::ConfigError> for GraphError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_execution_message_is_verbatim() {
        let err = GraphError::QueryExecution {
            code: "Neo.ClientError.Statement.SyntaxError".to_string(),
            message: "Invalid input 'X'".to_string(),
        };
        assert!(err.is_query_execution());
        assert_eq!(
            err.to_string(),
            "Query execution error [Neo.ClientError.Statement.SyntaxError]: Invalid input 'X'"
        );
    }

    #[test]
    fn test_ambiguous_match_display() {
        let err = GraphError::AmbiguousMatch {
            node_id: 7,
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "Expected at most one result from node 7 but found 2"
        );
    }
}
