use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the database driver for a single statement
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct StatementError {
    /// SQLSTATE code, when the server supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Human-readable message
    pub message: String,
}

impl StatementError {
    /// Create a statement error without a SQLSTATE code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Attach a SQLSTATE code
    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }
}

/// Error type for the pgmulti node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The inbound message is malformed; the batch never started
    #[error("Validation error: {0}")]
    Validation(String),

    /// No connection could be acquired from the pool
    #[error("Connection error: {0}")]
    Connection(String),

    /// One statement of the batch failed; the batch carried on
    #[error("Query {index} failed: {error}")]
    Query {
        /// Position of the failed statement in the batch
        index: usize,
        /// Driver failure
        error: StatementError,
    },

    /// The node references no usable configuration entity
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// A configuration field could not be resolved
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NodeError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::Validation(_) => "ValidationError",
            NodeError::Connection(_) => "ConnectionError",
            NodeError::Query { .. } => "QueryError",
            NodeError::ConfigurationMissing(_) => "ConfigurationMissingError",
            NodeError::Configuration(_) => "ConfigurationError",
        }
    }

    /// Whether the error aborts the whole batch
    pub fn is_fatal_to_batch(&self) -> bool {
        !matches!(self, NodeError::Query { .. })
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (NodeError::Validation("bad".to_string()), "Validation error: bad"),
            (NodeError::Connection("refused".to_string()), "Connection error: refused"),
            (
                NodeError::Query {
                    index: 2,
                    error: StatementError::new("syntax error at or near \"BAD\""),
                },
                "Query 2 failed: syntax error at or near \"BAD\"",
            ),
            (
                NodeError::ConfigurationMissing("missing postgres configuration".to_string()),
                "Configuration missing: missing postgres configuration",
            ),
            (NodeError::Configuration("port".to_string()), "Configuration error: port"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(NodeError::Validation(String::new()).kind(), "ValidationError");
        assert_eq!(NodeError::Connection(String::new()).kind(), "ConnectionError");
        assert_eq!(
            NodeError::Query { index: 0, error: StatementError::new("x") }.kind(),
            "QueryError"
        );
    }

    #[test]
    fn test_only_query_errors_are_isolated() {
        assert!(NodeError::Validation("x".to_string()).is_fatal_to_batch());
        assert!(NodeError::Connection("x".to_string()).is_fatal_to_batch());
        assert!(!NodeError::Query { index: 0, error: StatementError::new("x") }.is_fatal_to_batch());
    }

    #[test]
    fn test_statement_error_code() {
        let err = StatementError::new("relation \"nope\" does not exist")
            .with_code(Some("42P01".to_string()));
        assert_eq!(err.code.as_deref(), Some("42P01"));
        assert_eq!(err.to_string(), "relation \"nope\" does not exist");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: NodeError = json_error.into();

        match error {
            NodeError::Configuration(msg) => assert!(msg.contains("expected value")),
            _ => panic!("Expected Configuration variant"),
        }
    }
}
