//!
//! pgmulti Node - the PostgreSQL multi-query node
//!
//! Resolves a database configuration entity into a connection pool and
//! runs each inbound batch of statements sequentially on one pooled
//! connection, reporting per-statement failures without aborting the
//! batch. Also ships a small standalone host (`pgmulti-run`) that drives
//! one node from newline-delimited JSON.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Node and database configuration entities
pub mod config;

/// Stored credentials
pub mod credentials;

/// Batch execution
pub mod executor;

/// Typed configuration fields
pub mod field;

/// The node
pub mod node;

/// Standalone host
pub mod runner;

// Re-export key types
pub use config::{ConfigRegistry, DatabaseConfigEntity, NodeDefinition, SslSetting, CONFIG_NODE_TYPE, NODE_TYPE};
pub use credentials::{CredentialStore, CredentialSummary, CredentialUpdate, Credentials, InMemoryCredentialStore};
pub use executor::BatchExecutor;
pub use field::FieldType;
pub use node::PostgresNode;
pub use runner::{FlowFile, JsonLinesHost, RunnerSettings};
