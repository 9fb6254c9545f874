//!
//! pgmulti Core - domain model and host interfaces
//!
//! This crate defines the message and batch types, the error model, and
//! the capabilities the PostgreSQL batch node consumes from its
//! surroundings: the host runtime, the context store and the connection
//! pool. It has no database driver dependency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Batch data model
pub mod batch;

/// Connection configuration
pub mod config;

/// Flow/global context access
pub mod context;

/// Error types
pub mod error;

/// Host runtime callbacks
pub mod host;

/// Driver capability
pub mod pool;

/// Message type
pub mod types;

// Re-export key types
pub use batch::{BatchResult, QueryOutcome, QueryParams, QuerySpec, Row, QUERY_COUNTS_FIELD};
pub use config::{ConnectionConfig, PoolSettings, TlsMode};
pub use context::{ContextScope, ContextStore, InMemoryContextStore};
pub use error::{NodeError, StatementError};
pub use host::{CompletionMode, NodeHost};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use types::Message;
