//! PostgreSQL pool implementation for the pgmulti node
//!
//! This crate provides the sqlx implementation of the connection pool
//! capability defined in pgmulti-core, together with the named parameter
//! rewriting, the typed parameter binding and the row-to-JSON conversion
//! it relies on.

pub mod bind;
pub mod connection;
pub mod named;
pub mod row;

pub use bind::{ParamKind, PgParam};
pub use connection::{connect_options, PostgresPool, PostgresPooledConnection};
pub use named::{to_positional, PositionalQuery};
pub use row::row_to_json;
