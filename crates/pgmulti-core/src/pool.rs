//! Driver capability consumed by the batch executor.
//!
//! The executor never touches sockets or driver handles directly. It asks
//! a [`ConnectionPool`] for an exclusive [`PooledConnection`], runs its
//! statements on it one at a time and hands it back with
//! [`PooledConnection::release`].

use async_trait::async_trait;

use crate::batch::{QueryParams, Row};
use crate::error::{NodeError, StatementError};

/// Snapshot of pool occupancy, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open connections, idle or in use
    pub size: u32,
    /// Open connections waiting in the pool
    pub idle: usize,
}

/// A bounded pool of connections to one database target
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Wait for a free connection
    ///
    /// Suspends while the pool is exhausted. Fails with
    /// [`NodeError::Connection`] when the target is unreachable, the
    /// credentials are rejected or the pool's acquire timeout elapses.
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, NodeError>;

    /// Current occupancy
    fn status(&self) -> PoolStatus {
        PoolStatus::default()
    }

    /// Close every connection; later acquires fail
    async fn close(&self) {}
}

/// A connection checked out of a [`ConnectionPool`]
#[async_trait]
pub trait PooledConnection: Send {
    /// Run one statement and return its rows
    ///
    /// Named parameters are rewritten to the driver's positional form
    /// before execution.
    async fn query(&mut self, sql: &str, params: &QueryParams) -> Result<Vec<Row>, StatementError>;

    /// Return the connection to its pool
    fn release(self: Box<Self>);
}
