//! Scripted in-memory implementation of the ConnectionPool trait.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use pgmulti_core::{
    ConnectionPool, NodeError, PoolStatus, PooledConnection, QueryParams, Row, StatementError,
};

/// Acquire/release/query tallies of a [`MockPool`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounters {
    /// Successful acquires
    pub acquired: usize,
    /// Releases
    pub released: usize,
    /// Statements executed
    pub queries: usize,
    /// Highest number of connections checked out at once
    pub max_in_use: usize,
}

#[derive(Default)]
struct PoolState {
    responses: HashMap<String, Result<Vec<Row>, StatementError>>,
    acquire_error: Option<String>,
    query_delay: Option<Duration>,
    executed: Vec<(String, QueryParams)>,
    counters: PoolCounters,
    in_use: usize,
    closed: bool,
}

/// A fake pool answering statements from a script
///
/// Statements are matched on their exact SQL text. Unscripted statements
/// succeed with no rows. Clones share state, so a test can keep a handle
/// while the node owns another.
#[derive(Clone, Default)]
pub struct MockPool {
    state: Arc<Mutex<PoolState>>,
    capacity: Option<Arc<Semaphore>>,
}

impl MockPool {
    /// Create a pool where every statement succeeds with no rows
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with these rows
    pub fn with_rows(self, sql: &str, rows: Vec<Row>) -> Self {
        self.state.lock().responses.insert(sql.to_string(), Ok(rows));
        self
    }

    /// Fail `sql` with this message
    pub fn with_failure(self, sql: &str, message: &str) -> Self {
        self.state
            .lock()
            .responses
            .insert(sql.to_string(), Err(StatementError::new(message)));
        self
    }

    /// Make every acquire fail
    pub fn with_acquire_error(self, message: &str) -> Self {
        self.state.lock().acquire_error = Some(message.to_string());
        self
    }

    /// Sleep this long inside every statement
    pub fn with_query_delay(self, delay: Duration) -> Self {
        self.state.lock().query_delay = Some(delay);
        self
    }

    /// Bound the number of connections checked out at once
    pub fn with_capacity(mut self, connections: usize) -> Self {
        self.capacity = Some(Arc::new(Semaphore::new(connections)));
        self
    }

    /// Current tallies
    pub fn counters(&self) -> PoolCounters {
        self.state.lock().counters
    }

    /// Statements executed so far, in order
    pub fn executed(&self) -> Vec<(String, QueryParams)> {
        self.state.lock().executed.clone()
    }

    /// SQL of the statements executed so far, in order
    pub fn executed_sql(&self) -> Vec<String> {
        self.state.lock().executed.iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, NodeError> {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(NodeError::Connection("pool is closed".to_string()));
            }
            if let Some(message) = &state.acquire_error {
                return Err(NodeError::Connection(message.clone()));
            }
        }

        let permit = match &self.capacity {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| NodeError::Connection(e.to_string()))?,
            ),
            None => None,
        };

        let mut state = self.state.lock();
        state.counters.acquired += 1;
        state.in_use += 1;
        state.counters.max_in_use = state.counters.max_in_use.max(state.in_use);

        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            _permit: permit,
        }))
    }

    fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            size: state.in_use as u32,
            idle: 0,
        }
    }

    async fn close(&self) {
        self.state.lock().closed = true;
    }
}

struct MockConnection {
    state: Arc<Mutex<PoolState>>,
    _permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl PooledConnection for MockConnection {
    async fn query(&mut self, sql: &str, params: &QueryParams) -> Result<Vec<Row>, StatementError> {
        let delay = {
            let mut state = self.state.lock();
            state.executed.push((sql.to_string(), params.clone()));
            state.counters.queries += 1;
            state.query_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.state.lock().responses.get(sql).cloned();
        response.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn release(self: Box<Self>) {
        let mut state = self.state.lock();
        state.counters.released += 1;
        state.in_use -= 1;
    }
}
